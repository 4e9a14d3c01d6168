use std::sync::{Arc, RwLock};

use mkanban_core::config::ActionsConfig;

/// Cloneable handle to the live engine settings.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<ActionsConfig>>);

impl SharedConfig {
    pub fn new(config: ActionsConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> ActionsConfig {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut ActionsConfig)) {
        let mut guard = self.0.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }

    pub fn replace(&self, config: ActionsConfig) {
        self.update(|c| *c = config);
    }
}
