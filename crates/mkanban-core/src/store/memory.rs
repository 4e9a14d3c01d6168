use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ActionFilter, ActionStore};
use crate::action::Action;
use crate::error::{MkanbanError, Result};

/// Process-local store for tests and embedders without a data directory.
#[derive(Debug, Default)]
pub struct MemoryActionStore {
    actions: RwLock<BTreeMap<String, Action>>,
}

impl MemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Action>> {
        self.actions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Action>> {
        self.actions.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl ActionStore for MemoryActionStore {
    fn get_all(&self, filter: &ActionFilter) -> Result<Vec<Action>> {
        let mut out: Vec<Action> = self
            .read()
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Action>> {
        Ok(self.read().get(id).cloned())
    }

    fn create(&self, action: &Action) -> Result<()> {
        let mut map = self.write();
        if map.contains_key(&action.id) {
            return Err(MkanbanError::ActionExists(action.id.clone()));
        }
        map.insert(action.id.clone(), action.clone());
        Ok(())
    }

    fn update(&self, action: &Action) -> Result<()> {
        let mut map = self.write();
        match map.get_mut(&action.id) {
            Some(slot) => {
                *slot = action.clone();
                Ok(())
            }
            None => Err(MkanbanError::ActionNotFound(action.id.clone())),
        }
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.write().remove(id).is_some())
    }
}
