//! Background tasks and the runner that owns their lifecycle.

mod listener;
mod orphan;
mod poller;
mod polling;
mod runner;
mod timer;

pub use listener::{EventListenerTask, LISTENED_EVENTS};
pub use orphan::OrphanCleanerTask;
pub use poller::ActionPollerTask;
pub use polling::{AdaptivePolling, AdaptivePollingConfig, FixedInterval, PollingStrategy};
pub use runner::{DaemonRunner, DaemonStatus};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use mkanban_core::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonTaskConfig {
    pub enabled: bool,
    pub run_in_background: bool,
    /// Overrides the interval the task would otherwise derive from settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
}

impl Default for DaemonTaskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_in_background: false,
            interval: None,
        }
    }
}

#[async_trait]
pub trait DaemonTask: Send + Sync {
    fn name(&self) -> &str;

    /// No-op when already running or disabled.
    async fn start(&self) -> Result<()>;

    /// Stops future ticks. Work already in flight is not interrupted.
    fn stop(&self);

    /// One unit of work, outside the timer.
    async fn execute(&self) -> Result<()>;

    fn is_active(&self) -> bool;

    fn config(&self) -> DaemonTaskConfig;

    /// Restarts the task if it was running so the new settings take effect.
    async fn update_config(&self, config: DaemonTaskConfig) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Foreground,
    Background,
}
