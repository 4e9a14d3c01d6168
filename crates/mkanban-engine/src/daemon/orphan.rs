use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

use mkanban_core::Result;

use super::timer::{Tick, TimerChain};
use super::{DaemonTask, DaemonTaskConfig};
use crate::scheduler::Scheduler;
use crate::service::ActionService;
use crate::settings::SharedConfig;

const NAME: &str = "OrphanCleaner";

struct CleanerState {
    service: Arc<ActionService>,
    settings: SharedConfig,
    config: Mutex<DaemonTaskConfig>,
}

impl CleanerState {
    fn config(&self) -> DaemonTaskConfig {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn enabled(&self) -> bool {
        self.config().enabled && self.settings.get().enabled
    }

    async fn clean(&self) -> Result<usize> {
        if !self.enabled() {
            return Ok(0);
        }
        let cleaned = self.service.clean_orphaned_actions().await?;
        if cleaned > 0 {
            info!("[{NAME}] cleaned {cleaned} orphaned action(s)");
        }
        Ok(cleaned)
    }
}

#[async_trait]
impl Tick for CleanerState {
    async fn tick(&self) {
        if let Err(e) = self.clean().await {
            error!("[{NAME}] orphan sweep failed: {e}");
        }
    }

    fn next_delay(&self) -> Duration {
        self.config()
            .interval
            .unwrap_or_else(|| self.settings.get().orphan_check_interval())
    }
}

/// Applies the orphan policy on the configured interval.
pub struct OrphanCleanerTask {
    state: Arc<CleanerState>,
    timer: Arc<TimerChain>,
}

impl OrphanCleanerTask {
    pub fn new(
        service: Arc<ActionService>,
        settings: SharedConfig,
        scheduler: Arc<dyn Scheduler>,
        config: DaemonTaskConfig,
    ) -> Self {
        Self {
            state: Arc::new(CleanerState {
                service,
                settings,
                config: Mutex::new(config),
            }),
            timer: Arc::new(TimerChain::new(scheduler)),
        }
    }
}

#[async_trait]
impl DaemonTask for OrphanCleanerTask {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<()> {
        if !self.state.enabled() {
            info!("[{NAME}] disabled");
            return Ok(());
        }
        let Some(generation) = self.timer.begin() else {
            return Ok(());
        };
        info!("[{NAME}] started (every {:?})", self.state.next_delay());
        self.timer.arm(self.state.clone(), generation);
        Ok(())
    }

    fn stop(&self) {
        if self.timer.stop() {
            info!("[{NAME}] stopped");
        }
    }

    async fn execute(&self) -> Result<()> {
        self.state.clean().await.map(|_| ())
    }

    fn is_active(&self) -> bool {
        self.timer.is_running()
    }

    fn config(&self) -> DaemonTaskConfig {
        self.state.config()
    }

    async fn update_config(&self, config: DaemonTaskConfig) -> Result<()> {
        let was_running = self.is_active();
        if was_running {
            self.stop();
        }
        *self.state.config.lock().unwrap_or_else(|e| e.into_inner()) = config;
        if was_running {
            self.start().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ports::BoardLookup;
    use crate::scheduler::TokioScheduler;
    use chrono::Utc;
    use mkanban_core::action::{ActionScope, NewAction};
    use mkanban_core::board::Board;
    use mkanban_core::executor::ExecutorSpec;
    use mkanban_core::store::MemoryActionStore;
    use mkanban_core::trigger::{TimeSchedule, Trigger};
    use mkanban_core::types::ActionType;

    struct NoBoards;

    #[async_trait]
    impl BoardLookup for NoBoards {
        async fn get_board(&self, _: &str) -> Result<Option<Board>> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_interval() {
        let settings = SharedConfig::default();
        let service = Arc::new(ActionService::new(
            Arc::new(MemoryActionStore::new()),
            Arc::new(NoBoards),
            settings.clone(),
            Arc::new(FixedClock::new(Utc::now())),
        ));
        let a = service
            .create_action(
                NewAction::new(ActionType::Reminder, "Board reminder", ActionScope::board("gone"))
                    .trigger(Trigger::Time {
                        schedule: TimeSchedule::daily("10:00"),
                    })
                    .executor(ExecutorSpec::notify("x")),
            )
            .unwrap();

        let task = OrphanCleanerTask::new(
            service.clone(),
            settings,
            Arc::new(TokioScheduler),
            DaemonTaskConfig {
                interval: Some(Duration::from_secs(60)),
                ..Default::default()
            },
        );
        task.start().await.unwrap();
        assert!(service.get_action_by_id(&a.id).unwrap().unwrap().enabled);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!service.get_action_by_id(&a.id).unwrap().unwrap().enabled);
        task.stop();
    }
}
