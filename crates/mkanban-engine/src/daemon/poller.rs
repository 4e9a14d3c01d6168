use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

use mkanban_core::Result;

use super::polling::PollingStrategy;
use super::timer::{Tick, TimerChain};
use super::{DaemonTask, DaemonTaskConfig};
use crate::engine::ActionEngine;
use crate::scheduler::Scheduler;
use crate::settings::SharedConfig;

const NAME: &str = "ActionPoller";

struct PollerState {
    engine: ActionEngine,
    settings: SharedConfig,
    strategy: Mutex<Box<dyn PollingStrategy>>,
    config: Mutex<DaemonTaskConfig>,
}

impl PollerState {
    fn config(&self) -> DaemonTaskConfig {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn enabled(&self) -> bool {
        self.config().enabled && self.settings.get().enabled
    }

    fn evaluate(&self) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        let queued = self.engine.evaluate_time_triggers()?;
        let mut strategy = self.strategy.lock().unwrap_or_else(|e| e.into_inner());
        if queued > 0 {
            strategy.on_activity();
        } else {
            strategy.on_idle();
        }
        Ok(())
    }
}

#[async_trait]
impl Tick for PollerState {
    async fn tick(&self) {
        if let Err(e) = self.evaluate() {
            error!("[{NAME}] time trigger evaluation failed: {e}");
        }
    }

    fn next_delay(&self) -> Duration {
        self.config().interval.unwrap_or_else(|| {
            self.strategy
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .interval()
        })
    }
}

/// Evaluates time triggers on a timer, and once right away on start.
pub struct ActionPollerTask {
    state: Arc<PollerState>,
    timer: Arc<TimerChain>,
}

impl ActionPollerTask {
    pub fn new(
        engine: ActionEngine,
        settings: SharedConfig,
        strategy: Box<dyn PollingStrategy>,
        scheduler: Arc<dyn Scheduler>,
        config: DaemonTaskConfig,
    ) -> Self {
        Self {
            state: Arc::new(PollerState {
                engine,
                settings,
                strategy: Mutex::new(strategy),
                config: Mutex::new(config),
            }),
            timer: Arc::new(TimerChain::new(scheduler)),
        }
    }

    /// Time and inactivity evaluation, on demand.
    pub async fn force_evaluation(&self) -> Result<()> {
        self.execute().await?;
        self.state.engine.evaluate_inactivity_triggers()?;
        Ok(())
    }
}

#[async_trait]
impl DaemonTask for ActionPollerTask {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<()> {
        if self.timer.is_running() {
            return Ok(());
        }
        if !self.state.enabled() {
            info!("[{NAME}] disabled");
            return Ok(());
        }
        let Some(generation) = self.timer.begin() else {
            return Ok(());
        };
        self.state
            .strategy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
        info!("[{NAME}] started (every {:?})", self.state.next_delay());
        self.state.tick().await;
        self.timer.arm(self.state.clone(), generation);
        Ok(())
    }

    fn stop(&self) {
        if self.timer.stop() {
            info!("[{NAME}] stopped");
        }
    }

    async fn execute(&self) -> Result<()> {
        self.state.evaluate()
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
    use crate::clock::{Clock, FixedClock};
    use crate::daemon::FixedInterval;
    use crate::executors::testing::{MemoryTasks, RecordingNotifier};
    use crate::executors::ExecutorFactory;
    use crate::ports::BoardLookup;
    use crate::scheduler::TokioScheduler;
    use crate::service::ActionService;
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

    fn poller(settings: SharedConfig) -> (ActionPollerTask, ActionEngine, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let service = Arc::new(ActionService::new(
            Arc::new(MemoryActionStore::new()),
            Arc::new(NoBoards),
            settings.clone(),
            clock.clone(),
        ));
        let executors = ExecutorFactory::new(
            Arc::new(MemoryTasks::default()),
            Arc::new(RecordingNotifier::default()),
            settings.clone(),
        );
        let engine = ActionEngine::new(service, executors, Arc::new(TokioScheduler), clock.clone());
        let task = ActionPollerTask::new(
            engine.clone(),
            settings,
            Box::new(FixedInterval(Duration::from_secs(30))),
            Arc::new(TokioScheduler),
            DaemonTaskConfig::default(),
        );
        (task, engine, clock)
    }

    /// A ONCE action that is due; it fires on the first evaluation after it
    /// was created and never again.
    fn add_due_once(engine: &ActionEngine, clock: &FixedClock) -> String {
        engine
            .service()
            .create_action(
                NewAction::new(ActionType::Reminder, "Due", ActionScope::global())
                    .trigger(Trigger::Time {
                        schedule: TimeSchedule::once(clock.now() - chrono::Duration::seconds(1)),
                    })
                    .executor(ExecutorSpec::notify("due")),
            )
            .unwrap()
            .id
    }

    #[tokio::test(start_paused = true)]
    async fn evaluates_immediately_on_start() {
        let (task, engine, clock) = poller(SharedConfig::default());
        let id = add_due_once(&engine, &clock);
        task.start().await.unwrap();
        assert!(task.is_active());
        engine.wait_idle().await;
        let a = engine.service().get_action_by_id(&id).unwrap().unwrap();
        assert_eq!(a.execution.total_executions, 1);
        task.stop();
        assert!(!task.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_interval_until_stopped() {
        let (task, engine, clock) = poller(SharedConfig::default());
        task.start().await.unwrap();

        let first = add_due_once(&engine, &clock);
        tokio::time::sleep(Duration::from_secs(31)).await;
        engine.wait_idle().await;
        let a = engine.service().get_action_by_id(&first).unwrap().unwrap();
        assert_eq!(a.execution.total_executions, 1);

        task.stop();
        let second = add_due_once(&engine, &clock);
        tokio::time::sleep(Duration::from_secs(120)).await;
        engine.wait_idle().await;
        let b = engine.service().get_action_by_id(&second).unwrap().unwrap();
        assert_eq!(b.execution.total_executions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_settings_keep_task_idle() {
        let settings = SharedConfig::default();
        settings.update(|c| c.enabled = false);
        let (task, _, _) = poller(settings);
        task.start().await.unwrap();
        assert!(!task.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn update_config_restarts_running_task() {
        let (task, engine, clock) = poller(SharedConfig::default());
        task.start().await.unwrap();
        task.update_config(DaemonTaskConfig {
            interval: Some(Duration::from_secs(5)),
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(task.is_active());

        let id = add_due_once(&engine, &clock);
        tokio::time::sleep(Duration::from_secs(6)).await;
        engine.wait_idle().await;
        let a = engine.service().get_action_by_id(&id).unwrap().unwrap();
        assert_eq!(a.execution.total_executions, 1);
        task.stop();
    }
}
