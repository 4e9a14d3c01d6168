//! Wires the engine, its background tasks and their collaborators together.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use mkanban_core::config::ActionsConfig;
use mkanban_core::event::{EventPayload, EventType};
use mkanban_core::missed::MissedActionLog;
use mkanban_core::store::ActionStore;
use mkanban_core::Result;

use crate::bus::EventBus;
use crate::clock::{Clock, SystemClock};
use crate::daemon::{
    ActionPollerTask, AppState, DaemonRunner, DaemonTaskConfig, EventListenerTask, FixedInterval,
    OrphanCleanerTask,
};
use crate::engine::ActionEngine;
use crate::executors::ExecutorFactory;
use crate::missed::MissedActionsManager;
use crate::ports::{BoardLookup, NotificationPort, TaskMutationPort};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::service::ActionService;
use crate::settings::SharedConfig;

/// Host-provided collaborators.
pub struct RuntimeDeps {
    pub store: Arc<dyn ActionStore>,
    pub boards: Arc<dyn BoardLookup>,
    pub tasks: Arc<dyn TaskMutationPort>,
    pub notifier: Arc<dyn NotificationPort>,
    pub missed_log: Arc<dyn MissedActionLog>,
    pub config: ActionsConfig,
}

/// Everything the action system needs, built once and passed around
/// explicitly. Call [`ActionsRuntime::init`] before use and
/// [`ActionsRuntime::shutdown`] when done.
pub struct ActionsRuntime {
    bus: EventBus,
    settings: SharedConfig,
    service: Arc<ActionService>,
    engine: ActionEngine,
    missed: MissedActionsManager,
    runner: DaemonRunner,
    poller: Arc<ActionPollerTask>,
}

impl ActionsRuntime {
    pub fn new(deps: RuntimeDeps) -> Self {
        Self::with_clock(deps, Arc::new(SystemClock), Arc::new(TokioScheduler))
    }

    pub fn with_clock(deps: RuntimeDeps, clock: Arc<dyn Clock>, scheduler: Arc<dyn Scheduler>) -> Self {
        let polling = deps.config.polling_interval();
        let settings = SharedConfig::new(deps.config);
        let bus = EventBus::new();
        let service = Arc::new(ActionService::new(
            deps.store,
            deps.boards,
            settings.clone(),
            clock.clone(),
        ));
        let executors = ExecutorFactory::new(deps.tasks, deps.notifier, settings.clone());
        let engine = ActionEngine::new(service.clone(), executors, scheduler.clone(), clock.clone());
        let missed = MissedActionsManager::new(engine.clone(), deps.missed_log, settings.clone(), clock);

        let poller = Arc::new(ActionPollerTask::new(
            engine.clone(),
            settings.clone(),
            Box::new(FixedInterval(polling)),
            scheduler.clone(),
            DaemonTaskConfig::default(),
        ));
        let listener = Arc::new(EventListenerTask::new(
            bus.clone(),
            engine.clone(),
            settings.clone(),
            DaemonTaskConfig::default(),
        ));
        let orphans = Arc::new(OrphanCleanerTask::new(
            service.clone(),
            settings.clone(),
            scheduler,
            DaemonTaskConfig::default(),
        ));

        let runner = DaemonRunner::new(bus.clone());
        runner.register_task(poller.clone());
        runner.register_task(listener);
        runner.register_task(orphans);

        Self {
            bus,
            settings,
            service,
            engine,
            missed,
            runner,
            poller,
        }
    }

    /// Pause and resume the background tasks as the host changes state.
    pub fn with_lifecycle(mut self, states: watch::Receiver<AppState>) -> Self {
        self.runner = self.runner.with_lifecycle(states);
        self
    }

    /// Reconcile missed actions, start the background tasks and announce
    /// startup on the bus.
    pub async fn init(&self) -> Result<()> {
        if !self.settings.get().enabled {
            warn!("actions are disabled in config, background tasks will stay idle");
        }
        let missed = self.missed.check_for_missed_actions()?;
        if !missed.is_empty() {
            info!(count = missed.len(), "found missed actions");
        }
        self.runner.start().await;
        self.bus
            .publish(EventType::AppStartup, EventPayload::system())
            .await;
        Ok(())
    }

    /// Announce shutdown, stop the background tasks and drop pending retries.
    /// An execution already in progress is left to finish.
    pub async fn shutdown(&self) {
        self.bus
            .publish(EventType::AppShutdown, EventPayload::system())
            .await;
        self.runner.stop();
        self.engine.cancel_pending_retries();
        info!("actions runtime shut down");
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn settings(&self) -> &SharedConfig {
        &self.settings
    }

    pub fn service(&self) -> &Arc<ActionService> {
        &self.service
    }

    pub fn engine(&self) -> &ActionEngine {
        &self.engine
    }

    pub fn missed(&self) -> &MissedActionsManager {
        &self.missed
    }

    pub fn runner(&self) -> &DaemonRunner {
        &self.runner
    }

    pub fn poller(&self) -> &Arc<ActionPollerTask> {
        &self.poller
    }
}
