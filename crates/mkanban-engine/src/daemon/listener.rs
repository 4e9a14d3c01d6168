use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{debug, error, info};

use mkanban_core::event::{ChangeKind, EntityKind, EventData, EventPayload, EventType};
use mkanban_core::Result;

use super::{DaemonTask, DaemonTaskConfig};
use crate::bus::{EventBus, Subscription};
use crate::engine::ActionEngine;
use crate::settings::SharedConfig;

const NAME: &str = "EventListener";

/// Event types forwarded to the engine.
pub const LISTENED_EVENTS: &[EventType] = &[
    EventType::TaskCreated,
    EventType::TaskUpdated,
    EventType::TaskDeleted,
    EventType::TaskMoved,
    EventType::BoardCreated,
    EventType::BoardLoaded,
    EventType::BoardUpdated,
    EventType::BoardDeleted,
    EventType::BoardSwitched,
    EventType::BoardEnter,
    EventType::BoardExit,
    EventType::ColumnCreated,
    EventType::ColumnUpdated,
    EventType::ColumnDeleted,
    EventType::GitBranchCreated,
    EventType::GitBranchDeleted,
    EventType::GitBranchMerged,
    EventType::GitCommitMade,
    EventType::EntityChanged,
];

/// Feeds bus events into event-trigger evaluation and records task and board
/// activity for inactivity triggers.
pub struct EventListenerTask {
    bus: EventBus,
    engine: ActionEngine,
    settings: SharedConfig,
    config: Mutex<DaemonTaskConfig>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventListenerTask {
    pub const NAME: &'static str = NAME;

    pub fn new(bus: EventBus, engine: ActionEngine, settings: SharedConfig, config: DaemonTaskConfig) -> Self {
        Self {
            bus,
            engine,
            settings,
            config: Mutex::new(config),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    fn enabled(&self) -> bool {
        self.config().enabled && self.settings.get().enabled
    }
}

/// Entity whose tracked activity should be dropped rather than refreshed.
fn deleted_entity(event: EventType, payload: &EventPayload) -> Option<EntityKind> {
    match &payload.data {
        EventData::EntityChange(change) if change.change_type == ChangeKind::Deleted => {
            Some(change.entity_type)
        }
        _ => match event {
            EventType::TaskDeleted => Some(EntityKind::Task),
            EventType::BoardDeleted => Some(EntityKind::Board),
            _ => None,
        },
    }
}

fn handle_event(engine: &ActionEngine, event: EventType, payload: &EventPayload) {
    let deleted = deleted_entity(event, payload);
    if let Some(task_id) = payload.task_id() {
        if deleted == Some(EntityKind::Task) {
            engine.clear_activity(task_id);
        } else {
            engine.record_activity(task_id, payload.timestamp);
        }
    }
    if let Some(board_id) = payload.board_id() {
        if deleted == Some(EntityKind::Board) {
            engine.clear_activity(board_id);
        } else {
            engine.record_activity(board_id, payload.timestamp);
        }
    }

    match engine.evaluate_event_triggers(event, payload) {
        Ok(0) => {}
        Ok(queued) => debug!("[{NAME}] {event} queued {queued} action(s)"),
        Err(e) => error!("[{NAME}] evaluating {event} failed: {e}"),
    }
}

#[async_trait]
impl DaemonTask for EventListenerTask {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }
        if !self.enabled() {
            info!("[{NAME}] disabled");
            return Ok(());
        }
        let engine = self.engine.clone();
        let subs = self.bus.subscribe_many(LISTENED_EVENTS, move |event, payload| {
            let engine = engine.clone();
            async move { handle_event(&engine, event, &payload) }
        });
        *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()) = subs;
        info!("[{NAME}] listening for {} event types", LISTENED_EVENTS.len());
        Ok(())
    }

    fn stop(&self) {
        let subs = std::mem::take(&mut *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()));
        if subs.is_empty() {
            return;
        }
        for sub in subs {
            sub.unsubscribe();
        }
        info!("[{NAME}] stopped");
    }

    async fn execute(&self) -> Result<()> {
        Ok(())
    }

    fn is_active(&self) -> bool {
        !self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    fn config(&self) -> DaemonTaskConfig {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn update_config(&self, config: DaemonTaskConfig) -> Result<()> {
        let was_running = self.is_active();
        if was_running {
            self.stop();
        }
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = config;
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
    use mkanban_core::event::EntityChange;
    use mkanban_core::trigger::{BoardSwitchEvent, Trigger};
    use mkanban_core::types::ActionType;
    use std::sync::Arc;

    struct NoBoards;

    #[async_trait]
    impl BoardLookup for NoBoards {
        async fn get_board(&self, _: &str) -> Result<Option<Board>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn forwards_bus_events_until_stopped() {
        let settings = SharedConfig::default();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let service = Arc::new(ActionService::new(
            Arc::new(MemoryActionStore::new()),
            Arc::new(NoBoards),
            settings.clone(),
            clock.clone(),
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let executors =
            ExecutorFactory::new(Arc::new(MemoryTasks::default()), notifier.clone(), settings.clone());
        let engine = ActionEngine::new(service, executors, Arc::new(TokioScheduler), clock);
        engine
            .service()
            .create_action(
                NewAction::new(ActionType::Automation, "Welcome", ActionScope::board("work"))
                    .trigger(Trigger::BoardSwitch {
                        event: BoardSwitchEvent::Enter,
                        board_id: Some("work".into()),
                    })
                    .executor(ExecutorSpec::notify("Welcome to {board_name}")),
            )
            .unwrap();

        let bus = EventBus::new();
        let task = EventListenerTask::new(bus.clone(), engine.clone(), settings, DaemonTaskConfig::default());
        task.start().await.unwrap();
        assert!(task.is_active());
        assert_eq!(bus.listener_count(EventType::BoardEnter), 1);

        bus.publish(EventType::BoardEnter, EventPayload::board("work", "Work")).await;
        bus.publish(EventType::BoardEnter, EventPayload::board("home", "Home")).await;
        engine.wait_idle().await;
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        assert_eq!(notifier.sent.lock().unwrap()[0].message, "Welcome to Work");

        task.stop();
        assert!(!task.is_active());
        assert_eq!(bus.listener_count(EventType::BoardEnter), 0);
        bus.publish(EventType::BoardEnter, EventPayload::board("work", "Work")).await;
        engine.wait_idle().await;
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn entity_changes_feed_inactivity_tracking() {
        let settings = SharedConfig::default();
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let service = Arc::new(ActionService::new(
            Arc::new(MemoryActionStore::new()),
            Arc::new(NoBoards),
            settings.clone(),
            clock.clone(),
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let executors =
            ExecutorFactory::new(Arc::new(MemoryTasks::default()), notifier.clone(), settings.clone());
        let engine = ActionEngine::new(service, executors, Arc::new(TokioScheduler), clock.clone());
        engine
            .service()
            .create_action(
                NewAction::new(ActionType::Watcher, "Stale", ActionScope::global())
                    .trigger(Trigger::Inactivity {
                        check_interval: 60,
                        inactive_duration: 3600,
                    })
                    .executor(ExecutorSpec::notify("{task_id} is stale")),
            )
            .unwrap();

        let bus = EventBus::new();
        let task = EventListenerTask::new(bus.clone(), engine.clone(), settings, DaemonTaskConfig::default());
        task.start().await.unwrap();

        let change = |id: &str, change_type| {
            EventPayload::new(EventData::EntityChange(EntityChange {
                id: id.into(),
                entity_type: EntityKind::Task,
                change_type,
            }))
            .at(clock.now())
        };
        bus.publish(EventType::EntityChanged, change("t1", ChangeKind::Modified)).await;
        bus.publish(EventType::EntityChanged, change("t2", ChangeKind::Added)).await;
        bus.publish(EventType::EntityChanged, change("t2", ChangeKind::Deleted)).await;
        assert_eq!(engine.evaluate_inactivity_triggers().unwrap(), 0);

        clock.advance(chrono::Duration::hours(2));
        assert_eq!(engine.evaluate_inactivity_triggers().unwrap(), 1);
        engine.wait_idle().await;
        assert_eq!(notifier.sent.lock().unwrap()[0].message, "t1 is stale");
    }
}
