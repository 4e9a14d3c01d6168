//! Detects scheduled fires that fell between two runs and lets the user
//! replay or dismiss them.

use std::sync::Arc;
use tracing::{debug, info};

use mkanban_core::evaluator::TimeTriggerEvaluator;
use mkanban_core::missed::{MissedAction, MissedActionLog, MissedActionsState};
use mkanban_core::Result;

use crate::clock::Clock;
use crate::engine::ActionEngine;
use crate::settings::SharedConfig;

pub struct MissedActionsManager {
    engine: ActionEngine,
    log: Arc<dyn MissedActionLog>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    time: TimeTriggerEvaluator,
}

impl MissedActionsManager {
    pub fn new(
        engine: ActionEngine,
        log: Arc<dyn MissedActionLog>,
        config: SharedConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            log,
            config,
            clock,
            time: TimeTriggerEvaluator::new(),
        }
    }

    /// Records every enabled time-triggered action whose next fire after the
    /// previous check is already in the past and has not run since. The very
    /// first check only stores a baseline. Returns the newly recorded entries.
    pub fn check_for_missed_actions(&self) -> Result<Vec<MissedAction>> {
        let now = self.clock.now();
        let mut state = self.log.load()?;
        let Some(last_check) = state.last_check else {
            debug!("first missed-action check, storing baseline");
            state.last_check = Some(now);
            self.log.save(&state)?;
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for action in self.engine.service().get_enabled_actions()? {
            if !action.has_time_trigger() {
                continue;
            }
            let Some(next) = self.time.next_trigger_time_after(&action, last_check) else {
                continue;
            };
            let ran_since = action.execution.last_triggered.is_some_and(|t| t >= next);
            if next <= now && !ran_since {
                found.push(MissedAction::new(&action, next, now));
            }
        }

        let mut added = Vec::new();
        for m in found {
            if state.add(vec![m.clone()]) == 1 {
                added.push(m);
            }
        }
        self.prune(&mut state);
        state.last_check = Some(now);
        self.log.save(&state)?;
        if !added.is_empty() {
            info!(count = added.len(), "missed actions recorded");
        }
        Ok(added)
    }

    /// Entries within the retention window, oldest first.
    pub fn get_missed_actions(&self) -> Result<Vec<MissedAction>> {
        let mut state = self.log.load()?;
        let before = state.entries.len();
        self.prune(&mut state);
        if state.entries.len() != before {
            self.log.save(&state)?;
        }
        Ok(state.entries)
    }

    pub fn get_missed_actions_count(&self) -> Result<usize> {
        Ok(self.get_missed_actions()?.len())
    }

    /// Drops every record for `action_id`. Returns whether anything was removed.
    pub fn clear_missed_action(&self, action_id: &str) -> Result<bool> {
        let mut state = self.log.load()?;
        let before = state.entries.len();
        state.entries.retain(|m| m.action_id != action_id);
        let removed = state.entries.len() != before;
        if removed {
            self.log.save(&state)?;
        }
        Ok(removed)
    }

    pub fn clear_all_missed_actions(&self) -> Result<()> {
        let mut state = self.log.load()?;
        state.entries.clear();
        self.log.save(&state)
    }

    /// Queues the action for execution now and clears its record. Returns
    /// false when the action no longer exists.
    pub fn execute_missed_action(&self, action_id: &str) -> Result<bool> {
        if self.engine.service().get_action_by_id(action_id)?.is_none() {
            return Ok(false);
        }
        self.engine.execute_now(action_id)?;
        self.clear_missed_action(action_id)?;
        Ok(true)
    }

    /// A retention reaching past the representable range keeps everything.
    fn prune(&self, state: &mut MissedActionsState) {
        let retention = self.config.get().missed_retention();
        if let Some(cutoff) = self.clock.now().checked_sub_signed(retention) {
            state.prune(cutoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::executors::testing::{MemoryTasks, RecordingNotifier};
    use crate::executors::ExecutorFactory;
    use crate::ports::BoardLookup;
    use crate::scheduler::TokioScheduler;
    use crate::service::ActionService;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use mkanban_core::action::{ActionScope, NewAction};
    use mkanban_core::board::Board;
    use mkanban_core::executor::ExecutorSpec;
    use mkanban_core::missed::MemoryMissedActionLog;
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

    fn manager() -> (MissedActionsManager, Arc<FixedClock>, Arc<RecordingNotifier>) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let config = SharedConfig::default();
        let service = Arc::new(ActionService::new(
            Arc::new(MemoryActionStore::new()),
            Arc::new(NoBoards),
            config.clone(),
            clock.clone(),
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let executors =
            ExecutorFactory::new(Arc::new(MemoryTasks::default()), notifier.clone(), config.clone());
        let engine = ActionEngine::new(service, executors, Arc::new(TokioScheduler), clock.clone());
        let mgr = MissedActionsManager::new(
            engine,
            Arc::new(MemoryMissedActionLog::new()),
            config,
            clock.clone(),
        );
        (mgr, clock, notifier)
    }

    fn once_in(mgr: &MissedActionsManager, clock: &FixedClock, minutes: i64) -> String {
        let at = clock.now() + Duration::minutes(minutes);
        mgr.engine
            .service()
            .create_action(
                NewAction::new(ActionType::Reminder, "Call dentist", ActionScope::global())
                    .trigger(Trigger::Time {
                        schedule: TimeSchedule::once(at),
                    })
                    .executor(ExecutorSpec::notify("Call the dentist")),
            )
            .unwrap()
            .id
    }

    #[test]
    fn first_check_only_sets_baseline() {
        let (mgr, clock, _) = manager();
        once_in(&mgr, &clock, -5);
        assert!(mgr.check_for_missed_actions().unwrap().is_empty());
        assert_eq!(mgr.get_missed_actions_count().unwrap(), 0);
    }

    #[test]
    fn fire_between_checks_is_recorded_once() {
        let (mgr, clock, _) = manager();
        mgr.check_for_missed_actions().unwrap();
        let id = once_in(&mgr, &clock, 30);

        clock.advance(Duration::hours(1));
        let missed = mgr.check_for_missed_actions().unwrap();
        assert_eq!(missed.len(), 1);
        assert_eq!(missed[0].action_id, id);
        assert_eq!(missed[0].message.as_deref(), Some("Call the dentist"));

        clock.advance(Duration::hours(1));
        assert!(mgr.check_for_missed_actions().unwrap().is_empty());
        assert_eq!(mgr.get_missed_actions_count().unwrap(), 1);
    }

    #[test]
    fn future_fire_is_not_missed() {
        let (mgr, clock, _) = manager();
        mgr.check_for_missed_actions().unwrap();
        once_in(&mgr, &clock, 120);
        clock.advance(Duration::hours(1));
        assert!(mgr.check_for_missed_actions().unwrap().is_empty());
    }

    #[test]
    fn retention_prunes_old_entries() {
        let (mgr, clock, _) = manager();
        mgr.check_for_missed_actions().unwrap();
        once_in(&mgr, &clock, 30);
        clock.advance(Duration::hours(1));
        assert_eq!(mgr.check_for_missed_actions().unwrap().len(), 1);

        clock.advance(Duration::days(8));
        assert_eq!(mgr.get_missed_actions_count().unwrap(), 0);
    }

    #[test]
    fn unbounded_retention_keeps_entries() {
        let (mgr, clock, _) = manager();
        mgr.config.update(|c| c.missed_actions_retention = u32::MAX);
        mgr.check_for_missed_actions().unwrap();
        once_in(&mgr, &clock, 30);
        clock.advance(Duration::hours(1));
        assert_eq!(mgr.check_for_missed_actions().unwrap().len(), 1);

        clock.advance(Duration::days(30));
        assert_eq!(mgr.get_missed_actions_count().unwrap(), 1);
    }

    #[test]
    fn clear_single_and_all() {
        let (mgr, clock, _) = manager();
        mgr.check_for_missed_actions().unwrap();
        let a = once_in(&mgr, &clock, 10);
        once_in(&mgr, &clock, 20);
        clock.advance(Duration::hours(1));
        assert_eq!(mgr.check_for_missed_actions().unwrap().len(), 2);

        assert!(mgr.clear_missed_action(&a).unwrap());
        assert!(!mgr.clear_missed_action(&a).unwrap());
        assert_eq!(mgr.get_missed_actions_count().unwrap(), 1);
        mgr.clear_all_missed_actions().unwrap();
        assert_eq!(mgr.get_missed_actions_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn execute_missed_runs_and_clears() {
        let (mgr, clock, notifier) = manager();
        mgr.check_for_missed_actions().unwrap();
        let id = once_in(&mgr, &clock, 15);
        clock.advance(Duration::hours(1));
        mgr.check_for_missed_actions().unwrap();

        assert!(mgr.execute_missed_action(&id).unwrap());
        mgr.engine.wait_idle().await;
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        assert_eq!(mgr.get_missed_actions_count().unwrap(), 0);

        assert!(!mgr.execute_missed_action("gone").unwrap());
    }
}
