//! Trigger evaluation, the serial execution queue, retries and chaining.

use chrono::{DateTime, Local, Utc};
use futures::FutureExt;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use mkanban_core::action::Action;
use mkanban_core::condition::check_conditions;
use mkanban_core::context::ExecutionContext;
use mkanban_core::evaluator::{
    EventTriggerEvaluator, InactivityTriggerEvaluator, TimeTriggerEvaluator,
};
use mkanban_core::event::{EventPayload, EventType};
use mkanban_core::types::ScopeType;
use mkanban_core::{MkanbanError, Result};

use crate::clock::Clock;
use crate::executors::ExecutorFactory;
use crate::scheduler::{CancelHandle, Scheduler};
use crate::service::ActionService;

/// Chained executions deeper than this are dropped.
pub const MAX_CHAIN_DEPTH: u32 = 8;

#[derive(Debug, Clone)]
struct QueueEntry {
    action: Action,
    context: ExecutionContext,
    retry_count: u32,
    chain_depth: u32,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    executing: bool,
}

struct Inner {
    service: Arc<ActionService>,
    executors: ExecutorFactory,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    events: EventTriggerEvaluator,
    inactivity: Mutex<InactivityTriggerEvaluator>,
    queue: Mutex<QueueState>,
    /// Time-triggered action ids queued or executing, not yet recorded.
    time_in_flight: Mutex<HashSet<String>>,
    idle: tokio::sync::Notify,
    retries: Mutex<HashMap<u64, CancelHandle>>,
    next_retry: AtomicU64,
}

/// Cheap to clone. Executions are drained one at a time, in the order they
/// were enqueued, by a single task spawned on the current tokio runtime.
#[derive(Clone)]
pub struct ActionEngine {
    inner: Arc<Inner>,
}

impl ActionEngine {
    pub fn new(
        service: Arc<ActionService>,
        executors: ExecutorFactory,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                executors,
                scheduler,
                clock,
                events: EventTriggerEvaluator::new(),
                inactivity: Mutex::new(InactivityTriggerEvaluator::new()),
                queue: Mutex::new(QueueState::default()),
                time_in_flight: Mutex::new(HashSet::new()),
                idle: tokio::sync::Notify::new(),
                retries: Mutex::new(HashMap::new()),
                next_retry: AtomicU64::new(1),
            }),
        }
    }

    pub fn service(&self) -> &Arc<ActionService> {
        &self.inner.service
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Returns how many executions were enqueued. An action whose previous
    /// time-triggered execution has not been recorded yet is skipped.
    pub fn evaluate_time_triggers(&self) -> Result<usize> {
        let now = self.inner.clock.now();
        let local = now.with_timezone(&Local);
        let time = self.time_evaluator();
        let mut queued = 0;
        for action in self.inner.service.get_active_actions()? {
            if !action.has_time_trigger() || self.lock_time_in_flight().contains(&action.id) {
                continue;
            }
            if !time.should_trigger(&action, now) {
                continue;
            }
            let ctx = ExecutionContext::for_action(&action, now);
            if self.passes_conditions(&action, &ctx, &local) {
                self.lock_time_in_flight().insert(action.id.clone());
                self.enqueue(action, ctx, 0, 0);
                queued += 1;
            }
        }
        if queued > 0 {
            debug!(queued, "time triggers fired");
        }
        Ok(queued)
    }

    pub fn evaluate_event_triggers(&self, event: EventType, payload: &EventPayload) -> Result<usize> {
        let local = self.inner.clock.now().with_timezone(&Local);
        let mut queued = 0;
        for action in self.inner.service.get_active_actions()? {
            if !action.has_event_trigger() || !self.inner.events.should_trigger(&action, event, payload) {
                continue;
            }
            let ctx = ExecutionContext::from_event(&action, payload);
            if self.passes_conditions(&action, &ctx, &local) {
                self.enqueue(action, ctx, 0, 0);
                queued += 1;
            }
        }
        if queued > 0 {
            debug!(%event, queued, "event triggers fired");
        }
        Ok(queued)
    }

    /// Board and task scoped actions watch their target; global ones watch
    /// every tracked entity.
    pub fn evaluate_inactivity_triggers(&self) -> Result<usize> {
        let now = self.inner.clock.now();
        let local = now.with_timezone(&Local);
        let mut fired = Vec::new();
        {
            let mut inactivity = self.lock_inactivity();
            for action in self.inner.service.get_active_actions()? {
                if !action.has_inactivity_trigger() {
                    continue;
                }
                let candidates = match (action.scope.scope_type, action.scope.target_id.as_deref()) {
                    (ScopeType::Global, _) => inactivity.tracked_entities(),
                    (_, Some(target)) => vec![target.to_string()],
                    (_, None) => Vec::new(),
                };
                for entity in candidates {
                    if !inactivity.should_trigger(&action, &entity, now) {
                        continue;
                    }
                    let mut ctx = ExecutionContext::for_action(&action, now);
                    if action.scope.scope_type == ScopeType::Board {
                        ctx.board_id = Some(entity);
                    } else {
                        ctx.task_id = Some(entity);
                    }
                    fired.push((action.clone(), ctx));
                }
            }
        }

        let mut queued = 0;
        for (action, ctx) in fired {
            if self.passes_conditions(&action, &ctx, &local) {
                self.enqueue(action, ctx, 0, 0);
                queued += 1;
            }
        }
        Ok(queued)
    }

    pub fn record_activity(&self, entity_id: &str, at: DateTime<Utc>) {
        self.lock_inactivity().record_activity(entity_id, at);
    }

    pub fn clear_activity(&self, entity_id: &str) {
        self.lock_inactivity().clear_state(entity_id);
    }

    pub fn get_next_trigger_time(&self, action: &Action) -> Option<DateTime<Utc>> {
        self.time_evaluator()
            .get_next_trigger_time(action, self.inner.clock.now())
    }

    /// Cron occurrences count as due within one polling interval, read from
    /// the live settings.
    fn time_evaluator(&self) -> TimeTriggerEvaluator {
        let interval = self.inner.service.config().get().polling_interval();
        TimeTriggerEvaluator::with_cron_window(interval)
    }

    fn lock_time_in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.time_in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_watched_event_types(&self, action: &Action) -> BTreeSet<EventType> {
        self.inner.events.get_watched_event_types(action)
    }

    /// Enqueue an action directly, skipping triggers and conditions.
    pub fn execute_now(&self, action_id: &str) -> Result<()> {
        let action = self
            .inner
            .service
            .get_action_by_id(action_id)?
            .ok_or_else(|| MkanbanError::ActionNotFound(action_id.to_string()))?;
        let ctx = ExecutionContext::for_action(&action, self.inner.clock.now());
        self.enqueue(action, ctx, 0, 0);
        Ok(())
    }

    fn passes_conditions(
        &self,
        action: &Action,
        ctx: &ExecutionContext,
        now: &DateTime<Local>,
    ) -> bool {
        let pass = check_conditions(&action.conditions, ctx, now);
        if !pass {
            debug!(id = %action.id, "conditions not met");
        }
        pass
    }

    fn lock_inactivity(&self) -> MutexGuard<'_, InactivityTriggerEvaluator> {
        self.inner.inactivity.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        self.inner.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enqueue(&self, action: Action, context: ExecutionContext, retry_count: u32, chain_depth: u32) {
        let start_drain = {
            let mut queue = self.lock_queue();
            queue.entries.push_back(QueueEntry {
                action,
                context,
                retry_count,
                chain_depth,
            });
            !std::mem::replace(&mut queue.executing, true)
        };
        if start_drain {
            tokio::spawn(self.clone().drain());
        }
    }

    async fn drain(self) {
        loop {
            let next = {
                let mut queue = self.lock_queue();
                match queue.entries.pop_front() {
                    Some(entry) => entry,
                    None => {
                        queue.executing = false;
                        self.inner.idle.notify_waiters();
                        return;
                    }
                }
            };
            self.execute_action(next).await;
        }
    }

    /// Nothing queued and no drain running.
    pub fn is_idle(&self) -> bool {
        let queue = self.lock_queue();
        queue.entries.is_empty() && !queue.executing
    }

    pub fn queue_len(&self) -> usize {
        self.lock_queue().entries.len()
    }

    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    async fn execute_action(&self, entry: QueueEntry) {
        let QueueEntry {
            action,
            context,
            retry_count,
            chain_depth,
        } = entry;
        info!(id = %action.id, name = %action.name, attempt = retry_count + 1, "executing action");

        let mut success = true;
        let mut first_error = None;
        for spec in &action.executors {
            let result = self.inner.executors.dispatch(spec, &context).await;
            if !result.success {
                success = false;
                if first_error.is_none() {
                    first_error = Some(result.error.unwrap_or_else(|| format!("{} failed", spec.kind())));
                }
            }
        }

        if let Err(e) = self
            .inner
            .service
            .record_execution(&action.id, success, first_error.clone())
        {
            error!(id = %action.id, error = %e, "failed to record execution");
        }
        self.lock_time_in_flight().remove(&action.id);

        let chain = if success {
            &action.on_success
        } else {
            &action.on_failure
        };
        for next_id in chain {
            self.enqueue_chained(next_id, &context, chain_depth + 1);
        }

        if success {
            return;
        }
        warn!(id = %action.id, error = first_error.as_deref().unwrap_or(""), "action failed");
        if retry_count < action.metadata.max_retries {
            self.schedule_retry(action, context, retry_count + 1, chain_depth);
        }
    }

    fn enqueue_chained(&self, action_id: &str, context: &ExecutionContext, depth: u32) {
        if depth > MAX_CHAIN_DEPTH {
            warn!(%action_id, depth, "chain too deep, dropping");
            return;
        }
        match self.inner.service.get_action_by_id(action_id) {
            Ok(Some(action)) if action.enabled => {
                let ctx = context.rebind(&action);
                self.enqueue(action, ctx, 0, depth);
            }
            Ok(Some(_)) => debug!(%action_id, "chained action disabled"),
            Ok(None) => warn!(%action_id, "chained action not found"),
            Err(e) => error!(%action_id, error = %e, "failed to load chained action"),
        }
    }

    fn schedule_retry(&self, action: Action, context: ExecutionContext, retry_count: u32, chain_depth: u32) {
        let delay = Duration::from_secs(action.metadata.retry_delay);
        let retry_id = self.inner.next_retry.fetch_add(1, Ordering::Relaxed);
        info!(id = %action.id, retry_count, delay_secs = delay.as_secs(), "scheduling retry");

        let engine = self.clone();
        let action_id = action.id;
        let job = async move {
            engine.lock_retries().remove(&retry_id);
            match engine.inner.service.get_action_by_id(&action_id) {
                Ok(Some(action)) if action.enabled => {
                    engine.enqueue(action, context, retry_count, chain_depth);
                }
                Ok(_) => info!(id = %action_id, "retry abandoned, action gone or disabled"),
                Err(e) => error!(id = %action_id, error = %e, "retry abandoned"),
            }
        }
        .boxed();

        let handle = self.inner.scheduler.schedule_after(delay, job);
        let mut retries = self.lock_retries();
        retries.retain(|_, h| !h.is_finished());
        if !handle.is_finished() {
            retries.insert(retry_id, handle);
        }
    }

    fn lock_retries(&self) -> MutexGuard<'_, HashMap<u64, CancelHandle>> {
        self.inner.retries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pending_retry_count(&self) -> usize {
        self.lock_retries().values().filter(|h| !h.is_finished()).count()
    }

    pub fn cancel_pending_retries(&self) -> usize {
        let handles: Vec<CancelHandle> = self.lock_retries().drain().map(|(_, h)| h).collect();
        let pending = handles.iter().filter(|h| !h.is_finished()).count();
        for handle in &handles {
            handle.cancel();
        }
        if pending > 0 {
            info!(pending, "cancelled pending retries");
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::executors::testing::{MemoryTasks, RecordingNotifier};
    use crate::ports::BoardLookup;
    use crate::scheduler::TokioScheduler;
    use crate::settings::SharedConfig;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use mkanban_core::action::{ActionMetadata, ActionScope, NewAction};
    use mkanban_core::board::Board;
    use mkanban_core::condition::Condition;
    use mkanban_core::executor::ExecutorSpec;
    use mkanban_core::store::MemoryActionStore;
    use mkanban_core::trigger::{TaskStateChangeEvent, Trigger};
    use mkanban_core::types::ActionType;

    struct NoBoards;

    #[async_trait]
    impl BoardLookup for NoBoards {
        async fn get_board(&self, _: &str) -> Result<Option<Board>> {
            Ok(None)
        }
    }

    struct Harness {
        engine: ActionEngine,
        notifier: Arc<RecordingNotifier>,
        tasks: Arc<MemoryTasks>,
        clock: Arc<FixedClock>,
    }

    fn harness(notifier: RecordingNotifier) -> Harness {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let config = SharedConfig::default();
        let service = Arc::new(ActionService::new(
            Arc::new(MemoryActionStore::new()),
            Arc::new(NoBoards),
            config.clone(),
            clock.clone(),
        ));
        let notifier = Arc::new(notifier);
        let tasks = Arc::new(MemoryTasks::default());
        let executors = ExecutorFactory::new(tasks.clone(), notifier.clone(), config);
        let engine = ActionEngine::new(service, executors, Arc::new(TokioScheduler), clock.clone());
        Harness {
            engine,
            notifier,
            tasks,
            clock,
        }
    }

    fn on_task_moved(name: &str) -> NewAction {
        NewAction::new(ActionType::Automation, name, ActionScope::global())
            .trigger(Trigger::TaskStateChange {
                events: vec![TaskStateChangeEvent::Moved],
            })
            .executor(ExecutorSpec::notify("{task_title} moved"))
    }

    #[tokio::test]
    async fn event_trigger_respects_conditions() {
        let h = harness(RecordingNotifier::default());
        let svc = h.engine.service();
        svc.create_action(on_task_moved("Any move")).unwrap();
        svc.create_action(on_task_moved("Only to done").condition(Condition::TaskInColumn {
            column_ids: vec!["done".into()],
        }))
        .unwrap();

        let payload = EventPayload::task("t1", "Report", "work", "doing");
        assert_eq!(h.engine.evaluate_event_triggers(EventType::TaskMoved, &payload).unwrap(), 1);
        let payload = EventPayload::task("t1", "Report", "work", "done");
        assert_eq!(h.engine.evaluate_event_triggers(EventType::TaskMoved, &payload).unwrap(), 2);
        assert_eq!(h.engine.evaluate_event_triggers(EventType::TaskCreated, &payload).unwrap(), 0);

        h.engine.wait_idle().await;
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].message, "Report moved");
    }

    #[tokio::test]
    async fn executors_run_without_short_circuit() {
        let h = harness(RecordingNotifier::default());
        let svc = h.engine.service();
        let a = svc
            .create_action(
                NewAction::new(ActionType::Automation, "Two step", ActionScope::global())
                    .trigger(Trigger::TaskStateChange {
                        events: vec![TaskStateChangeEvent::Created],
                    })
                    .executor(ExecutorSpec::MoveTask {
                        target_column: "doing".into(),
                    })
                    .executor(ExecutorSpec::notify("second still runs"))
                    .metadata(ActionMetadata {
                        max_retries: 0,
                        ..Default::default()
                    }),
            )
            .unwrap();

        h.engine.execute_now(&a.id).unwrap();
        h.engine.wait_idle().await;

        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
        let a = svc.get_action_by_id(&a.id).unwrap().unwrap();
        assert_eq!(a.execution.total_executions, 1);
        assert_eq!(a.execution.successful_executions, 0);
        assert!(a.execution.last_error.is_some());
        assert_eq!(h.engine.pending_retry_count(), 0);
    }

    #[tokio::test]
    async fn success_chain_runs_follow_up() {
        let h = harness(RecordingNotifier::default());
        let svc = h.engine.service();
        h.tasks.insert("work", "t1", "todo");
        let follow = svc.create_action(on_task_moved("Follow up")).unwrap();
        let mut first = on_task_moved("First");
        first.executors = vec![ExecutorSpec::MarkComplete];
        first.on_success = vec![follow.id.clone()];
        svc.create_action(first).unwrap();

        let payload = EventPayload::task("t1", "Report", "work", "todo");
        h.engine.evaluate_event_triggers(EventType::TaskMoved, &payload).unwrap();
        h.engine.wait_idle().await;

        assert_eq!(h.tasks.column_of("work", "t1").as_deref(), Some("done"));
        let follow = svc.get_action_by_id(&follow.id).unwrap().unwrap();
        // once from the event, once from the chain
        assert_eq!(follow.execution.total_executions, 2);
    }

    #[tokio::test]
    async fn cyclic_chain_is_bounded() {
        let h = harness(RecordingNotifier::default());
        let svc = h.engine.service();
        let a = svc.create_action(on_task_moved("Loop")).unwrap();
        svc.update_action(
            &a.id,
            mkanban_core::action::ActionUpdate {
                on_success: Some(vec![a.id.clone()]),
                ..Default::default()
            },
        )
        .unwrap();

        h.engine.execute_now(&a.id).unwrap();
        h.engine.wait_idle().await;
        let a = svc.get_action_by_id(&a.id).unwrap().unwrap();
        assert_eq!(a.execution.total_executions, u64::from(MAX_CHAIN_DEPTH) + 1);
    }

    #[tokio::test]
    async fn inactivity_fires_for_board_scope() {
        let h = harness(RecordingNotifier::default());
        let svc = h.engine.service();
        svc.create_action(
            NewAction::new(ActionType::Watcher, "Stale board", ActionScope::board("work"))
                .trigger(Trigger::Inactivity {
                    check_interval: 60,
                    inactive_duration: 3600,
                })
                .executor(ExecutorSpec::notify("{board_id} is quiet")),
        )
        .unwrap();

        h.engine.record_activity("work", h.clock.now());
        assert_eq!(h.engine.evaluate_inactivity_triggers().unwrap(), 0);
        h.clock.advance(ChronoDuration::hours(2));
        assert_eq!(h.engine.evaluate_inactivity_triggers().unwrap(), 1);
        h.engine.wait_idle().await;
        assert_eq!(h.notifier.sent.lock().unwrap()[0].message, "work is quiet");
    }

    #[tokio::test]
    async fn cron_window_tracks_polling_interval() {
        let h = harness(RecordingNotifier::default());
        let svc = h.engine.service();
        svc.create_action(
            NewAction::new(ActionType::Reminder, "Nine", ActionScope::global())
                .trigger(Trigger::Time {
                    schedule: mkanban_core::trigger::TimeSchedule::cron("0 9 * * *"),
                })
                .executor(ExecutorSpec::notify("nine")),
        )
        .unwrap();
        let before_nine = chrono::TimeZone::with_ymd_and_hms(&Local, 2025, 6, 2, 8, 58, 50)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        h.clock.set(before_nine);

        assert_eq!(h.engine.evaluate_time_triggers().unwrap(), 0);
        svc.config().update(|c| c.polling_interval = 120);
        assert_eq!(h.engine.evaluate_time_triggers().unwrap(), 1);
        h.engine.wait_idle().await;
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn execute_now_unknown_id() {
        let h = harness(RecordingNotifier::default());
        assert!(matches!(
            h.engine.execute_now("missing"),
            Err(MkanbanError::ActionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_abandoned_when_action_disabled() {
        let h = harness(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let svc = h.engine.service();
        let a = svc
            .create_action(on_task_moved("Flaky").metadata(ActionMetadata {
                max_retries: 3,
                retry_delay: 60,
                ..Default::default()
            }))
            .unwrap();

        h.engine.execute_now(&a.id).unwrap();
        h.engine.wait_idle().await;
        assert_eq!(h.engine.pending_retry_count(), 1);
        svc.disable_action(&a.id).unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(61)).await;
        h.engine.wait_idle().await;
        let a = svc.get_action_by_id(&a.id).unwrap().unwrap();
        assert_eq!(a.execution.total_executions, 1);
        assert_eq!(h.engine.pending_retry_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_retries_stops_timer() {
        let h = harness(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let svc = h.engine.service();
        let a = svc.create_action(on_task_moved("Flaky")).unwrap();
        h.engine.execute_now(&a.id).unwrap();
        h.engine.wait_idle().await;

        assert_eq!(h.engine.cancel_pending_retries(), 1);
        tokio::time::sleep(std::time::Duration::from_secs(600)).await;
        h.engine.wait_idle().await;
        let a = svc.get_action_by_id(&a.id).unwrap().unwrap();
        assert_eq!(a.execution.total_executions, 1);
    }
}
