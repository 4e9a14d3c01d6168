//! Action lifecycle: CRUD with validation, snoozing, execution bookkeeping
//! and orphan handling.

use chrono::{DateTime, Days, Duration, Local, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use mkanban_core::action::{Action, ActionUpdate, NewAction};
use mkanban_core::config::OrphanPolicy;
use mkanban_core::store::{ActionFilter, ActionStore};
use mkanban_core::types::{ActionType, ScopeType};
use mkanban_core::{MkanbanError, Result};

use crate::clock::Clock;
use crate::ports::BoardLookup;
use crate::settings::SharedConfig;

pub struct ActionService {
    store: Arc<dyn ActionStore>,
    boards: Arc<dyn BoardLookup>,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
}

impl ActionService {
    pub fn new(
        store: Arc<dyn ActionStore>,
        boards: Arc<dyn BoardLookup>,
        config: SharedConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            boards,
            config,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get_all_actions(&self, filter: &ActionFilter) -> Result<Vec<Action>> {
        self.store.get_all(filter)
    }

    pub fn get_action_by_id(&self, id: &str) -> Result<Option<Action>> {
        self.store.get_by_id(id)
    }

    pub fn get_actions_by_scope(
        &self,
        scope_type: ScopeType,
        target_id: Option<&str>,
    ) -> Result<Vec<Action>> {
        self.store.get_by_scope(scope_type, target_id)
    }

    pub fn get_enabled_actions(&self) -> Result<Vec<Action>> {
        self.store.get_enabled()
    }

    pub fn get_actions_by_type(&self, action_type: ActionType) -> Result<Vec<Action>> {
        self.store.get_by_type(action_type)
    }

    /// Enabled and not currently snoozed.
    pub fn get_active_actions(&self) -> Result<Vec<Action>> {
        let now = self.clock.now();
        Ok(self
            .store
            .get_enabled()?
            .into_iter()
            .filter(|a| !a.is_snoozed(now))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn validate_action(&self, action: &Action) -> Result<()> {
        action.validate()
    }

    pub fn create_action(&self, input: NewAction) -> Result<Action> {
        let now = self.clock.now();
        let id = Action::generate_id(input.action_type, &input.name, now);
        let action = Action::from_new(id, input, now);
        action.validate()?;
        self.store.create(&action)?;
        info!(id = %action.id, name = %action.name, "action created");
        Ok(action)
    }

    pub fn update_action(&self, id: &str, update: ActionUpdate) -> Result<Action> {
        let mut action = self.require(id)?;
        update.apply(&mut action);
        action.validate()?;
        action.modified_at = self.clock.now();
        self.store.update(&action)?;
        Ok(action)
    }

    pub fn delete_action(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete(id)?;
        if deleted {
            info!(%id, "action deleted");
        }
        Ok(deleted)
    }

    pub fn enable_action(&self, id: &str) -> Result<Action> {
        self.update_action(
            id,
            ActionUpdate {
                enabled: Some(true),
                ..Default::default()
            },
        )
    }

    pub fn disable_action(&self, id: &str) -> Result<Action> {
        self.update_action(
            id,
            ActionUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
    }

    /// Snooze until the instant `token` describes from now.
    pub fn snooze_action(&self, id: &str, token: &str) -> Result<Action> {
        let mut action = self.require(id)?;
        let now = self.clock.now();
        let until = snooze_until(token, now);
        action.snooze.enabled = true;
        action.snooze.until = Some(until);
        action.snooze.count += 1;
        action.modified_at = now;
        self.store.update(&action)?;
        info!(%id, %until, "action snoozed");
        Ok(action)
    }

    pub fn unsnooze_action(&self, id: &str) -> Result<Action> {
        let mut action = self.require(id)?;
        action.snooze.enabled = false;
        action.snooze.until = None;
        action.modified_at = self.clock.now();
        self.store.update(&action)?;
        Ok(action)
    }

    pub fn is_action_snoozed(&self, id: &str) -> Result<bool> {
        Ok(self.require(id)?.is_snoozed(self.clock.now()))
    }

    /// Apply one attempt's outcome to the persisted execution history.
    pub fn record_execution(&self, id: &str, success: bool, error: Option<String>) -> Result<Action> {
        let mut action = self.require(id)?;
        let now = self.clock.now();
        action.execution.record(success, error, now);
        action.modified_at = now;
        self.store.update(&action)?;
        Ok(action)
    }

    fn require(&self, id: &str) -> Result<Action> {
        self.store
            .get_by_id(id)?
            .ok_or_else(|| MkanbanError::ActionNotFound(id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Orphans
    // -----------------------------------------------------------------------

    /// Board-scoped actions whose board cannot be resolved are orphaned,
    /// including when the lookup itself fails. Task scope is never reported.
    pub async fn is_orphaned(&self, action: &Action) -> bool {
        match action.scope.scope_type {
            ScopeType::Global | ScopeType::Task => false,
            ScopeType::Board => {
                let Some(board_id) = action.scope.target_id.as_deref() else {
                    return true;
                };
                match self.boards.get_board(board_id).await {
                    Ok(board) => board.is_none(),
                    Err(e) => {
                        warn!(id = %action.id, %board_id, error = %e, "board lookup failed, treating as orphaned");
                        true
                    }
                }
            }
        }
    }

    pub async fn get_orphaned_actions(&self) -> Result<Vec<Action>> {
        let mut orphans = Vec::new();
        for action in self.store.get_all(&ActionFilter::default())? {
            if self.is_orphaned(&action).await {
                orphans.push(action);
            }
        }
        Ok(orphans)
    }

    /// Applies the configured orphan policy. Returns how many actions were
    /// disabled or deleted.
    pub async fn clean_orphaned_actions(&self) -> Result<usize> {
        let policy = self.config.get().orphan_action;
        let orphans = self.get_orphaned_actions().await?;
        let mut cleaned = 0;
        for action in orphans {
            match policy {
                OrphanPolicy::AutoDelete => {
                    if self.store.delete(&action.id)? {
                        info!(id = %action.id, "deleted orphaned action");
                        cleaned += 1;
                    }
                }
                OrphanPolicy::AutoDisable => {
                    if action.enabled {
                        self.disable_action(&action.id)?;
                        info!(id = %action.id, "disabled orphaned action");
                        cleaned += 1;
                    }
                }
                OrphanPolicy::WarnOnly => {
                    warn!(id = %action.id, name = %action.name, "orphaned action");
                }
            }
        }
        Ok(cleaned)
    }
}

// ---------------------------------------------------------------------------
// Snooze durations
// ---------------------------------------------------------------------------

/// `Nm`, `Nh`, `Nd`, `tomorrow` (09:00 local next day), `next_week`
/// (09:00 local in seven days). Anything else snoozes for an hour.
pub fn snooze_until(token: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    match token {
        "tomorrow" => local_morning(now, 1).unwrap_or(now + Duration::days(1)),
        "next_week" => local_morning(now, 7).unwrap_or(now + Duration::days(7)),
        _ => parse_snooze_duration(token)
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now + Duration::hours(1)),
    }
}

fn parse_snooze_duration(token: &str) -> Option<Duration> {
    let unit = token.chars().last()?;
    let value: i64 = token[..token.len() - unit.len_utf8()].parse().ok()?;
    if value <= 0 {
        return None;
    }
    match unit {
        'm' => Duration::try_minutes(value),
        'h' => Duration::try_hours(value),
        'd' => Duration::try_days(value),
        _ => None,
    }
}

fn local_morning(now: DateTime<Utc>, days_ahead: u64) -> Option<DateTime<Utc>> {
    let date = now.with_timezone(&Local).date_naive().checked_add_days(Days::new(days_ahead))?;
    let nine = NaiveTime::from_hms_opt(9, 0, 0)?;
    Local
        .from_local_datetime(&date.and_time(nine))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use async_trait::async_trait;
    use chrono::Timelike;
    use mkanban_core::action::ActionScope;
    use mkanban_core::board::Board;
    use mkanban_core::executor::ExecutorSpec;
    use mkanban_core::store::MemoryActionStore;
    use mkanban_core::trigger::{TimeSchedule, Trigger};
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Boards {
        ids: Mutex<HashSet<String>>,
        fail: bool,
    }

    #[async_trait]
    impl BoardLookup for Boards {
        async fn get_board(&self, board_id: &str) -> Result<Option<Board>> {
            if self.fail {
                return Err(MkanbanError::Port("board store offline".into()));
            }
            let known = self.ids.lock().unwrap().contains(board_id);
            Ok(known.then(|| Board {
                id: board_id.to_string(),
                name: board_id.to_string(),
                columns: Vec::new(),
            }))
        }
    }

    fn service_with(boards: Boards, policy: OrphanPolicy) -> (ActionService, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let config = SharedConfig::default();
        config.update(|c| c.orphan_action = policy);
        let svc = ActionService::new(
            Arc::new(MemoryActionStore::new()),
            Arc::new(boards),
            config,
            clock.clone(),
        );
        (svc, clock)
    }

    fn reminder(scope: ActionScope) -> NewAction {
        NewAction::new(ActionType::Reminder, "Check inbox", scope)
            .trigger(Trigger::Time {
                schedule: TimeSchedule::daily("09:00"),
            })
            .executor(ExecutorSpec::notify("Inbox"))
    }

    #[test]
    fn create_rejects_invalid_input() {
        let (svc, _) = service_with(Boards::default(), OrphanPolicy::AutoDisable);
        let mut input = reminder(ActionScope::global());
        input.executors.clear();
        assert!(matches!(svc.create_action(input), Err(MkanbanError::Validation(_))));
        assert!(svc.get_all_actions(&ActionFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn update_keeps_identity_and_bumps_modified() {
        let (svc, clock) = service_with(Boards::default(), OrphanPolicy::AutoDisable);
        let a = svc.create_action(reminder(ActionScope::global())).unwrap();
        clock.advance(Duration::minutes(1));
        let b = svc.disable_action(&a.id).unwrap();
        assert_eq!(b.id, a.id);
        assert_eq!(b.created_at, a.created_at);
        assert!(b.modified_at > a.modified_at);
        assert!(!b.enabled);
        assert!(svc.get_active_actions().unwrap().is_empty());
    }

    #[test]
    fn update_missing_action_is_not_found() {
        let (svc, _) = service_with(Boards::default(), OrphanPolicy::AutoDisable);
        let err = svc.enable_action("nope").unwrap_err();
        assert!(matches!(err, MkanbanError::ActionNotFound(_)));
    }

    #[test]
    fn snooze_one_hour_then_expire() {
        let (svc, clock) = service_with(Boards::default(), OrphanPolicy::AutoDisable);
        let a = svc.create_action(reminder(ActionScope::global())).unwrap();
        let now = clock.now();
        let snoozed = svc.snooze_action(&a.id, "1h").unwrap();
        let until = snoozed.snooze.until.unwrap();
        assert!((until - (now + Duration::hours(1))).num_seconds().abs() <= 1);
        assert_eq!(snoozed.snooze.count, 1);
        assert!(svc.is_action_snoozed(&a.id).unwrap());

        clock.advance(Duration::minutes(61));
        assert!(!svc.is_action_snoozed(&a.id).unwrap());
    }

    #[test]
    fn unsnooze_clears_until() {
        let (svc, _) = service_with(Boards::default(), OrphanPolicy::AutoDisable);
        let a = svc.create_action(reminder(ActionScope::global())).unwrap();
        svc.snooze_action(&a.id, "30m").unwrap();
        let a = svc.unsnooze_action(&a.id).unwrap();
        assert!(a.snooze.until.is_none());
        assert!(!svc.is_action_snoozed(&a.id).unwrap());
    }

    #[test]
    fn snooze_tokens() {
        let now = Utc::now();
        assert_eq!(snooze_until("10m", now), now + Duration::minutes(10));
        assert_eq!(snooze_until("2d", now), now + Duration::days(2));
        assert_eq!(snooze_until("soon", now), now + Duration::hours(1));
        assert_eq!(snooze_until("xh", now), now + Duration::hours(1));

        let tomorrow = snooze_until("tomorrow", now).with_timezone(&Local);
        assert_eq!(tomorrow.hour(), 9);
        assert_eq!(tomorrow.minute(), 0);
        assert!(snooze_until("next_week", now) > now + Duration::days(6));
    }

    #[test]
    fn snooze_out_of_range_falls_back_to_an_hour() {
        let now = Utc::now();
        assert_eq!(snooze_until("1000000000d", now), now + Duration::hours(1));
        assert_eq!(snooze_until("9223372036854775807m", now), now + Duration::hours(1));
    }

    #[test]
    fn snooze_action_with_huge_token_does_not_panic() {
        let (svc, _) = service_with(Boards::default(), OrphanPolicy::AutoDisable);
        let a = svc.create_action(reminder(ActionScope::global())).unwrap();
        let a = svc.snooze_action(&a.id, "1000000000d").unwrap();
        assert_eq!(a.snooze.until, Some(a.modified_at + Duration::hours(1)));
    }

    #[test]
    fn record_execution_updates_history() {
        let (svc, _) = service_with(Boards::default(), OrphanPolicy::AutoDisable);
        let a = svc.create_action(reminder(ActionScope::global())).unwrap();
        svc.record_execution(&a.id, false, Some("offline".into())).unwrap();
        let a = svc.record_execution(&a.id, true, None).unwrap();
        assert_eq!(a.execution.total_executions, 2);
        assert_eq!(a.execution.successful_executions, 1);
        assert_eq!(a.execution.consecutive_failures, 0);
        assert!(a.execution.last_failure.is_some());
    }

    #[tokio::test]
    async fn orphan_detection_by_scope() {
        let boards = Boards::default();
        boards.ids.lock().unwrap().insert("home".into());
        let (svc, _) = service_with(boards, OrphanPolicy::AutoDisable);

        let global = svc.create_action(reminder(ActionScope::global())).unwrap();
        let live = svc.create_action(reminder(ActionScope::board("home"))).unwrap();
        let gone = svc.create_action(reminder(ActionScope::board("deleted"))).unwrap();
        let task = svc.create_action(reminder(ActionScope::task("t-missing"))).unwrap();

        assert!(!svc.is_orphaned(&global).await);
        assert!(!svc.is_orphaned(&live).await);
        assert!(svc.is_orphaned(&gone).await);
        assert!(!svc.is_orphaned(&task).await);
    }

    #[tokio::test]
    async fn lookup_failure_counts_as_orphaned() {
        let boards = Boards {
            fail: true,
            ..Default::default()
        };
        let (svc, _) = service_with(boards, OrphanPolicy::AutoDisable);
        let a = svc.create_action(reminder(ActionScope::board("home"))).unwrap();
        assert!(svc.is_orphaned(&a).await);
    }

    #[tokio::test]
    async fn clean_auto_disable_keeps_record() {
        let (svc, _) = service_with(Boards::default(), OrphanPolicy::AutoDisable);
        let a = svc.create_action(reminder(ActionScope::board("gone"))).unwrap();
        assert_eq!(svc.clean_orphaned_actions().await.unwrap(), 1);
        let a = svc.get_action_by_id(&a.id).unwrap().unwrap();
        assert!(!a.enabled);
        // already disabled, nothing left to act on
        assert_eq!(svc.clean_orphaned_actions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clean_auto_delete_removes_record() {
        let (svc, _) = service_with(Boards::default(), OrphanPolicy::AutoDelete);
        let a = svc.create_action(reminder(ActionScope::board("gone"))).unwrap();
        assert_eq!(svc.clean_orphaned_actions().await.unwrap(), 1);
        assert!(svc.get_action_by_id(&a.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn clean_warn_only_changes_nothing() {
        let (svc, _) = service_with(Boards::default(), OrphanPolicy::WarnOnly);
        let a = svc.create_action(reminder(ActionScope::board("gone"))).unwrap();
        assert_eq!(svc.clean_orphaned_actions().await.unwrap(), 0);
        assert!(svc.get_action_by_id(&a.id).unwrap().unwrap().enabled);
    }
}
