use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::action::Action;
use crate::trigger::Trigger;

/// Tracks when entities last changed and fires inactivity triggers.
///
/// State lives in memory only and starts over on restart. An entity first
/// seen by a check counts as active at that moment.
#[derive(Debug, Default)]
pub struct InactivityTriggerEvaluator {
    last_activity: HashMap<String, DateTime<Utc>>,
    /// Keyed by (entity id, action id).
    last_check: HashMap<(String, String), DateTime<Utc>>,
}

impl InactivityTriggerEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when some inactivity trigger is due for `entity_id`. Each trigger
    /// re-checks an entity no more often than its `check_interval`.
    pub fn should_trigger(&mut self, action: &Action, entity_id: &str, now: DateTime<Utc>) -> bool {
        let triggers: Vec<(u64, u64)> = action
            .triggers
            .iter()
            .filter_map(|t| match t {
                Trigger::Inactivity {
                    check_interval,
                    inactive_duration,
                } => Some((*check_interval, *inactive_duration)),
                _ => None,
            })
            .collect();
        if triggers.is_empty() {
            return false;
        }

        let last_activity = *self
            .last_activity
            .entry(entity_id.to_string())
            .or_insert(now);
        let key = (entity_id.to_string(), action.id.clone());
        let last_check = *self.last_check.entry(key.clone()).or_insert(now);

        let mut checked = false;
        let mut fired = false;
        for (check_interval, inactive_duration) in triggers {
            if now - last_check < secs(check_interval) {
                continue;
            }
            checked = true;
            if now - last_activity >= secs(inactive_duration) {
                fired = true;
                break;
            }
        }
        if checked {
            self.last_check.insert(key, now);
        }
        fired
    }

    /// Must be called whenever the tracked entity changes.
    pub fn record_activity(&mut self, entity_id: &str, at: DateTime<Utc>) {
        self.last_activity.insert(entity_id.to_string(), at);
    }

    /// Seconds since the entity's last recorded activity.
    pub fn inactivity_duration(&self, entity_id: &str, now: DateTime<Utc>) -> Option<i64> {
        self.last_activity
            .get(entity_id)
            .map(|at| (now - *at).num_seconds())
    }

    pub fn inactive_entities(&self, threshold_secs: u64, now: DateTime<Utc>) -> Vec<String> {
        let mut ids: Vec<String> = self
            .last_activity
            .iter()
            .filter(|(_, at)| now - **at >= secs(threshold_secs))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn tracked_entities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.last_activity.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn clear_state(&mut self, entity_id: &str) {
        self.last_activity.remove(entity_id);
        self.last_check.retain(|(entity, _), _| entity != entity_id);
    }

    pub fn clear_all_state(&mut self) {
        self.last_activity.clear();
        self.last_check.clear();
    }
}

fn secs(n: u64) -> Duration {
    Duration::seconds(i64::try_from(n).unwrap_or(i64::MAX).min(i64::MAX / 1000))
}
