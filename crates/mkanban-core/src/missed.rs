//! Records of scheduled fires that happened while nothing was running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::action::Action;
use crate::error::Result;
use crate::executor::ExecutorSpec;
use crate::types::ActionType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissedAction {
    pub action_id: String,
    pub action_name: String,
    pub action_type: ActionType,
    pub scheduled_time: DateTime<Utc>,
    pub missed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MissedAction {
    pub fn new(action: &Action, scheduled_time: DateTime<Utc>, missed_at: DateTime<Utc>) -> Self {
        Self {
            action_id: action.id.clone(),
            action_name: action.name.clone(),
            action_type: action.action_type,
            scheduled_time,
            missed_at,
            message: Some(summary_message(action)),
        }
    }
}

/// Description, else the first notify message, else the name.
fn summary_message(action: &Action) -> String {
    if let Some(desc) = action.description.as_deref().filter(|d| !d.is_empty()) {
        return desc.to_string();
    }
    action
        .executors
        .iter()
        .find_map(|e| match e {
            ExecutorSpec::Notify { message, .. } => Some(message.clone()),
            _ => None,
        })
        .unwrap_or_else(|| action.name.clone())
}

/// Persisted reconciliation state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissedActionsState {
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: Vec<MissedAction>,
}

impl MissedActionsState {
    /// Adds entries not already recorded for the same (action, scheduled time).
    /// Returns how many were added.
    pub fn add(&mut self, missed: Vec<MissedAction>) -> usize {
        let mut added = 0;
        for m in missed {
            let dup = self
                .entries
                .iter()
                .any(|e| e.action_id == m.action_id && e.scheduled_time == m.scheduled_time);
            if !dup {
                self.entries.push(m);
                added += 1;
            }
        }
        added
    }

    /// Drops entries recorded before `cutoff`.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) {
        self.entries.retain(|m| m.missed_at >= cutoff);
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub trait MissedActionLog: Send + Sync {
    fn load(&self) -> Result<MissedActionsState>;
    fn save(&self, state: &MissedActionsState) -> Result<()>;
}

/// YAML file, normally `.mkanban/missed_actions.yaml`.
#[derive(Debug, Clone)]
pub struct FileMissedActionLog {
    path: PathBuf,
}

impl FileMissedActionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MissedActionLog for FileMissedActionLog {
    fn load(&self) -> Result<MissedActionsState> {
        Ok(crate::io::read_yaml(&self.path)?.unwrap_or_default())
    }

    fn save(&self, state: &MissedActionsState) -> Result<()> {
        crate::io::write_yaml(&self.path, state)
    }
}

#[derive(Debug, Default)]
pub struct MemoryMissedActionLog {
    state: Mutex<MissedActionsState>,
}

impl MemoryMissedActionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MissedActionLog for MemoryMissedActionLog {
    fn load(&self) -> Result<MissedActionsState> {
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, state: &MissedActionsState) -> Result<()> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::tests::sample_action;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn message_prefers_description_then_notify() {
        let mut a = sample_action();
        let now = Utc::now();
        assert_eq!(
            MissedAction::new(&a, now, now).message.as_deref(),
            Some("Standup time")
        );
        a.description = Some("Morning sync".into());
        assert_eq!(
            MissedAction::new(&a, now, now).message.as_deref(),
            Some("Morning sync")
        );
        a.description = None;
        a.executors = vec![ExecutorSpec::MarkComplete];
        assert_eq!(
            MissedAction::new(&a, now, now).message.as_deref(),
            Some("Standup")
        );
    }

    #[test]
    fn add_skips_duplicates_and_prune_drops_old() {
        let a = sample_action();
        let now = Utc::now();
        let mut state = MissedActionsState::default();
        assert_eq!(state.add(vec![MissedAction::new(&a, now, now)]), 1);
        assert_eq!(state.add(vec![MissedAction::new(&a, now, now)]), 0);
        let old = MissedAction::new(&a, now - Duration::days(10), now - Duration::days(10));
        assert_eq!(state.add(vec![old]), 1);

        state.prune(now - Duration::days(7));
        assert_eq!(state.entries.len(), 1);
    }

    #[test]
    fn file_log_persists() {
        let dir = TempDir::new().unwrap();
        let log = FileMissedActionLog::new(dir.path().join(".mkanban/missed_actions.yaml"));
        assert_eq!(log.load().unwrap(), MissedActionsState::default());

        let now = Utc::now();
        let state = MissedActionsState {
            last_check: Some(now),
            entries: vec![MissedAction::new(&sample_action(), now, now)],
        };
        log.save(&state).unwrap();
        assert_eq!(log.load().unwrap(), state);
    }
}
