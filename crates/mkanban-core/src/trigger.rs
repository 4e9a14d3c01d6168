//! Trigger definitions: when an action becomes eligible to fire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EventType;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Time {
        schedule: TimeSchedule,
    },
    BoardSwitch {
        event: BoardSwitchEvent,
        /// Restrict to one board; any board when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        board_id: Option<String>,
    },
    TaskStateChange {
        events: Vec<TaskStateChangeEvent>,
    },
    GitEvent {
        events: Vec<GitEvent>,
    },
    JiraEvent {
        events: Vec<String>,
    },
    Inactivity {
        /// Seconds between re-checks of the same entity.
        check_interval: u64,
        /// Seconds without activity before the trigger fires.
        inactive_duration: u64,
    },
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Time { .. } => TriggerKind::Time,
            Trigger::BoardSwitch { .. }
            | Trigger::TaskStateChange { .. }
            | Trigger::GitEvent { .. } => TriggerKind::Event,
            Trigger::JiraEvent { .. } => TriggerKind::External,
            Trigger::Inactivity { .. } => TriggerKind::Inactivity,
        }
    }
}

/// Coarse grouping used by the engine to route actions to an evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Time,
    Event,
    Inactivity,
    /// Declared in the model but evaluated by an external integration.
    External,
}

// ---------------------------------------------------------------------------
// TimeSchedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Once,
    Daily,
    Weekly,
    Monthly,
    Cron,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSchedule {
    #[serde(rename = "type")]
    pub schedule_type: ScheduleType,
    /// Absolute fire time for `once`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<DateTime<Utc>>,
    /// "HH:MM" for daily/weekly/monthly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// ISO weekdays, 1 = Monday .. 7 = Sunday.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    /// IANA zone name, e.g. "America/New_York". Host local time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl TimeSchedule {
    fn empty(schedule_type: ScheduleType) -> Self {
        Self {
            schedule_type,
            datetime: None,
            time: None,
            days_of_week: Vec::new(),
            day_of_month: None,
            cron_expression: None,
            timezone: None,
        }
    }

    pub fn once(at: DateTime<Utc>) -> Self {
        Self {
            datetime: Some(at),
            ..Self::empty(ScheduleType::Once)
        }
    }

    pub fn daily(time: impl Into<String>) -> Self {
        Self {
            time: Some(time.into()),
            ..Self::empty(ScheduleType::Daily)
        }
    }

    pub fn weekly(time: impl Into<String>, days_of_week: Vec<u32>) -> Self {
        Self {
            time: Some(time.into()),
            days_of_week,
            ..Self::empty(ScheduleType::Weekly)
        }
    }

    pub fn monthly(time: impl Into<String>, day_of_month: u32) -> Self {
        Self {
            time: Some(time.into()),
            day_of_month: Some(day_of_month),
            ..Self::empty(ScheduleType::Monthly)
        }
    }

    pub fn cron(expression: impl Into<String>) -> Self {
        Self {
            cron_expression: Some(expression.into()),
            ..Self::empty(ScheduleType::Cron)
        }
    }

    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = Some(tz.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Event vocabularies carried by triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardSwitchEvent {
    Enter,
    Exit,
}

impl BoardSwitchEvent {
    pub fn event_type(self) -> EventType {
        match self {
            BoardSwitchEvent::Enter => EventType::BoardEnter,
            BoardSwitchEvent::Exit => EventType::BoardExit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStateChangeEvent {
    Created,
    Updated,
    Deleted,
    Moved,
}

impl TaskStateChangeEvent {
    pub fn event_type(self) -> EventType {
        match self {
            TaskStateChangeEvent::Created => EventType::TaskCreated,
            TaskStateChangeEvent::Updated => EventType::TaskUpdated,
            TaskStateChangeEvent::Deleted => EventType::TaskDeleted,
            TaskStateChangeEvent::Moved => EventType::TaskMoved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitEvent {
    BranchCreated,
    BranchDeleted,
    BranchMerged,
    CommitMade,
}

impl GitEvent {
    pub fn event_type(self) -> EventType {
        match self {
            GitEvent::BranchCreated => EventType::GitBranchCreated,
            GitEvent::BranchDeleted => EventType::GitBranchDeleted,
            GitEvent::BranchMerged => EventType::GitBranchMerged,
            GitEvent::CommitMade => EventType::GitCommitMade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_trigger_yaml_tagged() {
        let yaml = r#"
type: time
schedule:
  type: weekly
  time: "09:30"
  days_of_week: [1, 3, 5]
"#;
        let trigger: Trigger = serde_yaml::from_str(yaml).unwrap();
        let Trigger::Time { schedule } = trigger else {
            panic!("expected Time")
        };
        assert_eq!(schedule.schedule_type, ScheduleType::Weekly);
        assert_eq!(schedule.time.as_deref(), Some("09:30"));
        assert_eq!(schedule.days_of_week, vec![1, 3, 5]);
    }

    #[test]
    fn board_switch_without_board_id() {
        let yaml = "type: board_switch\nevent: enter\n";
        let trigger: Trigger = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            trigger,
            Trigger::BoardSwitch {
                event: BoardSwitchEvent::Enter,
                board_id: None
            }
        );
        assert_eq!(trigger.kind(), TriggerKind::Event);
    }

    #[test]
    fn jira_trigger_is_external() {
        let trigger = Trigger::JiraEvent {
            events: vec!["issue_updated".into()],
        };
        assert_eq!(trigger.kind(), TriggerKind::External);
    }
}
