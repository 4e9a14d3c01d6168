use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ActionType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Reminder,
    Automation,
    Watcher,
    Hook,
    ScheduledJob,
}

impl ActionType {
    pub fn all() -> &'static [ActionType] {
        &[
            ActionType::Reminder,
            ActionType::Automation,
            ActionType::Watcher,
            ActionType::Hook,
            ActionType::ScheduledJob,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Reminder => "reminder",
            ActionType::Automation => "automation",
            ActionType::Watcher => "watcher",
            ActionType::Hook => "hook",
            ActionType::ScheduledJob => "scheduled_job",
        }
    }

    /// Three-letter prefix used in generated action ids.
    pub fn id_prefix(self) -> &'static str {
        &self.as_str()[..3]
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = crate::error::MkanbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                crate::error::MkanbanError::Validation(format!("unknown action type '{s}'"))
            })
    }
}

// ---------------------------------------------------------------------------
// ScopeType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Global,
    Board,
    Task,
}

impl ScopeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeType::Global => "global",
            ScopeType::Board => "board",
            ScopeType::Task => "task",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScopeType {
    type Err = crate::error::MkanbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(ScopeType::Global),
            "board" => Ok(ScopeType::Board),
            "task" => Ok(ScopeType::Task),
            _ => Err(crate::error::MkanbanError::Validation(format!(
                "unknown scope type '{s}'"
            ))),
        }
    }
}
