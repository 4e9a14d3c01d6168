//! Application event vocabulary published on the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MkanbanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    TaskMoved,
    TaskStateChange,
    BoardCreated,
    BoardLoaded,
    BoardUpdated,
    BoardDeleted,
    BoardSwitched,
    BoardEnter,
    BoardExit,
    ColumnCreated,
    ColumnUpdated,
    ColumnDeleted,
    GitBranchCreated,
    GitBranchDeleted,
    GitBranchMerged,
    GitCommitMade,
    AppStartup,
    AppShutdown,
    AppForeground,
    AppBackground,
    EntityChanged,
}

impl EventType {
    pub fn all() -> &'static [EventType] {
        use EventType::*;
        &[
            TaskCreated,
            TaskUpdated,
            TaskDeleted,
            TaskMoved,
            TaskStateChange,
            BoardCreated,
            BoardLoaded,
            BoardUpdated,
            BoardDeleted,
            BoardSwitched,
            BoardEnter,
            BoardExit,
            ColumnCreated,
            ColumnUpdated,
            ColumnDeleted,
            GitBranchCreated,
            GitBranchDeleted,
            GitBranchMerged,
            GitCommitMade,
            AppStartup,
            AppShutdown,
            AppForeground,
            AppBackground,
            EntityChanged,
        ]
    }

    pub fn as_str(self) -> &'static str {
        use EventType::*;
        match self {
            TaskCreated => "task_created",
            TaskUpdated => "task_updated",
            TaskDeleted => "task_deleted",
            TaskMoved => "task_moved",
            TaskStateChange => "task_state_change",
            BoardCreated => "board_created",
            BoardLoaded => "board_loaded",
            BoardUpdated => "board_updated",
            BoardDeleted => "board_deleted",
            BoardSwitched => "board_switched",
            BoardEnter => "board_enter",
            BoardExit => "board_exit",
            ColumnCreated => "column_created",
            ColumnUpdated => "column_updated",
            ColumnDeleted => "column_deleted",
            GitBranchCreated => "git_branch_created",
            GitBranchDeleted => "git_branch_deleted",
            GitBranchMerged => "git_branch_merged",
            GitCommitMade => "git_commit_made",
            AppStartup => "app_startup",
            AppShutdown => "app_shutdown",
            AppForeground => "app_foreground",
            AppBackground => "app_background",
            EntityChanged => "entity_changed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = MkanbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MkanbanError::Validation(format!("unknown event type '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub task_title: String,
    pub board_id: String,
    pub column_id: String,
    /// Set for `task_moved`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_column_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardEvent {
    pub board_id: String,
    pub board_name: String,
    /// Set for `board_switched`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_board_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEvent {
    pub column_id: String,
    pub column_name: String,
    pub board_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitEventData {
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Agenda,
    Board,
    Task,
    Project,
    Note,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChange {
    pub id: String,
    pub entity_type: EntityKind,
    pub change_type: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventData {
    Task(TaskEvent),
    Board(BoardEvent),
    Column(ColumnEvent),
    Git(GitEventData),
    System {
        #[serde(default)]
        metadata: BTreeMap<String, String>,
    },
    EntityChange(EntityChange),
}

/// One published event: typed data plus when it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub data: EventData,
}

impl EventPayload {
    pub fn new(data: EventData) -> Self {
        Self {
            timestamp: Utc::now(),
            source: None,
            data,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn task(task_id: &str, task_title: &str, board_id: &str, column_id: &str) -> Self {
        Self::new(EventData::Task(TaskEvent {
            task_id: task_id.to_string(),
            task_title: task_title.to_string(),
            board_id: board_id.to_string(),
            column_id: column_id.to_string(),
            previous_column_id: None,
        }))
    }

    pub fn board(board_id: &str, board_name: &str) -> Self {
        Self::new(EventData::Board(BoardEvent {
            board_id: board_id.to_string(),
            board_name: board_name.to_string(),
            previous_board_id: None,
        }))
    }

    pub fn system() -> Self {
        Self::new(EventData::System {
            metadata: BTreeMap::new(),
        })
    }

    pub fn board_id(&self) -> Option<&str> {
        match &self.data {
            EventData::Task(t) => Some(&t.board_id),
            EventData::Board(b) => Some(&b.board_id),
            EventData::Column(c) => Some(&c.board_id),
            EventData::EntityChange(e) if e.entity_type == EntityKind::Board => Some(&e.id),
            _ => None,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match &self.data {
            EventData::Task(t) => Some(&t.task_id),
            EventData::EntityChange(e) if e.entity_type == EntityKind::Task => Some(&e.id),
            _ => None,
        }
    }
}
