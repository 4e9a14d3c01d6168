//! Executor specs: the effects an action performs when it fires.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutorSpec {
    Notify {
        /// Supports `{task_title}`, `{board_name}` and friends.
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        platforms: Vec<NotificationPlatform>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        channels: Vec<NotificationChannel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<NotificationPriority>,
    },
    MoveTask {
        target_column: String,
    },
    CreateTask {
        task_title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_description: Option<String>,
        task_column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        board_id: Option<String>,
    },
    MarkComplete,
    CreateBranch {
        branch_name: String,
    },
    JiraUpdate {
        #[serde(default)]
        updates: BTreeMap<String, serde_json::Value>,
    },
    RunCommand {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        environment: BTreeMap<String, String>,
    },
}

impl ExecutorSpec {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            ExecutorSpec::Notify { .. } => ExecutorKind::Notify,
            ExecutorSpec::MoveTask { .. } => ExecutorKind::MoveTask,
            ExecutorSpec::CreateTask { .. } => ExecutorKind::CreateTask,
            ExecutorSpec::MarkComplete => ExecutorKind::MarkComplete,
            ExecutorSpec::CreateBranch { .. } => ExecutorKind::CreateBranch,
            ExecutorSpec::JiraUpdate { .. } => ExecutorKind::JiraUpdate,
            ExecutorSpec::RunCommand { .. } => ExecutorKind::RunCommand,
        }
    }

    pub fn notify(message: impl Into<String>) -> Self {
        ExecutorSpec::Notify {
            message: message.into(),
            title: None,
            platforms: Vec::new(),
            channels: Vec::new(),
            priority: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Notify,
    MoveTask,
    CreateTask,
    MarkComplete,
    CreateBranch,
    JiraUpdate,
    RunCommand,
}

impl ExecutorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutorKind::Notify => "notify",
            ExecutorKind::MoveTask => "move_task",
            ExecutorKind::CreateTask => "create_task",
            ExecutorKind::MarkComplete => "mark_complete",
            ExecutorKind::CreateBranch => "create_branch",
            ExecutorKind::JiraUpdate => "jira_update",
            ExecutorKind::RunCommand => "run_command",
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Notification vocabulary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPlatform {
    Desktop,
    Mobile,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    System,
    MobilePush,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ExecutionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            data: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
