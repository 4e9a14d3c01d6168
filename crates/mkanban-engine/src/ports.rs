//! Collaborators the engine calls out to. Hosts supply the implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mkanban_core::board::{Board, NewTask, Task};
use mkanban_core::executor::{NotificationChannel, NotificationPlatform, NotificationPriority};
use mkanban_core::Result;

/// Board resolution, used for orphan detection.
#[async_trait]
pub trait BoardLookup: Send + Sync {
    async fn get_board(&self, board_id: &str) -> Result<Option<Board>>;
}

#[async_trait]
pub trait TaskMutationPort: Send + Sync {
    /// `column_id` may be empty when the caller does not know it.
    async fn get_task(&self, board_id: &str, column_id: &str, task_id: &str) -> Result<Option<Task>>;

    async fn move_task(
        &self,
        board_id: &str,
        task: &Task,
        from_column: &str,
        to_column: &str,
    ) -> Result<bool>;

    async fn create_task(&self, board_id: &str, column_id: &str, task: NewTask)
        -> Result<Option<Task>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub platforms: Vec<NotificationPlatform>,
    pub channels: Vec<NotificationChannel>,
}

#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Returns a delivery handle when the host has one.
    async fn send(&self, notification: Notification) -> Result<Option<String>>;
}
