use async_trait::async_trait;
use std::sync::Arc;

use mkanban_core::context::ExecutionContext;
use mkanban_core::executor::ExecutionResult;
use mkanban_core::Result;

use super::move_task::move_context_task;
use super::Executor;
use crate::ports::TaskMutationPort;

/// Moves the context task into the configured done column.
pub struct MarkCompleteExecutor {
    pub(super) done_column: String,
    pub(super) port: Arc<dyn TaskMutationPort>,
}

#[async_trait]
impl Executor for MarkCompleteExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult> {
        move_context_task(self.port.as_ref(), ctx, &self.done_column).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::MemoryTasks;
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn lands_in_done_column() {
        let tasks = Arc::new(MemoryTasks::default());
        tasks.insert("work", "t1", "doing");
        let exec = MarkCompleteExecutor {
            done_column: "shipped".into(),
            port: tasks.clone(),
        };
        let ctx = ExecutionContext {
            action_id: "a1".into(),
            action_name: "Close".into(),
            timestamp: Utc::now(),
            task_id: Some("t1".into()),
            task_title: None,
            board_id: Some("work".into()),
            board_name: None,
            column_id: Some("doing".into()),
            previous_column_id: None,
        };
        assert!(exec.execute(&ctx).await.unwrap().success);
        assert_eq!(tasks.column_of("work", "t1").as_deref(), Some("shipped"));
    }
}
