use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use mkanban_core::context::ExecutionContext;
use mkanban_core::executor::ExecutionResult;
use mkanban_core::{MkanbanError, Result};

use super::Executor;
use crate::ports::TaskMutationPort;

pub struct MoveTaskExecutor {
    pub(super) target_column: String,
    pub(super) port: Arc<dyn TaskMutationPort>,
}

/// Shared by MoveTask and MarkComplete.
pub(super) async fn move_context_task(
    port: &dyn TaskMutationPort,
    ctx: &ExecutionContext,
    target_column: &str,
) -> Result<ExecutionResult> {
    let (Some(task_id), Some(board_id)) = (ctx.task_id.as_deref(), ctx.board_id.as_deref()) else {
        return Ok(ExecutionResult::failed(
            "task and board ids are required in the execution context",
        ));
    };
    let column_id = ctx.column_id.as_deref().unwrap_or("");

    let Some(task) = port.get_task(board_id, column_id, task_id).await? else {
        return Err(MkanbanError::TaskNotFound(task_id.to_string()));
    };
    let from = task.column_id.clone();
    if port.move_task(board_id, &task, &from, target_column).await? {
        Ok(
            ExecutionResult::ok(format!("Moved task to {target_column}")).with_data(json!({
                "task_id": task_id,
                "from_column": from,
                "to_column": target_column,
            })),
        )
    } else {
        Ok(ExecutionResult::failed(format!(
            "could not move task {task_id} to {target_column}"
        )))
    }
}

#[async_trait]
impl Executor for MoveTaskExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult> {
        move_context_task(self.port.as_ref(), ctx, &self.target_column).await
    }

    fn validate(&self) -> Result<()> {
        if self.target_column.trim().is_empty() {
            return Err(MkanbanError::Validation(
                "move_task executor requires a target_column".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::MemoryTasks;
    use super::*;
    use chrono::Utc;

    fn ctx(task: Option<&str>, board: Option<&str>) -> ExecutionContext {
        ExecutionContext {
            action_id: "a1".into(),
            action_name: "Move".into(),
            timestamp: Utc::now(),
            task_id: task.map(str::to_string),
            task_title: None,
            board_id: board.map(str::to_string),
            board_name: None,
            column_id: None,
            previous_column_id: None,
        }
    }

    #[tokio::test]
    async fn moves_task_between_columns() {
        let tasks = Arc::new(MemoryTasks::default());
        tasks.insert("work", "t1", "todo");
        let exec = MoveTaskExecutor {
            target_column: "doing".into(),
            port: tasks.clone(),
        };
        let result = exec.execute(&ctx(Some("t1"), Some("work"))).await.unwrap();
        assert!(result.success);
        assert_eq!(tasks.column_of("work", "t1").as_deref(), Some("doing"));
    }

    #[tokio::test]
    async fn missing_context_fails_explicitly() {
        let exec = MoveTaskExecutor {
            target_column: "doing".into(),
            port: Arc::new(MemoryTasks::default()),
        };
        let result = exec.execute(&ctx(None, Some("work"))).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let exec = MoveTaskExecutor {
            target_column: "doing".into(),
            port: Arc::new(MemoryTasks::default()),
        };
        let err = exec.execute(&ctx(Some("ghost"), Some("work"))).await.unwrap_err();
        assert!(matches!(err, MkanbanError::TaskNotFound(_)));
    }
}
