use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use mkanban_core::board::NewTask;
use mkanban_core::context::{render_template, ExecutionContext};
use mkanban_core::executor::ExecutionResult;
use mkanban_core::{MkanbanError, Result};

use super::Executor;
use crate::ports::TaskMutationPort;

pub struct CreateTaskExecutor {
    pub(super) task_title: String,
    pub(super) task_description: Option<String>,
    pub(super) task_column: String,
    /// Falls back to the context's board.
    pub(super) board_id: Option<String>,
    pub(super) port: Arc<dyn TaskMutationPort>,
}

#[async_trait]
impl Executor for CreateTaskExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult> {
        let Some(board_id) = self.board_id.as_deref().or(ctx.board_id.as_deref()) else {
            return Ok(ExecutionResult::failed(
                "create_task needs a board_id in its config or the execution context",
            ));
        };
        let input = NewTask {
            title: render_template(&self.task_title, ctx),
            description: self.task_description.as_deref().map(|d| render_template(d, ctx)),
        };
        match self.port.create_task(board_id, &self.task_column, input).await? {
            Some(task) => Ok(ExecutionResult::ok(format!("Created task {}", task.title))
                .with_data(json!({ "task_id": task.id, "board_id": board_id }))),
            None => Ok(ExecutionResult::failed(format!(
                "board {board_id} rejected the new task"
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.task_title.trim().is_empty() || self.task_column.trim().is_empty() {
            return Err(MkanbanError::Validation(
                "create_task executor requires task_title and task_column".into(),
            ));
        }
        Ok(())
    }
}
