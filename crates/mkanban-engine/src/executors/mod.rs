//! Executor dispatch. Every failure mode of an executor, including a panic,
//! comes back as a failed [`ExecutionResult`].

mod create_task;
mod mark_complete;
mod move_task;
mod notify;

pub use create_task::CreateTaskExecutor;
pub use mark_complete::MarkCompleteExecutor;
pub use move_task::MoveTaskExecutor;
pub use notify::NotifyExecutor;

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

use mkanban_core::context::ExecutionContext;
use mkanban_core::executor::{ExecutionResult, ExecutorSpec};
use mkanban_core::Result;

use crate::ports::{NotificationPort, TaskMutationPort};
use crate::settings::SharedConfig;

#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult>;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds executors from specs against the host's collaborators.
#[derive(Clone)]
pub struct ExecutorFactory {
    tasks: Arc<dyn TaskMutationPort>,
    notifier: Arc<dyn NotificationPort>,
    config: SharedConfig,
}

impl ExecutorFactory {
    pub fn new(
        tasks: Arc<dyn TaskMutationPort>,
        notifier: Arc<dyn NotificationPort>,
        config: SharedConfig,
    ) -> Self {
        Self {
            tasks,
            notifier,
            config,
        }
    }

    /// `None` for kinds this engine does not implement.
    pub fn build(&self, spec: &ExecutorSpec) -> Option<Box<dyn Executor>> {
        match spec {
            ExecutorSpec::Notify {
                message,
                title,
                platforms,
                channels,
                priority,
            } => Some(Box::new(NotifyExecutor {
                message: message.clone(),
                title: title.clone(),
                platforms: platforms.clone(),
                channels: channels.clone(),
                priority: priority.unwrap_or_default(),
                port: self.notifier.clone(),
            })),
            ExecutorSpec::MoveTask { target_column } => Some(Box::new(MoveTaskExecutor {
                target_column: target_column.clone(),
                port: self.tasks.clone(),
            })),
            ExecutorSpec::CreateTask {
                task_title,
                task_description,
                task_column,
                board_id,
            } => Some(Box::new(CreateTaskExecutor {
                task_title: task_title.clone(),
                task_description: task_description.clone(),
                task_column: task_column.clone(),
                board_id: board_id.clone(),
                port: self.tasks.clone(),
            })),
            ExecutorSpec::MarkComplete => Some(Box::new(MarkCompleteExecutor {
                done_column: self.config.get().done_column,
                port: self.tasks.clone(),
            })),
            ExecutorSpec::CreateBranch { .. }
            | ExecutorSpec::JiraUpdate { .. }
            | ExecutorSpec::RunCommand { .. } => None,
        }
    }

    pub async fn dispatch(&self, spec: &ExecutorSpec, ctx: &ExecutionContext) -> ExecutionResult {
        let kind = spec.kind();
        let Some(executor) = self.build(spec) else {
            warn!(action = %ctx.action_id, %kind, "no executor available");
            return ExecutionResult::failed(format!("executor '{kind}' is not available"));
        };
        if let Err(e) = executor.validate() {
            return ExecutionResult::failed(e.to_string());
        }
        match AssertUnwindSafe(executor.execute(ctx)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(action = %ctx.action_id, %kind, error = %e, "executor failed");
                ExecutionResult::failed(e.to_string())
            }
            Err(_) => {
                warn!(action = %ctx.action_id, %kind, "executor panicked");
                ExecutionResult::failed(format!("executor '{kind}' panicked"))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use chrono::Utc;

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            action_id: "a1".into(),
            action_name: "Tidy".into(),
            timestamp: Utc::now(),
            task_id: None,
            task_title: None,
            board_id: None,
            board_name: None,
            column_id: None,
            previous_column_id: None,
        }
    }

    #[tokio::test]
    async fn unimplemented_kinds_fail_without_panicking() {
        let f = factory(Arc::default(), Arc::default());
        let spec = ExecutorSpec::CreateBranch {
            branch_name: "feature/x".into(),
        };
        let result = f.dispatch(&spec, &ctx()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("create_branch"));
    }

    #[tokio::test]
    async fn port_error_becomes_failed_result() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let f = factory(Arc::default(), notifier);
        let result = f.dispatch(&ExecutorSpec::notify("hi"), &ctx()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn invalid_spec_fails_validation() {
        let f = factory(Arc::default(), Arc::default());
        let result = f.dispatch(&ExecutorSpec::notify("  "), &ctx()).await;
        assert!(!result.success);
    }
}
