use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use mkanban_core::context::{render_template, ExecutionContext};
use mkanban_core::executor::{
    ExecutionResult, NotificationChannel, NotificationPlatform, NotificationPriority,
};
use mkanban_core::{MkanbanError, Result};

use super::Executor;
use crate::ports::{Notification, NotificationPort};

const DEFAULT_TITLE: &str = "MKanban";

pub struct NotifyExecutor {
    pub(super) message: String,
    pub(super) title: Option<String>,
    pub(super) platforms: Vec<NotificationPlatform>,
    pub(super) channels: Vec<NotificationChannel>,
    pub(super) priority: NotificationPriority,
    pub(super) port: Arc<dyn NotificationPort>,
}

#[async_trait]
impl Executor for NotifyExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<ExecutionResult> {
        let title = self
            .title
            .as_deref()
            .map(|t| render_template(t, ctx))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let platforms = if self.platforms.is_empty() {
            vec![NotificationPlatform::Mobile]
        } else {
            self.platforms.clone()
        };
        let channels = if self.channels.is_empty() {
            vec![NotificationChannel::System]
        } else {
            self.channels.clone()
        };

        let handle = self
            .port
            .send(Notification {
                title,
                message: render_template(&self.message, ctx),
                priority: self.priority,
                platforms,
                channels,
            })
            .await?;

        Ok(ExecutionResult::ok("Notification sent").with_data(json!({ "notification_id": handle })))
    }

    fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(MkanbanError::Validation(
                "notify executor requires a message".into(),
            ));
        }
        Ok(())
    }
}
