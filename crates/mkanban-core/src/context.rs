use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::event::{EventData, EventPayload};

/// What an executor knows about why it is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub action_id: String,
    pub action_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_column_id: Option<String>,
}

impl ExecutionContext {
    pub fn for_action(action: &Action, timestamp: DateTime<Utc>) -> Self {
        Self {
            action_id: action.id.clone(),
            action_name: action.name.clone(),
            timestamp,
            task_id: None,
            task_title: None,
            board_id: None,
            board_name: None,
            column_id: None,
            previous_column_id: None,
        }
    }

    /// Copies the task, board and column fields the payload carries.
    pub fn from_event(action: &Action, payload: &EventPayload) -> Self {
        let mut ctx = Self::for_action(action, payload.timestamp);
        match &payload.data {
            EventData::Task(t) => {
                ctx.task_id = Some(t.task_id.clone());
                ctx.task_title = Some(t.task_title.clone());
                ctx.board_id = Some(t.board_id.clone());
                ctx.column_id = Some(t.column_id.clone());
                ctx.previous_column_id = t.previous_column_id.clone();
            }
            EventData::Board(b) => {
                ctx.board_id = Some(b.board_id.clone());
                ctx.board_name = Some(b.board_name.clone());
            }
            EventData::Column(c) => {
                ctx.board_id = Some(c.board_id.clone());
                ctx.column_id = Some(c.column_id.clone());
            }
            EventData::Git(_) | EventData::System { .. } | EventData::EntityChange(_) => {
                ctx.board_id = payload.board_id().map(str::to_string);
                ctx.task_id = payload.task_id().map(str::to_string);
            }
        }
        ctx
    }

    /// Context for a chained action: same trigger data, new action identity.
    pub fn rebind(&self, action: &Action) -> Self {
        Self {
            action_id: action.id.clone(),
            action_name: action.name.clone(),
            ..self.clone()
        }
    }
}

/// Substitute `{variable}` placeholders from the context. Unknown or unset
/// variables render as an empty string.
pub fn render_template(template: &str, ctx: &ExecutionContext) -> String {
    let local = ctx.timestamp.with_timezone(&Local);
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        let value = match name {
            "task_title" => ctx.task_title.clone().unwrap_or_default(),
            "task_id" => ctx.task_id.clone().unwrap_or_default(),
            "board_name" => ctx.board_name.clone().unwrap_or_default(),
            "board_id" => ctx.board_id.clone().unwrap_or_default(),
            "column_id" => ctx.column_id.clone().unwrap_or_default(),
            "action_name" => ctx.action_name.clone(),
            "date" => local.format("%Y-%m-%d").to_string(),
            "time" => local.format("%H:%M").to_string(),
            _ => String::new(),
        };
        out.push_str(&value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}
