use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::condition::Condition;
use crate::config::SNOOZE_TOKENS;
use crate::error::{MkanbanError, Result};
use crate::executor::ExecutorSpec;
use crate::paths::slugify;
use crate::trigger::{Trigger, TriggerKind};
use crate::types::{ActionType, ScopeType};

// ---------------------------------------------------------------------------
// Supporting records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionScope {
    #[serde(rename = "type")]
    pub scope_type: ScopeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

impl ActionScope {
    pub fn global() -> Self {
        Self {
            scope_type: ScopeType::Global,
            target_id: None,
        }
    }

    pub fn board(board_id: impl Into<String>) -> Self {
        Self {
            scope_type: ScopeType::Board,
            target_id: Some(board_id.into()),
        }
    }

    pub fn task(task_id: impl Into<String>) -> Self {
        Self {
            scope_type: ScopeType::Task,
            target_id: Some(task_id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceType {
    Daily,
    Weekly,
    Monthly,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    #[serde(rename = "type")]
    pub recurrence_type: RecurrenceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnoozeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default = "default_snooze_options")]
    pub options: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_snooze_options() -> Vec<String> {
    SNOOZE_TOKENS.iter().map(|s| s.to_string()).collect()
}

impl Default for SnoozeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            count: 0,
            until: None,
            options: default_snooze_options(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistory {
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub total_executions: u64,
    #[serde(default)]
    pub successful_executions: u64,
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl ExecutionHistory {
    /// Apply one attempt's outcome.
    pub fn record(&mut self, success: bool, error: Option<String>, at: DateTime<Utc>) {
        self.last_triggered = Some(at);
        self.total_executions += 1;
        if success {
            self.last_success = Some(at);
            self.successful_executions += 1;
            self.consecutive_failures = 0;
            self.last_error = None;
        } else {
            self.last_failure = Some(at);
            self.last_error = error;
            self.consecutive_failures += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMetadata {
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    /// Seconds. Recorded but not enforced.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, serde_json::Value>,
}

fn default_priority() -> u32 {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    300
}

fn default_timeout() -> u64 {
    30
}

impl Default for ActionMetadata {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            timeout: default_timeout(),
            tags: Vec::new(),
            custom: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub scope: ActionScope,
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub executors: Vec<ExecutorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub snooze: SnoozeConfig,
    #[serde(default)]
    pub execution: ExecutionHistory,
    #[serde(default)]
    pub metadata: ActionMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<String>,
}

impl Action {
    /// Build a fresh action with seeded execution, snooze and metadata defaults.
    pub fn from_new(id: String, input: NewAction, now: DateTime<Utc>) -> Self {
        Self {
            id,
            action_type: input.action_type,
            name: input.name,
            description: input.description,
            enabled: input.enabled,
            created_at: now,
            modified_at: now,
            scope: input.scope,
            triggers: input.triggers,
            conditions: input.conditions,
            executors: input.executors,
            recurrence: input.recurrence,
            snooze: SnoozeConfig::default(),
            execution: ExecutionHistory::default(),
            metadata: input.metadata.unwrap_or_default(),
            on_success: input.on_success,
            on_failure: input.on_failure,
        }
    }

    /// `action-<type>-<slug>-<timestamp>-<suffix>`.
    pub fn generate_id(action_type: ActionType, name: &str, now: DateTime<Utc>) -> String {
        let slug = slugify(name, 20);
        let slug = if slug.is_empty() { "action".to_string() } else { slug };
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "action-{}-{}-{}-{}",
            action_type.id_prefix(),
            slug,
            now.format("%Y%m%dT%H%M%S"),
            &suffix[..6]
        )
    }

    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        self.snooze.enabled && self.snooze.until.is_some_and(|until| now < until)
    }

    /// Enabled and not snoozed.
    pub fn should_execute(&self, now: DateTime<Utc>) -> bool {
        self.enabled && !self.is_snoozed(now)
    }

    pub fn has_trigger_kind(&self, kind: TriggerKind) -> bool {
        self.triggers.iter().any(|t| t.kind() == kind)
    }

    pub fn has_time_trigger(&self) -> bool {
        self.has_trigger_kind(TriggerKind::Time)
    }

    pub fn has_event_trigger(&self) -> bool {
        self.has_trigger_kind(TriggerKind::Event)
    }

    pub fn has_inactivity_trigger(&self) -> bool {
        self.has_trigger_kind(TriggerKind::Inactivity)
    }

    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.metadata.tags.contains(t))
    }

    /// Structural checks run before anything is persisted.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(MkanbanError::Validation("id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(MkanbanError::Validation("name must not be empty".into()));
        }
        let has_target = self
            .scope
            .target_id
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        match self.scope.scope_type {
            ScopeType::Global if has_target => {
                return Err(MkanbanError::Validation(
                    "global scope must not carry a target_id".into(),
                ));
            }
            ScopeType::Board | ScopeType::Task if !has_target => {
                return Err(MkanbanError::Validation(format!(
                    "{} scope requires a target_id",
                    self.scope.scope_type
                )));
            }
            _ => {}
        }
        if self.triggers.is_empty() {
            return Err(MkanbanError::Validation(
                "at least one trigger is required".into(),
            ));
        }
        if self.executors.is_empty() {
            return Err(MkanbanError::Validation(
                "at least one executor is required".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NewAction / ActionUpdate
// ---------------------------------------------------------------------------

/// Caller-supplied fields for a new action; the service fills in the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub scope: ActionScope,
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub executors: Vec<ExecutorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ActionMetadata>,
    #[serde(default)]
    pub on_success: Vec<String>,
    #[serde(default)]
    pub on_failure: Vec<String>,
}

impl NewAction {
    pub fn new(action_type: ActionType, name: impl Into<String>, scope: ActionScope) -> Self {
        Self {
            action_type,
            name: name.into(),
            description: None,
            enabled: true,
            scope,
            triggers: Vec::new(),
            conditions: Vec::new(),
            executors: Vec::new(),
            recurrence: None,
            metadata: None,
            on_success: Vec::new(),
            on_failure: Vec::new(),
        }
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn executor(mut self, executor: ExecutorSpec) -> Self {
        self.executors.push(executor);
        self
    }

    pub fn metadata(mut self, metadata: ActionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub scope: Option<ActionScope>,
    #[serde(default)]
    pub triggers: Option<Vec<Trigger>>,
    #[serde(default)]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default)]
    pub executors: Option<Vec<ExecutorSpec>>,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub snooze: Option<SnoozeConfig>,
    #[serde(default)]
    pub metadata: Option<ActionMetadata>,
    #[serde(default)]
    pub on_success: Option<Vec<String>>,
    #[serde(default)]
    pub on_failure: Option<Vec<String>>,
}

impl ActionUpdate {
    /// Id, creation time and execution history are never touched.
    pub fn apply(self, action: &mut Action) {
        if let Some(v) = self.name {
            action.name = v;
        }
        if let Some(v) = self.description {
            action.description = Some(v);
        }
        if let Some(v) = self.enabled {
            action.enabled = v;
        }
        if let Some(v) = self.scope {
            action.scope = v;
        }
        if let Some(v) = self.triggers {
            action.triggers = v;
        }
        if let Some(v) = self.conditions {
            action.conditions = v;
        }
        if let Some(v) = self.executors {
            action.executors = v;
        }
        if let Some(v) = self.recurrence {
            action.recurrence = Some(v);
        }
        if let Some(v) = self.snooze {
            action.snooze = v;
        }
        if let Some(v) = self.metadata {
            action.metadata = v;
        }
        if let Some(v) = self.on_success {
            action.on_success = v;
        }
        if let Some(v) = self.on_failure {
            action.on_failure = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
