//! Action persistence.

mod db;
mod memory;

pub use db::ActionDb;
pub use memory::MemoryActionStore;

use crate::action::Action;
use crate::error::Result;
use crate::types::{ActionType, ScopeType};

/// AND-combined filter; unset fields match everything, `tags` must all be
/// present on the action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionFilter {
    pub action_type: Option<ActionType>,
    pub scope_type: Option<ScopeType>,
    pub target_id: Option<String>,
    pub enabled: Option<bool>,
    pub tags: Vec<String>,
}

impl ActionFilter {
    pub fn matches(&self, action: &Action) -> bool {
        self.action_type.map_or(true, |t| action.action_type == t)
            && self.scope_type.map_or(true, |s| action.scope.scope_type == s)
            && self
                .target_id
                .as_deref()
                .map_or(true, |t| action.scope.target_id.as_deref() == Some(t))
            && self.enabled.map_or(true, |e| action.enabled == e)
            && action.has_tags(&self.tags)
    }
}

/// Owner of persisted actions. Callers get snapshots; changes go through
/// `update`, last write wins.
pub trait ActionStore: Send + Sync {
    /// Sorted by creation time, oldest first.
    fn get_all(&self, filter: &ActionFilter) -> Result<Vec<Action>>;

    fn get_by_id(&self, id: &str) -> Result<Option<Action>>;

    fn create(&self, action: &Action) -> Result<()>;

    /// Fails with `ActionNotFound` when the id is unknown.
    fn update(&self, action: &Action) -> Result<()>;

    /// Returns whether a record was removed.
    fn delete(&self, id: &str) -> Result<bool>;

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.get_by_id(id)?.is_some())
    }

    fn get_by_scope(&self, scope_type: ScopeType, target_id: Option<&str>) -> Result<Vec<Action>> {
        self.get_all(&ActionFilter {
            scope_type: Some(scope_type),
            target_id: target_id.map(str::to_string),
            ..Default::default()
        })
    }

    fn get_by_type(&self, action_type: ActionType) -> Result<Vec<Action>> {
        self.get_all(&ActionFilter {
            action_type: Some(action_type),
            ..Default::default()
        })
    }

    fn get_enabled(&self) -> Result<Vec<Action>> {
        self.get_all(&ActionFilter {
            enabled: Some(true),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::tests::sample_action;
    use crate::action::ActionScope;

    #[test]
    fn filter_fields_are_and_combined() {
        let mut a = sample_action();
        a.scope = ActionScope::board("work");
        a.metadata.tags = vec!["focus".into(), "daily".into()];

        assert!(ActionFilter::default().matches(&a));
        assert!(ActionFilter {
            scope_type: Some(ScopeType::Board),
            target_id: Some("work".into()),
            tags: vec!["daily".into()],
            ..Default::default()
        }
        .matches(&a));
        assert!(!ActionFilter {
            scope_type: Some(ScopeType::Board),
            target_id: Some("home".into()),
            ..Default::default()
        }
        .matches(&a));
        assert!(!ActionFilter {
            tags: vec!["daily".into(), "weekly".into()],
            ..Default::default()
        }
        .matches(&a));
        assert!(!ActionFilter {
            enabled: Some(false),
            ..Default::default()
        }
        .matches(&a));
    }
}
