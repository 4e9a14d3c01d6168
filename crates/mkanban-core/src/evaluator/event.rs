use std::collections::BTreeSet;

use crate::action::Action;
use crate::event::{EventPayload, EventType};
use crate::trigger::Trigger;

/// Matches bus events against an action's event triggers.
#[derive(Debug, Clone, Default)]
pub struct EventTriggerEvaluator;

impl EventTriggerEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn should_trigger(&self, action: &Action, event: EventType, payload: &EventPayload) -> bool {
        action
            .triggers
            .iter()
            .any(|t| trigger_matches(t, event, payload))
    }

    /// Minimal set of event types a listener needs for this action.
    pub fn get_watched_event_types(&self, action: &Action) -> BTreeSet<EventType> {
        action.triggers.iter().flat_map(watched_by).collect()
    }
}

fn trigger_matches(trigger: &Trigger, event: EventType, payload: &EventPayload) -> bool {
    match trigger {
        Trigger::BoardSwitch {
            event: switch,
            board_id,
        } => {
            if switch.event_type() != event {
                return false;
            }
            match board_id {
                Some(expected) => payload.board_id() == Some(expected.as_str()),
                None => true,
            }
        }
        Trigger::TaskStateChange { events } => events.iter().any(|e| e.event_type() == event),
        Trigger::GitEvent { events } => events.iter().any(|e| e.event_type() == event),
        Trigger::Time { .. } | Trigger::JiraEvent { .. } | Trigger::Inactivity { .. } => false,
    }
}

fn watched_by(trigger: &Trigger) -> Vec<EventType> {
    match trigger {
        Trigger::BoardSwitch { event, .. } => vec![event.event_type()],
        Trigger::TaskStateChange { events } => events.iter().map(|e| e.event_type()).collect(),
        Trigger::GitEvent { events } => events.iter().map(|e| e.event_type()).collect(),
        Trigger::Time { .. } | Trigger::JiraEvent { .. } | Trigger::Inactivity { .. } => {
            Vec::new()
        }
    }
}
