//! AND-combined gates checked after a trigger fires.

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::ExecutionContext;
use crate::evaluator::parse_time_of_day;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Inclusive "HH:MM" window in local time.
    TimeRange { start_time: String, end_time: String },
    /// ISO weekdays, 1 = Monday .. 7 = Sunday.
    DayOfWeek { days: Vec<u32> },
    TaskInColumn { column_ids: Vec<String> },
    TaskProperty {
        property: String,
        operator: PropertyOperator,
        value: serde_json::Value,
    },
    BoardActive { board_ids: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
}

impl Condition {
    pub fn check<Tz: TimeZone>(&self, ctx: &ExecutionContext, now: &DateTime<Tz>) -> bool {
        match self {
            Condition::TimeRange {
                start_time,
                end_time,
            } => {
                let (Some(start), Some(end)) =
                    (parse_time_of_day(start_time), parse_time_of_day(end_time))
                else {
                    warn!(%start_time, %end_time, "unparseable time_range condition");
                    return false;
                };
                let current = now.hour() * 60 + now.minute();
                let start = start.0 * 60 + start.1;
                let end = end.0 * 60 + end.1;
                current >= start && current <= end
            }
            Condition::DayOfWeek { days } => {
                days.contains(&now.weekday().number_from_monday())
            }
            Condition::TaskInColumn { column_ids } => ctx
                .column_id
                .as_ref()
                .is_some_and(|c| column_ids.contains(c)),
            // Needs the live task; always passes.
            Condition::TaskProperty { .. } => true,
            Condition::BoardActive { board_ids } => ctx
                .board_id
                .as_ref()
                .is_some_and(|b| board_ids.contains(b)),
        }
    }
}

/// Empty list passes; otherwise the first failing condition vetoes.
pub fn check_conditions<Tz: TimeZone>(
    conditions: &[Condition],
    ctx: &ExecutionContext,
    now: &DateTime<Tz>,
) -> bool {
    conditions.iter().all(|c| c.check(ctx, now))
}
