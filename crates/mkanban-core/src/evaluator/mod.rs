//! Trigger evaluators. All of them are side-effect free apart from the
//! inactivity tracker's in-memory bookkeeping, and none of them fail: bad
//! input evaluates to `false` with a warning.

pub mod event;
pub mod inactivity;
pub mod time;

pub use event::EventTriggerEvaluator;
pub use inactivity::InactivityTriggerEvaluator;
pub use time::TimeTriggerEvaluator;

use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use tracing::warn;

use crate::error::{MkanbanError, Result};

/// Parse "HH:MM" into (hour, minute).
pub fn parse_time_of_day(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    (h < 24 && m < 60).then_some((h, m))
}

/// Accepts 5-field (minute first) or 6/7-field (seconds first) expressions.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let fields = expr.split_whitespace().count();
    let full = match fields {
        5 => format!("0 {}", expr.trim()),
        6 | 7 => expr.trim().to_string(),
        _ => {
            return Err(MkanbanError::InvalidSchedule(format!(
                "cron expression '{expr}' has {fields} fields"
            )))
        }
    };
    Schedule::from_str(&full)
        .map_err(|e| MkanbanError::InvalidSchedule(format!("cron expression '{expr}': {e}")))
}

/// IANA zone lookup; unknown names are logged and ignored by callers.
pub fn parse_timezone(name: &str) -> Option<Tz> {
    match name.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            warn!(timezone = name, "unknown timezone in schedule");
            None
        }
    }
}
