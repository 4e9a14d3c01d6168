use chrono::{DateTime, Datelike, Days, Duration, Local, NaiveDate, TimeZone, Timelike, Utc};
use tracing::warn;

use super::{parse_cron, parse_time_of_day, parse_timezone};
use crate::action::Action;
use crate::trigger::{ScheduleType, TimeSchedule, Trigger};

/// Cron occurrences within this distance of "now" count as due.
pub const DEFAULT_CRON_WINDOW_SECS: i64 = 30;

const MAX_CRON_WINDOW_SECS: i64 = 86_400;

/// A recurring schedule that fired this recently is not fired again.
const RECURRING_DEDUPE_MINUTES: i64 = 3;

/// Upper bound on how far ahead recurring schedules are searched.
const MAX_LOOKAHEAD_DAYS: u64 = 400;

/// Decides whether an action's time triggers are due.
///
/// Recurring schedules are evaluated in the host's local zone unless the
/// schedule names an IANA `timezone`.
#[derive(Debug, Clone)]
pub struct TimeTriggerEvaluator {
    cron_window: Duration,
}

impl Default for TimeTriggerEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeTriggerEvaluator {
    pub fn new() -> Self {
        Self {
            cron_window: Duration::seconds(DEFAULT_CRON_WINDOW_SECS),
        }
    }

    /// Tolerance for cron matching; normally the polling interval. Clamped
    /// to between one second and one day.
    pub fn with_cron_window(window: std::time::Duration) -> Self {
        let secs = i64::try_from(window.as_secs()).unwrap_or(MAX_CRON_WINDOW_SECS);
        Self {
            cron_window: Duration::seconds(secs.clamp(1, MAX_CRON_WINDOW_SECS)),
        }
    }

    pub fn should_trigger(&self, action: &Action, now: DateTime<Utc>) -> bool {
        self.should_trigger_at(action, &now.with_timezone(&Local))
    }

    /// Like [`should_trigger`](Self::should_trigger) with an explicit zone for
    /// schedules that do not name one.
    pub fn should_trigger_at<Tz: TimeZone>(&self, action: &Action, now: &DateTime<Tz>) -> bool {
        time_schedules(action).any(|schedule| match schedule.timezone.as_deref() {
            Some(name) => match parse_timezone(name) {
                Some(tz) => self.evaluate(schedule, action, &now.with_timezone(&tz)),
                None => false,
            },
            None => self.evaluate(schedule, action, now),
        })
    }

    /// Earliest upcoming fire across the action's time triggers.
    pub fn get_next_trigger_time(&self, action: &Action, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_trigger_time_after(action, now)
    }

    /// Earliest fire strictly after `after`.
    pub fn next_trigger_time_after(
        &self,
        action: &Action,
        after: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.next_trigger_time_after_at(action, &after.with_timezone(&Local))
    }

    pub fn next_trigger_time_after_at<Tz: TimeZone>(
        &self,
        action: &Action,
        after: &DateTime<Tz>,
    ) -> Option<DateTime<Utc>> {
        time_schedules(action)
            .filter_map(|schedule| match schedule.timezone.as_deref() {
                Some(name) => {
                    parse_timezone(name).and_then(|tz| next_after(schedule, &after.with_timezone(&tz)))
                }
                None => next_after(schedule, after),
            })
            .min()
    }

    // -----------------------------------------------------------------------
    // Per-schedule evaluation
    // -----------------------------------------------------------------------

    fn evaluate<Tz: TimeZone>(&self, schedule: &TimeSchedule, action: &Action, now: &DateTime<Tz>) -> bool {
        match schedule.schedule_type {
            ScheduleType::Once => evaluate_once(schedule, action, now),
            ScheduleType::Daily => {
                if !schedule.days_of_week.is_empty() && !weekday_listed(schedule, now) {
                    return false;
                }
                recurring_due(schedule, action, now)
            }
            ScheduleType::Weekly => {
                if schedule.days_of_week.is_empty() || !weekday_listed(schedule, now) {
                    return false;
                }
                recurring_due(schedule, action, now)
            }
            ScheduleType::Monthly => {
                if schedule.day_of_month != Some(now.day()) {
                    return false;
                }
                recurring_due(schedule, action, now)
            }
            ScheduleType::Cron => self.evaluate_cron(schedule, action, now),
        }
    }

    fn evaluate_cron<Tz: TimeZone>(&self, schedule: &TimeSchedule, action: &Action, now: &DateTime<Tz>) -> bool {
        let Some(expr) = schedule.cron_expression.as_deref() else {
            return false;
        };
        let cron = match parse_cron(expr) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, action_id = %action.id, "skipping cron trigger");
                return false;
            }
        };
        let window = self.cron_window;
        let Some(next) = cron.after(&(now.clone() - window)).next() else {
            return false;
        };
        let next = next.with_timezone(&Utc);
        let now = now.with_timezone(&Utc);
        if (next - now).abs() > window {
            return false;
        }
        // Occurrence already handled.
        !action
            .execution
            .last_triggered
            .is_some_and(|last| last >= next - window)
    }
}

fn time_schedules(action: &Action) -> impl Iterator<Item = &TimeSchedule> {
    action.triggers.iter().filter_map(|t| match t {
        Trigger::Time { schedule } => Some(schedule),
        _ => None,
    })
}

fn evaluate_once<Tz: TimeZone>(schedule: &TimeSchedule, action: &Action, now: &DateTime<Tz>) -> bool {
    let Some(target) = schedule.datetime else {
        warn!(action_id = %action.id, "once schedule without datetime");
        return false;
    };
    action.execution.last_triggered.is_none() && now.with_timezone(&Utc) >= target
}

fn weekday_listed<Tz: TimeZone>(schedule: &TimeSchedule, now: &DateTime<Tz>) -> bool {
    schedule
        .days_of_week
        .contains(&now.weekday().number_from_monday())
}

/// Same hour, minute within one of the configured minute, and not already
/// fired in the last few minutes.
fn recurring_due<Tz: TimeZone>(schedule: &TimeSchedule, action: &Action, now: &DateTime<Tz>) -> bool {
    let Some((hour, minute)) = schedule.time.as_deref().and_then(parse_time_of_day) else {
        warn!(action_id = %action.id, time = ?schedule.time, "unparseable schedule time");
        return false;
    };
    if now.hour() != hour || now.minute().abs_diff(minute) > 1 {
        return false;
    }
    let now = now.with_timezone(&Utc);
    !action.execution.last_triggered.is_some_and(|last| {
        let age = now - last;
        age >= Duration::zero() && age < Duration::minutes(RECURRING_DEDUPE_MINUTES)
    })
}

// ---------------------------------------------------------------------------
// Next fire time
// ---------------------------------------------------------------------------

fn next_after<Tz: TimeZone>(schedule: &TimeSchedule, after: &DateTime<Tz>) -> Option<DateTime<Utc>> {
    let after_utc = after.with_timezone(&Utc);
    match schedule.schedule_type {
        ScheduleType::Once => schedule.datetime.filter(|dt| *dt > after_utc),
        ScheduleType::Cron => {
            let cron = parse_cron(schedule.cron_expression.as_deref()?).ok()?;
            let next = cron.after(after).next()?;
            Some(next.with_timezone(&Utc))
        }
        ScheduleType::Daily | ScheduleType::Weekly | ScheduleType::Monthly => {
            next_recurring(schedule, after)
        }
    }
}

fn next_recurring<Tz: TimeZone>(schedule: &TimeSchedule, after: &DateTime<Tz>) -> Option<DateTime<Utc>> {
    let (hour, minute) = parse_time_of_day(schedule.time.as_deref()?)?;
    if schedule.schedule_type == ScheduleType::Weekly && schedule.days_of_week.is_empty() {
        return None;
    }
    let tz = after.timezone();
    let start = after.date_naive();
    (0..=MAX_LOOKAHEAD_DAYS)
        .filter_map(|offset| start.checked_add_days(Days::new(offset)))
        .filter(|date| day_matches(schedule, *date))
        .filter_map(|date| {
            let naive = date.and_hms_opt(hour, minute, 0)?;
            tz.from_local_datetime(&naive).earliest()
        })
        .find(|candidate| candidate > after)
        .map(|dt| dt.with_timezone(&Utc))
}

fn day_matches(schedule: &TimeSchedule, date: NaiveDate) -> bool {
    match schedule.schedule_type {
        ScheduleType::Monthly => schedule.day_of_month == Some(date.day()),
        _ => {
            schedule.days_of_week.is_empty()
                || schedule
                    .days_of_week
                    .contains(&date.weekday().number_from_monday())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
