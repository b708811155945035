use core::time::Duration;

use time::{PrimitiveDateTime, Time, Weekday};

use super::{AlarmError, Recurrence, validate_time};

/// Candidate leads, in seconds, for the gradual-wake countdown.
pub const GRADUAL_WAKE_STEPS: [u16; 9] = [30, 60, 90, 120, 180, 240, 300, 350, 600];

/// Next `hours:minutes` strictly after `after` that satisfies `recurrence`.
///
/// A candidate equal to `after` rolls over to the next valid day, and weekday
/// alarms skip Saturday and Sunday.
pub fn next_trigger(
    after: PrimitiveDateTime,
    hours: u8,
    minutes: u8,
    recurrence: Recurrence,
) -> Result<PrimitiveDateTime, AlarmError> {
    validate_time(hours, minutes)?;
    let time = Time::from_hms(hours, minutes, 0)
        .map_err(|_| AlarmError::InvalidTime { hours, minutes })?;

    let mut candidate = PrimitiveDateTime::new(after.date(), time);
    if candidate <= after {
        candidate = next_day(candidate)?;
    }

    if recurrence == Recurrence::Weekdays {
        while is_weekend(candidate.weekday()) {
            candidate = next_day(candidate)?;
        }
    }

    Ok(candidate)
}

/// Largest step from [`GRADUAL_WAKE_STEPS`] that starts strictly after now,
/// given the time left until the alarm.
#[must_use]
pub fn gradual_wake_lead(until_trigger: Duration) -> Option<Duration> {
    GRADUAL_WAKE_STEPS
        .iter()
        .rev()
        .map(|&secs| Duration::from_secs(u64::from(secs)))
        .find(|lead| *lead < until_trigger)
}

fn next_day(value: PrimitiveDateTime) -> Result<PrimitiveDateTime, AlarmError> {
    value
        .checked_add(time::Duration::DAY)
        .ok_or(AlarmError::CalendarOverflow)
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Saturday | Weekday::Sunday)
}
