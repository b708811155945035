//! Wake alarm configuration, scheduling and observable status.

use core::fmt;

use serde::{Deserialize, Serialize};

mod schedule;
mod scheduler;
mod status;

pub use schedule::{GRADUAL_WAKE_STEPS, gradual_wake_lead, next_trigger};
pub use scheduler::{CountdownOutcome, WakeAlarmScheduler};
pub use status::AlarmStatus;

/// Layout version written with every [`WakeAlarmSettings`] record.
pub const WAKE_ALARM_FORMAT_VERSION: u8 = 1;
/// Never written; kept free so the version field can grow later.
pub const RESERVED_FORMAT_VERSION: u8 = 255;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize, Deserialize)]
pub enum Recurrence {
    /// One-shot alarm, disabled after it has rung.
    #[default]
    None,
    Daily,
    /// Monday to Friday.
    Weekdays,
}

impl Recurrence {
    pub const ALL: [Recurrence; 3] = [Recurrence::None, Recurrence::Daily, Recurrence::Weekdays];

    #[must_use]
    pub const fn is_recurring(self) -> bool {
        !matches!(self, Recurrence::None)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Recurrence::None => "once",
            Recurrence::Daily => "daily",
            Recurrence::Weekdays => "weekdays",
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted wake alarm record.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WakeAlarmSettings {
    pub version: u8,
    pub hours: u8,
    pub minutes: u8,
    pub recurrence: Recurrence,
    pub is_enabled: bool,
}

impl Default for WakeAlarmSettings {
    fn default() -> Self {
        Self {
            version: WAKE_ALARM_FORMAT_VERSION,
            hours: 7,
            minutes: 0,
            recurrence: Recurrence::None,
            is_enabled: false,
        }
    }
}

/// Lifecycle of the wake alarm. The persisted `is_enabled` flag is derived
/// from this and never stored separately.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum AlarmState {
    #[default]
    Disabled,
    Armed,
    /// Armed, with the pre-alarm natural-wake ramp running.
    GradualWake,
    Alerting,
}

impl AlarmState {
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, AlarmState::Disabled)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AlarmState::Disabled => "disabled",
            AlarmState::Armed => "armed",
            AlarmState::GradualWake => "gradual-wake",
            AlarmState::Alerting => "alerting",
        }
    }

    pub(crate) const fn to_raw(self) -> u8 {
        match self {
            AlarmState::Disabled => 0,
            AlarmState::Armed => 1,
            AlarmState::GradualWake => 2,
            AlarmState::Alerting => 3,
        }
    }

    pub(crate) const fn from_raw(code: u8) -> Self {
        match code {
            1 => AlarmState::Armed,
            2 => AlarmState::GradualWake,
            3 => AlarmState::Alerting,
            _ => AlarmState::Disabled,
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AlarmError {
    InvalidTime { hours: u8, minutes: u8 },
    /// The next occurrence falls outside the representable calendar.
    CalendarOverflow,
}

impl fmt::Display for AlarmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmError::InvalidTime { hours, minutes } => {
                write!(f, "invalid alarm time {hours:02}:{minutes:02}")
            }
            AlarmError::CalendarOverflow => f.write_str("alarm time out of calendar range"),
        }
    }
}

/// Rejects anything outside 00:00..=23:59.
pub fn validate_time(hours: u8, minutes: u8) -> Result<(), AlarmError> {
    if hours > 23 || minutes > 59 {
        return Err(AlarmError::InvalidTime { hours, minutes });
    }
    Ok(())
}
