//! Shared status storage for the firmware target.
//!
//! The measurement worker and the alarm service publish into these cells so
//! UI code can read the latest heart rate and alarm state without touching
//! either task. Drop counters track requests lost to full queues.

use portable_atomic::{AtomicU32, Ordering};
use sleep_core::alarm::{AlarmState, AlarmStatus, Recurrence};
use sleep_core::heartrate::{BackgroundInterval, BackgroundIntervalCell, Estimate, SharedEstimate};

/// Latest heart-rate estimate published by the measurement worker.
pub static ESTIMATE: SharedEstimate = SharedEstimate::new();
/// Background measurement interval read by the worker every cycle.
pub static BACKGROUND_INTERVAL: BackgroundIntervalCell =
    BackgroundIntervalCell::new(BackgroundInterval::Off);
/// Alarm state mirrored by the alarm service after every request and deadline.
pub static ALARM_STATUS: AlarmStatus = AlarmStatus::new();

static COMMANDS_DROPPED: AtomicU32 = AtomicU32::new(0);
static ALARM_REQUESTS_DROPPED: AtomicU32 = AtomicU32::new(0);

/// Counts a measurement command dropped by a full queue. Returns the new total.
pub fn record_command_dropped() -> u32 {
    COMMANDS_DROPPED.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}

pub fn commands_dropped() -> u32 {
    COMMANDS_DROPPED.load(Ordering::Relaxed)
}

/// Counts an alarm request dropped by a full queue. Returns the new total.
pub fn record_alarm_request_dropped() -> u32 {
    ALARM_REQUESTS_DROPPED.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}

pub fn alarm_requests_dropped() -> u32 {
    ALARM_REQUESTS_DROPPED.load(Ordering::Relaxed)
}

/// Point-in-time view of every published value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub estimate: Estimate,
    pub background: BackgroundInterval,
    pub alarm_state: AlarmState,
    pub alarm_time: (u8, u8),
    pub recurrence: Recurrence,
    pub seconds_to_alarm: u32,
    pub commands_dropped: u32,
    pub alarm_requests_dropped: u32,
}

pub fn snapshot() -> StatusSnapshot {
    StatusSnapshot {
        estimate: ESTIMATE.load(),
        background: BACKGROUND_INTERVAL.load(),
        alarm_state: ALARM_STATUS.state(),
        alarm_time: ALARM_STATUS.time(),
        recurrence: ALARM_STATUS.recurrence(),
        seconds_to_alarm: ALARM_STATUS.seconds_to_alarm(),
        commands_dropped: commands_dropped(),
        alarm_requests_dropped: alarm_requests_dropped(),
    }
}
