use portable_atomic::{AtomicU8, AtomicU32, Ordering};

use super::{AlarmState, Recurrence, WakeAlarmSettings};

/// Alarm flags mirrored for readers outside the timer task.
///
/// The timer task is the only writer. Readers may observe fields from two
/// consecutive publishes; each field is individually consistent.
#[derive(Debug)]
pub struct AlarmStatus {
    state: AtomicU8,
    hours: AtomicU8,
    minutes: AtomicU8,
    recurrence: AtomicU8,
    seconds_to_alarm: AtomicU32,
}

impl AlarmStatus {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(0),
            hours: AtomicU8::new(7),
            minutes: AtomicU8::new(0),
            recurrence: AtomicU8::new(0),
            seconds_to_alarm: AtomicU32::new(0),
        }
    }

    pub fn publish(&self, state: AlarmState, settings: &WakeAlarmSettings, seconds_to_alarm: u32) {
        self.hours.store(settings.hours, Ordering::Relaxed);
        self.minutes.store(settings.minutes, Ordering::Relaxed);
        self.recurrence
            .store(recurrence_to_raw(settings.recurrence), Ordering::Relaxed);
        self.seconds_to_alarm
            .store(seconds_to_alarm, Ordering::Relaxed);
        self.state.store(state.to_raw(), Ordering::Release);
    }

    pub fn state(&self) -> AlarmState {
        AlarmState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state(), AlarmState::Armed | AlarmState::GradualWake)
    }

    pub fn is_alerting(&self) -> bool {
        self.state() == AlarmState::Alerting
    }

    pub fn time(&self) -> (u8, u8) {
        (
            self.hours.load(Ordering::Relaxed),
            self.minutes.load(Ordering::Relaxed),
        )
    }

    pub fn recurrence(&self) -> Recurrence {
        match self.recurrence.load(Ordering::Relaxed) {
            1 => Recurrence::Daily,
            2 => Recurrence::Weekdays,
            _ => Recurrence::None,
        }
    }

    /// Seconds to the trigger as of the last publish.
    pub fn seconds_to_alarm(&self) -> u32 {
        self.seconds_to_alarm.load(Ordering::Relaxed)
    }
}

impl Default for AlarmStatus {
    fn default() -> Self {
        Self::new()
    }
}

const fn recurrence_to_raw(recurrence: Recurrence) -> u8 {
    match recurrence {
        Recurrence::None => 0,
        Recurrence::Daily => 1,
        Recurrence::Weekdays => 2,
    }
}
