use time::PrimitiveDateTime;

use crate::clock::{WallClock, duration_between};
use crate::timer::{AlarmTimer, CountdownKind};

use super::{
    AlarmError, AlarmState, Recurrence, WAKE_ALARM_FORMAT_VERSION, WakeAlarmSettings,
    gradual_wake_lead, next_trigger, validate_time,
};

/// Result of routing a countdown expiry into the scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CountdownOutcome {
    /// The alarm started ringing.
    AlarmFired,
    /// The pre-alarm natural wake began.
    GradualWakeStarted,
    /// The countdown no longer matches the alarm state and was dropped.
    Stale,
}

/// Owns the alarm configuration and turns it into armed countdowns.
pub struct WakeAlarmScheduler<C, T> {
    clock: C,
    timer: T,
    hours: u8,
    minutes: u8,
    recurrence: Recurrence,
    state: AlarmState,
    gradual_wake: bool,
    changed: bool,
    trigger_at: Option<PrimitiveDateTime>,
    gradual_at: Option<PrimitiveDateTime>,
    /// Latest occurrence that already rang (or was skipped by a forced
    /// alert). Re-arming never lands on or before it.
    consumed: Option<PrimitiveDateTime>,
    /// The current alert was forced while nothing was armed.
    forced_from_disabled: bool,
}

impl<C, T> WakeAlarmScheduler<C, T>
where
    C: WallClock,
    T: AlarmTimer,
{
    pub fn new(clock: C, timer: T) -> Self {
        let defaults = WakeAlarmSettings::default();
        Self {
            clock,
            timer,
            hours: defaults.hours,
            minutes: defaults.minutes,
            recurrence: defaults.recurrence,
            state: AlarmState::Disabled,
            gradual_wake: false,
            changed: false,
            trigger_at: None,
            gradual_at: None,
            consumed: None,
            forced_from_disabled: false,
        }
    }

    /// Adopts a loaded record. The alarm stays disabled; callers re-schedule
    /// when `settings.is_enabled` is set.
    pub fn restore(&mut self, settings: &WakeAlarmSettings) -> Result<(), AlarmError> {
        validate_time(settings.hours, settings.minutes)?;
        self.hours = settings.hours;
        self.minutes = settings.minutes;
        self.recurrence = settings.recurrence;
        Ok(())
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    pub fn is_alerting(&self) -> bool {
        self.state == AlarmState::Alerting
    }

    pub fn hours(&self) -> u8 {
        self.hours
    }

    pub fn minutes(&self) -> u8 {
        self.minutes
    }

    pub fn recurrence(&self) -> Recurrence {
        self.recurrence
    }

    pub fn trigger_at(&self) -> Option<PrimitiveDateTime> {
        self.trigger_at
    }

    pub fn gradual_wake_at(&self) -> Option<PrimitiveDateTime> {
        self.gradual_at
    }

    /// Snapshot of the persisted record.
    pub fn settings(&self) -> WakeAlarmSettings {
        WakeAlarmSettings {
            version: WAKE_ALARM_FORMAT_VERSION,
            hours: self.hours,
            minutes: self.minutes,
            recurrence: self.recurrence,
            is_enabled: self.persisted_enabled(),
        }
    }

    fn persisted_enabled(&self) -> bool {
        self.state.is_enabled() && !self.forced_from_disabled
    }

    /// Returns and clears the "record changed since last save" flag.
    pub fn take_changed(&mut self) -> bool {
        core::mem::take(&mut self.changed)
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Whether scheduling also arms a gradual-wake countdown.
    pub fn set_gradual_wake(&mut self, enabled: bool) {
        self.gradual_wake = enabled;
    }

    /// Stores a new alarm time. Does not arm anything.
    pub fn set_wake_alarm_time(&mut self, hours: u8, minutes: u8) -> Result<(), AlarmError> {
        validate_time(hours, minutes)?;
        self.hours = hours;
        self.minutes = minutes;
        self.changed = true;
        Ok(())
    }

    pub fn set_recurrence(&mut self, recurrence: Recurrence) {
        self.recurrence = recurrence;
        self.changed = true;
    }

    /// Arms the alarm for the next occurrence strictly after now.
    pub fn schedule(&mut self) -> Result<PrimitiveDateTime, AlarmError> {
        let now = self.clock.now();
        self.consumed = None;
        self.schedule_after(now, now)
    }

    /// Re-arms after the clock or the gradual-wake preference changed. Unlike
    /// [`Self::schedule`], an occurrence that already rang is skipped.
    pub fn rearm(&mut self) -> Result<PrimitiveDateTime, AlarmError> {
        let now = self.clock.now();
        let reference = self.consumed.map_or(now, |occurrence| occurrence.max(now));
        self.schedule_after(reference, now)
    }

    /// Cancels every countdown. Safe to call in any state.
    pub fn disable(&mut self) {
        self.timer.cancel(CountdownKind::WakeAlarm);
        self.timer.cancel(CountdownKind::GradualWake);
        if self.persisted_enabled() {
            self.changed = true;
        }
        self.state = AlarmState::Disabled;
        self.trigger_at = None;
        self.gradual_at = None;
        self.consumed = None;
        self.forced_from_disabled = false;
    }

    /// Whole seconds until the armed trigger; zero when nothing is armed.
    pub fn seconds_to_wake_alarm(&self) -> u32 {
        match (self.state, self.trigger_at) {
            (AlarmState::Armed | AlarmState::GradualWake, Some(trigger)) => {
                let left = duration_between(self.clock.now(), trigger);
                u32::try_from(left.as_secs()).unwrap_or(u32::MAX)
            }
            _ => 0,
        }
    }

    /// Routes a countdown expiry. Expiries that arrive after the countdown was
    /// cancelled or superseded report [`CountdownOutcome::Stale`].
    pub fn on_countdown(&mut self, kind: CountdownKind) -> CountdownOutcome {
        match (kind, self.state) {
            (CountdownKind::GradualWake, AlarmState::Armed) => {
                self.gradual_at = None;
                self.state = AlarmState::GradualWake;
                CountdownOutcome::GradualWakeStarted
            }
            (CountdownKind::WakeAlarm, AlarmState::Armed | AlarmState::GradualWake) => {
                self.timer.cancel(CountdownKind::GradualWake);
                self.gradual_at = None;
                self.consumed = self.trigger_at.take();
                self.state = AlarmState::Alerting;
                CountdownOutcome::AlarmFired
            }
            _ => CountdownOutcome::Stale,
        }
    }

    /// Rings immediately, bypassing the countdown. The pending occurrence, if
    /// any, counts as consumed.
    pub fn set_off_wake_alarm_now(&mut self) {
        if self.state == AlarmState::Disabled {
            self.forced_from_disabled = true;
        }
        self.timer.cancel(CountdownKind::WakeAlarm);
        self.timer.cancel(CountdownKind::GradualWake);
        self.gradual_at = None;
        if let Some(pending) = self.trigger_at.take() {
            self.consumed = Some(pending);
        }
        self.state = AlarmState::Alerting;
    }

    /// Starts the natural-wake phase immediately. Returns `false` while the
    /// alarm is already ringing.
    pub fn set_off_gradual_wake_now(&mut self) -> bool {
        if self.state == AlarmState::Alerting {
            return false;
        }
        if self.state == AlarmState::Disabled {
            self.forced_from_disabled = true;
        }
        self.timer.cancel(CountdownKind::GradualWake);
        self.gradual_at = None;
        self.state = AlarmState::GradualWake;
        true
    }

    /// Ends the current alert. Recurring alarms re-arm for the first
    /// occurrence after both now and the occurrence just consumed; one-shot
    /// alarms, and alerts forced while disabled, end up disabled. A recurring
    /// alarm with no representable next occurrence is disabled as well.
    pub fn stop_alerting(&mut self) -> Result<AlarmState, AlarmError> {
        if !matches!(self.state, AlarmState::Alerting | AlarmState::GradualWake) {
            return Ok(self.state);
        }

        self.timer.cancel(CountdownKind::GradualWake);
        self.gradual_at = None;

        if !self.recurrence.is_recurring() || self.forced_from_disabled {
            self.disable();
            return Ok(self.state);
        }

        self.consumed = self.consumed.or(self.trigger_at);
        if let Err(err) = self.rearm() {
            self.disable();
            return Err(err);
        }
        Ok(self.state)
    }

    fn schedule_after(
        &mut self,
        reference: PrimitiveDateTime,
        now: PrimitiveDateTime,
    ) -> Result<PrimitiveDateTime, AlarmError> {
        let trigger = next_trigger(reference, self.hours, self.minutes, self.recurrence)?;
        let until = duration_between(now, trigger);

        self.timer.cancel(CountdownKind::GradualWake);
        self.timer.arm(CountdownKind::WakeAlarm, until);
        self.gradual_at = None;
        if self.gradual_wake {
            if let Some(lead) = gradual_wake_lead(until) {
                self.timer.arm(CountdownKind::GradualWake, until - lead);
                self.gradual_at = trigger.checked_sub(time::Duration::seconds(
                    i64::try_from(lead.as_secs()).unwrap_or(i64::MAX),
                ));
            }
        }

        if !self.persisted_enabled() {
            self.changed = true;
        }
        self.state = AlarmState::Armed;
        self.trigger_at = Some(trigger);
        self.forced_from_disabled = false;
        Ok(trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use core::time::Duration;
    use time::macros::datetime;

    struct FixedClock(Cell<PrimitiveDateTime>);

    impl WallClock for FixedClock {
        fn now(&self) -> PrimitiveDateTime {
            self.0.get()
        }
    }

    #[derive(Default)]
    struct RecordingTimer {
        armed: [Option<Duration>; 2],
        cancels: u32,
    }

    impl AlarmTimer for RecordingTimer {
        fn arm(&mut self, kind: CountdownKind, delay: Duration) {
            self.armed[kind as usize] = Some(delay);
        }

        fn cancel(&mut self, kind: CountdownKind) {
            self.cancels += 1;
            self.armed[kind as usize] = None;
        }
    }

    #[test]
    fn set_time_validates_and_does_not_arm() {
        let clock = FixedClock(Cell::new(datetime!(2025-03-05 06:00)));
        let mut scheduler = WakeAlarmScheduler::new(&clock, RecordingTimer::default());

        assert!(scheduler.set_wake_alarm_time(23, 60).is_err());
        scheduler.set_wake_alarm_time(6, 30).unwrap();
        assert!(scheduler.take_changed());
        assert_eq!(scheduler.state(), AlarmState::Disabled);
        assert_eq!(scheduler.timer().armed, [None, None]);
        assert_eq!(scheduler.seconds_to_wake_alarm(), 0);
    }

    #[test]
    fn schedule_arms_countdown_and_reports_seconds() {
        let clock = FixedClock(Cell::new(datetime!(2025-03-05 06:00)));
        let mut scheduler = WakeAlarmScheduler::new(&clock, RecordingTimer::default());

        let trigger = scheduler.schedule().unwrap();
        assert_eq!(trigger, datetime!(2025-03-05 07:00));
        assert_eq!(scheduler.state(), AlarmState::Armed);
        assert!(scheduler.settings().is_enabled);
        assert_eq!(scheduler.timer().armed[0], Some(Duration::from_secs(3_600)));
        assert_eq!(scheduler.seconds_to_wake_alarm(), 3_600);

        clock.0.set(datetime!(2025-03-05 06:59:30));
        assert_eq!(scheduler.seconds_to_wake_alarm(), 30);
    }

    #[test]
    fn gradual_wake_countdown_precedes_alarm() {
        let clock = FixedClock(Cell::new(datetime!(2025-03-05 06:00)));
        let mut scheduler = WakeAlarmScheduler::new(&clock, RecordingTimer::default());
        scheduler.set_gradual_wake(true);

        scheduler.schedule().unwrap();
        assert_eq!(scheduler.timer().armed[1], Some(Duration::from_secs(3_000)));
        assert_eq!(
            scheduler.gradual_wake_at(),
            Some(datetime!(2025-03-05 06:50))
        );

        assert_eq!(
            scheduler.on_countdown(CountdownKind::GradualWake),
            CountdownOutcome::GradualWakeStarted
        );
        assert_eq!(scheduler.state(), AlarmState::GradualWake);
        assert_eq!(
            scheduler.on_countdown(CountdownKind::WakeAlarm),
            CountdownOutcome::AlarmFired
        );
        assert!(scheduler.is_alerting());
    }

    #[test]
    fn disable_is_idempotent_and_makes_expiries_stale() {
        let clock = FixedClock(Cell::new(datetime!(2025-03-05 06:00)));
        let mut scheduler = WakeAlarmScheduler::new(&clock, RecordingTimer::default());
        scheduler.schedule().unwrap();
        scheduler.take_changed();

        scheduler.disable();
        assert!(scheduler.take_changed());
        scheduler.disable();
        assert!(!scheduler.take_changed());

        assert_eq!(scheduler.state(), AlarmState::Disabled);
        assert_eq!(
            scheduler.on_countdown(CountdownKind::WakeAlarm),
            CountdownOutcome::Stale
        );
    }

    #[test]
    fn one_shot_alarm_disables_after_stop() {
        let clock = FixedClock(Cell::new(datetime!(2025-03-05 06:00)));
        let mut scheduler = WakeAlarmScheduler::new(&clock, RecordingTimer::default());
        scheduler.schedule().unwrap();

        clock.0.set(datetime!(2025-03-05 07:00));
        scheduler.on_countdown(CountdownKind::WakeAlarm);
        assert_eq!(scheduler.stop_alerting(), Ok(AlarmState::Disabled));
        assert!(!scheduler.settings().is_enabled);
    }

    #[test]
    fn forcing_while_disabled_never_persists_as_enabled() {
        let clock = FixedClock(Cell::new(datetime!(2025-03-05 06:00)));
        let mut scheduler = WakeAlarmScheduler::new(&clock, RecordingTimer::default());
        scheduler.set_recurrence(Recurrence::Daily);
        scheduler.take_changed();

        scheduler.set_off_wake_alarm_now();
        assert!(scheduler.is_alerting());
        assert!(!scheduler.settings().is_enabled);
        assert!(!scheduler.is_changed());

        assert_eq!(scheduler.stop_alerting(), Ok(AlarmState::Disabled));
        assert_eq!(scheduler.trigger_at(), None);
        assert!(!scheduler.is_changed());

        assert!(scheduler.set_off_gradual_wake_now());
        assert!(!scheduler.settings().is_enabled);
        scheduler.schedule().unwrap();
        assert!(scheduler.settings().is_enabled);
        assert!(scheduler.take_changed());
    }
}
