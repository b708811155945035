use core::cell::Cell;
use core::time::Duration;

use time::macros::datetime;
use time::{PrimitiveDateTime, Weekday};

use sleep_core::alarm::{
    AlarmState, CountdownOutcome, Recurrence, WakeAlarmSettings, next_trigger,
};
use sleep_core::clock::{MonotonicClock, WallClock};
use sleep_core::haptic::{MotorDriver, RampProfile};
use sleep_core::persist::{self, MemoryStore};
use sleep_core::session::{InfiniSleepController, SleepSetting};
use sleep_core::telemetry::{TelemetryEventKind, TelemetryRecorder};
use sleep_core::timer::{CountdownKind, DeadlineTimer};

struct SimClock(Cell<PrimitiveDateTime>);

impl SimClock {
    fn at(now: PrimitiveDateTime) -> Self {
        Self(Cell::new(now))
    }

    fn set(&self, now: PrimitiveDateTime) {
        self.0.set(now);
    }
}

impl WallClock for SimClock {
    fn now(&self) -> PrimitiveDateTime {
        self.0.get()
    }
}

impl MonotonicClock for SimClock {
    type Instant = PrimitiveDateTime;

    fn now(&self) -> PrimitiveDateTime {
        self.0.get()
    }
}

#[derive(Default)]
struct Motor {
    last: Option<(u8, Duration)>,
    stops: u32,
}

impl MotorDriver for Motor {
    fn run(&mut self, strength: u8, duration: Duration) {
        self.last = Some((strength, duration));
    }

    fn stop(&mut self) {
        self.last = None;
        self.stops += 1;
    }
}

type Session<'c> = InfiniSleepController<
    &'c SimClock,
    DeadlineTimer<&'c SimClock>,
    Motor,
    MemoryStore,
    TelemetryRecorder<PrimitiveDateTime, 32>,
>;

fn session(clock: &SimClock, store: MemoryStore) -> Session<'_> {
    InfiniSleepController::new(
        clock,
        DeadlineTimer::new(clock),
        Motor::default(),
        store,
        TelemetryRecorder::new(),
    )
}

/// Jumps the clock to the next pending deadline and delivers it.
fn fire_next(clock: &SimClock, session: &mut Session<'_>) -> (CountdownKind, CountdownOutcome) {
    let deadline = session
        .scheduler()
        .timer()
        .next_deadline()
        .expect("a countdown should be armed");
    clock.set(deadline);
    let kind = session
        .scheduler_mut()
        .timer_mut()
        .take_expired(deadline)
        .expect("deadline should be due");
    (kind, session.on_countdown(kind))
}

#[test]
fn one_shot_alarm_in_the_past_rolls_to_tomorrow() {
    let now = datetime!(2024-03-06 09:15);
    for (hours, minutes) in [(0, 0), (7, 0), (9, 14), (9, 15)] {
        let trigger = next_trigger(now, hours, minutes, Recurrence::None).unwrap();
        assert_eq!(trigger.date(), datetime!(2024-03-07 00:00).date());
        assert_eq!((trigger.hour(), trigger.minute()), (hours, minutes));
    }

    let later_today = next_trigger(now, 9, 16, Recurrence::None).unwrap();
    assert_eq!(later_today, datetime!(2024-03-06 09:16));
}

#[test]
fn weekday_alarm_never_lands_on_a_weekend() {
    // 2024-03-04 is a Monday.
    let monday = datetime!(2024-03-04 00:00);
    for offset in 0..7 {
        for (hours, minutes) in [(0, 0), (6, 30), (12, 0), (23, 59)] {
            let start = monday + time::Duration::days(offset) + time::Duration::hours(8);
            let trigger = next_trigger(start, hours, minutes, Recurrence::Weekdays).unwrap();
            assert!(
                !matches!(trigger.weekday(), Weekday::Saturday | Weekday::Sunday),
                "{start} -> {trigger}"
            );
            assert!(trigger > start);
        }
    }
}

#[test]
fn daily_alarm_rearms_a_day_after_it_fired() {
    let clock = SimClock::at(datetime!(2024-03-04 22:00));
    let mut session = session(&clock, MemoryStore::new());
    session.init().unwrap();

    session.set_wake_alarm_time(7, 0).unwrap();
    session.set_recurrence(Recurrence::Daily);
    let first = session.schedule_wake_alarm().unwrap();
    assert_eq!(first, datetime!(2024-03-05 07:00));
    assert_eq!(session.seconds_to_wake_alarm(), 9 * 3_600);

    let (kind, outcome) = fire_next(&clock, &mut session);
    assert_eq!(kind, CountdownKind::WakeAlarm);
    assert_eq!(outcome, CountdownOutcome::AlarmFired);
    assert_eq!(session.alarm_state(), AlarmState::Alerting);
    assert_eq!(session.ramp().profile(), Some(RampProfile::WakeAlarm));
    assert_eq!(session.ramp_period(), Some(Duration::from_secs(1)));

    clock.set(datetime!(2024-03-05 07:03));
    assert_eq!(session.stop_alerting(), Ok(AlarmState::Armed));
    assert!(!session.ramp().is_running());
    assert_eq!(
        session.scheduler().trigger_at(),
        Some(first + time::Duration::DAY)
    );
    assert!(session.telemetry().contains(TelemetryEventKind::AlarmStopped));
}

#[test]
fn early_forced_fire_consumes_the_pending_occurrence() {
    let clock = SimClock::at(datetime!(2024-03-04 22:00));
    let mut session = session(&clock, MemoryStore::new());
    session.set_recurrence(Recurrence::Daily);
    session.schedule_wake_alarm().unwrap();

    clock.set(datetime!(2024-03-05 06:10));
    session.set_off_wake_alarm_now();
    assert_eq!(session.alarm_state(), AlarmState::Alerting);
    assert!(!session.scheduler().timer().is_armed(CountdownKind::WakeAlarm));

    clock.set(datetime!(2024-03-05 06:12));
    session.stop_alerting().unwrap();
    assert_eq!(
        session.scheduler().trigger_at(),
        Some(datetime!(2024-03-06 07:00))
    );
}

#[test]
fn toggling_gradual_wake_after_a_forced_fire_keeps_tomorrow() {
    let clock = SimClock::at(datetime!(2024-03-04 22:00));
    let mut session = session(&clock, MemoryStore::new());
    session.set_recurrence(Recurrence::Daily);
    session.schedule_wake_alarm().unwrap();

    clock.set(datetime!(2024-03-05 06:10));
    session.set_off_wake_alarm_now();
    clock.set(datetime!(2024-03-05 06:12));
    session.stop_alerting().unwrap();

    clock.set(datetime!(2024-03-05 06:13));
    session
        .set_sleep_setting(SleepSetting::GradualWake, true)
        .unwrap();
    assert_eq!(session.alarm_state(), AlarmState::Armed);
    assert_eq!(
        session.scheduler().trigger_at(),
        Some(datetime!(2024-03-06 07:00))
    );
    assert_eq!(
        session.scheduler().gradual_wake_at(),
        Some(datetime!(2024-03-06 06:50))
    );
    assert_eq!(
        session.telemetry().latest().map(|record| record.event),
        Some(TelemetryEventKind::AlarmArmed)
    );

    // An explicit `alarm on` starts over from the current time.
    assert_eq!(
        session.schedule_wake_alarm(),
        Ok(datetime!(2024-03-05 07:00))
    );
}

#[test]
fn ringing_a_disabled_alarm_does_not_enable_it() {
    let clock = SimClock::at(datetime!(2024-03-04 22:00));
    let mut session = session(&clock, MemoryStore::new());
    session.set_wake_alarm_time(6, 0).unwrap();
    session.set_recurrence(Recurrence::Daily);
    session.set_off_wake_alarm_now();
    assert_eq!(session.alarm_state(), AlarmState::Alerting);
    assert!(!session.wake_alarm().is_enabled);

    session.save_wake_alarm().unwrap();
    assert_eq!(
        session.store().raw(persist::RecordKind::WakeAlarm),
        Some(&[1u8, 6, 0, 1, 0][..])
    );

    assert_eq!(session.stop_alerting(), Ok(AlarmState::Disabled));
    assert_eq!(session.scheduler().timer().next_deadline(), None);
    assert!(!session.wake_alarm().is_enabled);
}

#[test]
fn failed_rearm_is_recorded_and_disables() {
    let clock = SimClock::at(datetime!(9999-12-31 06:00));
    let mut session = session(&clock, MemoryStore::new());
    session.set_recurrence(Recurrence::Daily);
    session.schedule_wake_alarm().unwrap();
    fire_next(&clock, &mut session);
    assert!(session.ramp().is_running());

    session.shutdown();
    assert!(!session.ramp().is_running());
    assert_eq!(session.alarm_state(), AlarmState::Disabled);
    assert!(session.telemetry().contains(TelemetryEventKind::RearmFailed));
    assert!(!session.telemetry().contains(TelemetryEventKind::AlarmStopped));
    assert_eq!(
        session.store().raw(persist::RecordKind::WakeAlarm),
        Some(&[1u8, 7, 0, 1, 0][..])
    );
}

#[test]
fn one_shot_alarm_disables_after_stop() {
    let clock = SimClock::at(datetime!(2024-03-04 22:00));
    let mut session = session(&clock, MemoryStore::new());
    session.set_wake_alarm_time(6, 45).unwrap();
    session.schedule_wake_alarm().unwrap();

    fire_next(&clock, &mut session);
    assert_eq!(session.stop_alerting(), Ok(AlarmState::Disabled));
    assert_eq!(session.scheduler().timer().next_deadline(), None);
    assert!(!session.wake_alarm().is_enabled);
}

#[test]
fn friday_weekday_alarm_rearms_for_monday() {
    // 2024-03-08 is a Friday.
    let clock = SimClock::at(datetime!(2024-03-07 23:00));
    let mut session = session(&clock, MemoryStore::new());
    session.set_recurrence(Recurrence::Weekdays);
    assert_eq!(
        session.schedule_wake_alarm(),
        Ok(datetime!(2024-03-08 07:00))
    );

    fire_next(&clock, &mut session);
    session.stop_alerting().unwrap();
    assert_eq!(
        session.scheduler().trigger_at(),
        Some(datetime!(2024-03-11 07:00))
    );
}

#[test]
fn gradual_wake_runs_ahead_of_the_alarm() {
    let clock = SimClock::at(datetime!(2024-03-05 06:40));
    let mut session = session(&clock, MemoryStore::new());
    session
        .set_sleep_setting(SleepSetting::GradualWake, true)
        .unwrap();
    session.schedule_wake_alarm().unwrap();
    assert_eq!(
        session.scheduler().gradual_wake_at(),
        Some(datetime!(2024-03-05 06:50))
    );

    let (kind, outcome) = fire_next(&clock, &mut session);
    assert_eq!(kind, CountdownKind::GradualWake);
    assert_eq!(outcome, CountdownOutcome::GradualWakeStarted);
    assert_eq!(session.alarm_state(), AlarmState::GradualWake);
    assert_eq!(session.ramp().profile(), Some(RampProfile::NaturalWake));
    assert_eq!(session.ramp_period(), Some(Duration::from_secs(30)));

    let (kind, outcome) = fire_next(&clock, &mut session);
    assert_eq!(kind, CountdownKind::WakeAlarm);
    assert_eq!(outcome, CountdownOutcome::AlarmFired);
    assert_eq!(session.ramp().profile(), Some(RampProfile::WakeAlarm));
}

#[test]
fn short_lead_picks_the_largest_fitting_step() {
    let clock = SimClock::at(datetime!(2024-03-05 06:56));
    let mut session = session(&clock, MemoryStore::new());
    session
        .set_sleep_setting(SleepSetting::GradualWake, true)
        .unwrap();
    session.schedule_wake_alarm().unwrap();

    // 240 s left: 240 is not strictly less, so 180 s wins.
    assert_eq!(
        session.scheduler().gradual_wake_at(),
        Some(datetime!(2024-03-05 06:57))
    );
}

#[test]
fn stale_countdown_after_disable_is_recorded() {
    let clock = SimClock::at(datetime!(2024-03-04 22:00));
    let mut session = session(&clock, MemoryStore::new());
    session.schedule_wake_alarm().unwrap();
    session.disable_wake_alarm();

    assert_eq!(
        session.on_countdown(CountdownKind::WakeAlarm),
        CountdownOutcome::Stale
    );
    assert!(!session.ramp().is_running());
    assert!(
        session
            .telemetry()
            .contains(TelemetryEventKind::StaleCountdown(CountdownKind::WakeAlarm))
    );
}

#[test]
fn startup_restores_an_enabled_alarm() {
    let mut store = MemoryStore::new();
    let saved = WakeAlarmSettings {
        hours: 6,
        minutes: 15,
        recurrence: Recurrence::Daily,
        is_enabled: true,
        ..WakeAlarmSettings::default()
    };
    persist::save(&mut store, &saved).unwrap();

    let clock = SimClock::at(datetime!(2024-03-05 08:00));
    let mut session = session(&clock, store);
    session.init().unwrap();

    assert_eq!(session.alarm_state(), AlarmState::Armed);
    assert_eq!(
        session.scheduler().trigger_at(),
        Some(datetime!(2024-03-06 06:15))
    );
    assert!(session.scheduler().timer().is_armed(CountdownKind::WakeAlarm));
    assert!(!session.scheduler().is_changed());
    assert_eq!(session.wake_alarm(), saved);
}

#[test]
fn shutdown_silences_and_persists() {
    let clock = SimClock::at(datetime!(2024-03-04 22:00));
    let mut session = session(&clock, MemoryStore::new());
    session.set_wake_alarm_time(5, 30).unwrap();
    session.set_recurrence(Recurrence::Weekdays);
    session.schedule_wake_alarm().unwrap();
    session.set_off_wake_alarm_now();

    session.shutdown();
    assert!(!session.ramp().is_running());
    assert!(session.ramp().motor().stops >= 1);
    assert_eq!(
        session.store().raw(persist::RecordKind::WakeAlarm),
        Some(&[1u8, 5, 30, 2, 1][..])
    );
}
