use core::ops::Add;
use core::time::Duration;

use sleep_core::clock::MonotonicInstant;
use sleep_core::heartrate::{
    AmbientStatus, BackgroundInterval, BackgroundIntervalCell, Command, Estimate, EstimateState,
    HeartRateSink, MeasurementState, MeasurementStateMachine, ResetScope, Sample, SensorDriver,
    SharedEstimate, SignalPreprocessor,
};
use sleep_core::telemetry::{NoopTelemetry, TelemetryEventKind, TelemetryRecorder};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
struct Millis(u64);

impl Add<Duration> for Millis {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + u64::try_from(rhs.as_millis()).unwrap())
    }
}

impl MonotonicInstant for Millis {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

#[derive(Default)]
struct Sensor {
    enabled: bool,
    enables: u32,
    disables: u32,
}

impl SensorDriver for Sensor {
    fn enable(&mut self) {
        self.enabled = true;
        self.enables += 1;
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.disables += 1;
    }

    fn read_sample(&mut self) -> Sample {
        Sample::new(20_000, 100)
    }
}

/// Preprocessor whose answers are set by the test.
#[derive(Default)]
struct Scripted {
    bpm: i32,
    saturated: bool,
    full_resets: u32,
    partial_resets: u32,
}

impl SignalPreprocessor for Scripted {
    fn preprocess(&mut self, _: Sample) -> AmbientStatus {
        if self.saturated {
            AmbientStatus::Saturated
        } else {
            AmbientStatus::Normal
        }
    }

    fn heart_rate(&mut self) -> i32 {
        self.bpm
    }

    fn reset(&mut self, scope: ResetScope) {
        match scope {
            ResetScope::Full => self.full_resets += 1,
            ResetScope::KeepRawHistory => self.partial_resets += 1,
        }
    }

    fn sample_cadence(&self) -> Duration {
        Duration::from_millis(40)
    }
}

#[derive(Default)]
struct Reports(heapless::Vec<Estimate, 8>);

impl HeartRateSink for Reports {
    fn update(&mut self, estimate: Estimate) {
        if self.0.is_full() {
            self.0.remove(0);
        }
        let _ = self.0.push(estimate);
    }
}

type Machine<'a> = MeasurementStateMachine<'a, Sensor, Scripted, Reports, Millis>;

fn machine(interval: &BackgroundIntervalCell) -> Machine<'_> {
    MeasurementStateMachine::new(
        Sensor::default(),
        Scripted::default(),
        Reports::default(),
        interval,
    )
}

/// Drives `machine` to `target` from the initial state.
fn reach(machine: &mut Machine<'_>, target: MeasurementState) {
    let mut telemetry = NoopTelemetry;
    let script: &[Command] = match target {
        MeasurementState::ScreenOnAndStopped => &[],
        MeasurementState::ScreenOnAndMeasuring => &[Command::StartMeasurement],
        MeasurementState::ScreenOffAndMeasuring => {
            &[Command::StartMeasurement, Command::GoToSleep]
        }
        MeasurementState::ScreenOffAndStopped => &[Command::GoToSleep],
        MeasurementState::ScreenOffAndWaiting => &[Command::StartMeasurement, Command::GoToSleep],
    };
    for command in script {
        machine.apply(*command, Millis(0), &mut telemetry);
    }
    if target == MeasurementState::ScreenOffAndWaiting {
        machine.preprocessor_mut().bpm = 60;
        machine.run_cycle(None, Millis(0), &mut telemetry);
        machine.preprocessor_mut().bpm = 0;
    }
    assert_eq!(machine.state(), target);
}

const APPLICABLE: [(MeasurementState, Command); 10] = [
    (MeasurementState::ScreenOnAndStopped, Command::GoToSleep),
    (MeasurementState::ScreenOnAndStopped, Command::StartMeasurement),
    (MeasurementState::ScreenOnAndMeasuring, Command::GoToSleep),
    (MeasurementState::ScreenOnAndMeasuring, Command::StopMeasurement),
    (MeasurementState::ScreenOffAndStopped, Command::WakeUp),
    (MeasurementState::ScreenOffAndStopped, Command::StartMeasurement),
    (MeasurementState::ScreenOffAndMeasuring, Command::WakeUp),
    (MeasurementState::ScreenOffAndMeasuring, Command::StopMeasurement),
    (MeasurementState::ScreenOffAndWaiting, Command::WakeUp),
    (MeasurementState::ScreenOffAndWaiting, Command::StopMeasurement),
];

#[test]
fn unlisted_pairs_leave_state_unchanged() {
    let interval = BackgroundIntervalCell::new(BackgroundInterval::Off);

    for state in MeasurementState::ALL {
        for command in Command::ALL {
            if APPLICABLE.contains(&(state, command)) {
                continue;
            }
            let mut machine = machine(&interval);
            reach(&mut machine, state);
            let enables = machine.sensor().enables;

            let mut telemetry = TelemetryRecorder::<Millis, 8>::new();
            assert!(!machine.apply(command, Millis(1), &mut telemetry));
            assert_eq!(machine.state(), state, "{command:?} in {state:?}");
            assert_eq!(machine.sensor().enables, enables);
            assert!(telemetry.contains(TelemetryEventKind::CommandIgnored { command, state }));
        }
    }
}

#[test]
fn start_from_stopped_states_enables_sensor_once() {
    let interval = BackgroundIntervalCell::new(BackgroundInterval::Off);

    for state in [
        MeasurementState::ScreenOnAndStopped,
        MeasurementState::ScreenOffAndStopped,
    ] {
        let mut machine = machine(&interval);
        reach(&mut machine, state);
        assert_eq!(machine.sensor().enables, 0);

        machine.apply(Command::StartMeasurement, Millis(5), &mut NoopTelemetry);
        assert!(machine.state().is_measuring());
        assert_eq!(machine.sensor().enables, 1);
        assert!(machine.sensor().enabled);
        assert_eq!(machine.preprocessor().full_resets, 1);
    }
}

#[test]
fn wake_up_from_waiting_starts_a_foreground_measurement() {
    let interval = BackgroundIntervalCell::new(BackgroundInterval::TenMinutes);
    let mut machine = machine(&interval);
    reach(&mut machine, MeasurementState::ScreenOffAndWaiting);
    assert!(!machine.sensor().enabled);

    machine.apply(Command::WakeUp, Millis(100), &mut NoopTelemetry);
    assert_eq!(machine.state(), MeasurementState::ScreenOnAndMeasuring);
    assert!(machine.sensor().enabled);
    assert_eq!(machine.sensor().enables, 2);
}

#[test]
fn background_burst_gives_up_then_rearms() {
    let interval = BackgroundIntervalCell::new(BackgroundInterval::ThirtySeconds);
    let mut machine = machine(&interval);
    let mut telemetry = TelemetryRecorder::<Millis, 16>::new();

    machine.run_cycle(Some(Command::StartMeasurement), Millis(0), &mut telemetry);
    machine.run_cycle(Some(Command::GoToSleep), Millis(0), &mut telemetry);
    assert_eq!(machine.state(), MeasurementState::ScreenOffAndMeasuring);

    // bpm stays 0; sample once a second for 31 s.
    for second in 1..=31 {
        machine.run_cycle(None, Millis(second * 1_000), &mut telemetry);
        if second < 30 {
            assert_eq!(machine.state(), MeasurementState::ScreenOffAndMeasuring);
        }
    }
    assert_eq!(machine.state(), MeasurementState::ScreenOffAndWaiting);
    assert!(telemetry.contains(TelemetryEventKind::BurstTimeout));
    assert!(!machine.sensor().enabled);
    assert_eq!(
        machine.sink().0.last(),
        Some(&Estimate::new(EstimateState::NotEnoughData, 0))
    );

    let waiting_since = 30_000;
    machine.run_cycle(None, Millis(waiting_since + 29_000), &mut telemetry);
    assert_eq!(machine.state(), MeasurementState::ScreenOffAndWaiting);
    machine.run_cycle(None, Millis(waiting_since + 30_000), &mut telemetry);
    assert_eq!(machine.state(), MeasurementState::ScreenOffAndMeasuring);
    assert!(machine.sensor().enabled);
    assert_eq!(machine.sensor().enables, 2);
}

#[test]
fn converged_burst_ends_early_unless_continuous() {
    let interval = BackgroundIntervalCell::new(BackgroundInterval::FiveMinutes);
    let mut machine = machine(&interval);
    let mut telemetry = NoopTelemetry;

    reach(&mut machine, MeasurementState::ScreenOffAndMeasuring);
    machine.preprocessor_mut().bpm = 58;
    machine.run_cycle(None, Millis(2_000), &mut telemetry);
    assert_eq!(machine.state(), MeasurementState::ScreenOffAndWaiting);
    assert_eq!(machine.sink().0.last(), Some(&Estimate::running(58)));

    interval.store(BackgroundInterval::Continuous);
    machine.run_cycle(None, Millis(2_040), &mut telemetry);
    assert_eq!(machine.state(), MeasurementState::ScreenOffAndMeasuring);
    machine.run_cycle(None, Millis(2_080), &mut telemetry);
    assert_eq!(machine.state(), MeasurementState::ScreenOffAndMeasuring);
    machine.run_cycle(None, Millis(60_000), &mut telemetry);
    assert_eq!(machine.state(), MeasurementState::ScreenOffAndMeasuring);
}

#[test]
fn waiting_stays_idle_when_background_is_off() {
    let interval = BackgroundIntervalCell::new(BackgroundInterval::TenSeconds);
    let mut machine = machine(&interval);
    reach(&mut machine, MeasurementState::ScreenOffAndWaiting);

    interval.store(BackgroundInterval::Off);
    machine.run_cycle(None, Millis(3_600_000), &mut NoopTelemetry);
    assert_eq!(machine.state(), MeasurementState::ScreenOffAndWaiting);
}

#[test]
fn anomalies_reset_the_preprocessor() {
    let interval = BackgroundIntervalCell::new(BackgroundInterval::Off);
    let mut machine = machine(&interval);
    let mut telemetry = TelemetryRecorder::<Millis, 16>::new();

    machine.run_cycle(Some(Command::StartMeasurement), Millis(0), &mut telemetry);
    machine.preprocessor_mut().bpm = 72;
    machine.run_cycle(None, Millis(40), &mut telemetry);
    assert_eq!(machine.last_bpm(), 72);

    // A rejected estimate keeps the last good value on display.
    machine.preprocessor_mut().bpm = -1;
    machine.run_cycle(None, Millis(80), &mut telemetry);
    assert_eq!(machine.preprocessor().partial_resets, 1);
    assert_eq!(machine.sink().0.last(), Some(&Estimate::running(72)));
    assert!(telemetry.contains(TelemetryEventKind::EstimateRejected));

    machine.preprocessor_mut().saturated = true;
    let full_before = machine.preprocessor().full_resets;
    machine.run_cycle(None, Millis(120), &mut telemetry);
    assert_eq!(machine.preprocessor().full_resets, full_before + 1);
    assert_eq!(machine.last_bpm(), 0);
    assert_eq!(machine.sink().0.last(), Some(&Estimate::not_enough_data()));
    assert!(telemetry.contains(TelemetryEventKind::AmbientSaturated));
}

#[test]
fn shared_estimate_tracks_the_worker() {
    let interval = BackgroundIntervalCell::new(BackgroundInterval::Off);
    let estimate = SharedEstimate::new();
    let mut machine = MeasurementStateMachine::new(
        Sensor::default(),
        Scripted {
            bpm: 65,
            ..Scripted::default()
        },
        &estimate,
        &interval,
    );

    machine.run_cycle(Some(Command::StartMeasurement), Millis(0), &mut NoopTelemetry);
    assert_eq!(estimate.state(), EstimateState::Running);
    assert_eq!(estimate.bpm(), 65);
}
