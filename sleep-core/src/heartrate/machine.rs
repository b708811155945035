//! Duty-cycled measurement state machine.
//!
//! The worker loop owns one [`MeasurementStateMachine`]. Each iteration it
//! waits up to [`MeasurementStateMachine::cycle_delay`] for a command, then
//! calls [`MeasurementStateMachine::run_cycle`] with whatever arrived. Waiting
//! is left to the runtime so the same logic runs under embassy, under the
//! emulator's virtual clock and inside plain unit tests.

use core::time::Duration;

use crate::clock::MonotonicInstant;
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetrySink};

use super::{
    AmbientStatus, BackgroundIntervalCell, Command, Estimate, HeartRateSink, MeasurementState,
    ResetScope, SensorDriver, SignalPreprocessor,
};

/// Poll period while the screen is on and no measurement runs.
pub const SCREEN_ON_POLL: Duration = Duration::from_millis(100);
/// Poll period between background bursts.
pub const WAITING_POLL: Duration = Duration::from_secs(10);
/// A background burst that has not converged after this long is abandoned.
pub const BACKGROUND_BURST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timing knobs of the worker.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MeasurementConfig {
    pub screen_on_poll: Duration,
    pub waiting_poll: Duration,
    pub burst_timeout: Duration,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            screen_on_poll: SCREEN_ON_POLL,
            waiting_poll: WAITING_POLL,
            burst_timeout: BACKGROUND_BURST_TIMEOUT,
        }
    }
}

/// What a transition asks of the sensor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SideEffect {
    None,
    Start,
    Stop,
}

pub struct MeasurementStateMachine<'a, S, P, H, I> {
    state: MeasurementState,
    sensor: S,
    preprocessor: P,
    sink: H,
    interval: &'a BackgroundIntervalCell,
    config: MeasurementConfig,
    last_bpm: u16,
    measurement_started_at: Option<I>,
    waiting_started_at: Option<I>,
}

impl<'a, S, P, H, I> MeasurementStateMachine<'a, S, P, H, I>
where
    S: SensorDriver,
    P: SignalPreprocessor,
    H: HeartRateSink,
    I: MonotonicInstant,
{
    pub fn new(sensor: S, preprocessor: P, sink: H, interval: &'a BackgroundIntervalCell) -> Self {
        Self::with_config(sensor, preprocessor, sink, interval, MeasurementConfig::default())
    }

    pub fn with_config(
        sensor: S,
        preprocessor: P,
        sink: H,
        interval: &'a BackgroundIntervalCell,
        config: MeasurementConfig,
    ) -> Self {
        Self {
            state: MeasurementState::default(),
            sensor,
            preprocessor,
            sink,
            interval,
            config,
            last_bpm: 0,
            measurement_started_at: None,
            waiting_started_at: None,
        }
    }

    pub fn state(&self) -> MeasurementState {
        self.state
    }

    /// Last non-zero bpm reported in the current measurement.
    pub fn last_bpm(&self) -> u16 {
        self.last_bpm
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn preprocessor(&self) -> &P {
        &self.preprocessor
    }

    pub fn preprocessor_mut(&mut self) -> &mut P {
        &mut self.preprocessor
    }

    pub fn sink(&self) -> &H {
        &self.sink
    }

    /// How long the worker may block waiting for the next command.
    /// `None` means wait until a command arrives.
    pub fn cycle_delay(&self) -> Option<Duration> {
        match self.state {
            MeasurementState::ScreenOnAndMeasuring | MeasurementState::ScreenOffAndMeasuring => {
                Some(self.preprocessor.sample_cadence())
            }
            MeasurementState::ScreenOnAndStopped => Some(self.config.screen_on_poll),
            MeasurementState::ScreenOffAndWaiting => Some(self.config.waiting_poll),
            MeasurementState::ScreenOffAndStopped => None,
        }
    }

    /// Runs one worker iteration: applies `command` if one was received, then
    /// samples the sensor or checks whether a background burst is due.
    pub fn run_cycle<T>(
        &mut self,
        command: Option<Command>,
        now: I,
        telemetry: &mut T,
    ) -> MeasurementState
    where
        T: TelemetrySink<I>,
    {
        if let Some(command) = command {
            self.apply(command, now, telemetry);
        }

        match self.state {
            MeasurementState::ScreenOnAndMeasuring | MeasurementState::ScreenOffAndMeasuring => {
                self.handle_sample(now, telemetry);
            }
            MeasurementState::ScreenOffAndWaiting => self.handle_waiting(now, telemetry),
            MeasurementState::ScreenOnAndStopped | MeasurementState::ScreenOffAndStopped => {}
        }

        self.state
    }

    /// Applies a single command against the transition table. Returns `false`
    /// when the command is not applicable in the current state.
    pub fn apply<T>(&mut self, command: Command, now: I, telemetry: &mut T) -> bool
    where
        T: TelemetrySink<I>,
    {
        let Some((next, effect)) = transition(self.state, command) else {
            telemetry.record(
                TelemetryEventKind::CommandIgnored {
                    command,
                    state: self.state,
                },
                TelemetryPayload::none(),
                now,
            );
            return false;
        };

        if command == Command::StartMeasurement {
            self.last_bpm = 0;
        }

        match effect {
            SideEffect::Start => self.start_measurement(now),
            SideEffect::Stop => self.stop_measurement(),
            SideEffect::None => {}
        }

        self.enter(next, now, telemetry);
        true
    }

    fn handle_sample<T>(&mut self, now: I, telemetry: &mut T)
    where
        T: TelemetrySink<I>,
    {
        let sample = self.sensor.read_sample();
        let ambient = self.preprocessor.preprocess(sample);
        let mut bpm = self.preprocessor.heart_rate();

        if ambient == AmbientStatus::Saturated {
            self.preprocessor.reset(ResetScope::Full);
            self.last_bpm = 0;
            bpm = 0;
            telemetry.record(
                TelemetryEventKind::AmbientSaturated,
                TelemetryPayload::none(),
                now,
            );
        } else if bpm < 0 {
            self.preprocessor.reset(ResetScope::KeepRawHistory);
            bpm = 0;
            telemetry.record(
                TelemetryEventKind::EstimateRejected,
                TelemetryPayload::none(),
                now,
            );
        }

        let bpm = u16::try_from(bpm).unwrap_or(u16::MAX);
        if self.last_bpm == 0 && bpm == 0 {
            self.sink.update(Estimate::not_enough_data());
        }
        if bpm != 0 {
            self.last_bpm = bpm;
            self.sink.update(Estimate::running(bpm));
        }

        if self.state != MeasurementState::ScreenOffAndMeasuring
            || self.interval.load().is_continuous()
        {
            return;
        }

        if bpm != 0 {
            self.start_waiting(now, telemetry);
            return;
        }

        let burst = self
            .measurement_started_at
            .map_or(Duration::ZERO, |start| now.saturating_duration_since(start));
        if burst >= self.config.burst_timeout {
            telemetry.record(
                TelemetryEventKind::BurstTimeout,
                TelemetryPayload::Elapsed(burst),
                now,
            );
            self.start_waiting(now, telemetry);
        }
    }

    fn handle_waiting<T>(&mut self, now: I, telemetry: &mut T)
    where
        T: TelemetrySink<I>,
    {
        let Some(period) = self.interval.load().period() else {
            return;
        };

        let waited = self
            .waiting_started_at
            .map_or(Duration::MAX, |start| now.saturating_duration_since(start));
        if waited >= period {
            self.start_measurement(now);
            self.enter(MeasurementState::ScreenOffAndMeasuring, now, telemetry);
        }
    }

    fn start_waiting<T>(&mut self, now: I, telemetry: &mut T)
    where
        T: TelemetrySink<I>,
    {
        self.stop_measurement();
        self.waiting_started_at = Some(now);
        self.enter(MeasurementState::ScreenOffAndWaiting, now, telemetry);
    }

    fn start_measurement(&mut self, now: I) {
        self.sensor.enable();
        self.preprocessor.reset(ResetScope::Full);
        self.measurement_started_at = Some(now);
    }

    fn stop_measurement(&mut self) {
        self.sensor.disable();
        self.preprocessor.reset(ResetScope::Full);
    }

    fn enter<T>(&mut self, next: MeasurementState, now: I, telemetry: &mut T)
    where
        T: TelemetrySink<I>,
    {
        if next == self.state {
            return;
        }

        telemetry.record(
            TelemetryEventKind::MeasurementTransition {
                from: self.state,
                to: next,
            },
            TelemetryPayload::none(),
            now,
        );
        self.state = next;
    }
}

/// Transition table of the worker. `None` marks an ignored pair.
fn transition(state: MeasurementState, command: Command) -> Option<(MeasurementState, SideEffect)> {
    use Command::{GoToSleep, StartMeasurement, StopMeasurement, WakeUp};
    use MeasurementState::{
        ScreenOffAndMeasuring, ScreenOffAndStopped, ScreenOffAndWaiting, ScreenOnAndMeasuring,
        ScreenOnAndStopped,
    };

    match (state, command) {
        (ScreenOnAndStopped, GoToSleep) => Some((ScreenOffAndStopped, SideEffect::None)),
        (ScreenOnAndStopped | ScreenOffAndStopped, StartMeasurement) => {
            Some((ScreenOnAndMeasuring, SideEffect::Start))
        }
        (ScreenOnAndMeasuring, GoToSleep) => Some((ScreenOffAndMeasuring, SideEffect::None)),
        (ScreenOnAndMeasuring, StopMeasurement) => Some((ScreenOnAndStopped, SideEffect::Stop)),
        (ScreenOffAndStopped, WakeUp) => Some((ScreenOnAndStopped, SideEffect::None)),
        (ScreenOffAndMeasuring, WakeUp) => Some((ScreenOnAndMeasuring, SideEffect::None)),
        (ScreenOffAndMeasuring | ScreenOffAndWaiting, StopMeasurement) => {
            Some((ScreenOffAndStopped, SideEffect::Stop))
        }
        (ScreenOffAndWaiting, WakeUp) => Some((ScreenOnAndMeasuring, SideEffect::Start)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartrate::{BackgroundInterval, Sample};
    use crate::telemetry::NoopTelemetry;
    use core::ops::Add;

    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
    struct MockInstant(u64);

    impl Add<Duration> for MockInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Self(self.0 + u64::try_from(rhs.as_millis()).unwrap())
        }
    }

    impl MonotonicInstant for MockInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_millis(self.0.saturating_sub(earlier.0))
        }
    }

    #[derive(Default)]
    struct CountingSensor {
        enables: u32,
        disables: u32,
    }

    impl SensorDriver for CountingSensor {
        fn enable(&mut self) {
            self.enables += 1;
        }

        fn disable(&mut self) {
            self.disables += 1;
        }

        fn read_sample(&mut self) -> Sample {
            Sample::new(1_000, 0)
        }
    }

    struct FixedPpg(i32);

    impl SignalPreprocessor for FixedPpg {
        fn preprocess(&mut self, _: Sample) -> AmbientStatus {
            AmbientStatus::Normal
        }

        fn heart_rate(&mut self) -> i32 {
            self.0
        }

        fn reset(&mut self, _: ResetScope) {}

        fn sample_cadence(&self) -> Duration {
            Duration::from_millis(40)
        }
    }

    #[derive(Default)]
    struct LastEstimate(Option<Estimate>);

    impl HeartRateSink for LastEstimate {
        fn update(&mut self, estimate: Estimate) {
            self.0 = Some(estimate);
        }
    }

    #[test]
    fn table_covers_exactly_the_documented_pairs() {
        let applicable = MeasurementState::ALL
            .into_iter()
            .flat_map(|state| Command::ALL.into_iter().map(move |command| (state, command)))
            .filter(|(state, command)| transition(*state, *command).is_some())
            .count();
        assert_eq!(applicable, 10);
    }

    #[test]
    fn delay_follows_state() {
        let interval = BackgroundIntervalCell::new(BackgroundInterval::Off);
        let mut machine: MeasurementStateMachine<'_, _, _, _, MockInstant> =
            MeasurementStateMachine::new(
                CountingSensor::default(),
                FixedPpg(0),
                LastEstimate::default(),
                &interval,
            );
        let mut telemetry = NoopTelemetry;

        assert_eq!(machine.cycle_delay(), Some(SCREEN_ON_POLL));
        machine.run_cycle(Some(Command::GoToSleep), MockInstant(0), &mut telemetry);
        assert_eq!(machine.cycle_delay(), None);
        machine.run_cycle(Some(Command::StartMeasurement), MockInstant(10), &mut telemetry);
        assert_eq!(machine.cycle_delay(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn converged_foreground_measurement_keeps_running() {
        let interval = BackgroundIntervalCell::new(BackgroundInterval::ThirtySeconds);
        let mut machine = MeasurementStateMachine::new(
            CountingSensor::default(),
            FixedPpg(64),
            LastEstimate::default(),
            &interval,
        );
        let mut telemetry = NoopTelemetry;

        let state = machine.run_cycle(
            Some(Command::StartMeasurement),
            MockInstant(0),
            &mut telemetry,
        );
        assert_eq!(state, MeasurementState::ScreenOnAndMeasuring);
        assert_eq!(machine.sink().0, Some(Estimate::running(64)));
        assert_eq!(machine.last_bpm(), 64);
        assert_eq!(machine.sensor().disables, 0);
    }
}
