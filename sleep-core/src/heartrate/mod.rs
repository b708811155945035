//! Heart-rate measurement data model and collaborator traits.
//!
//! The measurement worker owns a [`MeasurementStateMachine`] and is the only
//! context that mutates the duty-cycle state. Everything else talks to it by
//! pushing [`Command`]s through a bounded queue and reads the result back from
//! a [`HeartRateSink`] such as [`SharedEstimate`].

use core::fmt;
use core::time::Duration;

use portable_atomic::{AtomicU8, Ordering};

mod controller;
mod estimate;
mod machine;
mod ppg;
mod queue;

pub use controller::HeartRateController;
pub use estimate::SharedEstimate;
pub use machine::{
    BACKGROUND_BURST_TIMEOUT, MeasurementConfig, MeasurementStateMachine, SCREEN_ON_POLL,
    WAITING_POLL,
};
pub use ppg::{BasicPpg, DEFAULT_AMBIENT_THRESHOLD, PPG_SAMPLE_CADENCE};
pub use queue::{COMMAND_QUEUE_CAPACITY, CommandEnqueueError, CommandQueueProducer};

/// Duty-cycle regimes of the measurement worker.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum MeasurementState {
    #[default]
    ScreenOnAndStopped,
    ScreenOnAndMeasuring,
    ScreenOffAndMeasuring,
    ScreenOffAndWaiting,
    ScreenOffAndStopped,
}

impl MeasurementState {
    pub const ALL: [MeasurementState; 5] = [
        MeasurementState::ScreenOnAndStopped,
        MeasurementState::ScreenOnAndMeasuring,
        MeasurementState::ScreenOffAndMeasuring,
        MeasurementState::ScreenOffAndWaiting,
        MeasurementState::ScreenOffAndStopped,
    ];

    /// Returns `true` while the sensor is powered and sampled every cycle.
    #[must_use]
    pub const fn is_measuring(self) -> bool {
        matches!(
            self,
            MeasurementState::ScreenOnAndMeasuring | MeasurementState::ScreenOffAndMeasuring
        )
    }

    #[must_use]
    pub const fn is_screen_on(self) -> bool {
        matches!(
            self,
            MeasurementState::ScreenOnAndStopped | MeasurementState::ScreenOnAndMeasuring
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MeasurementState::ScreenOnAndStopped => "screen-on-stopped",
            MeasurementState::ScreenOnAndMeasuring => "screen-on-measuring",
            MeasurementState::ScreenOffAndMeasuring => "screen-off-measuring",
            MeasurementState::ScreenOffAndWaiting => "screen-off-waiting",
            MeasurementState::ScreenOffAndStopped => "screen-off-stopped",
        }
    }

    pub(crate) const fn to_raw(self) -> u16 {
        match self {
            MeasurementState::ScreenOnAndStopped => 0,
            MeasurementState::ScreenOnAndMeasuring => 1,
            MeasurementState::ScreenOffAndMeasuring => 2,
            MeasurementState::ScreenOffAndWaiting => 3,
            MeasurementState::ScreenOffAndStopped => 4,
        }
    }

    pub(crate) fn from_raw(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.to_raw() == code)
    }
}

impl fmt::Display for MeasurementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests consumed by the measurement worker, one per cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    GoToSleep,
    WakeUp,
    StartMeasurement,
    StopMeasurement,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::GoToSleep,
        Command::WakeUp,
        Command::StartMeasurement,
        Command::StopMeasurement,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Command::GoToSleep => "go-to-sleep",
            Command::WakeUp => "wake-up",
            Command::StartMeasurement => "start-measurement",
            Command::StopMeasurement => "stop-measurement",
        }
    }

    pub(crate) const fn to_raw(self) -> u16 {
        match self {
            Command::GoToSleep => 0,
            Command::WakeUp => 1,
            Command::StartMeasurement => 2,
            Command::StopMeasurement => 3,
        }
    }

    pub(crate) fn from_raw(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.to_raw() == code)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality of the published heart-rate value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum EstimateState {
    NotEnoughData,
    Running,
    NoTouch,
    #[default]
    Stopped,
}

impl EstimateState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EstimateState::NotEnoughData => "not-enough-data",
            EstimateState::Running => "running",
            EstimateState::NoTouch => "no-touch",
            EstimateState::Stopped => "stopped",
        }
    }

    pub(crate) const fn to_raw(self) -> u8 {
        match self {
            EstimateState::NotEnoughData => 0,
            EstimateState::Running => 1,
            EstimateState::NoTouch => 2,
            EstimateState::Stopped => 3,
        }
    }

    pub(crate) const fn from_raw(code: u8) -> Self {
        match code {
            0 => EstimateState::NotEnoughData,
            1 => EstimateState::Running,
            2 => EstimateState::NoTouch,
            _ => EstimateState::Stopped,
        }
    }
}

/// Heart-rate value pushed to a [`HeartRateSink`]. `bpm` only carries meaning
/// while `state` is [`EstimateState::Running`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct Estimate {
    pub state: EstimateState,
    pub bpm: u16,
}

impl Estimate {
    #[must_use]
    pub const fn new(state: EstimateState, bpm: u16) -> Self {
        Self { state, bpm }
    }

    #[must_use]
    pub const fn not_enough_data() -> Self {
        Self::new(EstimateState::NotEnoughData, 0)
    }

    #[must_use]
    pub const fn running(bpm: u16) -> Self {
        Self::new(EstimateState::Running, bpm)
    }

    #[must_use]
    pub const fn stopped() -> Self {
        Self::new(EstimateState::Stopped, 0)
    }
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            EstimateState::Running => write!(f, "{} bpm", self.bpm),
            other => f.write_str(other.as_str()),
        }
    }
}

/// How often a background burst is started while the screen is off.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum BackgroundInterval {
    #[default]
    Off,
    TenSeconds,
    ThirtySeconds,
    OneMinute,
    FiveMinutes,
    TenMinutes,
    ThirtyMinutes,
    Continuous,
}

impl BackgroundInterval {
    pub const ALL: [BackgroundInterval; 8] = [
        BackgroundInterval::Off,
        BackgroundInterval::TenSeconds,
        BackgroundInterval::ThirtySeconds,
        BackgroundInterval::OneMinute,
        BackgroundInterval::FiveMinutes,
        BackgroundInterval::TenMinutes,
        BackgroundInterval::ThirtyMinutes,
        BackgroundInterval::Continuous,
    ];

    /// Wait between bursts. `Off` never re-arms and `Continuous` is always due.
    #[must_use]
    pub const fn period(self) -> Option<Duration> {
        match self {
            BackgroundInterval::Off => None,
            BackgroundInterval::TenSeconds => Some(Duration::from_secs(10)),
            BackgroundInterval::ThirtySeconds => Some(Duration::from_secs(30)),
            BackgroundInterval::OneMinute => Some(Duration::from_secs(60)),
            BackgroundInterval::FiveMinutes => Some(Duration::from_secs(5 * 60)),
            BackgroundInterval::TenMinutes => Some(Duration::from_secs(10 * 60)),
            BackgroundInterval::ThirtyMinutes => Some(Duration::from_secs(30 * 60)),
            BackgroundInterval::Continuous => Some(Duration::ZERO),
        }
    }

    #[must_use]
    pub const fn is_continuous(self) -> bool {
        matches!(self, BackgroundInterval::Continuous)
    }

    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, BackgroundInterval::Off)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BackgroundInterval::Off => "off",
            BackgroundInterval::TenSeconds => "10s",
            BackgroundInterval::ThirtySeconds => "30s",
            BackgroundInterval::OneMinute => "1m",
            BackgroundInterval::FiveMinutes => "5m",
            BackgroundInterval::TenMinutes => "10m",
            BackgroundInterval::ThirtyMinutes => "30m",
            BackgroundInterval::Continuous => "continuous",
        }
    }

    const fn to_raw(self) -> u8 {
        match self {
            BackgroundInterval::Off => 0,
            BackgroundInterval::TenSeconds => 1,
            BackgroundInterval::ThirtySeconds => 2,
            BackgroundInterval::OneMinute => 3,
            BackgroundInterval::FiveMinutes => 4,
            BackgroundInterval::TenMinutes => 5,
            BackgroundInterval::ThirtyMinutes => 6,
            BackgroundInterval::Continuous => 7,
        }
    }

    fn from_raw(code: u8) -> Self {
        Self::ALL
            .into_iter()
            .find(|interval| interval.to_raw() == code)
            .unwrap_or_default()
    }
}

impl fmt::Display for BackgroundInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Background interval shared between the settings owner and the worker.
#[derive(Debug, Default)]
pub struct BackgroundIntervalCell {
    raw: AtomicU8,
}

impl BackgroundIntervalCell {
    #[must_use]
    pub const fn new(interval: BackgroundInterval) -> Self {
        Self {
            raw: AtomicU8::new(interval.to_raw()),
        }
    }

    pub fn load(&self) -> BackgroundInterval {
        BackgroundInterval::from_raw(self.raw.load(Ordering::Acquire))
    }

    pub fn store(&self, interval: BackgroundInterval) {
        self.raw.store(interval.to_raw(), Ordering::Release);
    }
}

/// One raw reading from the optical sensor.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct Sample {
    pub ir: u32,
    pub ambient: u32,
}

impl Sample {
    #[must_use]
    pub const fn new(ir: u32, ambient: u32) -> Self {
        Self { ir, ambient }
    }
}

/// Power and sampling control of the optical heart-rate sensor.
pub trait SensorDriver {
    fn enable(&mut self);
    fn disable(&mut self);
    fn read_sample(&mut self) -> Sample;
}

/// Result of feeding one sample into a [`SignalPreprocessor`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AmbientStatus {
    Normal,
    /// Ambient light swamps the signal; the accumulated data is unusable.
    Saturated,
}

/// Scope of a preprocessor buffer reset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResetScope {
    /// Clear every buffer.
    Full,
    /// Clear derived state but keep the raw sample history.
    KeepRawHistory,
}

/// Filtering and peak detection stage that turns raw samples into bpm.
pub trait SignalPreprocessor {
    fn preprocess(&mut self, sample: Sample) -> AmbientStatus;

    /// Current estimate. Zero until converged; negative when the buffers must
    /// be reset before a meaningful value can be produced.
    fn heart_rate(&mut self) -> i32;

    fn reset(&mut self, scope: ResetScope);

    /// Interval at which the preprocessor expects new samples.
    fn sample_cadence(&self) -> Duration;
}

/// Receiver for measurement results.
pub trait HeartRateSink {
    fn update(&mut self, estimate: Estimate);
}

impl<S: HeartRateSink + ?Sized> HeartRateSink for &mut S {
    fn update(&mut self, estimate: Estimate) {
        (**self).update(estimate);
    }
}
