//! Telemetry event catalog and ring buffer shared by firmware and host targets.
//!
//! The core never logs directly. State machines report noteworthy moments
//! through a [`TelemetrySink`]; the default [`TelemetryRecorder`] keeps them in
//! a fixed-capacity ring and each target decides whether to mirror them to
//! defmt, stdout or a transcript. Event kinds encode to compact numeric codes
//! so they can be shipped over a diagnostics channel without formatting.

use core::{fmt, time::Duration};

use heapless::HistoryBuf;

use crate::alarm::Recurrence;
use crate::clock::MonotonicInstant;
use crate::haptic::RampProfile;
use crate::heartrate::{Command, MeasurementState};
use crate::persist::{PersistenceError, RecordKind};
use crate::timer::CountdownKind;

/// Identifier used when tracking emitted telemetry events.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated telemetry events shared across all targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    MeasurementTransition {
        from: MeasurementState,
        to: MeasurementState,
    },
    /// A command arrived in a state whose transition table has no entry for it.
    CommandIgnored {
        command: Command,
        state: MeasurementState,
    },
    /// The worker queue was full and the command was discarded.
    CommandDropped(Command),
    AmbientSaturated,
    EstimateRejected,
    BurstTimeout,
    AlarmArmed,
    AlarmDisabled,
    AlarmFired,
    GradualWakeStarted,
    AlarmStopped,
    /// Stopping or re-arming the alarm found no future occurrence.
    RearmFailed,
    /// A countdown expired after it had been cancelled.
    StaleCountdown(CountdownKind),
    RampStarted(RampProfile),
    RampStopped,
    SettingsLoadFailed(RecordKind),
    SettingsSaveFailed(RecordKind),
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::MeasurementTransition { from, to } => {
                write!(f, "measurement {from} -> {to}")
            }
            TelemetryEventKind::CommandIgnored { command, state } => {
                write!(f, "command-ignored {command} in {state}")
            }
            TelemetryEventKind::CommandDropped(command) => write!(f, "command-dropped {command}"),
            TelemetryEventKind::StaleCountdown(kind) => write!(f, "stale-countdown {kind}"),
            TelemetryEventKind::RampStarted(profile) => write!(f, "ramp-started {profile}"),
            TelemetryEventKind::SettingsLoadFailed(record) => {
                write!(f, "settings-load-failed {record}")
            }
            TelemetryEventKind::SettingsSaveFailed(record) => {
                write!(f, "settings-save-failed {record}")
            }
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
            other => f.write_str(other.label()),
        }
    }
}

impl TelemetryEventKind {
    const AMBIENT_SATURATED_CODE: u16 = 0x0010;
    const ESTIMATE_REJECTED_CODE: u16 = 0x0011;
    const BURST_TIMEOUT_CODE: u16 = 0x0012;
    const ALARM_ARMED_CODE: u16 = 0x0020;
    const ALARM_DISABLED_CODE: u16 = 0x0021;
    const ALARM_FIRED_CODE: u16 = 0x0022;
    const GRADUAL_WAKE_CODE: u16 = 0x0023;
    const ALARM_STOPPED_CODE: u16 = 0x0024;
    const REARM_FAILED_CODE: u16 = 0x0025;
    const STALE_COUNTDOWN_BASE: u16 = 0x0028;
    const RAMP_STARTED_BASE: u16 = 0x0030;
    const RAMP_STOPPED_CODE: u16 = 0x0034;
    const LOAD_FAILED_BASE: u16 = 0x0040;
    const SAVE_FAILED_BASE: u16 = 0x0044;
    const TRANSITION_BASE: u16 = 0x0100;
    const IGNORED_BASE: u16 = 0x0200;
    const DROPPED_BASE: u16 = 0x0300;

    /// Short static label, suitable for defmt and transcript output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            TelemetryEventKind::MeasurementTransition { .. } => "measurement-transition",
            TelemetryEventKind::CommandIgnored { .. } => "command-ignored",
            TelemetryEventKind::CommandDropped(_) => "command-dropped",
            TelemetryEventKind::AmbientSaturated => "ambient-saturated",
            TelemetryEventKind::EstimateRejected => "estimate-rejected",
            TelemetryEventKind::BurstTimeout => "burst-timeout",
            TelemetryEventKind::AlarmArmed => "alarm-armed",
            TelemetryEventKind::AlarmDisabled => "alarm-disabled",
            TelemetryEventKind::AlarmFired => "alarm-fired",
            TelemetryEventKind::GradualWakeStarted => "gradual-wake-started",
            TelemetryEventKind::AlarmStopped => "alarm-stopped",
            TelemetryEventKind::RearmFailed => "rearm-failed",
            TelemetryEventKind::StaleCountdown(_) => "stale-countdown",
            TelemetryEventKind::RampStarted(_) => "ramp-started",
            TelemetryEventKind::RampStopped => "ramp-stopped",
            TelemetryEventKind::SettingsLoadFailed(_) => "settings-load-failed",
            TelemetryEventKind::SettingsSaveFailed(_) => "settings-save-failed",
            TelemetryEventKind::Custom(_) => "custom",
        }
    }

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::MeasurementTransition { from, to } => {
                Self::TRANSITION_BASE | (from.to_raw() << 4) | to.to_raw()
            }
            TelemetryEventKind::CommandIgnored { command, state } => {
                Self::IGNORED_BASE | (command.to_raw() << 4) | state.to_raw()
            }
            TelemetryEventKind::CommandDropped(command) => Self::DROPPED_BASE | command.to_raw(),
            TelemetryEventKind::AmbientSaturated => Self::AMBIENT_SATURATED_CODE,
            TelemetryEventKind::EstimateRejected => Self::ESTIMATE_REJECTED_CODE,
            TelemetryEventKind::BurstTimeout => Self::BURST_TIMEOUT_CODE,
            TelemetryEventKind::AlarmArmed => Self::ALARM_ARMED_CODE,
            TelemetryEventKind::AlarmDisabled => Self::ALARM_DISABLED_CODE,
            TelemetryEventKind::AlarmFired => Self::ALARM_FIRED_CODE,
            TelemetryEventKind::GradualWakeStarted => Self::GRADUAL_WAKE_CODE,
            TelemetryEventKind::AlarmStopped => Self::ALARM_STOPPED_CODE,
            TelemetryEventKind::RearmFailed => Self::REARM_FAILED_CODE,
            TelemetryEventKind::StaleCountdown(kind) => {
                Self::STALE_COUNTDOWN_BASE + countdown_index(kind)
            }
            TelemetryEventKind::RampStarted(profile) => {
                Self::RAMP_STARTED_BASE + profile_index(profile)
            }
            TelemetryEventKind::RampStopped => Self::RAMP_STOPPED_CODE,
            TelemetryEventKind::SettingsLoadFailed(record) => {
                Self::LOAD_FAILED_BASE + record_index(record)
            }
            TelemetryEventKind::SettingsSaveFailed(record) => {
                Self::SAVE_FAILED_BASE + record_index(record)
            }
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        let fallback = TelemetryEventKind::Custom(code);
        let high = (code >> 4) & 0x0F;
        let low = code & 0x0F;
        match code {
            Self::AMBIENT_SATURATED_CODE => TelemetryEventKind::AmbientSaturated,
            Self::ESTIMATE_REJECTED_CODE => TelemetryEventKind::EstimateRejected,
            Self::BURST_TIMEOUT_CODE => TelemetryEventKind::BurstTimeout,
            Self::ALARM_ARMED_CODE => TelemetryEventKind::AlarmArmed,
            Self::ALARM_DISABLED_CODE => TelemetryEventKind::AlarmDisabled,
            Self::ALARM_FIRED_CODE => TelemetryEventKind::AlarmFired,
            Self::GRADUAL_WAKE_CODE => TelemetryEventKind::GradualWakeStarted,
            Self::ALARM_STOPPED_CODE => TelemetryEventKind::AlarmStopped,
            Self::REARM_FAILED_CODE => TelemetryEventKind::RearmFailed,
            Self::RAMP_STOPPED_CODE => TelemetryEventKind::RampStopped,
            value if (Self::STALE_COUNTDOWN_BASE..Self::STALE_COUNTDOWN_BASE + 2).contains(&value) => {
                countdown_from_index(value - Self::STALE_COUNTDOWN_BASE)
                    .map_or(fallback, TelemetryEventKind::StaleCountdown)
            }
            value if (Self::RAMP_STARTED_BASE..Self::RAMP_STARTED_BASE + 2).contains(&value) => {
                profile_from_index(value - Self::RAMP_STARTED_BASE)
                    .map_or(fallback, TelemetryEventKind::RampStarted)
            }
            value if (Self::LOAD_FAILED_BASE..Self::LOAD_FAILED_BASE + 2).contains(&value) => {
                record_from_index(value - Self::LOAD_FAILED_BASE)
                    .map_or(fallback, TelemetryEventKind::SettingsLoadFailed)
            }
            value if (Self::SAVE_FAILED_BASE..Self::SAVE_FAILED_BASE + 2).contains(&value) => {
                record_from_index(value - Self::SAVE_FAILED_BASE)
                    .map_or(fallback, TelemetryEventKind::SettingsSaveFailed)
            }
            value if value & 0xFF00 == Self::TRANSITION_BASE => {
                match (MeasurementState::from_raw(high), MeasurementState::from_raw(low)) {
                    (Some(from), Some(to)) => TelemetryEventKind::MeasurementTransition { from, to },
                    _ => fallback,
                }
            }
            value if value & 0xFF00 == Self::IGNORED_BASE => {
                match (Command::from_raw(high), MeasurementState::from_raw(low)) {
                    (Some(command), Some(state)) => {
                        TelemetryEventKind::CommandIgnored { command, state }
                    }
                    _ => fallback,
                }
            }
            value if value & 0xFFF0 == Self::DROPPED_BASE => {
                Command::from_raw(low).map_or(fallback, TelemetryEventKind::CommandDropped)
            }
            _ => fallback,
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Time spent in the phase that just ended.
    Elapsed(Duration),
    /// Alarm configuration at the moment of the event.
    Alarm(AlarmTelemetry),
    /// Underlying storage failure.
    Persistence(PersistenceError),
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Alarm metadata payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AlarmTelemetry {
    pub hours: u8,
    pub minutes: u8,
    pub recurrence: Recurrence,
    pub seconds_to_trigger: u32,
}

impl AlarmTelemetry {
    #[must_use]
    pub const fn new(hours: u8, minutes: u8, recurrence: Recurrence, seconds_to_trigger: u32) -> Self {
        Self {
            hours,
            minutes,
            recurrence,
            seconds_to_trigger,
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Destination for telemetry produced by the state machines.
pub trait TelemetrySink<TInstant> {
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId;
}

impl<TInstant, S: TelemetrySink<TInstant> + ?Sized> TelemetrySink<TInstant> for &mut S {
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        (**self).record(event, payload, timestamp)
    }
}

/// Sink that discards every event.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopTelemetry;

impl<TInstant> TelemetrySink<TInstant> for NoopTelemetry {
    fn record(&mut self, _: TelemetryEventKind, _: TelemetryPayload, _: TInstant) -> EventId {
        0
    }
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: MonotonicInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TelemetryRecord<TInstant>> + '_ {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns `true` when any retained record carries `event`.
    pub fn contains(&self, event: TelemetryEventKind) -> bool {
        self.ring.oldest_ordered().any(|record| record.event == event)
    }

    /// Time between the two most recent occurrences of events matching `filter`.
    pub fn elapsed_between_last<F>(&self, filter: F) -> Option<Duration>
    where
        F: Fn(&TelemetryEventKind) -> bool,
    {
        let mut previous: Option<TInstant> = None;
        let mut gap = None;
        for record in self.ring.oldest_ordered() {
            if filter(&record.event) {
                if let Some(earlier) = previous {
                    gap = Some(record.timestamp.saturating_duration_since(earlier));
                }
                previous = Some(record.timestamp);
            }
        }
        gap
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: MonotonicInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<TInstant, const CAPACITY: usize> TelemetrySink<TInstant>
    for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: MonotonicInstant,
{
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

const fn countdown_index(kind: CountdownKind) -> u16 {
    match kind {
        CountdownKind::WakeAlarm => 0,
        CountdownKind::GradualWake => 1,
    }
}

fn countdown_from_index(index: u16) -> Option<CountdownKind> {
    match index {
        0 => Some(CountdownKind::WakeAlarm),
        1 => Some(CountdownKind::GradualWake),
        _ => None,
    }
}

const fn profile_index(profile: RampProfile) -> u16 {
    match profile {
        RampProfile::WakeAlarm => 0,
        RampProfile::NaturalWake => 1,
    }
}

fn profile_from_index(index: u16) -> Option<RampProfile> {
    match index {
        0 => Some(RampProfile::WakeAlarm),
        1 => Some(RampProfile::NaturalWake),
        _ => None,
    }
}

const fn record_index(record: RecordKind) -> u16 {
    match record {
        RecordKind::WakeAlarm => 0,
        RecordKind::SleepSettings => 1,
    }
}

fn record_from_index(index: u16) -> Option<RecordKind> {
    match index {
        0 => Some(RecordKind::WakeAlarm),
        1 => Some(RecordKind::SleepSettings),
        _ => None,
    }
}
