//! Telemetry sink that keeps the core ring buffer and mirrors every event to
//! defmt (target) or stdout (host) for quick inspection during bring-up.
//!
//! Each log line carries the source task, the event id, the static label and
//! the raw event code so a capture can be correlated with the ring contents
//! later.

use sleep_core::clock::MonotonicInstant;
use sleep_core::persist::PersistenceError;
use sleep_core::telemetry::{
    EventId, TelemetryEventKind, TelemetryPayload, TelemetryRecorder, TelemetrySink,
};

/// Records retained per task; the full core ring does not fit twice in RAM.
pub const FIRMWARE_TELEMETRY_CAPACITY: usize = 32;

/// Ring-backed telemetry sink that logs as it records.
pub struct LogTelemetry<TInstant>
where
    TInstant: MonotonicInstant,
{
    source: &'static str,
    recorder: TelemetryRecorder<TInstant, FIRMWARE_TELEMETRY_CAPACITY>,
}

impl<TInstant> LogTelemetry<TInstant>
where
    TInstant: MonotonicInstant,
{
    pub const fn new(source: &'static str) -> Self {
        Self {
            source,
            recorder: TelemetryRecorder::new(),
        }
    }

    pub fn recorder(&self) -> &TelemetryRecorder<TInstant, FIRMWARE_TELEMETRY_CAPACITY> {
        &self.recorder
    }
}

impl<TInstant> TelemetrySink<TInstant> for LogTelemetry<TInstant>
where
    TInstant: MonotonicInstant,
{
    fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.recorder.record(event, payload, timestamp);
        log_event(self.source, id, event, payload);
        id
    }
}

fn log_event(source: &'static str, id: EventId, event: TelemetryEventKind, payload: TelemetryPayload) {
    let label = event.label();
    let code = event.to_raw();
    match payload {
        TelemetryPayload::None => emit_log(source, id, label, code),
        TelemetryPayload::Elapsed(elapsed) => {
            let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            emit_elapsed(source, id, label, code, elapsed_ms);
        }
        TelemetryPayload::Alarm(alarm) => emit_alarm(
            source,
            id,
            label,
            code,
            (alarm.hours, alarm.minutes),
            alarm.recurrence.as_str(),
            alarm.seconds_to_trigger,
        ),
        TelemetryPayload::Persistence(err) => {
            emit_persistence(source, id, label, code, persistence_label(err));
        }
    }
}

const fn persistence_label(err: PersistenceError) -> &'static str {
    match err {
        PersistenceError::NotFound => "not-found",
        PersistenceError::Storage => "storage",
        PersistenceError::Decode => "decode",
        PersistenceError::UnsupportedVersion(_) => "unsupported-version",
        PersistenceError::OutOfRange => "out-of-range",
        PersistenceError::BufferTooSmall => "buffer-too-small",
    }
}

#[cfg(target_os = "none")]
fn emit_log(source: &'static str, id: EventId, label: &'static str, code: u16) {
    defmt::info!("telemetry:{} #{} {} ({=u16:#06x})", source, id, label, code);
}

#[cfg(not(target_os = "none"))]
fn emit_log(source: &'static str, id: EventId, label: &'static str, code: u16) {
    println!("telemetry:{source} #{id} {label} ({code:#06x})");
}

#[cfg(target_os = "none")]
fn emit_elapsed(source: &'static str, id: EventId, label: &'static str, code: u16, elapsed_ms: u64) {
    defmt::info!(
        "telemetry:{} #{} {} ({=u16:#06x}) after={}ms",
        source,
        id,
        label,
        code,
        elapsed_ms
    );
}

#[cfg(not(target_os = "none"))]
fn emit_elapsed(source: &'static str, id: EventId, label: &'static str, code: u16, elapsed_ms: u64) {
    println!("telemetry:{source} #{id} {label} ({code:#06x}) after={elapsed_ms}ms");
}

#[cfg(target_os = "none")]
fn emit_alarm(
    source: &'static str,
    id: EventId,
    label: &'static str,
    code: u16,
    (hours, minutes): (u8, u8),
    recurrence: &'static str,
    seconds: u32,
) {
    defmt::info!(
        "telemetry:{} #{} {} ({=u16:#06x}) at={=u8:02}:{=u8:02} {} in={}s",
        source,
        id,
        label,
        code,
        hours,
        minutes,
        recurrence,
        seconds
    );
}

#[cfg(not(target_os = "none"))]
fn emit_alarm(
    source: &'static str,
    id: EventId,
    label: &'static str,
    code: u16,
    (hours, minutes): (u8, u8),
    recurrence: &'static str,
    seconds: u32,
) {
    println!(
        "telemetry:{source} #{id} {label} ({code:#06x}) at={hours:02}:{minutes:02} {recurrence} in={seconds}s"
    );
}

#[cfg(target_os = "none")]
fn emit_persistence(source: &'static str, id: EventId, label: &'static str, code: u16, error: &'static str) {
    defmt::warn!("telemetry:{} #{} {} ({=u16:#06x}) error={}", source, id, label, code, error);
}

#[cfg(not(target_os = "none"))]
fn emit_persistence(source: &'static str, id: EventId, label: &'static str, code: u16, error: &'static str) {
    println!("telemetry:{source} #{id} {label} ({code:#06x}) error={error}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    use sleep_core::alarm::Recurrence;
    use sleep_core::heartrate::MeasurementState;
    use sleep_core::persist::RecordKind;
    use sleep_core::telemetry::AlarmTelemetry;

    use crate::clock::FirmwareInstant;
    use embassy_time::Instant;

    fn millis(value: u64) -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_millis(value))
    }

    #[test]
    fn records_into_the_ring_while_logging() {
        let mut telemetry = LogTelemetry::new("hr");

        let transition = TelemetryEventKind::MeasurementTransition {
            from: MeasurementState::ScreenOffAndMeasuring,
            to: MeasurementState::ScreenOffAndWaiting,
        };
        let id1 = telemetry.record(
            transition,
            TelemetryPayload::Elapsed(Duration::from_secs(30)),
            millis(30_000),
        );
        assert_eq!(id1, 0);

        let id2 = telemetry.record(
            TelemetryEventKind::SettingsLoadFailed(RecordKind::WakeAlarm),
            TelemetryPayload::Persistence(PersistenceError::UnsupportedVersion(2)),
            millis(30_010),
        );
        assert_eq!(id2, 1);

        let latest = telemetry.recorder().latest().copied().unwrap();
        assert_eq!(
            latest.details,
            TelemetryPayload::Persistence(PersistenceError::UnsupportedVersion(2))
        );
        assert!(telemetry.recorder().contains(transition));
    }

    #[test]
    fn ring_keeps_the_most_recent_records() {
        let mut telemetry = LogTelemetry::new("alarm");
        let payload = TelemetryPayload::Alarm(AlarmTelemetry::new(7, 0, Recurrence::Daily, 60));
        for step in 0..40u64 {
            telemetry.record(TelemetryEventKind::AlarmArmed, payload, millis(step));
        }
        assert_eq!(telemetry.recorder().len(), FIRMWARE_TELEMETRY_CAPACITY);
        assert_eq!(telemetry.recorder().latest().map(|record| record.id), Some(39));
    }
}
