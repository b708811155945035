//! Sleep session: the single owner of the wake alarm, its haptic ramp and the
//! two persisted records.
//!
//! All countdown expiries, ramp ticks and user requests for the alarm go
//! through one [`InfiniSleepController`], which the runtime keeps inside a
//! single task. That task is the serialization point for every alarm and ramp
//! callback.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::alarm::{
    AlarmError, AlarmState, AlarmStatus, CountdownOutcome, Recurrence, WakeAlarmScheduler,
    WakeAlarmSettings,
};
use crate::clock::WallClock;
use crate::haptic::{HapticRampEngine, MotorDriver, RampProfile, RampState};
use crate::heartrate::Command;
use crate::persist::{self, PersistenceError, Record, RecordStore};
use crate::telemetry::{AlarmTelemetry, TelemetryEventKind, TelemetryPayload, TelemetrySink};
use crate::timer::{AlarmTimer, CountdownKind};

/// Persisted sleep-tracking preferences, one byte per flag in this order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InfiniSleepSettings {
    pub body_tracking: bool,
    pub heart_rate_tracking: bool,
    pub gradual_wake: bool,
    pub smart_alarm: bool,
}

impl Default for InfiniSleepSettings {
    fn default() -> Self {
        Self {
            body_tracking: false,
            heart_rate_tracking: true,
            gradual_wake: false,
            smart_alarm: false,
        }
    }
}

/// Individually switchable sleep preference.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SleepSetting {
    BodyTracking,
    HeartRateTracking,
    GradualWake,
    SmartAlarm,
}

impl SleepSetting {
    pub const ALL: [SleepSetting; 4] = [
        SleepSetting::BodyTracking,
        SleepSetting::HeartRateTracking,
        SleepSetting::GradualWake,
        SleepSetting::SmartAlarm,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SleepSetting::BodyTracking => "body",
            SleepSetting::HeartRateTracking => "heart-rate",
            SleepSetting::GradualWake => "gradual",
            SleepSetting::SmartAlarm => "smart",
        }
    }
}

impl fmt::Display for SleepSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InfiniSleepSettings {
    #[must_use]
    pub const fn get(&self, setting: SleepSetting) -> bool {
        match setting {
            SleepSetting::BodyTracking => self.body_tracking,
            SleepSetting::HeartRateTracking => self.heart_rate_tracking,
            SleepSetting::GradualWake => self.gradual_wake,
            SleepSetting::SmartAlarm => self.smart_alarm,
        }
    }

    fn set(&mut self, setting: SleepSetting, enabled: bool) {
        match setting {
            SleepSetting::BodyTracking => self.body_tracking = enabled,
            SleepSetting::HeartRateTracking => self.heart_rate_tracking = enabled,
            SleepSetting::GradualWake => self.gradual_wake = enabled,
            SleepSetting::SmartAlarm => self.smart_alarm = enabled,
        }
    }
}

pub struct InfiniSleepController<C, T, M, S, R> {
    scheduler: WakeAlarmScheduler<C, T>,
    ramp: HapticRampEngine<M>,
    store: S,
    telemetry: R,
    settings: InfiniSleepSettings,
    settings_dirty: bool,
}

impl<C, T, M, S, R> InfiniSleepController<C, T, M, S, R>
where
    C: WallClock,
    T: AlarmTimer,
    M: MotorDriver,
    S: RecordStore,
    R: TelemetrySink<PrimitiveDateTime>,
{
    pub fn new(clock: C, timer: T, motor: M, store: S, telemetry: R) -> Self {
        Self::with_ramp(
            WakeAlarmScheduler::new(clock, timer),
            HapticRampEngine::new(motor),
            store,
            telemetry,
        )
    }

    pub fn with_ramp(
        scheduler: WakeAlarmScheduler<C, T>,
        ramp: HapticRampEngine<M>,
        store: S,
        telemetry: R,
    ) -> Self {
        Self {
            scheduler,
            ramp,
            store,
            telemetry,
            settings: InfiniSleepSettings::default(),
            settings_dirty: false,
        }
    }

    /// Loads both records and re-arms an alarm that was enabled when last
    /// saved. Unreadable records fall back to defaults.
    pub fn init(&mut self) -> Result<(), AlarmError> {
        let alarm: WakeAlarmSettings = self.load_or_default();
        self.settings = self.load_or_default();
        self.settings_dirty = false;

        self.scheduler.restore(&alarm)?;
        self.scheduler.set_gradual_wake(self.settings.gradual_wake);
        if alarm.is_enabled {
            self.schedule_wake_alarm()?;
        }
        self.scheduler.take_changed();
        Ok(())
    }

    /// Stops any alert and flushes both records. Save failures are recorded
    /// to telemetry and otherwise ignored.
    pub fn shutdown(&mut self) {
        if self.ramp.is_running() || self.scheduler.is_alerting() {
            let _ = self.stop_alerting();
        }
        let _ = self.save_wake_alarm();
        let _ = self.save_sleep_settings();
    }

    pub fn scheduler(&self) -> &WakeAlarmScheduler<C, T> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut WakeAlarmScheduler<C, T> {
        &mut self.scheduler
    }

    pub fn ramp(&self) -> &HapticRampEngine<M> {
        &self.ramp
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn telemetry(&self) -> &R {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut R {
        &mut self.telemetry
    }

    pub fn now(&self) -> PrimitiveDateTime {
        self.scheduler.clock().now()
    }

    pub fn alarm_state(&self) -> AlarmState {
        self.scheduler.state()
    }

    pub fn wake_alarm(&self) -> WakeAlarmSettings {
        self.scheduler.settings()
    }

    pub fn sleep_settings(&self) -> InfiniSleepSettings {
        self.settings
    }

    pub fn is_settings_dirty(&self) -> bool {
        self.settings_dirty
    }

    pub fn set_wake_alarm_time(&mut self, hours: u8, minutes: u8) -> Result<(), AlarmError> {
        self.scheduler.set_wake_alarm_time(hours, minutes)
    }

    pub fn set_recurrence(&mut self, recurrence: Recurrence) {
        self.scheduler.set_recurrence(recurrence);
    }

    pub fn schedule_wake_alarm(&mut self) -> Result<PrimitiveDateTime, AlarmError> {
        if self.ramp.is_running() {
            self.stop_ramp();
        }
        let trigger = self.scheduler.schedule()?;
        self.record_alarm(TelemetryEventKind::AlarmArmed);
        Ok(trigger)
    }

    /// Re-arms an armed alarm against the current clock without ringing an
    /// occurrence that already rang. Other states are left alone.
    pub fn rearm_wake_alarm(&mut self) -> Result<Option<PrimitiveDateTime>, AlarmError> {
        if self.scheduler.state() != AlarmState::Armed {
            return Ok(None);
        }
        match self.scheduler.rearm() {
            Ok(trigger) => {
                self.record_alarm(TelemetryEventKind::AlarmArmed);
                Ok(Some(trigger))
            }
            Err(err) => {
                self.record_alarm(TelemetryEventKind::RearmFailed);
                Err(err)
            }
        }
    }

    pub fn disable_wake_alarm(&mut self) {
        if self.ramp.is_running() {
            self.stop_ramp();
        }
        let was_enabled = self.scheduler.is_enabled();
        self.scheduler.disable();
        if was_enabled {
            self.record_alarm(TelemetryEventKind::AlarmDisabled);
        }
    }

    pub fn seconds_to_wake_alarm(&self) -> u32 {
        self.scheduler.seconds_to_wake_alarm()
    }

    pub fn set_off_wake_alarm_now(&mut self) {
        self.scheduler.set_off_wake_alarm_now();
        self.record_alarm(TelemetryEventKind::AlarmFired);
        self.start_ramp(RampProfile::WakeAlarm);
    }

    pub fn set_off_gradual_wake_now(&mut self) {
        if self.scheduler.set_off_gradual_wake_now() {
            self.record_alarm(TelemetryEventKind::GradualWakeStarted);
            self.start_ramp(RampProfile::NaturalWake);
        }
    }

    /// Silences the alarm and re-arms or disables it per its recurrence.
    pub fn stop_alerting(&mut self) -> Result<AlarmState, AlarmError> {
        if self.ramp.is_running() {
            self.stop_ramp();
        }
        let was_active = matches!(
            self.scheduler.state(),
            AlarmState::Alerting | AlarmState::GradualWake
        );
        let state = self.scheduler.stop_alerting().inspect_err(|_| {
            self.record_alarm(TelemetryEventKind::RearmFailed);
        })?;
        if was_active {
            self.record_alarm(TelemetryEventKind::AlarmStopped);
            if state == AlarmState::Armed {
                self.record_alarm(TelemetryEventKind::AlarmArmed);
            }
        }
        Ok(state)
    }

    /// Routes an expired countdown into the scheduler and starts the matching
    /// ramp.
    pub fn on_countdown(&mut self, kind: CountdownKind) -> CountdownOutcome {
        let outcome = self.scheduler.on_countdown(kind);
        match outcome {
            CountdownOutcome::AlarmFired => {
                self.record_alarm(TelemetryEventKind::AlarmFired);
                self.start_ramp(RampProfile::WakeAlarm);
            }
            CountdownOutcome::GradualWakeStarted => {
                self.record_alarm(TelemetryEventKind::GradualWakeStarted);
                self.start_ramp(RampProfile::NaturalWake);
            }
            CountdownOutcome::Stale => {
                let now = self.now();
                self.telemetry.record(
                    TelemetryEventKind::StaleCountdown(kind),
                    TelemetryPayload::none(),
                    now,
                );
            }
        }
        outcome
    }

    pub fn on_ramp_tick(&mut self) -> Option<RampState> {
        self.ramp.tick()
    }

    /// Tick period of the running ramp, if one is running.
    pub fn ramp_period(&self) -> Option<Duration> {
        self.ramp.period()
    }

    /// Changes one sleep preference and marks the record dirty. Toggling
    /// gradual wake while armed re-arms so the pre-alarm countdown follows.
    pub fn set_sleep_setting(
        &mut self,
        setting: SleepSetting,
        enabled: bool,
    ) -> Result<(), AlarmError> {
        if self.settings.get(setting) == enabled {
            return Ok(());
        }
        self.settings.set(setting, enabled);
        self.settings_dirty = true;

        if setting == SleepSetting::GradualWake {
            self.scheduler.set_gradual_wake(enabled);
            self.rearm_wake_alarm()?;
        }
        Ok(())
    }

    /// Writes the alarm record if it changed since the last save. Returns
    /// whether anything was written.
    pub fn save_wake_alarm(&mut self) -> Result<bool, PersistenceError> {
        if !self.scheduler.is_changed() {
            return Ok(false);
        }
        let record = self.scheduler.settings();
        self.save_record(&record)?;
        self.scheduler.take_changed();
        Ok(true)
    }

    /// Writes the sleep settings if they are dirty.
    pub fn save_sleep_settings(&mut self) -> Result<bool, PersistenceError> {
        if !self.settings_dirty {
            return Ok(false);
        }
        let record = self.settings;
        self.save_record(&record)?;
        self.settings_dirty = false;
        Ok(true)
    }

    /// Notes a measurement command the worker queue refused.
    pub fn record_dropped(&mut self, command: Command) {
        let now = self.now();
        self.telemetry.record(
            TelemetryEventKind::CommandDropped(command),
            TelemetryPayload::none(),
            now,
        );
    }

    /// Mirrors the alarm into cross-thread status cells.
    pub fn publish(&self, status: &AlarmStatus) {
        status.publish(
            self.scheduler.state(),
            &self.scheduler.settings(),
            self.scheduler.seconds_to_wake_alarm(),
        );
    }

    fn load_or_default<V: Record + Copy>(&mut self) -> V {
        match persist::load::<V, _>(&mut self.store) {
            Ok(record) => record,
            Err(PersistenceError::NotFound) => V::default(),
            Err(err) => {
                let now = self.now();
                self.telemetry.record(
                    TelemetryEventKind::SettingsLoadFailed(V::KIND),
                    TelemetryPayload::Persistence(err),
                    now,
                );
                V::default()
            }
        }
    }

    fn save_record<V: Record>(&mut self, record: &V) -> Result<(), PersistenceError> {
        persist::save(&mut self.store, record).inspect_err(|err| {
            let now = self.scheduler.clock().now();
            self.telemetry.record(
                TelemetryEventKind::SettingsSaveFailed(V::KIND),
                TelemetryPayload::Persistence(*err),
                now,
            );
        })
    }

    fn start_ramp(&mut self, profile: RampProfile) {
        self.ramp.start(profile);
        let now = self.now();
        self.telemetry.record(
            TelemetryEventKind::RampStarted(profile),
            TelemetryPayload::none(),
            now,
        );
    }

    fn stop_ramp(&mut self) {
        self.ramp.stop();
        let now = self.now();
        self.telemetry
            .record(TelemetryEventKind::RampStopped, TelemetryPayload::none(), now);
    }

    fn record_alarm(&mut self, event: TelemetryEventKind) {
        let now = self.now();
        let settings = self.scheduler.settings();
        let payload = TelemetryPayload::Alarm(AlarmTelemetry::new(
            settings.hours,
            settings.minutes,
            settings.recurrence,
            self.scheduler.seconds_to_wake_alarm(),
        ));
        self.telemetry.record(event, payload, now);
    }
}
