//! Alarm service: owns the sleep session and multiplexes UI requests with
//! countdown deadlines and ramp ticks on a single task.

use core::fmt;
use core::time::Duration;

use embassy_futures::select::{Either, select};
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use embassy_time::Timer;
use sleep_core::alarm::{AlarmError, AlarmStatus, CountdownOutcome, Recurrence};
use sleep_core::clock::{MonotonicClock, WallClock};
use sleep_core::haptic::{MotorDriver, RampProfile};
use sleep_core::persist::{PersistenceError, RecordStore};
use sleep_core::session::{InfiniSleepController, SleepSetting};
use sleep_core::timer::{CountdownKind, DeadlineTimer};
use time::PrimitiveDateTime;

use crate::clock::FirmwareInstant;
use crate::status;
use crate::sync::QueueMutex;
use crate::telemetry::LogTelemetry;

pub const ALARM_REQUEST_DEPTH: usize = 4;

/// Longest the service sleeps without republishing the countdown.
pub const STATUS_REFRESH: Duration = Duration::from_secs(60);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlarmRequest {
    SetTime { hours: u8, minutes: u8 },
    SetRecurrence(Recurrence),
    Schedule,
    Disable,
    RingNow,
    GradualNow,
    Stop,
    SetSleepSetting { setting: SleepSetting, enabled: bool },
    Save,
    /// The wall clock was re-anchored; an armed alarm must be re-armed.
    ClockChanged,
}

impl AlarmRequest {
    pub const fn as_str(self) -> &'static str {
        match self {
            AlarmRequest::SetTime { .. } => "set-time",
            AlarmRequest::SetRecurrence(_) => "set-recurrence",
            AlarmRequest::Schedule => "schedule",
            AlarmRequest::Disable => "disable",
            AlarmRequest::RingNow => "ring-now",
            AlarmRequest::GradualNow => "gradual-now",
            AlarmRequest::Stop => "stop",
            AlarmRequest::SetSleepSetting { .. } => "set-sleep-setting",
            AlarmRequest::Save => "save",
            AlarmRequest::ClockChanged => "clock-changed",
        }
    }
}

pub type AlarmChannel = Channel<QueueMutex, AlarmRequest, ALARM_REQUEST_DEPTH>;
pub type AlarmSender<'a> = Sender<'a, QueueMutex, AlarmRequest, ALARM_REQUEST_DEPTH>;
pub type AlarmReceiver<'a> = Receiver<'a, QueueMutex, AlarmRequest, ALARM_REQUEST_DEPTH>;

/// Non-blocking front-end for the alarm service.
#[derive(Clone, Copy)]
pub struct AlarmRequests<'a> {
    sender: AlarmSender<'a>,
}

impl<'a> AlarmRequests<'a> {
    pub const fn new(sender: AlarmSender<'a>) -> Self {
        Self { sender }
    }

    /// Hands `request` to the service. A full queue drops it and returns it.
    pub fn request(&self, request: AlarmRequest) -> Result<(), AlarmRequest> {
        match self.sender.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(request)) => {
                let total = status::record_alarm_request_dropped();
                log_dropped(request, total);
                Err(request)
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlarmRequestError {
    Alarm(AlarmError),
    Persistence(PersistenceError),
}

impl AlarmRequestError {
    pub const fn as_str(self) -> &'static str {
        match self {
            AlarmRequestError::Alarm(AlarmError::InvalidTime { .. }) => "invalid-time",
            AlarmRequestError::Alarm(AlarmError::CalendarOverflow) => "calendar-overflow",
            AlarmRequestError::Persistence(_) => "persistence",
        }
    }
}

impl fmt::Display for AlarmRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmRequestError::Alarm(err) => err.fmt(f),
            AlarmRequestError::Persistence(err) => err.fmt(f),
        }
    }
}

impl From<AlarmError> for AlarmRequestError {
    fn from(err: AlarmError) -> Self {
        AlarmRequestError::Alarm(err)
    }
}

impl From<PersistenceError> for AlarmRequestError {
    fn from(err: PersistenceError) -> Self {
        AlarmRequestError::Persistence(err)
    }
}

pub type AlarmSession<W, C, M, S> =
    InfiniSleepController<W, DeadlineTimer<C>, M, S, LogTelemetry<PrimitiveDateTime>>;

pub struct AlarmService<'a, W, C, M, S>
where
    C: MonotonicClock,
{
    session: AlarmSession<W, C, M, S>,
    status: &'a AlarmStatus,
    /// Running ramp profile and when it next ticks.
    ramp: Option<(RampProfile, C::Instant)>,
}

impl<'a, W, C, M, S> AlarmService<'a, W, C, M, S>
where
    W: WallClock,
    C: MonotonicClock,
    M: MotorDriver,
    S: RecordStore,
{
    pub fn new(session: AlarmSession<W, C, M, S>, status: &'a AlarmStatus) -> Self {
        Self {
            session,
            status,
            ramp: None,
        }
    }

    pub fn session(&self) -> &AlarmSession<W, C, M, S> {
        &self.session
    }

    /// Loads persisted records and re-arms a saved alarm.
    pub fn start(&mut self) {
        if let Err(err) = self.session.init() {
            log_request_failed("init", AlarmRequestError::Alarm(err));
        }
        self.publish();
    }

    pub fn handle(&mut self, request: AlarmRequest) -> Result<(), AlarmRequestError> {
        let result = self.apply(request);
        let now = self.monotonic_now();
        self.sync_ramp(now);
        self.publish();
        result
    }

    fn apply(&mut self, request: AlarmRequest) -> Result<(), AlarmRequestError> {
        match request {
            AlarmRequest::SetTime { hours, minutes } => {
                self.session.set_wake_alarm_time(hours, minutes)?;
            }
            AlarmRequest::SetRecurrence(recurrence) => self.session.set_recurrence(recurrence),
            AlarmRequest::Schedule => {
                self.session.schedule_wake_alarm()?;
            }
            AlarmRequest::Disable => self.session.disable_wake_alarm(),
            AlarmRequest::RingNow => self.session.set_off_wake_alarm_now(),
            AlarmRequest::GradualNow => self.session.set_off_gradual_wake_now(),
            AlarmRequest::Stop => {
                self.session.stop_alerting()?;
            }
            AlarmRequest::SetSleepSetting { setting, enabled } => {
                self.session.set_sleep_setting(setting, enabled)?;
            }
            AlarmRequest::Save => {
                let alarm = self.session.save_wake_alarm();
                let settings = self.session.save_sleep_settings();
                alarm?;
                settings?;
            }
            AlarmRequest::ClockChanged => {
                self.session.rearm_wake_alarm()?;
            }
        }
        Ok(())
    }

    /// Delivers every countdown due at `now` and ticks the ramp if its
    /// period elapsed.
    pub fn poll(&mut self, now: C::Instant) {
        while let Some(kind) = self.session.scheduler_mut().timer_mut().take_expired(now) {
            let outcome = self.session.on_countdown(kind);
            log_countdown(kind, outcome);
        }
        self.sync_ramp(now);

        if let Some((profile, due)) = self.ramp {
            if due <= now {
                self.session.on_ramp_tick();
                let next = due + profile.period();
                let next = if next <= now { now + profile.period() } else { next };
                self.ramp = Some((profile, next));
            }
        }
        self.publish();
    }

    /// Earliest instant `poll` has work to do, if any.
    pub fn next_wakeup(&self) -> Option<C::Instant> {
        let deadline = self.session.scheduler().timer().next_deadline();
        let tick = self.ramp.map(|(_, due)| due);
        match (deadline, tick) {
            (Some(deadline), Some(tick)) => Some(deadline.min(tick)),
            (deadline, tick) => deadline.or(tick),
        }
    }

    pub fn shutdown(&mut self) {
        self.session.shutdown();
        self.ramp = None;
        self.publish();
    }

    fn monotonic_now(&self) -> C::Instant {
        self.session.scheduler().timer().clock().now()
    }

    /// Starts tracking a ramp the session just started, or forgets one it
    /// stopped.
    fn sync_ramp(&mut self, now: C::Instant) {
        self.ramp = match (self.session.ramp().profile(), self.ramp) {
            (None, _) => None,
            (Some(profile), Some((tracked, due))) if profile == tracked => Some((tracked, due)),
            (Some(profile), _) => Some((profile, now + profile.period())),
        };
    }

    fn publish(&self) {
        self.session.publish(self.status);
    }
}

impl<W, C, M, S> AlarmService<'_, W, C, M, S>
where
    W: WallClock,
    C: MonotonicClock<Instant = FirmwareInstant>,
    M: MotorDriver,
    S: RecordStore,
{
    /// Serves requests and deadlines forever.
    pub async fn run(mut self, requests: AlarmReceiver<'_>) -> ! {
        self.start();
        loop {
            let now = self.monotonic_now();
            let refresh = now + STATUS_REFRESH;
            let wake_at = self.next_wakeup().map_or(refresh, |at| at.min(refresh));

            if let Either::First(request) =
                select(requests.receive(), Timer::at(wake_at.into_embassy())).await
            {
                if let Err(err) = self.handle(request) {
                    log_request_failed(request.as_str(), err);
                }
            }
            let now = self.monotonic_now();
            self.poll(now);
        }
    }
}

#[cfg(target_os = "none")]
fn log_dropped(request: AlarmRequest, total: u32) {
    defmt::warn!("alarm: dropped {} (queue full, {} total)", request.as_str(), total);
}

#[cfg(not(target_os = "none"))]
fn log_dropped(request: AlarmRequest, total: u32) {
    println!("alarm: dropped {} (queue full, {total} total)", request.as_str());
}

#[cfg(target_os = "none")]
fn log_request_failed(request: &'static str, err: AlarmRequestError) {
    defmt::warn!("alarm: {} failed: {}", request, err.as_str());
}

#[cfg(not(target_os = "none"))]
fn log_request_failed(request: &'static str, err: AlarmRequestError) {
    println!("alarm: {request} failed: {err}");
}

#[cfg(target_os = "none")]
fn log_countdown(kind: CountdownKind, outcome: CountdownOutcome) {
    defmt::info!("alarm: {} countdown -> {}", kind.as_str(), outcome_label(outcome));
}

#[cfg(not(target_os = "none"))]
fn log_countdown(kind: CountdownKind, outcome: CountdownOutcome) {
    println!("alarm: {kind} countdown -> {}", outcome_label(outcome));
}

const fn outcome_label(outcome: CountdownOutcome) -> &'static str {
    match outcome {
        CountdownOutcome::AlarmFired => "fired",
        CountdownOutcome::GradualWakeStarted => "gradual-wake",
        CountdownOutcome::Stale => "stale",
    }
}
