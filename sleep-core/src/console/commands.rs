//! Console command dispatcher.
//!
//! Parsed [`ConsoleCommand`]s are mapped onto the heart-rate front-end and the
//! sleep session. The dispatcher holds no state of its own, so firmware and
//! emulator hosts can share it.

use core::fmt;

use time::PrimitiveDateTime;

use crate::alarm::{AlarmError, AlarmState, Recurrence};
use crate::clock::WallClock;
use crate::haptic::{MotorDriver, RampState};
use crate::heartrate::{
    BackgroundInterval, Command, CommandEnqueueError, CommandQueueProducer, Estimate,
    HeartRateController,
};
use crate::persist::{PersistenceError, RecordStore};
use crate::session::{InfiniSleepController, InfiniSleepSettings};
use crate::telemetry::TelemetrySink;
use crate::timer::AlarmTimer;

use super::grammar::{self, AlarmCommand, ConsoleCommand, HeartRateCommand, ParseError};

/// Successful command results.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Ok,
    /// Alarm armed; carries the trigger time.
    Armed(PrimitiveDateTime),
    /// Alarm silenced; carries the state it settled in.
    Stopped(AlarmState),
    Saved {
        wake_alarm: bool,
        sleep_settings: bool,
    },
    Status(StatusReport),
    Help,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => f.write_str("ok"),
            Reply::Armed(trigger) => write!(
                f,
                "armed for {} {:02}:{:02}",
                trigger.date(),
                trigger.hour(),
                trigger.minute()
            ),
            Reply::Stopped(state) => write!(f, "stopped, alarm {}", state.as_str()),
            Reply::Saved {
                wake_alarm,
                sleep_settings,
            } => write!(
                f,
                "saved wakealarm={} infinisleep={}",
                u8::from(*wake_alarm),
                u8::from(*sleep_settings)
            ),
            Reply::Status(report) => report.fmt(f),
            Reply::Help => f.write_str(grammar::HELP_TEXT),
        }
    }
}

/// Snapshot rendered by `status`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub estimate: Estimate,
    pub background: BackgroundInterval,
    pub alarm: AlarmState,
    pub hours: u8,
    pub minutes: u8,
    pub recurrence: Recurrence,
    pub seconds_to_alarm: u32,
    pub ramp: Option<RampState>,
    pub settings: InfiniSleepSettings,
    pub settings_dirty: bool,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "hr: {} (background {})",
            self.estimate,
            self.background.as_str()
        )?;
        write!(
            f,
            "alarm: {} {:02}:{:02} {}",
            self.alarm.as_str(),
            self.hours,
            self.minutes,
            self.recurrence.as_str()
        )?;
        if self.alarm.is_enabled() {
            write!(f, " in {}s", self.seconds_to_alarm)?;
        }
        writeln!(f)?;
        if let Some(ramp) = self.ramp {
            writeln!(
                f,
                "ramp: strength {} pulse {}ms",
                ramp.strength, ramp.pulse_ms
            )?;
        }
        write!(
            f,
            "sleep: body={} heart-rate={} gradual={} smart={}{}",
            u8::from(self.settings.body_tracking),
            u8::from(self.settings.heart_rate_tracking),
            u8::from(self.settings.gradual_wake),
            u8::from(self.settings.smart_alarm),
            if self.settings_dirty { " (unsaved)" } else { "" }
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConsoleError<E = ()> {
    Parse(ParseError),
    /// The measurement queue refused the command.
    CommandDropped(Command, CommandEnqueueError<E>),
    Alarm(AlarmError),
    Persistence(PersistenceError),
}

impl<E> From<ParseError> for ConsoleError<E> {
    fn from(err: ParseError) -> Self {
        ConsoleError::Parse(err)
    }
}

impl<E> From<AlarmError> for ConsoleError<E> {
    fn from(err: AlarmError) -> Self {
        ConsoleError::Alarm(err)
    }
}

impl<E> From<PersistenceError> for ConsoleError<E> {
    fn from(err: PersistenceError) -> Self {
        ConsoleError::Persistence(err)
    }
}

impl<E: fmt::Debug> fmt::Display for ConsoleError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Parse(err) => write!(f, "parse error: {err}"),
            ConsoleError::CommandDropped(command, err) => {
                write!(f, "{} dropped: {err}", command.as_str())
            }
            ConsoleError::Alarm(err) => write!(f, "alarm error: {err}"),
            ConsoleError::Persistence(err) => write!(f, "save failed: {err}"),
        }
    }
}

/// Parses and executes one console line.
pub fn execute_line<P, C, T, M, S, R>(
    line: &str,
    heart_rate: &mut HeartRateController<'_, P>,
    session: &mut InfiniSleepController<C, T, M, S, R>,
) -> Result<Reply, ConsoleError<P::Error>>
where
    P: CommandQueueProducer,
    C: WallClock,
    T: AlarmTimer,
    M: MotorDriver,
    S: RecordStore,
    R: TelemetrySink<PrimitiveDateTime>,
{
    let command = grammar::parse(line)?;
    execute(command, heart_rate, session)
}

pub fn execute<P, C, T, M, S, R>(
    command: ConsoleCommand,
    heart_rate: &mut HeartRateController<'_, P>,
    session: &mut InfiniSleepController<C, T, M, S, R>,
) -> Result<Reply, ConsoleError<P::Error>>
where
    P: CommandQueueProducer,
    C: WallClock,
    T: AlarmTimer,
    M: MotorDriver,
    S: RecordStore,
    R: TelemetrySink<PrimitiveDateTime>,
{
    match command {
        ConsoleCommand::Screen(on) => {
            let (sent, result) = if on {
                (Command::WakeUp, heart_rate.wake_up())
            } else {
                (Command::GoToSleep, heart_rate.go_to_sleep())
            };
            enqueued(sent, result, session)
        }
        ConsoleCommand::HeartRate(HeartRateCommand::Start) => {
            let result = heart_rate.start();
            enqueued(Command::StartMeasurement, result, session)
        }
        ConsoleCommand::HeartRate(HeartRateCommand::Stop) => {
            let result = heart_rate.stop();
            enqueued(Command::StopMeasurement, result, session)
        }
        ConsoleCommand::HeartRate(HeartRateCommand::Interval(interval)) => {
            heart_rate.set_background_interval(interval);
            Ok(Reply::Ok)
        }
        ConsoleCommand::Alarm(alarm) => execute_alarm(alarm, session),
        ConsoleCommand::Sleep { setting, enabled } => {
            session.set_sleep_setting(setting, enabled)?;
            Ok(Reply::Ok)
        }
        ConsoleCommand::Save => {
            let wake_alarm = session.save_wake_alarm()?;
            let sleep_settings = session.save_sleep_settings()?;
            Ok(Reply::Saved {
                wake_alarm,
                sleep_settings,
            })
        }
        ConsoleCommand::Status => Ok(Reply::Status(status(heart_rate, session))),
        ConsoleCommand::Help => Ok(Reply::Help),
    }
}

/// Records a refused enqueue in the session telemetry before reporting it.
fn enqueued<E, C, T, M, S, R>(
    command: Command,
    result: Result<(), CommandEnqueueError<E>>,
    session: &mut InfiniSleepController<C, T, M, S, R>,
) -> Result<Reply, ConsoleError<E>>
where
    C: WallClock,
    T: AlarmTimer,
    M: MotorDriver,
    S: RecordStore,
    R: TelemetrySink<PrimitiveDateTime>,
{
    result.map_err(|err| {
        session.record_dropped(command);
        ConsoleError::CommandDropped(command, err)
    })?;
    Ok(Reply::Ok)
}

fn execute_alarm<E, C, T, M, S, R>(
    command: AlarmCommand,
    session: &mut InfiniSleepController<C, T, M, S, R>,
) -> Result<Reply, ConsoleError<E>>
where
    C: WallClock,
    T: AlarmTimer,
    M: MotorDriver,
    S: RecordStore,
    R: TelemetrySink<PrimitiveDateTime>,
{
    match command {
        AlarmCommand::Set { hours, minutes } => {
            session.set_wake_alarm_time(hours, minutes)?;
            Ok(Reply::Ok)
        }
        AlarmCommand::Recur(recurrence) => {
            session.set_recurrence(recurrence);
            Ok(Reply::Ok)
        }
        AlarmCommand::On => Ok(Reply::Armed(session.schedule_wake_alarm()?)),
        AlarmCommand::Off => {
            session.disable_wake_alarm();
            Ok(Reply::Ok)
        }
        AlarmCommand::Ring => {
            session.set_off_wake_alarm_now();
            Ok(Reply::Ok)
        }
        AlarmCommand::Gradual => {
            session.set_off_gradual_wake_now();
            Ok(Reply::Ok)
        }
        AlarmCommand::Stop => Ok(Reply::Stopped(session.stop_alerting()?)),
    }
}

fn status<P, C, T, M, S, R>(
    heart_rate: &HeartRateController<'_, P>,
    session: &InfiniSleepController<C, T, M, S, R>,
) -> StatusReport
where
    P: CommandQueueProducer,
    C: WallClock,
    T: AlarmTimer,
    M: MotorDriver,
    S: RecordStore,
    R: TelemetrySink<PrimitiveDateTime>,
{
    let alarm = session.wake_alarm();
    StatusReport {
        estimate: heart_rate.estimate(),
        background: heart_rate.background_interval(),
        alarm: session.alarm_state(),
        hours: alarm.hours,
        minutes: alarm.minutes,
        recurrence: alarm.recurrence,
        seconds_to_alarm: session.seconds_to_wake_alarm(),
        ramp: session.ramp().state(),
        settings: session.sleep_settings(),
        settings_dirty: session.is_settings_dirty(),
    }
}
