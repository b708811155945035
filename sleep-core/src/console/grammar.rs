//! Line grammar for the diagnostics console.
//!
//! Keywords are case-insensitive and separated by ASCII spaces or tabs. The
//! parser is a set of `winnow` combinators over `&str`; every top-level
//! keyword commits (`cut_err`) once matched so errors point at the argument
//! that failed instead of at the start of the line. Errors keep only the
//! innermost label, so the grammar needs no allocator.

use core::fmt;

use winnow::ascii::{Caseless, space1};
use winnow::combinator::{alt, cut_err, preceded, separated_pair};
use winnow::error::{AddContext, ErrMode, ParserError, StrContext};
use winnow::prelude::*;
use winnow::stream::{AsChar, Stream};
use winnow::token::take_while;

use crate::alarm::Recurrence;
use crate::heartrate::BackgroundInterval;
use crate::session::SleepSetting;

/// Structured commands produced by the parser.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Screen on (`true`) or off.
    Screen(bool),
    HeartRate(HeartRateCommand),
    Alarm(AlarmCommand),
    Sleep {
        setting: SleepSetting,
        enabled: bool,
    },
    Save,
    Status,
    Help,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HeartRateCommand {
    Start,
    Stop,
    Interval(BackgroundInterval),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AlarmCommand {
    Set { hours: u8, minutes: u8 },
    Recur(Recurrence),
    On,
    Off,
    Ring,
    Gradual,
    Stop,
}

/// Parse failure with the byte offset into the trimmed line.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub expected: Option<&'static str>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expected {
            Some(expected) => write!(f, "expected {expected} at column {}", self.offset + 1),
            None => write!(f, "unexpected input at column {}", self.offset + 1),
        }
    }
}

pub const HELP_TEXT: &str = "\
screen on|off
hr start|stop
hr interval off|10s|30s|1m|5m|10m|30m|continuous
alarm set HH:MM
alarm recur once|daily|weekdays
alarm on|off|ring|gradual|stop
sleep body|heart-rate|gradual|smart on|off
save
status";

/// Parser error carrying the innermost `Label` context, if any.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
struct LabelError {
    label: Option<&'static str>,
}

impl<I: Stream> ParserError<I> for LabelError {
    type Inner = Self;

    fn from_input(_input: &I) -> Self {
        Self::default()
    }

    fn or(self, other: Self) -> Self {
        // Prefer the branch that got far enough to be labelled.
        if other.label.is_some() || self.label.is_none() {
            other
        } else {
            self
        }
    }

    fn into_inner(self) -> Result<Self::Inner, Self> {
        Ok(self)
    }
}

impl<I: Stream> AddContext<I, StrContext> for LabelError {
    fn add_context(
        self,
        _input: &I,
        _token_start: &<I as Stream>::Checkpoint,
        context: StrContext,
    ) -> Self {
        match (self.label, context) {
            (None, StrContext::Label(label)) => Self { label: Some(label) },
            _ => self,
        }
    }
}

type GrammarResult<O> = ModalResult<O, LabelError>;

/// Parses one console line. Leading and trailing whitespace is ignored.
pub fn parse(line: &str) -> Result<ConsoleCommand, ParseError> {
    let source = line.trim();
    let mut input = source;

    let result = command.parse_next(&mut input);
    let offset = source.len() - input.len();
    match result {
        Ok(command) if input.trim_start().is_empty() => Ok(command),
        Ok(_) => Err(ParseError {
            offset: offset + (input.len() - input.trim_start().len()),
            expected: Some("end of line"),
        }),
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => Err(ParseError {
            offset,
            expected: err.label,
        }),
        Err(ErrMode::Incomplete(_)) => Err(ParseError {
            offset,
            expected: None,
        }),
    }
}

fn command(input: &mut &str) -> GrammarResult<ConsoleCommand> {
    alt((
        screen,
        heart_rate,
        alarm,
        sleep,
        Caseless("save").value(ConsoleCommand::Save),
        Caseless("status").value(ConsoleCommand::Status),
        Caseless("help").value(ConsoleCommand::Help),
    ))
    .context(StrContext::Label("command"))
    .parse_next(input)
}

fn on_off(input: &mut &str) -> GrammarResult<bool> {
    alt((Caseless("on").value(true), Caseless("off").value(false)))
        .context(StrContext::Label("on|off"))
        .parse_next(input)
}

fn screen(input: &mut &str) -> GrammarResult<ConsoleCommand> {
    preceded((Caseless("screen"), space1), cut_err(on_off))
        .map(ConsoleCommand::Screen)
        .parse_next(input)
}

fn heart_rate(input: &mut &str) -> GrammarResult<ConsoleCommand> {
    preceded(
        (Caseless("hr"), space1),
        cut_err(alt((
            Caseless("start").value(HeartRateCommand::Start),
            Caseless("stop").value(HeartRateCommand::Stop),
            preceded((Caseless("interval"), space1), interval).map(HeartRateCommand::Interval),
        )))
        .context(StrContext::Label("start|stop|interval")),
    )
    .map(ConsoleCommand::HeartRate)
    .parse_next(input)
}

fn interval(input: &mut &str) -> GrammarResult<BackgroundInterval> {
    alt((
        Caseless("off").value(BackgroundInterval::Off),
        Caseless("continuous").value(BackgroundInterval::Continuous),
        Caseless("10s").value(BackgroundInterval::TenSeconds),
        Caseless("30s").value(BackgroundInterval::ThirtySeconds),
        Caseless("10m").value(BackgroundInterval::TenMinutes),
        Caseless("30m").value(BackgroundInterval::ThirtyMinutes),
        Caseless("1m").value(BackgroundInterval::OneMinute),
        Caseless("5m").value(BackgroundInterval::FiveMinutes),
    ))
    .context(StrContext::Label("interval"))
    .parse_next(input)
}

fn alarm(input: &mut &str) -> GrammarResult<ConsoleCommand> {
    preceded(
        (Caseless("alarm"), space1),
        cut_err(alt((
            preceded((Caseless("set"), space1), alarm_time)
                .map(|(hours, minutes)| AlarmCommand::Set { hours, minutes }),
            preceded((Caseless("recur"), space1), recurrence).map(AlarmCommand::Recur),
            Caseless("on").value(AlarmCommand::On),
            Caseless("off").value(AlarmCommand::Off),
            Caseless("ring").value(AlarmCommand::Ring),
            Caseless("gradual").value(AlarmCommand::Gradual),
            Caseless("stop").value(AlarmCommand::Stop),
        )))
        .context(StrContext::Label("alarm action")),
    )
    .map(ConsoleCommand::Alarm)
    .parse_next(input)
}

fn alarm_time(input: &mut &str) -> GrammarResult<(u8, u8)> {
    separated_pair(clock_field, ':', clock_field)
        .context(StrContext::Label("HH:MM"))
        .parse_next(input)
}

/// One or two decimal digits; leading zeros allowed.
fn clock_field(input: &mut &str) -> GrammarResult<u8> {
    take_while(1..=2, AsChar::is_dec_digit)
        .parse_to()
        .parse_next(input)
}

fn recurrence(input: &mut &str) -> GrammarResult<Recurrence> {
    alt((
        Caseless("once").value(Recurrence::None),
        Caseless("daily").value(Recurrence::Daily),
        Caseless("weekdays").value(Recurrence::Weekdays),
    ))
    .context(StrContext::Label("once|daily|weekdays"))
    .parse_next(input)
}

fn sleep_setting(input: &mut &str) -> GrammarResult<SleepSetting> {
    alt((
        Caseless("body").value(SleepSetting::BodyTracking),
        Caseless("heart-rate").value(SleepSetting::HeartRateTracking),
        Caseless("gradual").value(SleepSetting::GradualWake),
        Caseless("smart").value(SleepSetting::SmartAlarm),
    ))
    .context(StrContext::Label("sleep setting"))
    .parse_next(input)
}

fn sleep(input: &mut &str) -> GrammarResult<ConsoleCommand> {
    preceded(
        (Caseless("sleep"), space1),
        cut_err(separated_pair(sleep_setting, space1, on_off)),
    )
    .map(|(setting, enabled)| ConsoleCommand::Sleep { setting, enabled })
    .parse_next(input)
}
