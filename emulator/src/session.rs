use std::cell::Cell;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use sleep_core::alarm::AlarmStatus;
use sleep_core::clock::duration_between;
use sleep_core::console::{self, HELP_TEXT, Reply};
use sleep_core::haptic::RampProfile;
use sleep_core::heartrate::{
    BackgroundInterval, BackgroundIntervalCell, BasicPpg, CommandQueueProducer,
    HeartRateController, MeasurementStateMachine, SharedEstimate,
};
use sleep_core::session::InfiniSleepController;
use sleep_core::telemetry::{
    EventId, TelemetryEventKind, TelemetryPayload, TelemetryRecord, TelemetryRecorder,
};
use sleep_core::timer::DeadlineTimer;
use time::PrimitiveDateTime;
use time::macros::datetime;

use crate::sim::{FileStore, HostQueue, SimClock, SimMotor, SimulatedSensor, Wrist};

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "advance",
        "advance <n>[ms|s|m|h]        - move virtual time forward",
    ),
    (
        "touch",
        "touch on|off                 - put the watch on or take it off",
    ),
    ("bpm", "bpm <n>                      - set the simulated pulse"),
    ("clock", "clock                        - show the virtual time"),
];

/// Cells the firmware would keep in statics.
pub struct SharedState {
    pub estimate: SharedEstimate,
    pub interval: BackgroundIntervalCell,
    pub alarm: AlarmStatus,
}

impl SharedState {
    pub const fn new() -> Self {
        Self {
            estimate: SharedEstimate::new(),
            interval: BackgroundIntervalCell::new(BackgroundInterval::Off),
            alarm: AlarmStatus::new(),
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SessionOptions {
    pub start: PrimitiveDateTime,
    pub store_dir: PathBuf,
    pub transcript: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            start: datetime!(2024-03-04 22:00),
            store_dir: PathBuf::from("target/infinisleep-emulator/store"),
            transcript: Some(PathBuf::from("target/infinisleep-emulator/session.log")),
        }
    }
}

type Worker<'a> =
    MeasurementStateMachine<'a, SimulatedSensor, BasicPpg, &'a SharedEstimate, PrimitiveDateTime>;

type SleepSession = InfiniSleepController<
    SimClock,
    DeadlineTimer<SimClock>,
    SimMotor,
    FileStore,
    TelemetryRecorder<PrimitiveDateTime>,
>;

pub struct Session<'a> {
    shared: &'a SharedState,
    clock: SimClock,
    started_at: PrimitiveDateTime,
    wrist: Rc<Cell<Wrist>>,
    worker: Worker<'a>,
    worker_queue: HostQueue,
    next_cycle: Option<PrimitiveDateTime>,
    hr_telemetry: TelemetryRecorder<PrimitiveDateTime>,
    heart_rate: HeartRateController<'a, HostQueue>,
    sleep: SleepSession,
    ramp_due: Option<(RampProfile, PrimitiveDateTime)>,
    hr_next_id: EventId,
    alarm_next_id: EventId,
    reported_pulses: u64,
    transcript: Option<TranscriptLogger>,
}

impl<'a> Session<'a> {
    pub fn new(shared: &'a SharedState, options: SessionOptions) -> io::Result<Self> {
        let clock = SimClock::new(options.start);
        let wrist = Rc::new(Cell::new(Wrist::default()));
        let queue = HostQueue::default();

        let worker = MeasurementStateMachine::new(
            SimulatedSensor::new(clock.clone(), Rc::clone(&wrist)),
            BasicPpg::new(),
            &shared.estimate,
            &shared.interval,
        );
        let heart_rate = HeartRateController::new(queue.clone(), &shared.estimate, &shared.interval);
        let sleep = InfiniSleepController::new(
            clock.clone(),
            DeadlineTimer::new(clock.clone()),
            SimMotor::default(),
            FileStore::new(options.store_dir),
            TelemetryRecorder::new(),
        );
        let transcript = match options.transcript {
            Some(path) => Some(TranscriptLogger::new(&path, options.start)?),
            None => None,
        };

        Ok(Self {
            shared,
            clock,
            started_at: options.start,
            wrist,
            worker,
            worker_queue: queue,
            next_cycle: None,
            hr_telemetry: TelemetryRecorder::new(),
            heart_rate,
            sleep,
            ramp_due: None,
            hr_next_id: 0,
            alarm_next_id: 0,
            reported_pulses: 0,
            transcript,
        })
    }

    /// Loads persisted records and schedules the first worker cycle.
    pub fn start(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        if let Err(err) = self.sleep.init() {
            lines.push(format!("ERR init {err}"));
        }
        let now = self.clock.get();
        self.next_cycle = self.worker.cycle_delay().map(|delay| now + delay);
        self.step(now, &mut lines);
        lines.push(format!(
            "alarm {} {:02}:{:02} {}",
            self.sleep.alarm_state().as_str(),
            self.sleep.wake_alarm().hours,
            self.sleep.wake_alarm().minutes,
            self.sleep.wake_alarm().recurrence.as_str()
        ));
        self.record_output(&lines)?;
        Ok(lines)
    }

    pub fn now(&self) -> PrimitiveDateTime {
        self.clock.get()
    }

    pub fn shared(&self) -> &SharedState {
        self.shared
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        self.record_input(trimmed)?;

        let lines = match self.handle_emulator_command(trimmed) {
            Some(lines) => lines,
            None => self.handle_console(trimmed),
        };

        self.record_output(&lines)?;
        Ok(lines)
    }

    /// Stops any alert, saves both records and reports what happened.
    pub fn shutdown(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        self.sleep.shutdown();
        self.ramp_due = None;
        let now = self.clock.get();
        self.step(now, &mut lines);
        self.report_motor(&mut lines);
        lines.push(format!(
            "records saved to {}",
            self.sleep.store().dir().display()
        ));
        self.record_output(&lines)?;
        Ok(lines)
    }

    fn handle_emulator_command(&mut self, line: &str) -> Option<Vec<String>> {
        let mut words = line.split_whitespace();
        let keyword = words.next()?.to_ascii_lowercase();
        let argument = words.next();
        let extra = words.next();

        let lines = match (keyword.as_str(), argument, extra) {
            ("help", topic, None) => self.help(topic),
            ("advance", Some(span), None) => match parse_span(span) {
                Ok(span) => self.advance(span),
                Err(err) => vec![format!("ERR syntax {err}")],
            },
            ("touch", Some(state), None) => match parse_on_off(state) {
                Some(touching) => {
                    let wrist = self.wrist.get();
                    self.wrist.set(Wrist { touching, ..wrist });
                    vec![format!("wrist {}", if touching { "on" } else { "off" })]
                }
                None => vec![usage("touch")],
            },
            ("bpm", Some(value), None) => match value.parse::<u16>() {
                Ok(bpm) if (30..=240).contains(&bpm) => {
                    let wrist = self.wrist.get();
                    self.wrist.set(Wrist { bpm, ..wrist });
                    vec![format!("pulse {bpm} bpm")]
                }
                _ => vec!["ERR syntax expected a pulse between 30 and 240".to_string()],
            },
            ("clock", None, None) => vec![format!("clock {}", format_time(self.clock.get()))],
            ("advance" | "touch" | "bpm" | "clock", _, _) => vec![usage(&keyword)],
            _ => return None,
        };
        Some(lines)
    }

    fn handle_console(&mut self, line: &str) -> Vec<String> {
        let result = console::execute_line(line, &mut self.heart_rate, &mut self.sleep);
        let mut lines: Vec<String> = match result {
            Ok(Reply::Status(report)) => {
                let mut lines: Vec<String> = report.to_string().lines().map(str::to_owned).collect();
                lines.push(format!("clock {}", format_time(self.clock.get())));
                lines.push(format!("worker {}", self.worker.state()));
                lines
            }
            Ok(reply) => reply.to_string().lines().map(str::to_owned).collect(),
            Err(err) => vec![format!("ERR {err}")],
        };

        let now = self.clock.get();
        self.pump(now);
        self.step(now, &mut lines);
        self.report_motor(&mut lines);
        lines
    }

    fn help(&self, topic: Option<&str>) -> Vec<String> {
        let mut lines = Vec::new();
        match topic {
            Some(target) => {
                if let Some((_, detail)) = HELP_TOPICS
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(target))
                {
                    lines.push((*detail).to_string());
                } else {
                    lines.extend(
                        HELP_TEXT
                            .lines()
                            .filter(|line| line.split_whitespace().next() == Some(target))
                            .map(str::to_owned),
                    );
                    if lines.is_empty() {
                        lines.push(format!("No help available for `{target}`."));
                    }
                }
            }
            None => {
                lines.push("Device commands:".to_string());
                lines.extend(HELP_TEXT.lines().map(|line| format!("  {line}")));
                lines.push("Emulator commands:".to_string());
                for (_, detail) in HELP_TOPICS {
                    lines.push(format!("  {detail}"));
                }
            }
        }
        lines
    }

    /// Runs every worker cycle, countdown and ramp tick due before
    /// `now + span`, in time order.
    pub fn advance(&mut self, span: Duration) -> Vec<String> {
        let target = self.clock.get() + span;
        let mut lines = Vec::new();
        loop {
            match self.next_event() {
                Some(at) if at <= target => {
                    self.clock.set(at);
                    self.step(at, &mut lines);
                }
                _ => {
                    self.clock.set(target);
                    break;
                }
            }
        }
        self.report_motor(&mut lines);
        lines.push(format!(
            "clock {} hr {}",
            format_time(target),
            self.shared.estimate.load()
        ));
        lines
    }

    fn next_event(&self) -> Option<PrimitiveDateTime> {
        [
            self.next_cycle,
            self.sleep.scheduler().timer().next_deadline(),
            self.ramp_due.map(|(_, due)| due),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn step(&mut self, now: PrimitiveDateTime, lines: &mut Vec<String>) {
        if self.next_cycle.is_some_and(|at| at <= now) {
            self.run_worker_cycle(now);
        }

        while let Some(kind) = self.sleep.scheduler_mut().timer_mut().take_expired(now) {
            self.sleep.on_countdown(kind);
        }
        self.sync_ramp(now);
        if let Some((profile, due)) = self.ramp_due {
            if due <= now {
                self.sleep.on_ramp_tick();
                self.ramp_due = Some((profile, due + profile.period()));
            }
        }

        self.sleep.publish(&self.shared.alarm);
        self.drain_telemetry(lines);
    }

    /// Gives the worker every queued command at `now`, as the firmware's
    /// receive wakes it early.
    fn pump(&mut self, now: PrimitiveDateTime) {
        while self.worker_queue.is_empty() == Some(false) {
            self.run_worker_cycle(now);
        }
    }

    fn run_worker_cycle(&mut self, now: PrimitiveDateTime) {
        let command = self.worker_queue.pop_front();
        self.worker.run_cycle(command, now, &mut self.hr_telemetry);
        self.next_cycle = self.worker.cycle_delay().map(|delay| now + delay);
    }

    fn sync_ramp(&mut self, now: PrimitiveDateTime) {
        self.ramp_due = match (self.sleep.ramp().profile(), self.ramp_due) {
            (None, _) => None,
            (Some(profile), Some((tracked, due))) if profile == tracked => Some((tracked, due)),
            (Some(profile), _) => Some((profile, now + profile.period())),
        };
    }

    fn drain_telemetry(&mut self, lines: &mut Vec<String>) {
        drain(&self.hr_telemetry, &mut self.hr_next_id, "hr", lines);
        drain(self.sleep.telemetry(), &mut self.alarm_next_id, "alarm", lines);
    }

    fn report_motor(&mut self, lines: &mut Vec<String>) {
        let motor = self.sleep.ramp().motor();
        let fresh = motor.pulses() - self.reported_pulses;
        self.reported_pulses = motor.pulses();
        if fresh == 0 {
            return;
        }
        match motor.last() {
            Some((strength, pulse)) => lines.push(format!(
                "motor: {fresh} pulse(s), last {strength} for {}ms",
                pulse.as_millis()
            )),
            None => lines.push(format!("motor: {fresh} pulse(s), now idle")),
        }
    }

    fn record_input(&mut self, line: &str) -> io::Result<()> {
        let offset = duration_between(self.started_at, self.clock.get());
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(offset, TranscriptRole::Host, line),
            None => Ok(()),
        }
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let offset = duration_between(self.started_at, self.clock.get());
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(offset, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(())
    }
}

fn drain<const N: usize>(
    recorder: &TelemetryRecorder<PrimitiveDateTime, N>,
    next_id: &mut EventId,
    source: &str,
    lines: &mut Vec<String>,
) {
    let Some(latest) = recorder.latest() else {
        return;
    };
    if latest.id < *next_id {
        return;
    }
    for record in recorder.oldest_first().filter(|record| record.id >= *next_id) {
        lines.push(describe(source, record));
    }
    *next_id = latest.id.wrapping_add(1);
}

fn describe(source: &str, record: &TelemetryRecord<PrimitiveDateTime>) -> String {
    let prefix = match record.event {
        TelemetryEventKind::AlarmFired | TelemetryEventKind::GradualWakeStarted => "ALERT",
        TelemetryEventKind::SettingsLoadFailed(_)
        | TelemetryEventKind::SettingsSaveFailed(_)
        | TelemetryEventKind::RearmFailed
        | TelemetryEventKind::CommandDropped(_) => "WARN",
        _ => "event",
    };
    let detail = match record.details {
        TelemetryPayload::None => String::new(),
        TelemetryPayload::Elapsed(elapsed) => format!(" after {}", format_span(elapsed)),
        TelemetryPayload::Alarm(alarm) => format!(
            " {:02}:{:02} {} in {}s",
            alarm.hours,
            alarm.minutes,
            alarm.recurrence.as_str(),
            alarm.seconds_to_trigger
        ),
        TelemetryPayload::Persistence(err) => format!(" ({err})"),
    };
    format!(
        "{prefix} [{}] {source}: {}{detail}",
        format_clock(record.timestamp),
        record.event
    )
}

fn usage(keyword: &str) -> String {
    match HELP_TOPICS.iter().find(|(name, _)| *name == keyword) {
        Some((_, detail)) => format!("ERR usage {detail}"),
        None => "ERR usage".to_string(),
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("on") {
        Some(true)
    } else if value.eq_ignore_ascii_case("off") {
        Some(false)
    } else {
        None
    }
}

/// Parses `90`, `90s`, `250ms`, `15m` or `8h`.
pub fn parse_span(value: &str) -> Result<Duration, String> {
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("expected a number in `{value}`"))?;
    match unit.to_ascii_lowercase().as_str() {
        "" | "s" => Ok(Duration::from_secs(amount)),
        "ms" => Ok(Duration::from_millis(amount)),
        "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(amount.saturating_mul(3_600))),
        other => Err(format!("unknown unit `{other}`")),
    }
}

fn format_clock(at: PrimitiveDateTime) -> String {
    format!("{:02}:{:02}:{:02}", at.hour(), at.minute(), at.second())
}

fn format_time(at: PrimitiveDateTime) -> String {
    format!("{} {} {}", at.date(), at.weekday(), format_clock(at))
}

fn format_span(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, start: PrimitiveDateTime) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(start)?;
        Ok(logger)
    }

    fn write_header(&mut self, start: PrimitiveDateTime) -> io::Result<()> {
        writeln!(self.writer, "# InfiniSleep emulator transcript")?;
        writeln!(
            self.writer,
            "# Timestamps are virtual seconds since {}",
            format_time(start)
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        offset: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} s] {} {}",
            offset.as_secs(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sleep_core::alarm::AlarmState;
    use sleep_core::heartrate::Estimate;

    fn options(name: &str) -> SessionOptions {
        let store_dir =
            std::env::temp_dir().join(format!("infinisleep-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&store_dir);
        SessionOptions {
            start: datetime!(2024-03-04 22:00),
            store_dir,
            transcript: None,
        }
    }

    fn contains(lines: &[String], needle: &str) -> bool {
        lines.iter().any(|line| line.contains(needle))
    }

    #[test]
    fn alarm_fires_in_virtual_time() {
        let shared = SharedState::new();
        let mut session = Session::new(&shared, options("fires")).unwrap();
        session.start().unwrap();

        let lines = session.handle_command("alarm set 07:00").unwrap();
        assert_eq!(lines[0], "ok");
        let lines = session.handle_command("alarm on").unwrap();
        assert!(contains(&lines, "armed for 2024-03-05 07:00"), "{lines:?}");
        assert_eq!(shared.alarm.state(), AlarmState::Armed);

        let lines = session.handle_command("advance 9h").unwrap();
        assert!(contains(&lines, "ALERT [07:00:00] alarm: alarm-fired"), "{lines:?}");
        assert!(contains(&lines, "motor:"), "{lines:?}");
        assert_eq!(shared.alarm.state(), AlarmState::Alerting);

        let lines = session.handle_command("alarm stop").unwrap();
        assert!(contains(&lines, "stopped, alarm disabled"), "{lines:?}");
        assert_eq!(session.ramp_due, None);
    }

    #[test]
    fn heart_rate_converges_on_the_simulated_pulse() {
        let shared = SharedState::new();
        let mut session = Session::new(&shared, options("pulse")).unwrap();
        session.start().unwrap();

        session.handle_command("bpm 60").unwrap();
        session.handle_command("hr start").unwrap();
        assert_eq!(shared.estimate.load(), Estimate::not_enough_data());

        session.handle_command("advance 10s").unwrap();
        assert_eq!(shared.estimate.load(), Estimate::running(60));

        session.handle_command("touch off").unwrap();
        session.handle_command("advance 1s").unwrap();
        assert_eq!(shared.estimate.load(), Estimate::not_enough_data());
    }

    #[test]
    fn emulator_commands_validate_arguments() {
        let shared = SharedState::new();
        let mut session = Session::new(&shared, options("args")).unwrap();

        let lines = session.handle_command("advance 5x").unwrap();
        assert!(lines[0].starts_with("ERR syntax"), "{lines:?}");
        let lines = session.handle_command("bpm 400").unwrap();
        assert!(lines[0].starts_with("ERR"), "{lines:?}");
        let lines = session.handle_command("alarm set 24:00").unwrap();
        assert!(lines[0].starts_with("ERR alarm error"), "{lines:?}");
        let lines = session.handle_command("touch").unwrap();
        assert!(lines[0].starts_with("ERR usage"), "{lines:?}");
    }

    #[test]
    fn shutdown_persists_and_restart_restores() {
        let shared = SharedState::new();
        let options = options("restart");
        let store_dir = options.store_dir.clone();
        {
            let mut session = Session::new(&shared, options).unwrap();
            session.start().unwrap();
            session.handle_command("alarm set 06:30").unwrap();
            session.handle_command("alarm recur daily").unwrap();
            session.handle_command("alarm on").unwrap();
            session.shutdown().unwrap();
        }
        assert_eq!(
            fs::read(store_dir.join("wakealarm.dat")).unwrap(),
            vec![1, 6, 30, 1, 1]
        );

        let shared = SharedState::new();
        let mut session = Session::new(
            &shared,
            SessionOptions {
                start: datetime!(2024-03-05 12:00),
                store_dir: store_dir.clone(),
                transcript: None,
            },
        )
        .unwrap();
        let lines = session.start().unwrap();
        assert!(contains(&lines, "alarm armed 06:30 daily"), "{lines:?}");
        assert_eq!(shared.alarm.seconds_to_alarm(), 18 * 3_600 + 30 * 60);

        fs::remove_dir_all(store_dir).unwrap();
    }

    #[test]
    fn spans_parse_with_units() {
        assert_eq!(parse_span("90"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_span("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_span("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_span("8H"), Ok(Duration::from_secs(8 * 3_600)));
        assert!(parse_span("m").is_err());
    }
}
