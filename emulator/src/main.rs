use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use crossterm::style::Stylize;
use time::macros::format_description;
use time::PrimitiveDateTime;

use infinisleep_emulator::session::{Session, SessionOptions, SharedState};

const USAGE: &str = "Usage: infinisleep-emulator [--start YYYY-MM-DDTHH:MM] [--store <dir>] [--transcript <path>|--no-transcript]";

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    let shared = SharedState::new();
    let mut session = Session::new(&shared, options)?;
    let mut line = String::new();

    writeln!(
        writer,
        "InfiniSleep emulator ready. Type `help` for commands or `exit` to quit."
    )?;
    print_lines(&mut writer, &session.start()?)?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            break;
        }

        let responses = session.handle_command(trimmed)?;
        print_lines(&mut writer, &responses)?;
    }

    print_lines(&mut writer, &session.shutdown()?)?;
    writeln!(writer, "Session closed.")?;
    Ok(())
}

fn print_lines(writer: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        if line.starts_with("ALERT") {
            writeln!(writer, "{}", line.as_str().red().bold())?;
        } else if line.starts_with("ERR") || line.starts_with("WARN") {
            writeln!(writer, "{}", line.as_str().yellow())?;
        } else {
            writeln!(writer, "{line}")?;
        }
    }
    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options() -> Result<SessionOptions, String> {
    let mut options = SessionOptions::default();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--start" => {
                let value = args.next().ok_or("Expected value after --start")?;
                options.start = parse_start(&value)?;
            }
            "--store" => {
                let value = args.next().ok_or("Expected value after --store")?;
                options.store_dir = PathBuf::from(value);
            }
            "--transcript" => {
                let value = args.next().ok_or("Expected value after --transcript")?;
                options.transcript = Some(PathBuf::from(value));
            }
            "--no-transcript" => options.transcript = None,
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }
    Ok(options)
}

fn parse_start(value: &str) -> Result<PrimitiveDateTime, String> {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]");
    PrimitiveDateTime::parse(value, format).map_err(|err| format!("Bad --start `{value}`: {err}"))
}
