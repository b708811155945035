//! Line console shared by the emulator and any host front-end.
//!
//! [`grammar`] turns a text line into a [`ConsoleCommand`]; [`commands`]
//! executes it against the heart-rate front-end and the sleep session.

pub mod commands;
pub mod grammar;

pub use commands::{ConsoleError, Reply, StatusReport, execute, execute_line};
pub use grammar::{AlarmCommand, ConsoleCommand, HELP_TEXT, HeartRateCommand, ParseError, parse};
