//! Vibration motor plumbing: the ramp engine signals pulses, the motor task
//! owns the pin and times each pulse.

use core::time::Duration;

use embassy_futures::select::{Either, select};
use embassy_sync::signal::Signal;
use embassy_time::Timer;
use sleep_core::haptic::MotorDriver;

use crate::clock::to_embassy;
use crate::sync::QueueMutex;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MotorCommand {
    Pulse { strength: u8, duration: Duration },
    Stop,
}

/// Latest motor request; a newer command replaces one the task has not seen.
pub type MotorSignal = Signal<QueueMutex, MotorCommand>;

/// Output stage behind the motor. `strength` is a percentage; zero is off.
pub trait MotorLine {
    fn drive(&mut self, strength: u8);
}

/// `MotorDriver` handed to the ramp engine. Never blocks.
#[derive(Clone, Copy)]
pub struct MotorHandle<'a> {
    signal: &'a MotorSignal,
}

impl<'a> MotorHandle<'a> {
    pub const fn new(signal: &'a MotorSignal) -> Self {
        Self { signal }
    }
}

impl MotorDriver for MotorHandle<'_> {
    fn run(&mut self, strength: u8, duration: Duration) {
        let command = if strength == 0 || duration.is_zero() {
            MotorCommand::Stop
        } else {
            MotorCommand::Pulse { strength, duration }
        };
        self.signal.signal(command);
    }

    fn stop(&mut self) {
        self.signal.signal(MotorCommand::Stop);
    }
}

/// Applies motor commands forever. A command arriving mid-pulse takes over
/// immediately; otherwise the line is released when the pulse ends.
pub async fn run_motor<L: MotorLine>(signal: &MotorSignal, mut line: L) -> ! {
    let mut pending = None;
    loop {
        let command = match pending.take() {
            Some(command) => command,
            None => signal.wait().await,
        };
        match command {
            MotorCommand::Stop => line.drive(0),
            MotorCommand::Pulse { strength, duration } => {
                line.drive(strength);
                match select(signal.wait(), Timer::after(to_embassy(duration))).await {
                    Either::First(next) => pending = Some(next),
                    Either::Second(()) => line.drive(0),
                }
            }
        }
    }
}
