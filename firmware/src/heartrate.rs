//! Channel plumbing and the async driver loop for the measurement worker.

use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use embassy_time::with_timeout;
use sleep_core::heartrate::{
    COMMAND_QUEUE_CAPACITY, Command, CommandEnqueueError, CommandQueueProducer, HeartRateSink,
    MeasurementStateMachine, SensorDriver, SignalPreprocessor,
};
use sleep_core::telemetry::TelemetrySink;

use crate::clock::{FirmwareInstant, to_embassy};
use crate::status;
use crate::sync::QueueMutex;

/// Bounded queue between UI/system code and the measurement worker.
pub type CommandChannel = Channel<QueueMutex, Command, COMMAND_QUEUE_CAPACITY>;
pub type CommandSender<'a> = Sender<'a, QueueMutex, Command, COMMAND_QUEUE_CAPACITY>;
pub type CommandReceiver<'a> = Receiver<'a, QueueMutex, Command, COMMAND_QUEUE_CAPACITY>;

pub type FirmwareMachine<'a, S, P, H> = MeasurementStateMachine<'a, S, P, H, FirmwareInstant>;

/// Adapter that lets `HeartRateController` enqueue onto an embassy channel.
///
/// A full queue drops the command and bumps the shared drop counter; the
/// worker never sees it.
#[derive(Clone, Copy)]
pub struct ChannelProducer<'a> {
    sender: CommandSender<'a>,
}

impl<'a> ChannelProducer<'a> {
    pub const fn new(sender: CommandSender<'a>) -> Self {
        Self { sender }
    }
}

impl CommandQueueProducer for ChannelProducer<'_> {
    type Error = ();

    fn try_enqueue(&mut self, command: Command) -> Result<(), CommandEnqueueError<Self::Error>> {
        match self.sender.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                let total = status::record_command_dropped();
                log_dropped(command, total);
                Err(CommandEnqueueError::QueueFull)
            }
        }
    }

    fn capacity(&self) -> Option<usize> {
        Some(COMMAND_QUEUE_CAPACITY)
    }

    fn len(&self) -> Option<usize> {
        Some(self.sender.len())
    }
}

/// Drives the worker forever: wait up to the state's cycle delay for one
/// command, then run a single cycle. Stopped with the screen off blocks on
/// the queue.
pub async fn run_worker<S, P, H, T>(
    mut machine: FirmwareMachine<'_, S, P, H>,
    commands: CommandReceiver<'_>,
    telemetry: &mut T,
) -> !
where
    S: SensorDriver,
    P: SignalPreprocessor,
    H: HeartRateSink,
    T: TelemetrySink<FirmwareInstant>,
{
    loop {
        let command = match machine.cycle_delay() {
            Some(delay) => with_timeout(to_embassy(delay), commands.receive()).await.ok(),
            None => Some(commands.receive().await),
        };
        machine.run_cycle(command, FirmwareInstant::now(), telemetry);
    }
}

#[cfg(target_os = "none")]
fn log_dropped(command: Command, total: u32) {
    defmt::warn!("heartrate: dropped {} (queue full, {} total)", command.as_str(), total);
}

#[cfg(not(target_os = "none"))]
fn log_dropped(command: Command, total: u32) {
    println!("heartrate: dropped {command} (queue full, {total} total)");
}
