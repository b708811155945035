//! Producer side of the measurement worker's command queue.

use core::fmt;

use super::Command;

/// Depth of the worker's command queue. Producers never block; a full queue
/// drops the command.
pub const COMMAND_QUEUE_CAPACITY: usize = 10;

/// Error returned when a command could not be handed to the worker.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandEnqueueError<E = ()> {
    /// The queue is full and the command was dropped.
    QueueFull,
    /// The consumer side of the queue no longer exists.
    Disconnected,
    /// Transport-specific failure.
    Other(E),
}

impl<E: fmt::Debug> fmt::Display for CommandEnqueueError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandEnqueueError::QueueFull => f.write_str("command queue full"),
            CommandEnqueueError::Disconnected => f.write_str("command queue disconnected"),
            CommandEnqueueError::Other(err) => write!(f, "command queue error: {err:?}"),
        }
    }
}

/// Non-blocking producer handle for the worker's queue. Implementations must
/// be safe to call from interrupt-style contexts.
pub trait CommandQueueProducer {
    /// Transport-specific error type.
    type Error;

    /// Attempts to enqueue a command without blocking.
    fn try_enqueue(&mut self, command: Command) -> Result<(), CommandEnqueueError<Self::Error>>;

    /// Returns the queue capacity if it is known at compile- or run-time.
    fn capacity(&self) -> Option<usize> {
        None
    }

    /// Returns the current queue depth if it can be observed.
    fn len(&self) -> Option<usize> {
        None
    }

    /// Returns `true` when the queue reports that it currently holds no items.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|current| current == 0)
    }

    /// Remaining slots when both capacity and length are observable.
    fn remaining(&self) -> Option<usize> {
        match (self.capacity(), self.len()) {
            (Some(capacity), Some(len)) => Some(capacity.saturating_sub(len)),
            _ => None,
        }
    }
}

impl<P: CommandQueueProducer + ?Sized> CommandQueueProducer for &mut P {
    type Error = P::Error;

    fn try_enqueue(&mut self, command: Command) -> Result<(), CommandEnqueueError<Self::Error>> {
        (**self).try_enqueue(command)
    }

    fn capacity(&self) -> Option<usize> {
        (**self).capacity()
    }

    fn len(&self) -> Option<usize> {
        (**self).len()
    }
}

/// Fixed-capacity in-memory queue used by host tooling and tests.
impl<const N: usize> CommandQueueProducer for heapless::Deque<Command, N> {
    type Error = ();

    fn try_enqueue(&mut self, command: Command) -> Result<(), CommandEnqueueError<Self::Error>> {
        self.push_back(command)
            .map_err(|_| CommandEnqueueError::QueueFull)
    }

    fn capacity(&self) -> Option<usize> {
        Some(N)
    }

    fn len(&self) -> Option<usize> {
        Some(heapless::Deque::len(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Deque;

    #[test]
    fn deque_drops_commands_when_full() {
        let mut queue: Deque<Command, COMMAND_QUEUE_CAPACITY> = Deque::new();
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            queue.try_enqueue(Command::WakeUp).unwrap();
        }

        assert_eq!(CommandQueueProducer::remaining(&queue), Some(0));
        assert_eq!(
            queue.try_enqueue(Command::StartMeasurement),
            Err(CommandEnqueueError::QueueFull)
        );
        assert_eq!(queue.pop_front(), Some(Command::WakeUp));
    }
}
