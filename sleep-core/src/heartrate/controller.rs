use super::{
    BackgroundInterval, BackgroundIntervalCell, Command, CommandEnqueueError,
    CommandQueueProducer, Estimate, SharedEstimate,
};

/// Front-end used by UI and system code to drive the measurement worker.
///
/// Every request is a non-blocking enqueue. When the queue is full the
/// command is dropped and the error is handed back; the published estimate is
/// only changed when the worker will actually see the request.
pub struct HeartRateController<'a, P> {
    producer: P,
    estimate: &'a SharedEstimate,
    interval: &'a BackgroundIntervalCell,
}

impl<'a, P> HeartRateController<'a, P>
where
    P: CommandQueueProducer,
{
    pub fn new(
        producer: P,
        estimate: &'a SharedEstimate,
        interval: &'a BackgroundIntervalCell,
    ) -> Self {
        Self {
            producer,
            estimate,
            interval,
        }
    }

    pub fn start(&mut self) -> Result<(), CommandEnqueueError<P::Error>> {
        self.producer.try_enqueue(Command::StartMeasurement)?;
        self.estimate.store(Estimate::not_enough_data());
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), CommandEnqueueError<P::Error>> {
        self.producer.try_enqueue(Command::StopMeasurement)?;
        self.estimate.store(Estimate::stopped());
        Ok(())
    }

    /// Forwards a screen-on event.
    pub fn wake_up(&mut self) -> Result<(), CommandEnqueueError<P::Error>> {
        self.producer.try_enqueue(Command::WakeUp)
    }

    /// Forwards a screen-off event.
    pub fn go_to_sleep(&mut self) -> Result<(), CommandEnqueueError<P::Error>> {
        self.producer.try_enqueue(Command::GoToSleep)
    }

    pub fn estimate(&self) -> Estimate {
        self.estimate.load()
    }

    pub fn background_interval(&self) -> BackgroundInterval {
        self.interval.load()
    }

    pub fn set_background_interval(&self, interval: BackgroundInterval) {
        self.interval.store(interval);
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn producer_mut(&mut self) -> &mut P {
        &mut self.producer
    }
}
