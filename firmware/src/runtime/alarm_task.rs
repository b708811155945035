use sleep_core::persist::MemoryStore;

use super::ALARM_QUEUE;
use crate::alarm::AlarmService;
use crate::clock::{EmbassyClock, SystemWallClock};
use crate::haptic::MotorHandle;

/// The flash record store is not wired up yet; settings live in RAM.
pub type FirmwareAlarmService = AlarmService<
    'static,
    &'static SystemWallClock,
    EmbassyClock,
    MotorHandle<'static>,
    MemoryStore,
>;

#[embassy_executor::task]
pub async fn run(service: FirmwareAlarmService) -> ! {
    service.run(ALARM_QUEUE.receiver()).await
}
