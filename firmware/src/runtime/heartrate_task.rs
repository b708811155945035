use embassy_nrf::peripherals::TWISPI0;
use sleep_core::heartrate::{BasicPpg, SharedEstimate};

use super::COMMAND_QUEUE;
use crate::clock::FirmwareInstant;
use crate::heartrate::{FirmwareMachine, run_worker};
use crate::hw::Hrs3300Sensor;
use crate::telemetry::LogTelemetry;

#[embassy_executor::task]
pub async fn run(
    machine: FirmwareMachine<'static, Hrs3300Sensor<TWISPI0>, BasicPpg, &'static SharedEstimate>,
    mut telemetry: LogTelemetry<FirmwareInstant>,
) -> ! {
    run_worker(machine, COMMAND_QUEUE.receiver(), &mut telemetry).await
}
