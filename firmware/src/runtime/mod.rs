use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::{bind_interrupts, peripherals};
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::Timer;
use sleep_core::heartrate::{BasicPpg, HeartRateController, MeasurementStateMachine};
use sleep_core::persist::MemoryStore;
use sleep_core::session::InfiniSleepController;
use sleep_core::timer::DeadlineTimer;
use static_cell::StaticCell;

use crate::alarm::{AlarmChannel, AlarmRequests, AlarmService};
use crate::clock::{BOOT_EPOCH, EmbassyClock, SystemWallClock};
use crate::haptic::{MotorHandle, MotorSignal};
use crate::heartrate::{ChannelProducer, CommandChannel};
use crate::hw::{Hrs3300Sensor, VibrationMotor};
use crate::status::{self, StatusSnapshot};
use crate::telemetry::LogTelemetry;

mod alarm_task;
mod button_task;
mod heartrate_task;
mod motor_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

bind_interrupts!(struct Irqs {
    SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

pub(super) static COMMAND_QUEUE: CommandChannel = Channel::new();
pub(super) static ALARM_QUEUE: AlarmChannel = Channel::new();
pub(super) static MOTOR_SIGNAL: MotorSignal = Signal::new();
pub(super) static WALL_CLOCK: SystemWallClock = SystemWallClock::new(EmbassyClock, BOOT_EPOCH);
static TWIM_BUFFER: StaticCell<[u8; 16]> = StaticCell::new();

const STATUS_LOG_PERIOD_SECS: u64 = 60;

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let p = embassy_nrf::init(embassy_nrf::config::Config::default());

    let mut bus_config = twim::Config::default();
    bus_config.frequency = twim::Frequency::K400;
    let bus = Twim::new(
        p.TWISPI0,
        Irqs,
        p.P0_06,
        p.P0_07,
        bus_config,
        TWIM_BUFFER.init([0; 16]),
    );
    let machine = MeasurementStateMachine::new(
        Hrs3300Sensor::new(bus),
        BasicPpg::new(),
        &status::ESTIMATE,
        &status::BACKGROUND_INTERVAL,
    );

    let session = InfiniSleepController::new(
        &WALL_CLOCK,
        DeadlineTimer::new(EmbassyClock),
        MotorHandle::new(&MOTOR_SIGNAL),
        MemoryStore::new(),
        LogTelemetry::new("alarm"),
    );
    let alarm = AlarmService::new(session, &status::ALARM_STATUS);

    let motor = VibrationMotor::new(Output::new(p.P0_16, Level::High, OutputDrive::Standard));
    // P0.15 powers the side button; P0.13 reads it.
    let button_enable = Output::new(p.P0_15, Level::High, OutputDrive::Standard);
    let button = Input::new(p.P0_13, Pull::None);

    let mut heart_rate = HeartRateController::new(
        ChannelProducer::new(COMMAND_QUEUE.sender()),
        &status::ESTIMATE,
        &status::BACKGROUND_INTERVAL,
    );
    if heart_rate.start().is_err() {
        defmt::warn!("heartrate: initial start dropped");
    }

    spawner
        .spawn(motor_task::run(motor))
        .expect("failed to spawn motor task");
    spawner
        .spawn(heartrate_task::run(machine, LogTelemetry::new("hr")))
        .expect("failed to spawn heart-rate task");
    spawner
        .spawn(alarm_task::run(alarm))
        .expect("failed to spawn alarm task");
    spawner
        .spawn(button_task::run(
            button,
            button_enable,
            heart_rate,
            AlarmRequests::new(ALARM_QUEUE.sender()),
        ))
        .expect("failed to spawn button task");

    loop {
        Timer::after_secs(STATUS_LOG_PERIOD_SECS).await;
        log_snapshot(&status::snapshot());
    }
}

fn log_snapshot(snapshot: &StatusSnapshot) {
    defmt::info!(
        "status: hr={} {} bg={} alarm={} {=u8:02}:{=u8:02} {} in={}s drops={}/{}",
        snapshot.estimate.state.as_str(),
        snapshot.estimate.bpm,
        snapshot.background.as_str(),
        snapshot.alarm_state.as_str(),
        snapshot.alarm_time.0,
        snapshot.alarm_time.1,
        snapshot.recurrence.as_str(),
        snapshot.seconds_to_alarm,
        snapshot.commands_dropped,
        snapshot.alarm_requests_dropped
    );
}
