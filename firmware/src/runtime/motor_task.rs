use super::MOTOR_SIGNAL;
use crate::haptic::run_motor;
use crate::hw::VibrationMotor;

#[embassy_executor::task]
pub async fn run(motor: VibrationMotor) -> ! {
    run_motor(&MOTOR_SIGNAL, motor).await
}
