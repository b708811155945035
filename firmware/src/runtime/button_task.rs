use embassy_nrf::gpio::{Input, Output};
use embassy_time::Timer;
use sleep_core::heartrate::HeartRateController;

use crate::alarm::{AlarmRequest, AlarmRequests};
use crate::heartrate::ChannelProducer;
use crate::status;

const DEBOUNCE_MS: u64 = 50;

/// Side button: silences an active alarm, otherwise toggles the screen.
#[embassy_executor::task]
pub async fn run(
    mut button: Input<'static>,
    _enable: Output<'static>,
    mut heart_rate: HeartRateController<'static, ChannelProducer<'static>>,
    alarms: AlarmRequests<'static>,
) -> ! {
    let mut screen_on = true;
    loop {
        button.wait_for_rising_edge().await;

        if status::ALARM_STATUS.is_alerting()
            || status::ALARM_STATUS.state() == sleep_core::alarm::AlarmState::GradualWake
        {
            // Drops are counted and logged by the request queue.
            let _ = alarms.request(AlarmRequest::Stop);
        } else {
            screen_on = !screen_on;
            let sent = if screen_on {
                heart_rate.wake_up()
            } else {
                heart_rate.go_to_sleep()
            };
            if sent.is_err() {
                screen_on = !screen_on;
            }
        }

        Timer::after_millis(DEBOUNCE_MS).await;
    }
}
