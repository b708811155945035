//! PineTime board drivers: HRS3300 optical sensor on TWIM0 and the
//! active-low vibration motor on P0.16.

use embassy_nrf::gpio::{Level, Output};
use embassy_nrf::twim::{self, Twim};
use hrs3300::Hrs3300;
use sleep_core::heartrate::{Sample, SensorDriver};

use crate::haptic::MotorLine;

/// HRS3300 behind the measurement worker's `SensorDriver` seam.
///
/// Bus errors are logged and counted; a failed read repeats the last good
/// sample so the preprocessor sees a flat signal rather than a spike.
pub struct Hrs3300Sensor<TWI>
where
    TWI: twim::Instance,
{
    sensor: Hrs3300<Twim<'static, TWI>>,
    last: Sample,
    bus_errors: u32,
}

impl<TWI> Hrs3300Sensor<TWI>
where
    TWI: twim::Instance,
{
    pub fn new(bus: Twim<'static, TWI>) -> Self {
        let mut sensor = Hrs3300::new(bus);
        let mut bus_errors = 0;
        if sensor.init().is_err() {
            defmt::warn!("hrs3300: init failed");
            bus_errors += 1;
        }
        Self {
            sensor,
            last: Sample::new(0, 0),
            bus_errors,
        }
    }

    pub fn bus_errors(&self) -> u32 {
        self.bus_errors
    }

    fn note_error(&mut self, operation: &'static str) {
        self.bus_errors = self.bus_errors.wrapping_add(1);
        defmt::warn!("hrs3300: {} failed ({} total)", operation, self.bus_errors);
    }
}

impl<TWI> SensorDriver for Hrs3300Sensor<TWI>
where
    TWI: twim::Instance,
{
    fn enable(&mut self) {
        if self.sensor.enable_hrs().is_err() {
            self.note_error("enable_hrs");
        }
        if self.sensor.enable_oscillator().is_err() {
            self.note_error("enable_oscillator");
        }
    }

    fn disable(&mut self) {
        if self.sensor.disable_hrs().is_err() {
            self.note_error("disable_hrs");
        }
        if self.sensor.disable_oscillator().is_err() {
            self.note_error("disable_oscillator");
        }
    }

    fn read_sample(&mut self) -> Sample {
        let ir = self.sensor.read_hrs();
        let ambient = self.sensor.read_als();
        match (ir, ambient) {
            (Ok(ir), Ok(ambient)) => {
                self.last = Sample::new(ir, ambient);
            }
            _ => self.note_error("read"),
        }
        self.last
    }
}

/// Motor GPIO. The PineTime motor has no PWM stage, so any non-zero
/// strength switches it fully on.
pub struct VibrationMotor {
    pin: Output<'static>,
}

impl VibrationMotor {
    pub fn new(pin: Output<'static>) -> Self {
        Self { pin }
    }
}

impl MotorLine for VibrationMotor {
    fn drive(&mut self, strength: u8) {
        let level = if strength == 0 { Level::High } else { Level::Low };
        self.pin.set_level(level);
    }
}
