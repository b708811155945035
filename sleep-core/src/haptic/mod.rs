//! Haptic intensity ramps played while the wake alarm is alerting.
//!
//! A ramp is a periodic tick over a `(strength, pulse)` pair. The engine only
//! computes and applies values; who calls [`HapticRampEngine::tick`] and when
//! is up to the timer task, which uses [`HapticRampEngine::period`] to pace it.

use core::fmt;
use core::time::Duration;

/// Strength used at 100 % when no other base is configured.
pub const DEFAULT_BASE_STRENGTH: u8 = 100;
/// Longest pulse the motor is ever asked for.
pub const DEFAULT_MAX_PULSE_MS: u16 = 500;
/// Pulse length every ramp starts from.
pub const INITIAL_PULSE_MS: u16 = 100;

/// Vibration motor seen as a duration-based pulse primitive.
pub trait MotorDriver {
    /// Runs the motor at `strength` for `duration`, then lets it fall idle.
    fn run(&mut self, strength: u8, duration: Duration);
    /// Forces the motor output to zero immediately.
    fn stop(&mut self);
}

impl<M: MotorDriver + ?Sized> MotorDriver for &mut M {
    fn run(&mut self, strength: u8, duration: Duration) {
        (**self).run(strength, duration);
    }

    fn stop(&mut self) {
        (**self).stop();
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RampProfile {
    /// Alarm ring: slowly softer, progressively longer pulses.
    WakeAlarm,
    /// Pre-alarm breathing pattern oscillating around 80 % strength.
    NaturalWake,
}

impl RampProfile {
    /// Logical tick period of the profile.
    #[must_use]
    pub const fn period(self) -> Duration {
        match self {
            RampProfile::WakeAlarm => Duration::from_secs(1),
            RampProfile::NaturalWake => Duration::from_secs(30),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RampProfile::WakeAlarm => "wake-alarm",
            RampProfile::NaturalWake => "natural-wake",
        }
    }
}

impl fmt::Display for RampProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds applied to every ramp value before it reaches the motor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RampConfig {
    pub base_strength: u8,
    pub max_pulse_ms: u16,
}

impl RampConfig {
    /// `percent` % of the base strength, never below one unit for non-zero
    /// percentages so small bases still move.
    #[must_use]
    pub fn percent_of_base(&self, percent: u8) -> i32 {
        let value = i32::from(self.base_strength) * i32::from(percent) / 100;
        if percent > 0 && self.base_strength > 0 {
            value.max(1)
        } else {
            value
        }
    }
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            base_strength: DEFAULT_BASE_STRENGTH,
            max_pulse_ms: DEFAULT_MAX_PULSE_MS,
        }
    }
}

/// Values most recently applied to the motor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RampState {
    pub strength: u8,
    pub pulse_ms: u16,
}

impl RampState {
    #[must_use]
    pub fn initial(config: &RampConfig) -> Self {
        clamp(config, config.percent_of_base(80), i32::from(INITIAL_PULSE_MS))
    }

    #[must_use]
    pub fn pulse(&self) -> Duration {
        Duration::from_millis(u64::from(self.pulse_ms))
    }

    /// Value of the next tick under `profile`.
    #[must_use]
    pub fn advance(self, profile: RampProfile, config: &RampConfig) -> Self {
        let strength = i32::from(self.strength);
        let pulse = i32::from(self.pulse_ms);

        let (strength, pulse) = match profile {
            RampProfile::WakeAlarm => {
                let strength = if strength > config.percent_of_base(40) {
                    strength - config.percent_of_base(1)
                } else {
                    strength
                };
                let pulse = if pulse < i32::from(config.max_pulse_ms) {
                    pulse + 6
                } else {
                    pulse
                };
                (strength, pulse)
            }
            RampProfile::NaturalWake => {
                let strength = if strength > config.percent_of_base(80) {
                    strength - config.percent_of_base(5)
                } else {
                    strength + config.percent_of_base(10)
                };
                let pulse = if pulse <= 100 { pulse + 25 } else { pulse - 50 };
                (strength, pulse)
            }
        };

        clamp(config, strength, pulse)
    }
}

fn clamp(config: &RampConfig, strength: i32, pulse: i32) -> RampState {
    let strength = strength.clamp(0, i32::from(config.base_strength));
    let pulse = pulse.clamp(0, i32::from(config.max_pulse_ms));
    RampState {
        strength: u8::try_from(strength).unwrap_or(config.base_strength),
        pulse_ms: u16::try_from(pulse).unwrap_or(config.max_pulse_ms),
    }
}

/// Drives one ramp profile at a time on a [`MotorDriver`].
pub struct HapticRampEngine<M> {
    motor: M,
    config: RampConfig,
    active: Option<(RampProfile, RampState)>,
    ticks: u32,
}

impl<M> HapticRampEngine<M>
where
    M: MotorDriver,
{
    pub fn new(motor: M) -> Self {
        Self::with_config(motor, RampConfig::default())
    }

    pub fn with_config(motor: M, config: RampConfig) -> Self {
        Self {
            motor,
            config,
            active: None,
            ticks: 0,
        }
    }

    pub fn config(&self) -> RampConfig {
        self.config
    }

    pub fn motor(&self) -> &M {
        &self.motor
    }

    pub fn motor_mut(&mut self) -> &mut M {
        &mut self.motor
    }

    pub fn profile(&self) -> Option<RampProfile> {
        self.active.map(|(profile, _)| profile)
    }

    pub fn state(&self) -> Option<RampState> {
        self.active.map(|(_, state)| state)
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Ticks applied since the current profile started.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Tick period of the running profile.
    pub fn period(&self) -> Option<Duration> {
        self.profile().map(RampProfile::period)
    }

    /// Starts `profile` from its initial values, replacing whatever was
    /// running, and applies the first pulse right away.
    pub fn start(&mut self, profile: RampProfile) -> RampState {
        let state = RampState::initial(&self.config);
        self.active = Some((profile, state));
        self.ticks = 0;
        self.apply(state);
        state
    }

    /// Advances the running profile by one tick. Returns `None` when stopped.
    pub fn tick(&mut self) -> Option<RampState> {
        let (profile, state) = self.active?;
        let next = state.advance(profile, &self.config);
        self.active = Some((profile, next));
        self.ticks = self.ticks.saturating_add(1);
        self.apply(next);
        Some(next)
    }

    pub fn stop(&mut self) {
        self.active = None;
        self.ticks = 0;
        self.motor.stop();
    }

    fn apply(&mut self, state: RampState) {
        self.motor.run(state.strength, state.pulse());
    }
}
