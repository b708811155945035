use core::time::Duration;

use sleep_core::haptic::{HapticRampEngine, MotorDriver, RampConfig, RampProfile, RampState};

#[derive(Default)]
struct Motor {
    pulses: u32,
    last: Option<(u8, Duration)>,
}

impl MotorDriver for Motor {
    fn run(&mut self, strength: u8, duration: Duration) {
        self.pulses += 1;
        self.last = Some((strength, duration));
    }

    fn stop(&mut self) {
        self.last = None;
    }
}

fn tick_n(engine: &mut HapticRampEngine<Motor>, ticks: u32) -> RampState {
    let mut state = engine.state().expect("ramp should be running");
    for _ in 0..ticks {
        state = engine.tick().expect("ramp should be running");
    }
    state
}

#[test]
fn wake_alarm_ramp_softens_to_the_floor_and_lengthens_to_the_cap() {
    let mut engine = HapticRampEngine::new(Motor::default());
    let initial = engine.start(RampProfile::WakeAlarm);
    assert_eq!(
        initial,
        RampState {
            strength: 80,
            pulse_ms: 100
        }
    );
    assert_eq!(
        engine.motor().last,
        Some((80, Duration::from_millis(100)))
    );

    let after_40 = tick_n(&mut engine, 40);
    assert_eq!(after_40.strength, 40);
    assert_eq!(after_40.pulse_ms, 340);

    let after_67 = tick_n(&mut engine, 27);
    assert_eq!(after_67.strength, 40);
    assert_eq!(after_67.pulse_ms, 500);

    let later = tick_n(&mut engine, 100);
    assert_eq!(later, after_67);
    assert_eq!(engine.ticks(), 167);
    assert_eq!(engine.motor().pulses, 168);
}

#[test]
fn natural_wake_ramp_oscillates_inside_its_band() {
    let mut engine = HapticRampEngine::new(Motor::default());
    engine.start(RampProfile::NaturalWake);

    let mut seen_high = false;
    let mut seen_low = false;
    for _ in 0..200 {
        let state = engine.tick().unwrap();
        assert!((80..=90).contains(&state.strength), "{state:?}");
        assert!((75..=125).contains(&state.pulse_ms), "{state:?}");
        seen_high |= state.strength == 90;
        seen_low |= state.pulse_ms == 75;
    }
    assert!(seen_high && seen_low);
}

#[test]
fn stop_zeroes_the_motor_and_ends_ticks() {
    let mut engine = HapticRampEngine::new(Motor::default());
    engine.start(RampProfile::NaturalWake);
    engine.tick();

    engine.stop();
    assert!(!engine.is_running());
    assert_eq!(engine.motor().last, None);
    assert_eq!(engine.tick(), None);
    assert_eq!(engine.period(), None);
}

#[test]
fn restart_switches_profile_from_initial_values() {
    let mut engine = HapticRampEngine::new(Motor::default());
    engine.start(RampProfile::NaturalWake);
    tick_n(&mut engine, 3);

    let state = engine.start(RampProfile::WakeAlarm);
    assert_eq!(state, RampState::initial(&RampConfig::default()));
    assert_eq!(engine.ticks(), 0);
    assert_eq!(engine.period(), Some(Duration::from_secs(1)));
}

#[test]
fn values_stay_clamped_to_a_small_base() {
    let config = RampConfig {
        base_strength: 10,
        max_pulse_ms: 200,
    };
    let mut engine = HapticRampEngine::with_config(Motor::default(), config);

    engine.start(RampProfile::WakeAlarm);
    let state = tick_n(&mut engine, 500);
    assert_eq!(state.strength, 4);
    assert_eq!(state.pulse_ms, 200);

    engine.start(RampProfile::NaturalWake);
    for _ in 0..50 {
        let state = engine.tick().unwrap();
        assert!(state.strength <= config.base_strength);
        assert!(state.pulse_ms <= config.max_pulse_ms);
    }
}
