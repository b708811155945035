use portable_atomic::{AtomicU32, Ordering};

use super::{Estimate, EstimateState, HeartRateSink};

/// Latest estimate packed into a single atomic word so readers on other
/// threads always observe a consistent (state, bpm) pair.
#[derive(Debug)]
pub struct SharedEstimate {
    packed: AtomicU32,
}

impl SharedEstimate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            packed: AtomicU32::new(pack(Estimate::stopped())),
        }
    }

    pub fn load(&self) -> Estimate {
        unpack(self.packed.load(Ordering::Acquire))
    }

    pub fn store(&self, estimate: Estimate) {
        self.packed.store(pack(estimate), Ordering::Release);
    }

    pub fn state(&self) -> EstimateState {
        self.load().state
    }

    /// Current bpm, or zero unless a measurement is running.
    pub fn bpm(&self) -> u16 {
        let estimate = self.load();
        if estimate.state == EstimateState::Running {
            estimate.bpm
        } else {
            0
        }
    }
}

impl Default for SharedEstimate {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartRateSink for &SharedEstimate {
    fn update(&mut self, estimate: Estimate) {
        self.store(estimate);
    }
}

impl HeartRateSink for SharedEstimate {
    fn update(&mut self, estimate: Estimate) {
        self.store(estimate);
    }
}

/// Layout, most significant byte first: unused, state, bpm high, bpm low.
const fn pack(estimate: Estimate) -> u32 {
    let [bpm_high, bpm_low] = estimate.bpm.to_be_bytes();
    u32::from_be_bytes([0, estimate.state.to_raw(), bpm_high, bpm_low])
}

const fn unpack(raw: u32) -> Estimate {
    let [_, state, bpm_high, bpm_low] = raw.to_be_bytes();
    Estimate {
        state: EstimateState::from_raw(state),
        bpm: u16::from_be_bytes([bpm_high, bpm_low]),
    }
}
