//! Host-side InfiniSleep emulator.
//!
//! Everything runs in virtual time: the wall clock, the countdown timer and
//! the measurement worker share one simulated clock that only moves when the
//! operator (or a scenario script) advances it.

pub mod session;
pub mod sim;
