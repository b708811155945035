#![no_std]

// Shared logic for the InfiniSleep health/alarm subsystem.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and exposing abstractions the other crates can adopt.
pub mod alarm;
pub mod clock;
pub mod console;
pub mod haptic;
pub mod heartrate;
pub mod persist;
pub mod session;
pub mod telemetry;
pub mod timer;
