//! Mutex flavour shared by every channel and signal in the firmware.
//!
//! Producers run from task context and from GPIOTE/TWIM interrupt handlers,
//! so the target build needs a critical-section mutex. Host builds only ever
//! exercise the queues from a single test thread.

#[cfg(target_os = "none")]
pub type QueueMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

#[cfg(not(target_os = "none"))]
pub type QueueMutex = embassy_sync::blocking_mutex::raw::NoopRawMutex;
