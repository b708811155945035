//! Clock adapters between `embassy-time` and the sleep-core clock traits.

use core::cell::Cell;
use core::ops::Add;
use core::time::Duration;

use embassy_sync::blocking_mutex::Mutex;
use embassy_time::Instant;
use sleep_core::clock::{MonotonicClock, MonotonicInstant, WallClock};
use time::PrimitiveDateTime;
use time::macros::datetime;

use crate::sync::QueueMutex;

/// Wall-clock value assumed at boot until the companion app sets the time.
pub const BOOT_EPOCH: PrimitiveDateTime = datetime!(2024-01-01 00:00);

/// Converts a core duration into the embassy tick representation, saturating
/// at the largest representable value.
pub fn to_embassy(duration: Duration) -> embassy_time::Duration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    embassy_time::Duration::from_micros(micros)
}

pub fn from_embassy(duration: embassy_time::Duration) -> Duration {
    Duration::from_micros(duration.as_micros())
}

/// Monotonic instant used by the measurement worker and the countdown timer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub const fn from_embassy(instant: Instant) -> Self {
        Self(instant)
    }

    pub const fn into_embassy(self) -> Instant {
        self.0
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

impl Add<Duration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.checked_add(to_embassy(rhs)).unwrap_or(Instant::MAX))
    }
}

impl MonotonicInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        from_embassy(self.0.saturating_duration_since(earlier.0))
    }
}

/// Monotonic clock backed by the RTC1 time driver.
#[derive(Copy, Clone, Debug, Default)]
pub struct EmbassyClock;

impl MonotonicClock for EmbassyClock {
    type Instant = FirmwareInstant;

    fn now(&self) -> FirmwareInstant {
        FirmwareInstant::now()
    }
}

/// Local wall clock derived from the monotonic clock and the last time the
/// user set it. Shared by reference so the time service can re-anchor it
/// while the alarm service reads it.
pub struct SystemWallClock<C = EmbassyClock> {
    monotonic: C,
    anchor: Mutex<QueueMutex, Cell<(PrimitiveDateTime, FirmwareInstant)>>,
}

impl<C> SystemWallClock<C>
where
    C: MonotonicClock<Instant = FirmwareInstant>,
{
    /// Starts the clock at `epoch` as of monotonic tick zero (boot).
    pub const fn new(monotonic: C, epoch: PrimitiveDateTime) -> Self {
        Self {
            monotonic,
            anchor: Mutex::new(Cell::new((
                epoch,
                FirmwareInstant::from_embassy(Instant::from_ticks(0)),
            ))),
        }
    }

    /// Re-anchors the wall clock so that `now` is the current local time.
    pub fn set(&self, now: PrimitiveDateTime) {
        let at = self.monotonic.now();
        self.anchor.lock(|anchor| anchor.set((now, at)));
    }
}

impl<C> WallClock for SystemWallClock<C>
where
    C: MonotonicClock<Instant = FirmwareInstant>,
{
    fn now(&self) -> PrimitiveDateTime {
        let (epoch, epoch_at) = self.anchor.lock(Cell::get);
        let uptime = self.monotonic.now().saturating_duration_since(epoch_at);
        let uptime = time::Duration::try_from(uptime).unwrap_or(time::Duration::MAX);
        epoch.saturating_add(uptime)
    }
}
