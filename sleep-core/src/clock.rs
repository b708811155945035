//! Time sources consumed by the measurement worker and the alarm scheduler.
//!
//! Two notions of time coexist: a monotonic instant used for sampling
//! cadences, burst timeouts and countdown deadlines, and a calendar wall clock
//! used to place wake alarms on a specific day. Firmware and host targets
//! provide their own instant types; the core only relies on the traits below.

use core::ops::Add;
use core::time::Duration;

use time::PrimitiveDateTime;

/// Monotonic timestamp used for elapsed-time bookkeeping.
pub trait MonotonicInstant: Copy + Ord + Add<Duration, Output = Self> {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Source of monotonic timestamps.
pub trait MonotonicClock {
    type Instant: MonotonicInstant;

    fn now(&self) -> Self::Instant;
}

impl<C: MonotonicClock> MonotonicClock for &C {
    type Instant = C::Instant;

    fn now(&self) -> Self::Instant {
        (**self).now()
    }
}

/// Local calendar time source used to place alarms.
pub trait WallClock {
    /// Returns the current local date and time.
    fn now(&self) -> PrimitiveDateTime;
}

impl<C: WallClock> WallClock for &C {
    fn now(&self) -> PrimitiveDateTime {
        (**self).now()
    }
}

impl MonotonicInstant for PrimitiveDateTime {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        duration_between(earlier, *self)
    }
}

/// Converts the signed gap between two calendar instants into a
/// non-negative [`Duration`] with millisecond precision.
#[must_use]
pub fn duration_between(from: PrimitiveDateTime, to: PrimitiveDateTime) -> Duration {
    let millis = (to - from).whole_milliseconds();
    if millis <= 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}
