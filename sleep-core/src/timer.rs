//! One-shot countdowns backing the wake alarm.
//!
//! The scheduler only talks to the [`AlarmTimer`] port. [`DeadlineTimer`] is
//! the stock implementation: it turns relative delays into absolute deadlines
//! on a monotonic clock and lets a single timer task poll for expiries, so all
//! countdown and ramp callbacks run serialized in that one task.

use core::fmt;
use core::time::Duration;

use crate::clock::{MonotonicClock, MonotonicInstant};

/// Countdowns the alarm subsystem can have armed at the same time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CountdownKind {
    WakeAlarm,
    GradualWake,
}

impl CountdownKind {
    pub const ALL: [CountdownKind; 2] = [CountdownKind::WakeAlarm, CountdownKind::GradualWake];

    const fn index(self) -> usize {
        match self {
            CountdownKind::WakeAlarm => 0,
            CountdownKind::GradualWake => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CountdownKind::WakeAlarm => "wake-alarm",
            CountdownKind::GradualWake => "gradual-wake",
        }
    }
}

impl fmt::Display for CountdownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Port used by the scheduler to arm and cancel countdowns.
pub trait AlarmTimer {
    /// Arms `kind` to expire after `delay`, replacing any pending deadline.
    fn arm(&mut self, kind: CountdownKind, delay: Duration);

    /// Cancels `kind`. Cancelling an idle countdown is a no-op.
    fn cancel(&mut self, kind: CountdownKind);
}

impl<T: AlarmTimer + ?Sized> AlarmTimer for &mut T {
    fn arm(&mut self, kind: CountdownKind, delay: Duration) {
        (**self).arm(kind, delay);
    }

    fn cancel(&mut self, kind: CountdownKind) {
        (**self).cancel(kind);
    }
}

/// Deadline table keyed by [`CountdownKind`].
pub struct DeadlineTimer<C>
where
    C: MonotonicClock,
{
    clock: C,
    deadlines: [Option<C::Instant>; 2],
}

impl<C> DeadlineTimer<C>
where
    C: MonotonicClock,
{
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            deadlines: [None; 2],
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn deadline(&self, kind: CountdownKind) -> Option<C::Instant> {
        self.deadlines[kind.index()]
    }

    pub fn is_armed(&self, kind: CountdownKind) -> bool {
        self.deadline(kind).is_some()
    }

    /// Earliest pending deadline, if any countdown is armed.
    pub fn next_deadline(&self) -> Option<C::Instant> {
        self.deadlines.iter().flatten().copied().min()
    }

    /// Time left until the earliest deadline, saturating at zero.
    pub fn time_until_next(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Removes and returns one countdown whose deadline is at or before `now`.
    /// The gradual-wake countdown is reported before the wake alarm when both
    /// are due.
    pub fn take_expired(&mut self, now: C::Instant) -> Option<CountdownKind> {
        let kind = [CountdownKind::GradualWake, CountdownKind::WakeAlarm]
            .into_iter()
            .find(|kind| self.deadlines[kind.index()].is_some_and(|deadline| deadline <= now))?;
        self.deadlines[kind.index()] = None;
        Some(kind)
    }
}

impl<C> AlarmTimer for DeadlineTimer<C>
where
    C: MonotonicClock,
{
    fn arm(&mut self, kind: CountdownKind, delay: Duration) {
        self.deadlines[kind.index()] = Some(self.clock.now() + delay);
    }

    fn cancel(&mut self, kind: CountdownKind) {
        self.deadlines[kind.index()] = None;
    }
}
