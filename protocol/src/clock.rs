//! # Clock Sources
//!
//! The ledger and the bank never ask the operating system for the time.
//! Whoever drives them reads a [`Clock`] exactly once per call and passes
//! the value down inside the call context. That keeps every operation a pure
//! function of (state, input, timestamp), which is what makes the maturity
//! tests deterministic.
//!
//! The only requirement on a clock is that it never appears to move
//! backwards between two calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A source of Unix timestamps in whole seconds.
pub trait Clock: Send + Sync {
    /// Current time, seconds since the Unix epoch.
    fn now(&self) -> u64;
}

/// Wall-clock time from the system, via `chrono`.
///
/// Remembers the highest value it has handed out, so a wall clock that gets
/// stepped backwards by NTP still looks monotonic to callers.
#[derive(Debug, Default)]
pub struct SystemClock {
    high_water: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        let wall = chrono::Utc::now().timestamp().max(0) as u64;
        let prev = self.high_water.fetch_max(wall, Ordering::AcqRel);
        prev.max(wall)
    }
}

/// A manually driven clock for tests and simulations.
///
/// Cheap to clone; all clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// A clock frozen at `start`.
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Move time forward by `secs`. Saturates at `u64::MAX`.
    pub fn advance(&self, secs: u64) -> u64 {
        let mut current = self.now.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(secs);
            match self
                .now
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Jump to `timestamp`. Refuses to go backwards and returns the time the
    /// clock actually shows afterwards.
    pub fn set(&self, timestamp: u64) -> u64 {
        let prev = self.now.fetch_max(timestamp, Ordering::AcqRel);
        prev.max(timestamp)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> u64 {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SECONDS_PER_DAY;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.advance(31 * SECONDS_PER_DAY), 1_000 + 31 * SECONDS_PER_DAY);
        assert_eq!(clock.now(), 1_000 + 31 * SECONDS_PER_DAY);
    }

    #[test]
    fn manual_clock_never_moves_backwards() {
        let clock = ManualClock::new(5_000);
        assert_eq!(clock.set(4_000), 5_000);
        assert_eq!(clock.now(), 5_000);
        assert_eq!(clock.set(6_000), 6_000);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let a = ManualClock::new(0);
        let b = a.clone();
        a.advance(10);
        assert_eq!(b.now(), 10);
    }

    #[test]
    fn manual_clock_saturates() {
        let clock = ManualClock::new(u64::MAX - 1);
        assert_eq!(clock.advance(10), u64::MAX);
    }

    #[test]
    fn system_clock_is_monotonic_and_recent() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        // 2024-01-01T00:00:00Z
        assert!(a > 1_704_067_200);
    }

    #[test]
    fn arc_dyn_clock_delegates() {
        let manual = ManualClock::new(77);
        let shared: Arc<dyn Clock> = Arc::new(manual.clone());
        manual.advance(3);
        assert_eq!(shared.now(), 80);
    }
}
