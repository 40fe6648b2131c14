//! Injectable time source.
//!
//! Expiry math and event timestamps run against a [`Clock`] so tests can
//! advance time deterministically instead of sleeping through TTLs.

use std::time::Instant;

#[cfg(any(test, feature = "mock"))]
use std::time::Duration;

/// Source of monotonic and wall-clock time for the cache.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic now, used for expiry and LRU bookkeeping.
    fn now(&self) -> Instant;

    /// Wall-clock milliseconds since the Unix epoch, used to timestamp
    /// invalidation events for last-timestamp-wins resolution.
    fn unix_millis(&self) -> i64;
}

/// Real time. The default clock for production managers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn unix_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Test clock that only moves when told to.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    epoch_ms: i64,
    offset: parking_lot::Mutex<Duration>,
}

#[cfg(any(test, feature = "mock"))]
impl ManualClock {
    /// Creates a clock frozen at the current real time.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            epoch_ms: chrono::Utc::now().timestamp_millis(),
            offset: parking_lot::Mutex::new(Duration::ZERO),
        }
    }

    /// Advances the clock by `by`.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

#[cfg(any(test, feature = "mock"))]
impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "mock"))]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }

    fn unix_millis(&self) -> i64 {
        self.epoch_ms + self.offset.lock().as_millis() as i64
    }
}
