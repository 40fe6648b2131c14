//! Refresh-ahead support: the source-of-truth seam and the per-key
//! single-flight guard.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors from the system of record.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The fetch failed; the refresh is abandoned and only counted.
    #[error("source fetch failed: {reason}")]
    Failed { reason: String },
}

/// Fetches fresh values from the system of record.
///
/// Registered per namespace; required for refresh-ahead, optional elsewhere
/// (a write-around namespace with a loader gets read-through population on a
/// full miss). Loaders receive the encoded cache key, which for non-hashed
/// keys is the readable colon-joined argument form.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Fetches the current value for `key`. `Ok(None)` means the key no
    /// longer exists upstream and the cached copy should be dropped.
    async fn load(&self, namespace: &str, key: &str)
    -> Result<Option<serde_json::Value>, SourceError>;
}

/// Per-key in-flight guard: at most one refresh per key regardless of how
/// many readers observe the refresh window simultaneously.
#[derive(Debug, Default)]
pub struct SingleFlight {
    in_flight: Mutex<HashSet<String>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`. Returns `None` when a flight is already active; the
    /// returned guard releases the claim on drop, including on panic or task
    /// cancellation.
    pub fn begin(self: &Arc<Self>, key: &str) -> Option<FlightGuard> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.contains(key) {
            return None;
        }
        in_flight.insert(key.to_string());
        Some(FlightGuard {
            flight: Arc::clone(self),
            key: key.to_string(),
        })
    }

    /// Number of active flights.
    pub fn len(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Returns `true` if no flights are active.
    pub fn is_empty(&self) -> bool {
        self.in_flight.lock().is_empty()
    }
}

/// RAII claim on a key's refresh slot.
#[derive(Debug)]
pub struct FlightGuard {
    flight: Arc<SingleFlight>,
    key: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flight.in_flight.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_refused_until_guard_drops() {
        let flight = Arc::new(SingleFlight::new());

        let guard = flight.begin("q:AAPL").expect("first claim");
        assert!(flight.begin("q:AAPL").is_none());
        // Other keys are unaffected.
        assert!(flight.begin("q:MSFT").is_some());

        drop(guard);
        assert!(flight.begin("q:AAPL").is_some());
    }

    #[test]
    fn guard_releases_on_panic() {
        let flight = Arc::new(SingleFlight::new());
        let flight2 = Arc::clone(&flight);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = flight2.begin("q:AAPL").unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(flight.is_empty());
    }

    #[test]
    fn many_claims_one_winner() {
        let flight = Arc::new(SingleFlight::new());
        let winners: usize = (0..50)
            .map(|_| usize::from(flight.begin("q:AAPL").map(std::mem::forget).is_some()))
            .sum();
        assert_eq!(winners, 1);
    }
}
