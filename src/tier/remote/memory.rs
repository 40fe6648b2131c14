//! In-memory backing store.
//!
//! Stands in for the shared key-value store in tests and single-node local
//! runs. Supports failure injection (to exercise degradation) and switchable
//! key enumeration (to exercise the pattern-invalidation fallback), and
//! records every successful write so ordering tests can assert on it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::key::glob_match;

use super::error::{RemoteResult, RemoteStoreError};
use super::store::RemoteStore;

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// In-memory [`RemoteStore`].
pub struct MemoryRemoteStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    history: Mutex<Vec<(String, Vec<u8>)>>,
    unavailable: AtomicBool,
    enumeration: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl MemoryRemoteStore {
    /// Creates a store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store on an explicit clock (share a manual clock with the
    /// manager to test TTL behavior under simulated time).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
            enumeration: AtomicBool::new(true),
            clock,
        }
    }

    /// Makes every operation fail with [`RemoteStoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Toggles key-enumeration support.
    pub fn set_enumeration(&self, supported: bool) {
        self.enumeration.store(supported, Ordering::SeqCst);
    }

    /// Writes raw bytes directly, bypassing availability checks. Test hook
    /// for planting corrupt payloads.
    pub fn insert_raw(&self, key: &str, bytes: Vec<u8>, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.entries
            .lock()
            .insert(key.to_string(), StoredValue { bytes, expires_at });
    }

    /// All successful writes in arrival order, as `(key, bytes)` pairs.
    pub fn write_history(&self) -> Vec<(String, Vec<u8>)> {
        self.history.lock().clone()
    }

    /// Number of unexpired entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .values()
            .filter(|v| v.expires_at > now)
            .count()
    }

    /// Returns `true` if no unexpired entries exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> RemoteResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RemoteStoreError::Unavailable {
                reason: "injected outage".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRemoteStore")
            .field("entries", &self.entries.lock().len())
            .field("unavailable", &self.unavailable.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, key: &str) -> RemoteResult<Option<Vec<u8>>> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(v) if v.expires_at > now => Ok(Some(v.bytes.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> RemoteResult<()> {
        self.check_available()?;
        let expires_at = self.clock.now() + ttl;
        self.entries.lock().insert(
            key.to_string(),
            StoredValue {
                bytes: value.to_vec(),
                expires_at,
            },
        );
        self.history
            .lock()
            .push((key.to_string(), value.to_vec()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> RemoteResult<()> {
        self.check_available()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> RemoteResult<Option<Vec<String>>> {
        self.check_available()?;
        if !self.enumeration.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let now = self.clock.now();
        let keys = self
            .entries
            .lock()
            .iter()
            .filter(|(k, v)| v.expires_at > now && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(Some(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryRemoteStore::new();
        store
            .set_with_ttl("q:AAPL", b"150", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get("q:AAPL").await.unwrap().unwrap(), b"150");

        store.delete("q:AAPL").await.unwrap();
        assert!(store.get("q:AAPL").await.unwrap().is_none());
        // Deleting again is fine.
        store.delete("q:AAPL").await.unwrap();
    }

    #[tokio::test]
    async fn injected_outage_fails_every_op() {
        let store = MemoryRemoteStore::new();
        store.set_unavailable(true);

        assert!(store.get("k").await.is_err());
        assert!(
            store
                .set_with_ttl("k", b"v", Duration::from_secs(1))
                .await
                .is_err()
        );
        assert!(store.delete("k").await.is_err());
        assert!(store.keys("*").await.is_err());
    }

    #[tokio::test]
    async fn enumeration_toggle() {
        let store = MemoryRemoteStore::new();
        store
            .set_with_ttl("q:AAPL", b"1", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set_with_ttl("q:MSFT", b"2", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set_with_ttl("s:AAPL", b"3", Duration::from_secs(60))
            .await
            .unwrap();

        let mut keys = store.keys("q:*").await.unwrap().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["q:AAPL", "q:MSFT"]);

        store.set_enumeration(false);
        assert!(store.keys("q:*").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ttl_expiry_under_manual_clock() {
        let clock = Arc::new(crate::clock::ManualClock::new());
        let store = MemoryRemoteStore::with_clock(clock.clone());
        store
            .set_with_ttl("k", b"v", Duration::from_secs(1))
            .await
            .unwrap();

        clock.advance(Duration::from_millis(1100));
        assert!(store.get("k").await.unwrap().is_none());
    }
}
