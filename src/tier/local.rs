//! Local tier: bounded in-process cache with LRU eviction and TTL.
//!
//! One `LocalTier` exists per namespace, each behind its own mutex, so
//! contention is bounded per namespace rather than process-wide. Expiry is
//! lazy: a `get` on an expired entry removes it and reports a miss. The
//! manager's background sweeper calls [`LocalTier::sweep`] to reclaim space
//! proactively.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::Clock;

/// A cached value plus bookkeeping. Owned exclusively by the tier; values
/// promoted from the remote tier are copied in, never shared by reference.
#[derive(Debug, Clone)]
struct LocalEntry {
    value: Vec<u8>,
    created_at: Instant,
    expires_at: Instant,
    last_accessed_at: Instant,
    size_bytes: usize,
    seq: u64,
}

/// Result of a local lookup.
#[derive(Debug, Clone)]
pub struct LocalLookup {
    value: Vec<u8>,
    created_at: Instant,
    expires_at: Instant,
}

impl LocalLookup {
    /// Returns the payload bytes.
    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Consumes the lookup and returns the payload bytes.
    #[inline]
    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    /// Entry expiry instant.
    #[inline]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Returns `true` when `now` has entered the trailing `ratio` share of
    /// the entry's lifetime, i.e. the refresh-ahead window.
    pub fn in_refresh_window(&self, now: Instant, ratio: f64) -> bool {
        if ratio <= 0.0 {
            return false;
        }
        let lifetime = self.expires_at.duration_since(self.created_at);
        let window = lifetime.mul_f64(ratio.min(1.0));
        now >= self.expires_at - window
    }
}

#[derive(Debug, Default)]
struct LruStore {
    entries: HashMap<String, LocalEntry>,
    /// Access order: oldest sequence first. Keys here always mirror `entries`.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl LruStore {
    fn touch(&mut self, key: &str, now: Instant) {
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.seq);
            entry.seq = self.next_seq;
            entry.last_accessed_at = now;
            self.order.insert(entry.seq, key.to_string());
            self.next_seq += 1;
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(&entry.seq);
                true
            }
            None => false,
        }
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Bounded in-process cache for a single namespace.
pub struct LocalTier {
    max_entries: usize,
    clock: Arc<dyn Clock>,
    inner: Mutex<LruStore>,
}

impl LocalTier {
    /// Creates a tier bounded to `max_entries`.
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_entries,
            clock,
            inner: Mutex::new(LruStore::default()),
        }
    }

    /// Looks up `key`. An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<LocalLookup> {
        let now = self.clock.now();
        let mut store = self.inner.lock();

        let entry = store.entries.get(key)?;
        if entry.expires_at <= now {
            store.remove(key);
            return None;
        }

        let lookup = LocalLookup {
            value: entry.value.clone(),
            created_at: entry.created_at,
            expires_at: entry.expires_at,
        };
        store.touch(key, now);
        Some(lookup)
    }

    /// Inserts or replaces `key`. When the tier is full, the
    /// least-recently-accessed entry is evicted before the insert lands.
    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let now = self.clock.now();
        let mut store = self.inner.lock();

        if !store.entries.contains_key(key) {
            while store.entries.len() >= self.max_entries {
                if let Some(evicted) = store.evict_lru() {
                    tracing::debug!(evicted = %evicted, "local tier full, evicted LRU entry");
                } else {
                    break;
                }
            }
        } else {
            store.remove(key);
        }

        let seq = store.next_seq;
        store.next_seq += 1;
        let size_bytes = value.len();
        store.entries.insert(
            key.to_string(),
            LocalEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
                last_accessed_at: now,
                size_bytes,
                seq,
            },
        );
        store.order.insert(seq, key.to_string());
    }

    /// Removes `key`. Returns `true` if an entry existed. Idempotent.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key)
    }

    /// Drops all entries.
    pub fn clear(&self) {
        let mut store = self.inner.lock();
        store.entries.clear();
        store.order.clear();
    }

    /// Removes expired entries and returns how many were reclaimed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut store = self.inner.lock();

        let expired: Vec<String> = store
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            store.remove(key);
        }
        expired.len()
    }

    /// Number of resident entries (including not-yet-swept expired ones).
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `key` is resident and unexpired, without touching
    /// the LRU order.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| e.expires_at > now)
    }

    /// Last access instant of `key`, if resident. Does not touch LRU order.
    pub fn last_accessed(&self, key: &str) -> Option<Instant> {
        self.inner
            .lock()
            .entries
            .get(key)
            .map(|e| e.last_accessed_at)
    }

    /// Total payload bytes resident in the tier.
    pub fn size_bytes(&self) -> usize {
        self.inner
            .lock()
            .entries
            .values()
            .map(|e| e.size_bytes)
            .sum()
    }
}

impl std::fmt::Debug for LocalTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTier")
            .field("max_entries", &self.max_entries)
            .field("entries", &self.len())
            .finish()
    }
}
