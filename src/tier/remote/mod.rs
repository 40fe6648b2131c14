//! Remote tier: shared backing store behind a degrade-don't-crash wrapper.
//!
//! Every call carries its own timeout and never runs while a local-tier lock
//! is held. Failures are logged and counted; the read path degrades to a miss
//! and the write path to a no-op, so a backing-store outage never surfaces to
//! `get`/`set` callers.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{RemoteResult, RemoteStoreError};
pub use memory::MemoryRemoteStore;
pub use store::RemoteStore;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::stats::StatsCollector;

/// Degrading wrapper over a [`RemoteStore`].
#[derive(Clone)]
pub struct RemoteTier {
    store: Arc<dyn RemoteStore>,
    timeout: Duration,
    stats: Arc<StatsCollector>,
}

impl RemoteTier {
    /// Wraps `store` with per-call `timeout`; failures are recorded on
    /// `stats`.
    pub fn new(store: Arc<dyn RemoteStore>, timeout: Duration, stats: Arc<StatsCollector>) -> Self {
        Self {
            store,
            timeout,
            stats,
        }
    }

    async fn run<T, F>(&self, fut: F) -> RemoteResult<T>
    where
        F: Future<Output = RemoteResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RemoteStoreError::Timeout {
                after: self.timeout,
            }),
        }
    }

    /// Fetches `key`, degrading to a miss on any failure.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.run(self.store.get(key)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "remote get failed, degrading to miss");
                self.stats.record_error();
                None
            }
        }
    }

    /// Stores `key`, degrading to a logged no-op on failure. Returns whether
    /// the write landed.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> bool {
        match self.run(self.store.set_with_ttl(key, value, ttl)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "remote set failed, continuing local-only");
                self.stats.record_error();
                false
            }
        }
    }

    /// Stores `key`, surfacing the error. Used by the write-behind flush
    /// worker, which owns its own retry/backoff policy.
    pub async fn try_set(&self, key: &str, value: &[u8], ttl: Duration) -> RemoteResult<()> {
        self.run(self.store.set_with_ttl(key, value, ttl)).await
    }

    /// Deletes `key`, degrading to a logged no-op on failure.
    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.run(self.store.delete(key)).await {
            warn!(key, error = %e, "remote delete failed");
            self.stats.record_error();
        }
    }

    /// Enumerates keys matching `pattern`. Returns `None` when the store
    /// lacks enumeration or the call failed; callers degrade to a
    /// namespace-wide clear either way.
    pub async fn keys(&self, pattern: &str) -> Option<Vec<String>> {
        match self.run(self.store.keys(pattern)).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(pattern, error = %e, "remote key enumeration failed");
                self.stats.record_error();
                None
            }
        }
    }
}

impl std::fmt::Debug for RemoteTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTier")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
