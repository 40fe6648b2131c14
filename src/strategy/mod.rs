//! Write/refresh strategy execution over the two tiers.
//!
//! The executor owns how a `set` propagates: synchronously to both tiers
//! (write-through, refresh-ahead), locally with an asynchronous remote flush
//! (write-behind), or not at all (write-around). Read-time refresh-ahead is
//! orchestrated by the manager with the [`SingleFlight`] guard and
//! [`SourceLoader`] seam defined here.

pub mod refresh;
pub mod write_behind;

pub use refresh::{FlightGuard, SingleFlight, SourceError, SourceLoader};
pub use write_behind::{FlushPolicy, WriteBehindQueue};

use std::time::Duration;

use crate::config::Strategy;
use crate::tier::{LocalTier, RemoteTier};

use write_behind::FlushJob;

/// Applies writes according to a namespace's [`Strategy`].
#[derive(Debug)]
pub struct StrategyExecutor {
    remote: RemoteTier,
    write_behind: WriteBehindQueue,
}

impl StrategyExecutor {
    pub fn new(remote: RemoteTier, write_behind: WriteBehindQueue) -> Self {
        Self {
            remote,
            write_behind,
        }
    }

    /// Executes a write. Returns `true` when shared cache state was mutated
    /// (and the manager should broadcast an invalidation event).
    ///
    /// A remote failure under write-through is advisory: the local write
    /// already succeeded, so the call still reports success and the failure
    /// is only logged and counted.
    pub async fn write(
        &self,
        strategy: Strategy,
        local: &LocalTier,
        key: &str,
        bytes: Vec<u8>,
        ttl: Duration,
    ) -> bool {
        match strategy {
            Strategy::WriteAround => false,
            Strategy::WriteThrough | Strategy::RefreshAhead => {
                local.set(key, bytes.clone(), ttl);
                self.remote.set(key, &bytes, ttl).await;
                true
            }
            Strategy::WriteBehind => {
                local.set(key, bytes.clone(), ttl);
                self.write_behind.enqueue(FlushJob {
                    key: key.to_string(),
                    bytes,
                    ttl,
                });
                true
            }
        }
    }

    /// Drains the write-behind queue under `deadline`.
    pub async fn shutdown(&self, deadline: Duration) {
        self.write_behind.shutdown(deadline).await;
    }
}
