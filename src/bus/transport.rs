//! Event transport seam.
//!
//! A transport carries [`InvalidationEvent`]s between process instances. The
//! production transport is whatever pub/sub channel the backing store offers;
//! [`BroadcastTransport`] is the in-process implementation used in tests and
//! single-host deployments (two managers sharing one transport model two
//! nodes).

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use super::event::InvalidationEvent;

/// Default buffered capacity of a transport subscription.
pub const DEFAULT_TRANSPORT_CAPACITY: usize = 256;

/// Transport failures. Publishing is best-effort; the manager logs and counts
/// these but never propagates them to the mutating caller.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel was torn down.
    #[error("invalidation channel closed")]
    Closed,

    /// Transport-level failure.
    #[error("transport failure: {reason}")]
    Failed { reason: String },
}

/// Publish/subscribe channel for invalidation events.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Publishes `event` to all peer subscribers.
    async fn publish(&self, event: &InvalidationEvent) -> Result<(), TransportError>;

    /// Opens a subscription. Events published after this call are delivered
    /// in publish order; a slow subscriber may observe gaps, which is safe
    /// because event application is idempotent and bounded by TTL.
    fn subscribe(&self) -> mpsc::Receiver<InvalidationEvent>;
}

/// In-process [`EventTransport`] over a tokio broadcast channel.
pub struct BroadcastTransport {
    tx: broadcast::Sender<InvalidationEvent>,
}

impl BroadcastTransport {
    /// Creates a transport with the given per-subscriber buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Creates a transport with [`DEFAULT_TRANSPORT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRANSPORT_CAPACITY)
    }
}

impl Default for BroadcastTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BroadcastTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastTransport")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[async_trait]
impl EventTransport for BroadcastTransport {
    async fn publish(&self, event: &InvalidationEvent) -> Result<(), TransportError> {
        // A send error only means there are no subscribers right now, which
        // is not a failure for a best-effort broadcast.
        let _ = self.tx.send(event.clone());
        Ok(())
    }

    fn subscribe(&self) -> mpsc::Receiver<InvalidationEvent> {
        let mut rx = self.tx.subscribe();
        let (out_tx, out_rx) = mpsc::channel(DEFAULT_TRANSPORT_CAPACITY);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if out_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "invalidation subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        out_rx
    }
}
