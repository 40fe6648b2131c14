//! Top-level error taxonomy.
//!
//! Only programmer-facing failures propagate: key encoding, payload encoding
//! on the write path, unknown namespaces and lifecycle misuse. Backing-store
//! problems degrade (a `get` becomes a miss, a remote write becomes a logged
//! no-op) and surface only through logs and the error counter — no `get`
//! ever fails because the shared store is down.

use thiserror::Error;

use crate::key::KeyError;
use crate::payload::PayloadError;

/// Errors surfaced by [`crate::manager::CacheManager`] operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A cache-key argument could not be encoded. Programmer error, always
    /// propagated.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The value could not be serialized (write path) or a loader-supplied
    /// value could not be converted (read-through path).
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The namespace was never registered with the manager.
    #[error("unknown namespace '{namespace}'")]
    UnknownNamespace { namespace: String },

    /// The manager has been shut down; writes are no longer accepted.
    #[error("cache manager is shutting down")]
    ShuttingDown,
}

/// Convenience result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
