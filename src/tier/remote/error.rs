//! Remote-store error types.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a [`super::RemoteStore`] implementation or by the
/// timeout wrapper around it. These never reach `get`/`set` callers; the
/// remote tier degrades to miss/no-op and logs instead.
#[derive(Debug, Error)]
pub enum RemoteStoreError {
    /// The backing store is unreachable or refused the operation.
    #[error("backing store unavailable: {reason}")]
    Unavailable { reason: String },

    /// The operation exceeded the configured per-call timeout.
    #[error("backing store call timed out after {after:?}")]
    Timeout { after: Duration },

    /// The backing store reported an operation-level failure.
    #[error("backing store error: {reason}")]
    Backend { reason: String },
}

/// Convenience result type for remote-store operations.
pub type RemoteResult<T> = Result<T, RemoteStoreError>;
