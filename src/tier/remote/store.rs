//! Backing-store contract for the remote tier.
//!
//! Any shared key-value store offering GET, SET-with-TTL and DELETE can back
//! the remote tier; key enumeration is optional and only used by pattern
//! invalidation.

use std::time::Duration;

use async_trait::async_trait;

use super::error::RemoteResult;

/// Primitives required of the shared backing store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches the raw payload for `key`, or `None` on miss.
    async fn get(&self, key: &str) -> RemoteResult<Option<Vec<u8>>>;

    /// Stores `value` under `key` with a time-to-live.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> RemoteResult<()>;

    /// Deletes `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> RemoteResult<()>;

    /// Enumerates keys matching a glob `pattern`, or `None` when the store
    /// does not support enumeration (pattern invalidation then degrades to a
    /// namespace-wide clear).
    async fn keys(&self, pattern: &str) -> RemoteResult<Option<Vec<String>>>;
}
