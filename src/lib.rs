//! tickcache — multi-tier caching layer for market-data services.
//!
//! A process keeps hot entries in a bounded in-process LRU tier and falls
//! back to a shared remote key-value store; peers converge through an
//! invalidation bus layered on the store's pub/sub channel. Write
//! propagation is pluggable per namespace (write-through, write-behind,
//! write-around, refresh-ahead).
//!
//! # Public API Surface
//!
//! - [`CacheManager`], [`CacheManagerBuilder`] — the facade callers use
//! - [`NamespaceConfig`], [`CacheConfig`], [`Strategy`] — configuration
//! - [`KeyArgs`] — positional/keyword cache-key arguments
//! - [`RemoteStore`], [`EventTransport`], [`SourceLoader`] — collaborator
//!   seams for the backing store, its pub/sub channel and the system of
//!   record
//! - [`LocalTier`], [`RemoteTier`] — the tiers themselves, for embedding
//! - [`CacheStats`] — counters for the observability collaborator
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tickcache::{
//!     BroadcastTransport, CacheConfig, CacheManager, KeyArgs, MemoryRemoteStore,
//!     NamespaceConfig, Strategy,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CacheManager::builder(
//!     CacheConfig::from_env()?,
//!     Arc::new(MemoryRemoteStore::new()),
//!     Arc::new(BroadcastTransport::new()),
//! )
//! .namespace(NamespaceConfig::new("stock_quote", 60, 1000, Strategy::WriteThrough))
//! .build()?;
//!
//! let args = KeyArgs::new().arg("AAPL");
//! manager
//!     .set("stock_quote", &args, &serde_json::json!({"price": 150.0}), None)
//!     .await?;
//! let quote: Option<serde_json::Value> = manager.get("stock_quote", &args).await?;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod manager;
pub mod payload;
pub mod stats;
pub mod strategy;
pub mod tier;

pub use bus::{
    BroadcastTransport, DEFAULT_TRANSPORT_CAPACITY, EventTransport, EventType, InvalidationEvent,
    TransportError,
};
#[cfg(any(test, feature = "mock"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use config::{
    CacheConfig, ConfigError, DEFAULT_REFRESH_RATIO, NamespaceConfig, Strategy,
};
pub use error::{CacheError, CacheResult};
pub use key::{KeyArgs, KeyError, KeyResult, MAX_KEY_LEN, glob_match};
pub use manager::{CacheManager, CacheManagerBuilder};
pub use payload::{PayloadError, PayloadResult, SerializationFormat};
pub use stats::{CacheStats, StatsCollector};
pub use strategy::{
    FlightGuard, FlushPolicy, SingleFlight, SourceError, SourceLoader, StrategyExecutor,
    WriteBehindQueue,
};
pub use tier::{
    LocalLookup, LocalTier, MemoryRemoteStore, RemoteStore, RemoteStoreError, RemoteTier,
};
pub use tier::remote::RemoteResult;
