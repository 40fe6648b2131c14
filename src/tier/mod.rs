//! Cache tiers: local in-process LRU and the shared remote store.

pub mod local;
pub mod remote;


pub use local::{LocalLookup, LocalTier};
pub use remote::{MemoryRemoteStore, RemoteStore, RemoteStoreError, RemoteTier};
