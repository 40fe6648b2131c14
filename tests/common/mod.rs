//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use tickcache::{
    BroadcastTransport, CacheConfig, CacheManager, ManualClock, MemoryRemoteStore,
    NamespaceConfig, SourceError, SourceLoader,
};

/// Installs a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Tight timings so failure-path tests stay fast.
pub fn test_config() -> CacheConfig {
    CacheConfig {
        remote_timeout: Duration::from_millis(100),
        write_behind_capacity: 64,
        write_behind_retries: 2,
        write_behind_backoff: Duration::from_millis(5),
        shutdown_flush_deadline: Duration::from_millis(500),
        sweep_interval: None,
        max_concurrent_refreshes: 8,
    }
}

/// One simulated node: a manager plus handles on its collaborators.
pub struct TestNode {
    pub manager: Arc<CacheManager>,
    pub store: Arc<MemoryRemoteStore>,
    pub transport: Arc<BroadcastTransport>,
    pub clock: Arc<ManualClock>,
}

/// Builds a single node with its own store/transport/clock.
pub fn build_node(namespaces: &[NamespaceConfig]) -> TestNode {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryRemoteStore::with_clock(clock.clone()));
    let transport = Arc::new(BroadcastTransport::new());
    build_node_on(namespaces, store, transport, clock)
}

/// Builds a node on shared collaborators (two nodes sharing one store and
/// transport model a two-node deployment).
pub fn build_node_on(
    namespaces: &[NamespaceConfig],
    store: Arc<MemoryRemoteStore>,
    transport: Arc<BroadcastTransport>,
    clock: Arc<ManualClock>,
) -> TestNode {
    let mut builder =
        CacheManager::builder(test_config(), store.clone(), transport.clone()).clock(clock.clone());
    for ns in namespaces {
        builder = builder.namespace(ns.clone());
    }
    TestNode {
        manager: builder.build().expect("manager builds"),
        store,
        transport,
        clock,
    }
}

/// A stock quote as the business collaborator would cache it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
}

impl Quote {
    pub fn new(symbol: &str, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
        }
    }
}

/// Source-of-truth stub that counts fetches.
pub struct CountingLoader {
    calls: AtomicUsize,
    value: Mutex<serde_json::Value>,
    delay: Duration,
    fail: AtomicUsize,
}

impl CountingLoader {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            value: Mutex::new(value),
            delay: Duration::ZERO,
            fail: AtomicUsize::new(0),
        }
    }

    /// Adds latency per fetch so single-flight windows stay open in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_value(&self, value: serde_json::Value) {
        *self.value.lock() = value;
    }

    /// Makes the next `n` fetches fail.
    pub fn fail_next(&self, n: usize) {
        self.fail.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceLoader for CountingLoader {
    async fn load(
        &self,
        _namespace: &str,
        _key: &str,
    ) -> Result<Option<serde_json::Value>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self
            .fail
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SourceError::Failed {
                reason: "injected source failure".to_string(),
            });
        }
        Ok(Some(self.value.lock().clone()))
    }
}

/// Waits briefly for background delivery/flush tasks to settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
