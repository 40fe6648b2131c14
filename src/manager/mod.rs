//! Cache manager facade.
//!
//! Composes the key codec, the two tiers, the strategy executor and the
//! invalidation bus behind the one interface external collaborators use.
//! Constructed once at service start via [`CacheManager::builder`] with its
//! full set of [`NamespaceConfig`]s, and torn down with an explicit
//! [`CacheManager::shutdown`] that drains the write-behind queue under a
//! bounded deadline.
//!
//! # Consistency
//!
//! During a partition between a node and the shared backing store or the
//! invalidation bus, the node keeps serving its local tier — possibly stale —
//! until entries expire. The guarantee is eventual consistency bounded by
//! TTL; nothing stronger is claimed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::bus::{EventTransport, EventType, InvalidationEvent};
use crate::clock::Clock;
use crate::config::{CacheConfig, ConfigError, NamespaceConfig, Strategy};
use crate::error::{CacheError, CacheResult};
use crate::key::{self, KeyArgs};
use crate::payload;
use crate::stats::{CacheStats, StatsCollector};
use crate::strategy::{FlushPolicy, SingleFlight, SourceLoader, StrategyExecutor, WriteBehindQueue};
use crate::tier::{LocalLookup, LocalTier, RemoteStore, RemoteTier};

/// Entries tracked for last-timestamp-wins before the index is pruned.
const APPLIED_INDEX_CAP: usize = 4096;

struct Namespace {
    config: NamespaceConfig,
    local: LocalTier,
    loader: Option<Arc<dyn SourceLoader>>,
    flight: Arc<SingleFlight>,
}

/// Last-applied-event timestamps per `(namespace, key)`, for
/// last-timestamp-wins resolution of conflicting concurrent events.
#[derive(Default)]
struct AppliedIndex {
    inner: Mutex<HashMap<(String, String), i64>>,
}

impl AppliedIndex {
    /// Returns `false` when a newer event for the key was already applied.
    fn admit(&self, namespace: &str, key: &str, timestamp_ms: i64) -> bool {
        let mut map = self.inner.lock();
        if map.len() >= APPLIED_INDEX_CAP {
            // Re-applying an older event after a prune is harmless: event
            // application only drops local copies.
            map.clear();
        }
        let slot = (namespace.to_string(), key.to_string());
        match map.get(&slot) {
            Some(&prev) if prev > timestamp_ms => false,
            _ => {
                map.insert(slot, timestamp_ms);
                true
            }
        }
    }
}

/// Facade over the multi-tier cache. Construct via [`CacheManager::builder`].
pub struct CacheManager {
    node_id: Uuid,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    namespaces: HashMap<String, Arc<Namespace>>,
    remote: RemoteTier,
    transport: Arc<dyn EventTransport>,
    executor: StrategyExecutor,
    stats: Arc<StatsCollector>,
    refresh_permits: Arc<Semaphore>,
    applied: AppliedIndex,
    shutting_down: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheManager {
    /// Starts building a manager over a backing store and event transport.
    pub fn builder(
        config: CacheConfig,
        store: Arc<dyn RemoteStore>,
        transport: Arc<dyn EventTransport>,
    ) -> CacheManagerBuilder {
        CacheManagerBuilder {
            config,
            store,
            transport,
            clock: Arc::new(crate::clock::SystemClock),
            namespaces: Vec::new(),
        }
    }

    /// This node's identity on the invalidation bus.
    #[inline]
    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    /// Snapshot of the hit/miss/error counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Number of entries resident in a namespace's local tier.
    pub fn local_entry_count(&self, namespace: &str) -> CacheResult<usize> {
        Ok(self.namespace(namespace)?.local.len())
    }

    /// Returns `true` if the encoded key is resident and fresh in the local
    /// tier. Does not touch LRU order.
    pub fn contains_local(&self, namespace: &str, args: &KeyArgs) -> CacheResult<bool> {
        let ns = self.namespace(namespace)?;
        let key = key::encode(namespace, args)?;
        Ok(ns.local.contains(&key))
    }

    fn namespace(&self, name: &str) -> CacheResult<&Arc<Namespace>> {
        self.namespaces
            .get(name)
            .ok_or_else(|| CacheError::UnknownNamespace {
                namespace: name.to_string(),
            })
    }

    /// Looks up a value: local tier first, remote tier on miss (backfilling
    /// the local tier on a remote hit), then miss.
    ///
    /// On a full miss the caller fetches from the source of truth and calls
    /// [`CacheManager::set`]; the exception is a write-around namespace with
    /// a registered [`SourceLoader`], where the manager performs the
    /// read-through itself since writes never pass through the cache.
    #[instrument(skip(self, args))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        args: &KeyArgs,
    ) -> CacheResult<Option<T>> {
        let ns = self.namespace(namespace)?;
        let key = key::encode(namespace, args)?;

        if let Some(lookup) = ns.local.get(&key) {
            match payload::decode::<T>(lookup.value()) {
                Ok(value) => {
                    debug!(key, "local tier hit");
                    self.stats.record_hit();
                    if ns.config.strategy == Strategy::RefreshAhead {
                        self.maybe_refresh(ns, &key, &lookup);
                    }
                    return Ok(Some(value));
                }
                Err(e) => {
                    warn!(key, error = %e, "corrupt local payload, dropping entry");
                    ns.local.delete(&key);
                    self.stats.record_error();
                }
            }
        }

        if let Some(bytes) = self.remote.get(&key).await {
            match payload::decode::<T>(&bytes) {
                Ok(value) => {
                    debug!(key, "remote tier hit, promoting to local");
                    // Copy on promotion; the tiers never share an entry.
                    ns.local.set(&key, bytes, ns.config.ttl());
                    self.stats.record_hit();
                    return Ok(Some(value));
                }
                Err(e) => {
                    warn!(key, error = %e, "corrupt remote payload, deleting entry");
                    self.remote.delete(&key).await;
                    self.stats.record_error();
                }
            }
        }

        self.stats.record_miss();
        if ns.config.strategy == Strategy::WriteAround {
            if let Some(value) = self.read_through::<T>(ns, &key).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Writes a value according to the namespace strategy and announces the
    /// mutation to peers. `ttl_override` replaces the namespace TTL for this
    /// entry only.
    #[instrument(skip(self, args, value))]
    pub async fn set<T: Serialize>(
        &self,
        namespace: &str,
        args: &KeyArgs,
        value: &T,
        ttl_override: Option<Duration>,
    ) -> CacheResult<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(CacheError::ShuttingDown);
        }
        let ns = self.namespace(namespace)?;
        let key = key::encode(namespace, args)?;
        let bytes = payload::encode(ns.config.format, value)?;
        let ttl = ttl_override.unwrap_or_else(|| ns.config.ttl());

        let shared = self
            .executor
            .write(ns.config.strategy, &ns.local, &key, bytes, ttl)
            .await;
        self.stats.record_set();

        if shared {
            self.publish(InvalidationEvent::set(
                namespace,
                &key,
                self.node_id,
                self.clock.unix_millis(),
            ))
            .await;
        }
        Ok(())
    }

    /// Deletes a key from both tiers and announces the deletion. A deleted
    /// entry is only resurrected by a new explicit `set`.
    #[instrument(skip(self, args))]
    pub async fn delete(&self, namespace: &str, args: &KeyArgs) -> CacheResult<()> {
        let ns = self.namespace(namespace)?;
        let key = key::encode(namespace, args)?;

        ns.local.delete(&key);
        self.remote.delete(&key).await;
        self.stats.record_delete();

        self.publish(InvalidationEvent::delete(
            namespace,
            &key,
            self.node_id,
            self.clock.unix_millis(),
        ))
        .await;
        Ok(())
    }

    /// Clears a namespace in both tiers and announces the clear. When the
    /// backing store cannot enumerate keys its entries are left to expire
    /// via TTL.
    #[instrument(skip(self))]
    pub async fn clear(&self, namespace: &str) -> CacheResult<()> {
        let ns = self.namespace(namespace)?;
        ns.local.clear();

        match self.remote.keys(&format!("{namespace}:*")).await {
            Some(keys) => {
                join_all(keys.iter().map(|k| self.remote.delete(k))).await;
            }
            None => {
                warn!(
                    namespace,
                    "backing store cannot enumerate keys, remote entries expire via TTL"
                );
            }
        }

        self.publish(InvalidationEvent::clear(
            namespace,
            self.node_id,
            self.clock.unix_millis(),
        ))
        .await;
        Ok(())
    }

    /// Deletes every key matching `pattern` (glob, `*` and `?`) within a
    /// namespace and publishes a DELETE per key. Degrades to a
    /// namespace-wide [`CacheManager::clear`] when the backing store lacks
    /// key enumeration. Returns the number of keys invalidated individually.
    #[instrument(skip(self))]
    pub async fn invalidate_pattern(&self, namespace: &str, pattern: &str) -> CacheResult<usize> {
        let ns = self.namespace(namespace)?;
        let full_pattern = format!("{namespace}:{pattern}");

        match self.remote.keys(&full_pattern).await {
            Some(keys) => {
                join_all(keys.iter().map(|k| self.remote.delete(k))).await;
                let timestamp_ms = self.clock.unix_millis();
                for key in &keys {
                    ns.local.delete(key);
                    self.stats.record_delete();
                    self.publish(InvalidationEvent::delete(
                        namespace,
                        key,
                        self.node_id,
                        timestamp_ms,
                    ))
                    .await;
                }
                debug!(namespace, pattern, invalidated = keys.len(), "pattern invalidation");
                Ok(keys.len())
            }
            None => {
                warn!(
                    namespace,
                    pattern, "no key enumeration, degrading to namespace clear"
                );
                self.clear(namespace).await?;
                Ok(0)
            }
        }
    }

    /// Flushes pending write-behind work under the configured deadline and
    /// stops the background tasks. Idempotent; further writes fail with
    /// [`CacheError::ShuttingDown`].
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(node_id = %self.node_id, "cache manager shutting down");

        self.executor
            .shutdown(self.config.shutdown_flush_deadline)
            .await;

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    async fn publish(&self, event: InvalidationEvent) {
        if let Err(e) = self.transport.publish(&event).await {
            warn!(error = %e, "failed to publish invalidation event");
            self.stats.record_error();
        }
    }

    /// Applies a peer's event to the local tier only. Never republishes and
    /// performs no remote calls, so delivery can never loop or block.
    fn apply_event(&self, event: InvalidationEvent) {
        if event.origin_node_id == self.node_id {
            return;
        }
        let Some(ns) = self.namespaces.get(&event.namespace) else {
            debug!(namespace = %event.namespace, "event for unregistered namespace ignored");
            return;
        };

        match (event.event_type, event.key.as_deref()) {
            (EventType::Clear, _) => {
                ns.local.clear();
                debug!(namespace = %event.namespace, "applied remote clear");
            }
            (EventType::Set | EventType::Delete, Some(key)) => {
                if !self.applied.admit(&event.namespace, key, event.timestamp_ms) {
                    debug!(key, "stale event superseded by newer mutation, skipping");
                    return;
                }
                // A peer SET means our copy is stale; dropping it lets the
                // next read backfill from the remote tier. A DELETE drops it
                // for good. Both are idempotent.
                ns.local.delete(key);
            }
            (_, None) => {
                warn!(event_id = %event.event_id, "malformed invalidation event without key");
            }
        }
    }

    /// Read-through for write-around namespaces: writes go around the cache,
    /// so population happens here, on the first miss, guarded per key.
    async fn read_through<T: DeserializeOwned>(
        &self,
        ns: &Arc<Namespace>,
        key: &str,
    ) -> CacheResult<Option<T>> {
        let Some(loader) = &ns.loader else {
            return Ok(None);
        };
        // Someone else is already loading this key; report the miss rather
        // than pile onto the source of truth.
        let Some(_guard) = ns.flight.begin(key) else {
            return Ok(None);
        };

        match loader.load(&ns.config.name, key).await {
            Ok(Some(value)) => {
                let bytes = payload::encode(ns.config.format, &value)?;
                let ttl = ns.config.ttl();
                ns.local.set(key, bytes.clone(), ttl);
                self.remote.set(key, &bytes, ttl).await;
                let typed = serde_json::from_value::<T>(value)
                    .map_err(payload::PayloadError::Decode)?;
                debug!(key, "read-through populated write-around entry");
                Ok(Some(typed))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(key, error = %e, "read-through fetch failed");
                self.stats.record_error();
                Ok(None)
            }
        }
    }

    /// Spawns an asynchronous refresh when a read lands in the refresh
    /// window. Concurrent readers keep getting the current value; the
    /// single-flight guard admits one refresh per key and the semaphore
    /// bounds the refresh pool as a whole.
    fn maybe_refresh(&self, ns: &Arc<Namespace>, key: &str, lookup: &LocalLookup) {
        if !lookup.in_refresh_window(self.clock.now(), ns.config.refresh_ratio) {
            return;
        }
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        let Some(loader) = ns.loader.clone() else {
            return;
        };
        let Ok(permit) = Arc::clone(&self.refresh_permits).try_acquire_owned() else {
            debug!(key, "refresh pool saturated, serving stale value");
            return;
        };
        let Some(guard) = ns.flight.begin(key) else {
            return;
        };

        let ns = Arc::clone(ns);
        let remote = self.remote.clone();
        let transport = Arc::clone(&self.transport);
        let stats = Arc::clone(&self.stats);
        let clock = Arc::clone(&self.clock);
        let node_id = self.node_id;
        let key = key.to_string();

        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;

            match loader.load(&ns.config.name, &key).await {
                Ok(Some(value)) => match payload::encode(ns.config.format, &value) {
                    Ok(bytes) => {
                        let ttl = ns.config.ttl();
                        ns.local.set(&key, bytes.clone(), ttl);
                        remote.set(&key, &bytes, ttl).await;
                        let event = InvalidationEvent::set(
                            &ns.config.name,
                            &key,
                            node_id,
                            clock.unix_millis(),
                        );
                        if transport.publish(&event).await.is_err() {
                            stats.record_error();
                        }
                        debug!(key, "refresh-ahead completed");
                    }
                    Err(e) => {
                        warn!(key, error = %e, "refresh-ahead payload encoding failed");
                        stats.record_error();
                    }
                },
                Ok(None) => {
                    // Gone upstream: drop the entry everywhere.
                    ns.local.delete(&key);
                    remote.delete(&key).await;
                    let event = InvalidationEvent::delete(
                        &ns.config.name,
                        &key,
                        node_id,
                        clock.unix_millis(),
                    );
                    if transport.publish(&event).await.is_err() {
                        stats.record_error();
                    }
                }
                Err(e) => {
                    warn!(key, error = %e, "refresh-ahead fetch failed, serving stale until expiry");
                    stats.record_error();
                }
            }
        });
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("node_id", &self.node_id)
            .field("namespaces", &self.namespaces.len())
            .field("shutting_down", &self.shutting_down.load(Ordering::Relaxed))
            .finish()
    }
}

/// Builder for [`CacheManager`]. Namespaces are fixed at build time.
pub struct CacheManagerBuilder {
    config: CacheConfig,
    store: Arc<dyn RemoteStore>,
    transport: Arc<dyn EventTransport>,
    clock: Arc<dyn Clock>,
    namespaces: Vec<(NamespaceConfig, Option<Arc<dyn SourceLoader>>)>,
}

impl CacheManagerBuilder {
    /// Overrides the time source (tests pass a manual clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers a namespace.
    pub fn namespace(mut self, config: NamespaceConfig) -> Self {
        self.namespaces.push((config, None));
        self
    }

    /// Registers a namespace with a source-of-truth loader. Required for
    /// refresh-ahead; enables read-through for write-around.
    pub fn namespace_with_loader(
        mut self,
        config: NamespaceConfig,
        loader: Arc<dyn SourceLoader>,
    ) -> Self {
        self.namespaces.push((config, Some(loader)));
        self
    }

    /// Validates the namespace set, starts the background tasks and returns
    /// the manager. Must be called within a tokio runtime.
    pub fn build(self) -> Result<Arc<CacheManager>, ConfigError> {
        let mut namespaces = HashMap::with_capacity(self.namespaces.len());
        for (config, loader) in self.namespaces {
            config.validate()?;
            if namespaces.contains_key(&config.name) {
                return Err(ConfigError::DuplicateNamespace {
                    namespace: config.name,
                });
            }
            if config.strategy == Strategy::RefreshAhead && loader.is_none() {
                return Err(ConfigError::MissingLoader {
                    namespace: config.name,
                });
            }
            let local = LocalTier::new(config.max_entries, Arc::clone(&self.clock));
            namespaces.insert(
                config.name.clone(),
                Arc::new(Namespace {
                    local,
                    loader,
                    flight: Arc::new(SingleFlight::new()),
                    config,
                }),
            );
        }

        let stats = Arc::new(StatsCollector::new());
        let remote = RemoteTier::new(self.store, self.config.remote_timeout, Arc::clone(&stats));
        let queue = WriteBehindQueue::start(
            remote.clone(),
            Arc::clone(&stats),
            self.config.write_behind_capacity,
            FlushPolicy {
                retries: self.config.write_behind_retries,
                base_backoff: self.config.write_behind_backoff,
            },
        );
        let executor = StrategyExecutor::new(remote.clone(), queue);

        let manager = Arc::new(CacheManager {
            node_id: Uuid::new_v4(),
            clock: self.clock,
            namespaces,
            remote,
            transport: self.transport,
            executor,
            refresh_permits: Arc::new(Semaphore::new(self.config.max_concurrent_refreshes)),
            stats,
            applied: AppliedIndex::default(),
            shutting_down: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            config: self.config,
        });

        let mut rx = manager.transport.subscribe();
        let delivery_mgr = Arc::clone(&manager);
        let delivery = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                delivery_mgr.apply_event(event);
            }
            debug!("invalidation delivery loop exiting");
        });
        manager.tasks.lock().push(delivery);

        if let Some(interval) = manager.config.sweep_interval {
            let sweep_mgr = Arc::clone(&manager);
            let sweeper = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    for ns in sweep_mgr.namespaces.values() {
                        let swept = ns.local.sweep();
                        if swept > 0 {
                            debug!(namespace = %ns.config.name, swept, "sweeper reclaimed expired entries");
                        }
                    }
                }
            });
            manager.tasks.lock().push(sweeper);
        }

        info!(
            node_id = %manager.node_id,
            namespaces = manager.namespaces.len(),
            "cache manager started"
        );
        Ok(manager)
    }
}
