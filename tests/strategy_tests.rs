//! Integration tests for the write/refresh strategies.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{CountingLoader, build_node, init_tracing, test_config};
use futures::future::join_all;
use serde_json::json;
use tickcache::{
    BroadcastTransport, CacheManager, KeyArgs, ManualClock, MemoryRemoteStore, NamespaceConfig,
    Strategy, payload,
};

fn aapl() -> KeyArgs {
    KeyArgs::new().arg("AAPL")
}

fn build_with_loader(
    ns: NamespaceConfig,
    loader: Arc<CountingLoader>,
) -> (Arc<CacheManager>, Arc<MemoryRemoteStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryRemoteStore::with_clock(clock.clone()));
    let manager = CacheManager::builder(
        test_config(),
        store.clone(),
        Arc::new(BroadcastTransport::new()),
    )
    .clock(clock.clone())
    .namespace_with_loader(ns, loader)
    .build()
    .unwrap();
    (manager, store, clock)
}

#[tokio::test]
async fn write_behind_lands_in_remote_store() {
    init_tracing();
    let ns = NamespaceConfig::new("sentiment_current", 60, 100, Strategy::WriteBehind);
    let node = build_node(&[ns]);

    node.manager
        .set(
            "sentiment_current",
            &aapl(),
            &json!({"score": 0.8}),
            None,
        )
        .await
        .unwrap();

    // Local is visible immediately; remote catches up asynchronously.
    let got: Option<serde_json::Value> = node
        .manager
        .get("sentiment_current", &aapl())
        .await
        .unwrap();
    assert_eq!(got, Some(json!({"score": 0.8})));

    common::settle().await;
    assert_eq!(node.store.len(), 1);
}

#[tokio::test]
async fn write_behind_preserves_per_key_order() {
    init_tracing();
    let ns = NamespaceConfig::new("sentiment_current", 60, 100, Strategy::WriteBehind);
    let node = build_node(&[ns]);

    node.manager
        .set("sentiment_current", &aapl(), &json!({"v": 1}), None)
        .await
        .unwrap();
    node.manager
        .set("sentiment_current", &aapl(), &json!({"v": 2}), None)
        .await
        .unwrap();

    common::settle().await;

    let history: Vec<serde_json::Value> = node
        .store
        .write_history()
        .into_iter()
        .filter(|(key, _)| key == "sentiment_current:AAPL")
        .map(|(_, bytes)| payload::decode(&bytes).unwrap())
        .collect();
    assert_eq!(history, vec![json!({"v": 1}), json!({"v": 2})]);
}

#[tokio::test]
async fn write_behind_exhaustion_counts_and_never_surfaces() {
    init_tracing();
    let ns = NamespaceConfig::new("sentiment_current", 60, 100, Strategy::WriteBehind);
    let node = build_node(&[ns]);
    node.store.set_unavailable(true);

    // Fire-and-forget: the caller sees success.
    node.manager
        .set("sentiment_current", &aapl(), &json!({"v": 1}), None)
        .await
        .unwrap();

    // retries=2, backoff 5ms: exhausted well within this window.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(node.manager.stats().errors >= 1);
    assert_eq!(node.store.write_history().len(), 0);

    // The local copy is still served.
    let got: Option<serde_json::Value> = node
        .manager
        .get("sentiment_current", &aapl())
        .await
        .unwrap();
    assert_eq!(got, Some(json!({"v": 1})));
}

#[tokio::test]
async fn write_around_bypasses_both_tiers() {
    init_tracing();
    let ns = NamespaceConfig::new("daily_history", 300, 100, Strategy::WriteAround);
    let node = build_node(&[ns]);

    node.manager
        .set("daily_history", &aapl(), &json!({"closes": [1, 2]}), None)
        .await
        .unwrap();

    assert!(!node.manager.contains_local("daily_history", &aapl()).unwrap());
    assert_eq!(node.store.len(), 0);

    let got: Option<serde_json::Value> = node.manager.get("daily_history", &aapl()).await.unwrap();
    assert_eq!(got, None);
}

#[tokio::test]
async fn write_around_populates_lazily_via_read_through() {
    init_tracing();
    let loader = Arc::new(CountingLoader::new(json!({"closes": [1, 2, 3]})));
    let ns = NamespaceConfig::new("daily_history", 300, 100, Strategy::WriteAround);
    let (manager, store, _clock) = build_with_loader(ns, loader.clone());

    let got: Option<serde_json::Value> = manager.get("daily_history", &aapl()).await.unwrap();
    assert_eq!(got, Some(json!({"closes": [1, 2, 3]})));
    assert_eq!(loader.calls(), 1);

    // Both tiers were populated by the miss, so the next read is a local hit.
    assert!(manager.contains_local("daily_history", &aapl()).unwrap());
    assert_eq!(store.len(), 1);

    let again: Option<serde_json::Value> = manager.get("daily_history", &aapl()).await.unwrap();
    assert_eq!(again, Some(json!({"closes": [1, 2, 3]})));
    assert_eq!(loader.calls(), 1);
}

#[tokio::test]
async fn refresh_ahead_single_flight_under_concurrency() {
    init_tracing();
    let loader = Arc::new(
        CountingLoader::new(json!({"price": 160.0})).with_delay(Duration::from_millis(50)),
    );
    let ns = NamespaceConfig::new("stock_quote", 10, 100, Strategy::RefreshAhead).refresh_ratio(0.5);
    let (manager, _store, clock) = build_with_loader(ns, loader.clone());

    manager
        .set("stock_quote", &aapl(), &json!({"price": 150.0}), None)
        .await
        .unwrap();

    // Enter the refresh window (last 5s of a 10s TTL).
    clock.advance(Duration::from_secs(6));

    let readers = (0..50).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .get::<serde_json::Value>("stock_quote", &KeyArgs::new().arg("AAPL"))
                .await
                .unwrap()
        })
    });
    let results = join_all(readers).await;

    // Every concurrent reader observed the previous value, none blocked or
    // errored, and exactly one refresh hit the source of truth.
    for result in results {
        assert_eq!(result.unwrap(), Some(json!({"price": 150.0})));
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(loader.calls(), 1);

    let refreshed: Option<serde_json::Value> = manager.get("stock_quote", &aapl()).await.unwrap();
    assert_eq!(refreshed, Some(json!({"price": 160.0})));
}

#[tokio::test]
async fn refresh_ahead_outside_window_does_nothing() {
    let loader = Arc::new(CountingLoader::new(json!({"price": 160.0})));
    let ns = NamespaceConfig::new("stock_quote", 10, 100, Strategy::RefreshAhead).refresh_ratio(0.2);
    let (manager, _store, clock) = build_with_loader(ns, loader.clone());

    manager
        .set("stock_quote", &aapl(), &json!({"price": 150.0}), None)
        .await
        .unwrap();

    clock.advance(Duration::from_secs(1));
    let got: Option<serde_json::Value> = manager.get("stock_quote", &aapl()).await.unwrap();
    assert_eq!(got, Some(json!({"price": 150.0})));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(loader.calls(), 0);
}

#[tokio::test]
async fn refresh_ahead_failure_serves_stale() {
    init_tracing();
    let loader = Arc::new(CountingLoader::new(json!({"price": 160.0})));
    loader.fail_next(1);
    let ns = NamespaceConfig::new("stock_quote", 10, 100, Strategy::RefreshAhead).refresh_ratio(0.5);
    let (manager, _store, clock) = build_with_loader(ns, loader.clone());

    manager
        .set("stock_quote", &aapl(), &json!({"price": 150.0}), None)
        .await
        .unwrap();
    clock.advance(Duration::from_secs(6));

    let got: Option<serde_json::Value> = manager.get("stock_quote", &aapl()).await.unwrap();
    assert_eq!(got, Some(json!({"price": 150.0})));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(loader.calls(), 1);
    assert!(manager.stats().errors >= 1);

    // The stale value keeps being served until expiry.
    let still: Option<serde_json::Value> = manager.get("stock_quote", &aapl()).await.unwrap();
    assert_eq!(still, Some(json!({"price": 150.0})));
}

#[tokio::test]
async fn shutdown_drains_pending_write_behind() {
    init_tracing();
    let ns = NamespaceConfig::new("sentiment_current", 60, 100, Strategy::WriteBehind);
    let node = build_node(&[ns]);

    for symbol in ["AAPL", "MSFT", "GOOG", "AMZN", "NVDA"] {
        node.manager
            .set(
                "sentiment_current",
                &KeyArgs::new().arg(symbol),
                &json!({"score": 0.5}),
                None,
            )
            .await
            .unwrap();
    }

    node.manager.shutdown().await;
    assert_eq!(node.store.len(), 5);
}

#[tokio::test]
async fn shutdown_deadline_bounds_a_stuck_flush() {
    init_tracing();
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryRemoteStore::with_clock(clock.clone()));
    store.set_unavailable(true);

    let mut config = test_config();
    config.write_behind_retries = 5;
    config.write_behind_backoff = Duration::from_secs(10);
    config.shutdown_flush_deadline = Duration::from_millis(100);

    let manager = CacheManager::builder(config, store, Arc::new(BroadcastTransport::new()))
        .clock(clock.clone())
        .namespace(NamespaceConfig::new(
            "sentiment_current",
            60,
            100,
            Strategy::WriteBehind,
        ))
        .build()
        .unwrap();

    manager
        .set("sentiment_current", &aapl(), &json!({"v": 1}), None)
        .await
        .unwrap();

    let started = Instant::now();
    manager.shutdown().await;
    // Bounded by the deadline, not the backoff schedule.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(manager.stats().errors >= 1);
}
