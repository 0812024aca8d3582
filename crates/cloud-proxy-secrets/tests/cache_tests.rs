//! Secret cache behaviour against a recording store
//!
//! Time is paused so TTL boundaries are exact.

mod common;

use cloud_proxy_core::Error;
use cloud_proxy_secrets::{SecretCache, SecretValue};
use common::RecordingStore;
use std::sync::Arc;
use std::time::Duration;

fn cache(store: &RecordingStore, max_entries: usize, ttl_secs: u64) -> SecretCache {
    SecretCache::new(
        Arc::new(store.clone()),
        max_entries,
        Duration::from_secs(ttl_secs),
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_capacity_two_keeps_latest_two() {
    let store = RecordingStore::echo(&["a", "b", "c"]);
    let cache = cache(&store, 2, 3600);

    for name in ["a", "b", "c"] {
        cache.get(name).await.unwrap();
    }

    assert_eq!(cache.names().await, vec!["b", "c"]);
    assert!(!cache.contains("a").await);
}

#[tokio::test(start_paused = true)]
async fn test_ttl_hit_then_refetch() {
    let store = RecordingStore::echo(&["x"]);
    let cache = cache(&store, 10, 10);

    cache.get("x").await.unwrap();
    assert_eq!(store.fetch_count("x"), 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    let value = cache.get("x").await.unwrap();
    assert_eq!(value, SecretValue::from("value-of-x"));
    assert_eq!(store.fetch_count("x"), 1);

    tokio::time::advance(Duration::from_secs(6)).await;
    cache.get("x").await.unwrap();
    assert_eq!(store.fetch_count("x"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_size_never_exceeds_capacity() {
    let names: Vec<String> = (0..25).map(|i| format!("secret-{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let store = RecordingStore::echo(&refs);
    let cache = cache(&store, 4, 3600);

    for (i, name) in names.iter().enumerate() {
        cache.get(name).await.unwrap();
        // revisit an older key now and then
        if i % 3 == 0 {
            cache.get(&names[i / 2]).await.unwrap();
        }
        assert!(cache.len().await <= 4);
        tokio::time::advance(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_eviction_keeps_most_recently_fetched() {
    let store = RecordingStore::echo(&["a", "b", "c", "d"]);
    let cache = cache(&store, 3, 3600);

    for name in ["a", "b", "c"] {
        cache.get(name).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
    }
    // a hit does not refresh fetchedAt
    cache.get("a").await.unwrap();
    cache.get("d").await.unwrap();

    assert_eq!(cache.names().await, vec!["b", "c", "d"]);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_lookups_never_fetch() {
    let store = RecordingStore::echo(&["k"]);
    let cache = cache(&store, 1, 30);

    cache.get("k").await.unwrap();
    for _ in 0..29 {
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.get("k").await.unwrap();
    }
    assert_eq!(store.fetch_count("k"), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    cache.get("k").await.unwrap();
    assert_eq!(store.fetch_count("k"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_leaves_cache_untouched() {
    let store = RecordingStore::echo(&["a", "b"]);
    let cache = cache(&store, 5, 10);

    cache.get("a").await.unwrap();
    cache.get("b").await.unwrap();
    tokio::time::advance(Duration::from_secs(10)).await;

    store.fail(Some("a"));
    let err = cache.get("a").await.unwrap_err();
    assert!(matches!(err, Error::SecretFetch { .. }));
    assert_eq!(cache.names().await, vec!["a", "b"]);

    store.fail(None);
    store.set("a", "rotated");
    assert_eq!(cache.get("a").await.unwrap(), SecretValue::from("rotated"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_lookups_fetch_once() {
    let store = RecordingStore::echo(&["shared"]).with_delay(Duration::from_millis(50));
    let cache = Arc::new(cache(&store, 10, 3600));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move { cache.get("shared").await }));
    }
    for handle in handles {
        assert_eq!(
            handle.await.unwrap().unwrap(),
            SecretValue::from("value-of-shared")
        );
    }

    assert_eq!(store.fetch_count("shared"), 1);
    let stats = cache.stats().await;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 7);
}
