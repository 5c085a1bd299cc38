//! Behaviour of the cache helpers against the in-process store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backend::cache::{CacheService, ChannelMessage, KeyValueStore, MemoryStore};
use backend::error::CacheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

// == Helper Functions ==

fn create_service() -> (CacheService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (CacheService::new(store.clone()), store)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PriceQuote {
    route: String,
    price_eur: u32,
    airlines: Vec<String>,
}

fn quote() -> PriceQuote {
    PriceQuote {
        route: "CDG-JFK".to_string(),
        price_eur: 249,
        airlines: vec!["AF".to_string(), "DL".to_string()],
    }
}

// == JSON get/set ==

#[tokio::test]
async fn test_set_then_get_json_round_trips() {
    let (cache, _) = create_service();

    cache.set_json("price:CDG-JFK", &quote(), Some(300)).await.unwrap();
    let read: Option<PriceQuote> = cache.get_json("price:CDG-JFK").await.unwrap();

    assert_eq!(read, Some(quote()));
}

#[tokio::test]
async fn test_get_json_on_non_json_value_is_a_miss() {
    let (cache, store) = create_service();
    store.set("price:broken", "not json at all", None).await.unwrap();

    let read: Option<PriceQuote> = cache.get_json("price:broken").await.unwrap();
    assert!(read.is_none());
}

#[tokio::test]
async fn test_get_json_with_wrong_shape_is_a_miss() {
    let (cache, _) = create_service();
    cache.set_json("price:CDG-JFK", &json!({"unexpected": true}), None).await.unwrap();

    let read: Option<PriceQuote> = cache.get_json("price:CDG-JFK").await.unwrap();
    assert!(read.is_none());
}

#[tokio::test]
async fn test_set_json_without_ttl_does_not_expire() {
    let (cache, _) = create_service();
    cache.set_json("route:static", &json!(["CDG", "JFK"]), None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let read: Option<Vec<String>> = cache.get_json("route:static").await.unwrap();
    assert_eq!(read, Some(vec!["CDG".to_string(), "JFK".to_string()]));
}

// == Counter ==

#[tokio::test]
async fn test_increment_with_limit_sixth_call_is_rejected() {
    let (cache, _) = create_service();

    for expected in 1..=5 {
        let result = cache.increment_with_limit("calls:user-1", 5, 60).await.unwrap();
        assert_eq!(result.count, expected);
        assert!(result.allowed);
    }

    let result = cache.increment_with_limit("calls:user-1", 5, 60).await.unwrap();
    assert_eq!(result.count, 6);
    assert!(!result.allowed);
}

#[tokio::test]
async fn test_counter_resets_after_expiry() {
    let (cache, _) = create_service();

    cache.increment_with_limit("calls:burst", 1, 1).await.unwrap();
    let second = cache.increment_with_limit("calls:burst", 1, 1).await.unwrap();
    assert!(!second.allowed);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let fresh = cache.increment_with_limit("calls:burst", 1, 1).await.unwrap();
    assert_eq!(fresh.count, 1);
    assert!(fresh.allowed);
}

// == Read-through cache ==

#[tokio::test]
async fn test_cache_invokes_generator_once() {
    let (cache, _) = create_service();
    let calls = AtomicUsize::new(0);

    for _ in 0..2 {
        let value: PriceQuote = cache
            .cache("price:CDG-JFK", 60, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(quote())
            })
            .await
            .unwrap();
        assert_eq!(value, quote());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cache_does_not_store_generator_errors() {
    let (cache, _) = create_service();

    let failed: Result<PriceQuote, CacheError> = cache
        .cache("price:LHR-SFO", 60, || async {
            Err(CacheError::Store("upstream price API down".to_string()))
        })
        .await;
    assert!(failed.is_err());

    let read: Option<PriceQuote> = cache.get_json("price:LHR-SFO").await.unwrap();
    assert!(read.is_none());
}

#[tokio::test]
async fn test_cache_recomputes_corrupt_entries() {
    let (cache, store) = create_service();
    store.set("price:CDG-JFK", "{truncated", Some(60)).await.unwrap();

    let value: PriceQuote = cache
        .cache("price:CDG-JFK", 60, || async { Ok::<_, CacheError>(quote()) })
        .await
        .unwrap();
    assert_eq!(value, quote());

    let read: Option<PriceQuote> = cache.get_json("price:CDG-JFK").await.unwrap();
    assert_eq!(read, Some(quote()));
}

// == Pattern invalidation ==

#[tokio::test]
async fn test_invalidate_pattern_deletes_exact_matches() {
    let (cache, store) = create_service();
    for id in ["a", "b", "c"] {
        store.set(&format!("session:{}", id), "{}", None).await.unwrap();
    }
    store.set("price:CDG-JFK", "{}", None).await.unwrap();
    store.set("sessions", "{}", None).await.unwrap();

    let deleted = cache.invalidate_pattern("session:*").await.unwrap();

    assert_eq!(deleted, 3);
    assert_eq!(store.len(), 2);
    assert!(store.get("price:CDG-JFK").await.unwrap().is_some());
}

#[tokio::test]
async fn test_invalidate_pattern_without_matches_returns_zero() {
    let (cache, store) = create_service();
    store.set("price:CDG-JFK", "{}", None).await.unwrap();

    assert_eq!(cache.invalidate_pattern("session:*").await.unwrap(), 0);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_invalidate_pattern_drains_many_batches() {
    let (cache, store) = create_service();
    for i in 0..450 {
        store.set(&format!("route:{:04}", i), "{}", None).await.unwrap();
    }
    for i in 0..50 {
        store.set(&format!("user:{:04}", i), "{}", None).await.unwrap();
    }

    assert_eq!(cache.invalidate_pattern("route:*").await.unwrap(), 450);
    assert_eq!(store.len(), 50);
}

#[tokio::test]
async fn test_invalidate_pattern_when_every_key_matches() {
    let (cache, store) = create_service();
    for i in 0..350 {
        store.set(&format!("price:{:04}", i), "{}", None).await.unwrap();
    }

    assert_eq!(cache.invalidate_pattern("price:*").await.unwrap(), 350);
    assert!(store.is_empty());
}

// == Locks ==

#[tokio::test]
async fn test_lock_lifecycle() {
    let (cache, _) = create_service();

    let token = cache.acquire_lock("r1").await.unwrap().expect("lock should be free");
    assert!(cache.acquire_lock("r1").await.unwrap().is_none());

    assert!(!cache.release_lock("r1", "not-the-owner").await.unwrap());
    assert!(cache.acquire_lock("r1").await.unwrap().is_none());

    assert!(cache.release_lock("r1", &token).await.unwrap());
    assert!(cache.acquire_lock("r1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_lock_tokens_are_unique() {
    let (cache, _) = create_service();

    let first = cache.acquire_lock("scan:tier1").await.unwrap().unwrap();
    let second = cache.acquire_lock("scan:tier2").await.unwrap().unwrap();
    assert_ne!(first, second);
    assert_eq!(first.len(), 32);
}

#[tokio::test]
async fn test_release_of_unheld_lock_is_false() {
    let (cache, _) = create_service();
    assert!(!cache.release_lock("never-taken", "token").await.unwrap());
}

// == Sliding-window rate limiting ==

#[tokio::test]
async fn test_rate_limit_admits_up_to_limit_then_rejects() {
    let (cache, _) = create_service();
    let window = Duration::from_millis(1000);

    let started = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
    for expected_remaining in [2, 1, 0] {
        let decision = cache.check_rate_limit("u1", 3, window).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, expected_remaining);
    }

    let rejected = cache.check_rate_limit("u1", 3, window).await.unwrap();
    assert!(!rejected.allowed);
    assert_eq!(rejected.remaining, 0);

    // Capacity frees up one window after the oldest admitted request.
    let until_reset = (rejected.reset_at - started).num_milliseconds();
    assert!((1000..1200).contains(&until_reset), "reset in {}ms", until_reset);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let later = cache.check_rate_limit("u1", 3, window).await.unwrap();
    assert!(later.allowed);
    assert_eq!(later.remaining, 2);
}

#[tokio::test]
async fn test_rate_limit_identifiers_are_independent() {
    let (cache, _) = create_service();
    let window = Duration::from_secs(60);

    assert!(cache.check_rate_limit("10.0.0.1", 1, window).await.unwrap().allowed);
    assert!(!cache.check_rate_limit("10.0.0.1", 1, window).await.unwrap().allowed);
    assert!(cache.check_rate_limit("10.0.0.2", 1, window).await.unwrap().allowed);
}

#[tokio::test]
async fn test_rejected_requests_do_not_consume_capacity() {
    let (cache, store) = create_service();
    let window = Duration::from_secs(60);

    for _ in 0..5 {
        cache.check_rate_limit("u2", 2, window).await.unwrap();
    }
    assert_eq!(store.zcard("rate_limit:u2").await.unwrap(), 2);
}

// == Pub/Sub ==

#[tokio::test]
async fn test_subscribe_receives_json_and_raw_messages() {
    let (cache, _) = create_service();
    let (tx, mut rx) = mpsc::unbounded_channel();

    cache
        .subscribe("alerts", move |msg| {
            let _ = tx.send(msg);
        })
        .await
        .unwrap();

    cache.publish("alerts", &json!({"route": "CDG-JFK", "discount": 42})).await.unwrap();
    cache.publish("alerts", "plain text").await.unwrap();

    let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, ChannelMessage::Json(json!({"route": "CDG-JFK", "discount": 42})));

    let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(second, ChannelMessage::Raw("plain text".to_string()));
}

#[tokio::test]
async fn test_channels_do_not_cross_deliver() {
    let (cache, _) = create_service();
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();

    cache.subscribe("a", move |msg| { let _ = tx_a.send(msg); }).await.unwrap();
    cache.subscribe("b", move |msg| { let _ = tx_b.send(msg); }).await.unwrap();

    cache.publish("b", &json!({"only": "b"})).await.unwrap();

    let on_b = timeout(Duration::from_secs(1), rx_b.recv()).await.unwrap().unwrap();
    assert_eq!(on_b, ChannelMessage::Json(json!({"only": "b"})));
    assert!(timeout(Duration::from_millis(100), rx_a.recv()).await.is_err());
}

#[tokio::test]
async fn test_one_delivery_per_publish() {
    let (cache, _) = create_service();
    let (tx, mut rx) = mpsc::unbounded_channel();

    cache.subscribe("scans", move |msg| { let _ = tx.send(msg); }).await.unwrap();
    cache.publish("scans", &json!({"tier": 1})).await.unwrap();

    assert!(timeout(Duration::from_secs(1), rx.recv()).await.unwrap().is_some());
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let (cache, _) = create_service();
    let (tx, mut rx) = mpsc::unbounded_channel();

    cache.subscribe("prices", move |msg| { let _ = tx.send(msg); }).await.unwrap();
    assert!(cache.unsubscribe("prices").await);
    assert!(!cache.unsubscribe("prices").await);

    cache.publish("prices", "after unsubscribe").await.unwrap();
    // The relay task was aborted, so the sender is dropped and nothing arrives.
    let received = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
    assert!(received.is_none());
}

// == Liveness and stats ==

#[tokio::test]
async fn test_ping_and_info() {
    let (cache, store) = create_service();
    store.set("k", "v", None).await.unwrap();

    assert!(cache.ping().await);
    let info = cache.get_info().await.unwrap();
    assert_eq!(info.get("keys").map(String::as_str), Some("1"));
    assert_eq!(cache.backend_name(), "memory");
}
