use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use tokio::task::JoinHandle;

use super::store::KeyValueStore;
use crate::error::{CacheError, CacheResult};

/// Helper layer over a key-value store: JSON values, read-through caching,
/// counters, locks, rate limiting and pub/sub.
///
/// Holds no cached data itself. The only in-process state is the set of
/// relay tasks started by [`CacheService::subscribe`].
#[derive(Clone)]
pub struct CacheService {
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) subscriptions: Arc<Mutex<HashMap<String, Vec<JoinHandle<()>>>>>,
}

impl CacheService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Reads and decodes a JSON value.
    ///
    /// A value that does not decode is logged and reported as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::error!("Error parsing JSON for key {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Encodes and writes a JSON value. Without a TTL the key never expires.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: Option<u64>,
    ) -> CacheResult<()> {
        let encoded = serde_json::to_string(value)?;
        self.store.set(key, &encoded, ttl_secs).await
    }

    /// Read-through cache.
    ///
    /// On a hit the generator is not called. On a miss it runs once and its
    /// result is stored for `ttl_secs`. Concurrent misses on one key each
    /// run their own generator.
    pub async fn cache<T, F, Fut, E>(&self, key: &str, ttl_secs: u64, generator: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CacheError>,
    {
        if let Some(cached) = self.get_json::<T>(key).await? {
            return Ok(cached);
        }

        let value = generator().await?;
        self.set_json(key, &value, Some(ttl_secs)).await?;
        Ok(value)
    }

    /// Liveness probe. Never fails; any error reads as `false`.
    pub async fn ping(&self) -> bool {
        match self.store.ping().await {
            Ok(reply) => reply == "PONG",
            Err(e) => {
                tracing::warn!("{} ping failed: {}", self.store.backend_name(), e);
                false
            }
        }
    }

    /// Server statistics from `INFO`, as key/value pairs.
    pub async fn get_info(&self) -> CacheResult<BTreeMap<String, String>> {
        let info = self.store.info().await?;
        Ok(parse_info(&info))
    }

    /// Stops every subscription relay.
    pub fn shutdown(&self) {
        let mut subscriptions = self.subscriptions.lock();
        let channels = subscriptions.len();
        for (_, tasks) in subscriptions.drain() {
            for task in tasks {
                task.abort();
            }
        }
        tracing::info!("Cache service stopped, {} channel(s) unsubscribed", channels);
    }
}

fn parse_info(info: &str) -> BTreeMap<String, String> {
    info.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryStore;
    use crate::cache::store::failing::FailingStore;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> CacheService {
        CacheService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn missing_key_is_a_miss() {
        let cache = service();
        let value: Option<Value> = cache.get_json("absent").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn corrupt_json_is_a_miss() {
        let cache = service();
        cache.store.set("broken", "{not json", None).await.unwrap();
        let value: Option<Value> = cache.get_json("broken").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn json_round_trip_with_ttl() {
        let cache = service();
        let route = json!({"origin": "CDG", "destination": "JFK", "tier": 1});
        cache.set_json("route:CDG-JFK", &route, Some(60)).await.unwrap();

        let read: Option<Value> = cache.get_json("route:CDG-JFK").await.unwrap();
        assert_eq!(read, Some(route));
    }

    #[test]
    fn info_parsing_skips_headers_and_blank_lines() {
        let info = "# Server\r\nredis_version:7.2.4\r\n\r\n# Clients\r\nconnected_clients:3\r\nexecutable:/usr/bin/redis-server\r\n";
        let parsed = parse_info(info);

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["redis_version"], "7.2.4");
        assert_eq!(parsed["connected_clients"], "3");
        assert_eq!(parsed["executable"], "/usr/bin/redis-server");
    }

    #[tokio::test]
    async fn ping_reports_liveness() {
        assert!(service().ping().await);
    }

    #[tokio::test]
    async fn unreachable_store_pings_false() {
        let cache = CacheService::new(Arc::new(FailingStore));
        assert!(!cache.ping().await);
    }

    #[tokio::test]
    async fn store_errors_propagate_from_get_json() {
        let cache = CacheService::new(Arc::new(FailingStore));
        let result: CacheResult<Option<Value>> = cache.get_json("route:CDG-JFK").await;
        assert!(matches!(result, Err(CacheError::Store(_))));
    }

    #[tokio::test]
    async fn cache_does_not_run_generator_when_store_fails() {
        let cache = CacheService::new(Arc::new(FailingStore));
        let calls = AtomicUsize::new(0);
        let result: Result<u32, CacheError> = cache
            .cache("price:CDG-JFK", 60, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(249)
            })
            .await;
        assert!(matches!(result, Err(CacheError::Store(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
