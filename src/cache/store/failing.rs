use async_trait::async_trait;
use futures_util::stream;

use super::{KeyValueStore, MessageStream};
use crate::cache::models::WindowAdmission;
use crate::error::{CacheError, CacheResult};

fn unreachable_store() -> CacheError {
    CacheError::Store("connection refused".to_string())
}

/// Store whose every command fails, except that the atomic increment
/// batch comes back empty and a subscription ends as soon as it opens.
pub(crate) struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(unreachable_store())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_secs: Option<u64>) -> CacheResult<()> {
        Err(unreachable_store())
    }

    async fn set_nx_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> CacheResult<bool> {
        Err(unreachable_store())
    }

    async fn incr_and_expire(&self, _key: &str, _ttl_secs: u64) -> CacheResult<Option<i64>> {
        Ok(None)
    }

    async fn compare_and_delete(&self, _key: &str, _expected: &str) -> CacheResult<bool> {
        Err(unreachable_store())
    }

    async fn scan(
        &self,
        _cursor: u64,
        _pattern: &str,
        _count: usize,
    ) -> CacheResult<(u64, Vec<String>)> {
        Err(unreachable_store())
    }

    async fn del(&self, _keys: &[String]) -> CacheResult<u64> {
        Err(unreachable_store())
    }

    async fn zadd(&self, _key: &str, _member: &str, _score: f64) -> CacheResult<()> {
        Err(unreachable_store())
    }

    async fn zrem_below(&self, _key: &str, _min_score: f64) -> CacheResult<u64> {
        Err(unreachable_store())
    }

    async fn zcard(&self, _key: &str) -> CacheResult<u64> {
        Err(unreachable_store())
    }

    async fn zfirst_with_score(&self, _key: &str) -> CacheResult<Option<(String, f64)>> {
        Err(unreachable_store())
    }

    async fn expire(&self, _key: &str, _ttl_secs: u64) -> CacheResult<()> {
        Err(unreachable_store())
    }

    async fn admit_in_window(
        &self,
        _key: &str,
        _member: &str,
        _score: f64,
        _min_score: f64,
        _limit: u64,
        _ttl_secs: u64,
    ) -> CacheResult<WindowAdmission> {
        Err(unreachable_store())
    }

    async fn publish(&self, _channel: &str, _payload: &str) -> CacheResult<u64> {
        Err(unreachable_store())
    }

    async fn subscribe(&self, _channel: &str) -> CacheResult<MessageStream> {
        Ok(Box::pin(stream::empty()))
    }

    async fn ping(&self) -> CacheResult<String> {
        Err(unreachable_store())
    }

    async fn info(&self) -> CacheResult<String> {
        Err(unreachable_store())
    }
}
