//! Key-value store backends for the cache service.
//!
//! `KeyValueStore` is the narrow surface the cache helpers need: string
//! get/set with expiry, a handful of atomic primitives, cursor scanning,
//! sorted sets and channel pub/sub. `RedisStore` talks to a real server,
//! `MemoryStore` keeps everything in process.

#[cfg(test)]
pub(crate) mod failing;
mod glob;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::cache::models::WindowAdmission;
use crate::error::CacheResult;

pub use self::glob::glob_match;
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Payloads received on a subscribed channel.
pub type MessageStream = BoxStream<'static, String>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name, for logs.
    fn backend_name(&self) -> &'static str;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Writes `value`, with an expiry when `ttl_secs` is set.
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> CacheResult<()>;

    /// `SET key value NX EX ttl`. Returns `true` if the key was written.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<bool>;

    /// `INCR` then `EXPIRE` in one atomic batch.
    ///
    /// `None` means the batch produced no reply.
    async fn incr_and_expire(&self, key: &str, ttl_secs: u64) -> CacheResult<Option<i64>>;

    /// Deletes `key` only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> CacheResult<bool>;

    /// One `SCAN cursor MATCH pattern COUNT count` step.
    ///
    /// Every key present for the whole scan is returned at least once, even
    /// when keys are deleted between steps.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize)
    -> CacheResult<(u64, Vec<String>)>;

    async fn del(&self, keys: &[String]) -> CacheResult<u64>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> CacheResult<()>;

    /// Removes members scored strictly below `min_score`.
    async fn zrem_below(&self, key: &str, min_score: f64) -> CacheResult<u64>;

    async fn zcard(&self, key: &str) -> CacheResult<u64>;

    /// Lowest-scored member, if any.
    async fn zfirst_with_score(&self, key: &str) -> CacheResult<Option<(String, f64)>>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<()>;

    /// One sliding-window step as a single atomic unit: drop members scored
    /// below `min_score`, count the rest and, while under `limit`, add
    /// `member` at `score` and re-arm the key's expiry. A rejection reports
    /// the oldest remaining score.
    async fn admit_in_window(
        &self,
        key: &str,
        member: &str,
        score: f64,
        min_score: f64,
        limit: u64,
        ttl_secs: u64,
    ) -> CacheResult<WindowAdmission>;

    /// Returns the number of receivers the message reached.
    async fn publish(&self, channel: &str, payload: &str) -> CacheResult<u64>;

    async fn subscribe(&self, channel: &str) -> CacheResult<MessageStream>;

    async fn ping(&self) -> CacheResult<String>;

    /// Raw `INFO` text.
    async fn info(&self) -> CacheResult<String>;
}
