use crate::cache::CacheService;
use crate::cache::models::CounterResult;
use crate::error::{CacheError, CacheResult};

impl CacheService {
    /// Increments `key` and re-arms its expiry in one atomic batch.
    ///
    /// `allowed` is `count <= limit`. An empty batch reply is an error
    /// rather than a silent zero.
    pub async fn increment_with_limit(
        &self,
        key: &str,
        limit: i64,
        ttl_secs: u64,
    ) -> CacheResult<CounterResult> {
        let count = self
            .store
            .incr_and_expire(key, ttl_secs)
            .await?
            .ok_or_else(|| CacheError::TransactionFailed(format!("no reply incrementing {}", key)))?;

        Ok(CounterResult {
            count,
            allowed: count <= limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::cache::CacheService;
    use crate::cache::store::MemoryStore;
    use crate::cache::store::failing::FailingStore;
    use crate::error::CacheError;

    #[tokio::test]
    async fn counter_allows_up_to_limit() {
        let cache = CacheService::new(Arc::new(MemoryStore::new()));

        for expected in 1..=5 {
            let result = cache.increment_with_limit("api:calls", 5, 60).await.unwrap();
            assert_eq!(result.count, expected);
            assert!(result.allowed);
        }

        let sixth = cache.increment_with_limit("api:calls", 5, 60).await.unwrap();
        assert_eq!(sixth.count, 6);
        assert!(!sixth.allowed);
    }

    #[tokio::test]
    async fn empty_batch_reply_is_a_transaction_failure() {
        let cache = CacheService::new(Arc::new(FailingStore));
        let err = cache.increment_with_limit("api:calls", 5, 60).await.unwrap_err();
        assert!(matches!(err, CacheError::TransactionFailed(_)));
    }
}
