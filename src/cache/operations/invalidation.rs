use crate::cache::CacheService;
use crate::error::CacheResult;

/// `COUNT` hint for each `SCAN` step.
pub const SCAN_BATCH_SIZE: usize = 100;

impl CacheService {
    /// Deletes every key matching `pattern` and returns how many went.
    ///
    /// Walks the keyspace with `SCAN` until the cursor comes back to zero,
    /// deleting each batch as it arrives. Cost is proportional to the whole
    /// keyspace, not to the number of matches.
    pub async fn invalidate_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let mut cursor = 0;
        let mut deleted = 0;

        loop {
            let (next, keys) = self.store.scan(cursor, pattern, SCAN_BATCH_SIZE).await?;
            if !keys.is_empty() {
                deleted += self.store.del(&keys).await?;
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        tracing::info!("Invalidated {} cache keys matching pattern: {}", deleted, pattern);
        Ok(deleted)
    }
}
