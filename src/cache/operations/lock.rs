use uuid::Uuid;

use crate::cache::CacheService;
use crate::cache::keys::lock_key;
use crate::error::CacheResult;

pub const DEFAULT_LOCK_TTL_SECS: u64 = 10;

impl CacheService {
    /// [`acquire_lock_with_ttl`](Self::acquire_lock_with_ttl) with the
    /// default TTL.
    pub async fn acquire_lock(&self, name: &str) -> CacheResult<Option<String>> {
        self.acquire_lock_with_ttl(name, DEFAULT_LOCK_TTL_SECS).await
    }

    /// Tries once to take the lock. Returns the owner token, or `None` if
    /// someone else holds it.
    pub async fn acquire_lock_with_ttl(
        &self,
        name: &str,
        ttl_secs: u64,
    ) -> CacheResult<Option<String>> {
        let token = Uuid::new_v4().simple().to_string();
        let acquired = self.store.set_nx_ex(&lock_key(name), &token, ttl_secs).await?;

        if acquired {
            tracing::debug!("Lock {} acquired for {}s", name, ttl_secs);
            Ok(Some(token))
        } else {
            tracing::debug!("Lock {} is held elsewhere", name);
            Ok(None)
        }
    }

    /// Releases the lock only if `token` still owns it.
    pub async fn release_lock(&self, name: &str, token: &str) -> CacheResult<bool> {
        self.store.compare_and_delete(&lock_key(name), token).await
    }
}
