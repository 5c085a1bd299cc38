use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cache::CacheService;
use crate::cache::keys::rate_limit_key;
use crate::cache::models::RateLimitDecision;
use crate::error::CacheResult;

impl CacheService {
    /// Sliding-window rate limit.
    ///
    /// Every admitted request leaves a marker in a sorted set scored by its
    /// time in milliseconds. Markers older than `window` are purged before
    /// counting, so only requests in `[now - window, now]` count. Purge,
    /// count and insert run as one atomic store step, so concurrent callers
    /// never admit more than `limit` requests per window.
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
    ) -> CacheResult<RateLimitDecision> {
        let key = rate_limit_key(identifier);
        let now_ms = Utc::now().timestamp_millis();
        // Both outcomes report `reset_at` at millisecond precision.
        let now = DateTime::from_timestamp_millis(now_ms).unwrap_or_else(Utc::now);
        let window_ms = window.as_millis() as i64;
        let window_span = chrono::Duration::milliseconds(window_ms);

        // Suffix keeps same-millisecond requests distinct.
        let marker = format!("{}-{}", now_ms, Uuid::new_v4().simple());
        let ttl_secs = (window_ms as u64).div_ceil(1000).max(1);
        let admission = self
            .store
            .admit_in_window(
                &key,
                &marker,
                now_ms as f64,
                (now_ms - window_ms) as f64,
                u64::from(limit),
                ttl_secs,
            )
            .await?;

        if admission.admitted {
            return Ok(RateLimitDecision {
                allowed: true,
                remaining: limit - admission.count as u32 - 1,
                reset_at: now + window_span,
            });
        }

        let reset_at = admission
            .oldest_score
            .and_then(|oldest| DateTime::from_timestamp_millis(oldest as i64 + window_ms))
            .unwrap_or(now + window_span);

        tracing::debug!(
            "Rate limit reached for {} ({} requests in {}ms)",
            identifier,
            admission.count,
            window_ms
        );
        Ok(RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at,
        })
    }
}
