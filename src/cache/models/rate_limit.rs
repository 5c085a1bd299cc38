use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a fixed-window counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterResult {
    pub count: i64,
    pub allowed: bool,
}

/// Outcome of a sliding-window rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// When the next slot frees up.
    pub reset_at: DateTime<Utc>,
}

/// What the store saw while recording one request in a sliding window.
///
/// `count` is the number of markers in the window before this request.
/// `oldest_score` is only reported for a rejected request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowAdmission {
    pub admitted: bool,
    pub count: u64,
    pub oldest_score: Option<f64>,
}

impl RateLimitDecision {
    /// Whole seconds until `reset_at`, rounded up, as sent in `Retry-After`.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000)
    }
}
