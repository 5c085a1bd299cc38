/// Cache operations, grouped by concern. Each file adds methods to
/// `CacheService`.
mod counter;
mod invalidation;
mod lock;
mod pubsub;
mod rate_limit;

pub use invalidation::SCAN_BATCH_SIZE;
pub use lock::DEFAULT_LOCK_TTL_SECS;
