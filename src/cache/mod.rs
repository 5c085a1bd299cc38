// Cache module: a helper layer over a key-value store.
// Store backends live in `store`, the helpers in `service` and `operations`.

pub mod keys;
pub mod models;
pub mod operations;
pub mod service;
pub mod store;

pub use models::{ChannelMessage, CounterResult, RateLimitDecision, WindowAdmission};
pub use operations::{DEFAULT_LOCK_TTL_SECS, SCAN_BATCH_SIZE};
pub use service::CacheService;
pub use store::{KeyValueStore, MemoryStore, RedisStore};
