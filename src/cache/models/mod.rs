/// Result types returned by the cache helpers.
pub mod pubsub;
pub mod rate_limit;

pub use pubsub::ChannelMessage;
pub use rate_limit::{CounterResult, RateLimitDecision, WindowAdmission};
