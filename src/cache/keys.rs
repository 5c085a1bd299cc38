/// Lock key prefix
pub const LOCK_PREFIX: &str = "lock:";

/// Rate limit window key prefix
pub const RATE_LIMIT_PREFIX: &str = "rate_limit:";

pub fn lock_key(name: &str) -> String {
    format!("{}{}", LOCK_PREFIX, name)
}

pub fn rate_limit_key(identifier: &str) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, identifier)
}
