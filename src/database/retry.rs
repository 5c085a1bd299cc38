use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

// not_null_violation, foreign_key_violation, unique_violation
const NON_RETRYABLE_CODES: [&str; 3] = ["23502", "23503", "23505"];

/// Constraint violations fail the same way every time; everything else is
/// worth another attempt.
pub fn is_retryable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .is_none_or(|code| NON_RETRYABLE_CODES.iter().all(|c| *c != code)),
        _ => true,
    }
}

/// Runs `op` up to `max_attempts` times, sleeping `base_delay * n` after the
/// n-th failure. Stops early on an error `is_retryable` rejects.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    max_attempts: u32,
    base_delay: Duration,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts || !is_retryable(&e) => return Err(e),
            Err(e) => {
                tracing::warn!("Attempt {}/{} failed, retrying: {}", attempt, max_attempts, e);
                tokio::time::sleep(base_delay * attempt).await;
                attempt += 1;
            }
        }
    }
}
