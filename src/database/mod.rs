// Postgres connection pool wrapper.
// Retrying reads, slow-query logging and a transaction helper.

mod retry;

use std::future::Future;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool, Postgres, Transaction};

pub use retry::{is_retryable, retry_with_backoff};

/// Queries slower than this are logged.
pub const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(100);

/// Delay before the first retry; later retries wait proportionally longer.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Opens the pool and checks it with a round trip.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(30))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET TIME ZONE 'UTC';").await?;
                    conn.execute("SET application_name = 'globegenius_backend';")
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;

        sqlx::query("SELECT NOW()").execute(&pool).await?;
        tracing::info!("Database connection established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Database ping failed: {}", e);
                false
            }
        }
    }

    /// Runs an idempotent read, retrying failures other than constraint
    /// violations up to `max_attempts` times in total.
    pub async fn query_with_retry<T, F, Fut>(
        &self,
        max_attempts: u32,
        mut query: F,
    ) -> Result<T, sqlx::Error>
    where
        F: FnMut(PgPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        retry_with_backoff(max_attempts, RETRY_BASE_DELAY, is_retryable, || {
            timed(query(self.pool.clone()))
        })
        .await
    }

    /// Runs `f` inside a transaction: commit on `Ok`, rollback on `Err`.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T, sqlx::Error>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'static, Postgres>) -> BoxFuture<'c, Result<T, sqlx::Error>>,
    {
        let mut tx = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!("Transaction rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database connections closed");
    }
}

async fn timed<T, Fut>(query: Fut) -> Result<T, sqlx::Error>
where
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let start = Instant::now();
    let result = query.await;
    let elapsed = start.elapsed();
    if elapsed > SLOW_QUERY_THRESHOLD {
        tracing::warn!("Slow database query: {}ms", elapsed.as_millis());
    }
    if let Err(e) = &result {
        tracing::error!("Database query error: {}", e);
    }
    result
}
