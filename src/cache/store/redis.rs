use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{AsyncCommands, Client, Script, aio::MultiplexedConnection};

use super::{KeyValueStore, MessageStream};
use crate::cache::models::WindowAdmission;
use crate::error::CacheResult;

/// Deletes KEYS[1] only while it still holds ARGV[1].
const COMPARE_AND_DELETE: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Sliding-window admission on the sorted set KEYS[1].
///
/// ARGV: min score (exclusive), limit, score, member, ttl seconds.
/// Replies `{admitted, count, oldest score or ""}`.
const ADMIT_IN_WINDOW: &str = r#"
redis.call("zremrangebyscore", KEYS[1], "-inf", "(" .. ARGV[1])
local count = redis.call("zcard", KEYS[1])
if count < tonumber(ARGV[2]) then
    redis.call("zadd", KEYS[1], ARGV[3], ARGV[4])
    redis.call("expire", KEYS[1], ARGV[5])
    return {1, count, ""}
end
local oldest = redis.call("zrange", KEYS[1], 0, 0, "WITHSCORES")
return {0, count, oldest[2] or ""}
"#;

/// Redis-backed store.
///
/// Commands share one multiplexed connection; every subscription opens its
/// own pub/sub connection from the same client.
pub struct RedisStore {
    client: Client,
    conn: MultiplexedConnection,
    compare_and_delete: Script,
    admit_in_window: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::info!("Redis connected");
        Ok(Self {
            client,
            conn,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
            admit_in_window: Script::new(ADMIT_IN_WINDOW),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.conn().get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> CacheResult<()> {
        let mut conn = self.conn();
        let _: () = match ttl_secs {
            Some(ttl) => conn.set_ex(key, value, ttl).await?,
            None => conn.set(key, value).await?,
        };
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut self.conn())
            .await?;
        Ok(reply.as_deref() == Some("OK"))
    }

    async fn incr_and_expire(&self, key: &str, ttl_secs: u64) -> CacheResult<Option<i64>> {
        let reply: Option<(i64,)> = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl_secs as i64)
            .ignore()
            .query_async(&mut self.conn())
            .await?;
        Ok(reply.map(|(count,)| count))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> CacheResult<bool> {
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut self.conn())
            .await?;
        Ok(deleted == 1)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> CacheResult<(u64, Vec<String>)> {
        Ok(redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.conn())
            .await?)
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.conn().del(keys).await?)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> CacheResult<()> {
        let _: () = self.conn().zadd(key, member, score).await?;
        Ok(())
    }

    async fn zrem_below(&self, key: &str, min_score: f64) -> CacheResult<u64> {
        // "(" makes the upper bound exclusive.
        Ok(self
            .conn()
            .zrembyscore(key, "-inf", format!("({}", min_score))
            .await?)
    }

    async fn zcard(&self, key: &str) -> CacheResult<u64> {
        Ok(self.conn().zcard(key).await?)
    }

    async fn zfirst_with_score(&self, key: &str) -> CacheResult<Option<(String, f64)>> {
        let first: Vec<(String, f64)> = self.conn().zrange_withscores(key, 0, 0).await?;
        Ok(first.into_iter().next())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<()> {
        let _: () = self.conn().expire(key, ttl_secs as i64).await?;
        Ok(())
    }

    async fn admit_in_window(
        &self,
        key: &str,
        member: &str,
        score: f64,
        min_score: f64,
        limit: u64,
        ttl_secs: u64,
    ) -> CacheResult<WindowAdmission> {
        let (admitted, count, oldest): (i64, u64, String) = self
            .admit_in_window
            .key(key)
            .arg(min_score)
            .arg(limit)
            .arg(score)
            .arg(member)
            .arg(ttl_secs)
            .invoke_async(&mut self.conn())
            .await?;
        Ok(WindowAdmission {
            admitted: admitted == 1,
            count,
            oldest_score: oldest.parse().ok(),
        })
    }

    async fn publish(&self, channel: &str, payload: &str) -> CacheResult<u64> {
        Ok(self.conn().publish(channel, payload).await?)
    }

    async fn subscribe(&self, channel: &str) -> CacheResult<MessageStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        tracing::debug!("Subscribed to Redis channel {}", channel);

        let messages = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!(
                            "Dropping undecodable payload on {}: {}",
                            msg.get_channel_name(),
                            e
                        );
                        None
                    }
                }
            });
        Ok(Box::pin(messages))
    }

    async fn ping(&self) -> CacheResult<String> {
        Ok(redis::cmd("PING").query_async(&mut self.conn()).await?)
    }

    async fn info(&self) -> CacheResult<String> {
        Ok(redis::cmd("INFO").query_async(&mut self.conn()).await?)
    }
}
