use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{KeyValueStore, MessageStream, glob_match};
use crate::cache::models::WindowAdmission;
use crate::error::{CacheError, CacheResult};

const CHANNEL_CAPACITY: usize = 256;
/// Unfinished scans remembered at once; the oldest cursor is forgotten first.
const MAX_OPEN_SCANS: usize = 1024;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    /// Kept ordered by (score, member), like a Redis sorted set.
    Sorted(Vec<(f64, String)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    /// Open scan cursors, each mapped to the last key it returned.
    scans: BTreeMap<u64, String>,
    last_cursor: u64,
    channels: HashMap<String, broadcast::Sender<String>>,
}

impl Inner {
    /// Live entry for `key`; an expired one is dropped on the way.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn sorted(&mut self, key: &str) -> CacheResult<Option<&mut Vec<(f64, String)>>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Sorted(members),
                ..
            }) => Ok(Some(members)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// Remembers where a scan stopped and hands out a fresh cursor for it.
    fn open_scan(&mut self, last_key: String) -> u64 {
        if self.scans.len() >= MAX_OPEN_SCANS {
            self.scans.pop_first();
        }
        self.last_cursor = self.last_cursor.wrapping_add(1).max(1);
        self.scans.insert(self.last_cursor, last_key);
        self.last_cursor
    }

    fn zadd(&mut self, key: &str, member: &str, score: f64) -> CacheResult<()> {
        if self.sorted(key)?.is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Sorted(Vec::new()),
                    expires_at: None,
                },
            );
        }
        let members = self
            .sorted(key)?
            .ok_or_else(|| CacheError::Store(format!("sorted set {} vanished", key)))?;
        members.retain(|(_, m)| m != member);
        let at = members.partition_point(|(s, m)| (*s, m.as_str()) < (score, member));
        members.insert(at, (score, member.to_string()));
        Ok(())
    }

    fn zrem_below(&mut self, key: &str, min_score: f64) -> CacheResult<u64> {
        let Some(members) = self.sorted(key)? else {
            return Ok(0);
        };
        let before = members.len();
        members.retain(|(score, _)| *score >= min_score);
        let removed = (before - members.len()) as u64;
        if members.is_empty() {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    fn zcard(&mut self, key: &str) -> CacheResult<u64> {
        Ok(self.sorted(key)?.map_or(0, |members| members.len() as u64))
    }

    fn zfirst_with_score(&mut self, key: &str) -> CacheResult<Option<(String, f64)>> {
        Ok(self.sorted(key)?.and_then(|members| {
            members
                .first()
                .map(|(score, member)| (member.clone(), *score))
        }))
    }

    fn expire(&mut self, key: &str, ttl_secs: u64) {
        if let Some(entry) = self.live(key) {
            entry.expires_at = deadline(ttl_secs);
        }
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Store(format!(
        "WRONGTYPE operation against key {} holding the wrong kind of value",
        key
    ))
}

fn deadline(ttl_secs: u64) -> Option<Instant> {
    Some(Instant::now() + Duration::from_secs(ttl_secs))
}

/// In-process store with the same semantics as the Redis backend.
///
/// Expiry is lazy: a key past its deadline is invisible and removed the
/// next time anything touches it. Scan cursors resume after the last key
/// they returned, so deletes between steps never hide a key.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.entries.retain(|_, e| !e.is_expired(now));
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut inner = self.inner.lock();
        match inner.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> CacheResult<()> {
        let entry = Entry {
            value: Value::Text(value.to_string()),
            expires_at: ttl_secs.and_then(deadline),
        };
        self.inner.lock().entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> CacheResult<bool> {
        let mut inner = self.inner.lock();
        if inner.live(key).is_some() {
            return Ok(false);
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: deadline(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn incr_and_expire(&self, key: &str, ttl_secs: u64) -> CacheResult<Option<i64>> {
        let mut inner = self.inner.lock();
        let current = match inner.live(key) {
            None => 0,
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => text
                .parse::<i64>()
                .map_err(|_| CacheError::Store("value is not an integer".to_string()))?,
            Some(_) => return Err(wrong_type(key)),
        };
        let count = current + 1;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(count.to_string()),
                expires_at: deadline(ttl_secs),
            },
        );
        Ok(Some(count))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> CacheResult<bool> {
        let mut inner = self.inner.lock();
        let holds = matches!(
            inner.live(key),
            Some(Entry { value: Value::Text(text), .. }) if text == expected
        );
        if holds {
            inner.entries.remove(key);
        }
        Ok(holds)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> CacheResult<(u64, Vec<String>)> {
        let now = Instant::now();
        let batch_size = count.max(1);
        let mut inner = self.inner.lock();

        let lower = match cursor {
            0 => Bound::Unbounded,
            _ => match inner.scans.remove(&cursor) {
                Some(last_key) => Bound::Excluded(last_key),
                // Unknown or forgotten cursor: nothing left to return.
                None => return Ok((0, Vec::new())),
            },
        };

        let mut visited: Vec<String> = inner
            .entries
            .range((lower, Bound::Unbounded))
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .take(batch_size + 1)
            .collect();
        let more = visited.len() > batch_size;
        visited.truncate(batch_size);

        let next = match visited.last() {
            Some(last_key) if more => inner.open_scan(last_key.clone()),
            _ => 0,
        };
        let matched = visited
            .into_iter()
            .filter(|k| glob_match(pattern, k))
            .collect();
        Ok((next, matched))
    }

    async fn del(&self, keys: &[String]) -> CacheResult<u64> {
        let mut inner = self.inner.lock();
        let mut removed = 0;
        for key in keys {
            if inner.live(key).is_some() {
                inner.entries.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> CacheResult<()> {
        self.inner.lock().zadd(key, member, score)
    }

    async fn zrem_below(&self, key: &str, min_score: f64) -> CacheResult<u64> {
        self.inner.lock().zrem_below(key, min_score)
    }

    async fn zcard(&self, key: &str) -> CacheResult<u64> {
        self.inner.lock().zcard(key)
    }

    async fn zfirst_with_score(&self, key: &str) -> CacheResult<Option<(String, f64)>> {
        self.inner.lock().zfirst_with_score(key)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> CacheResult<()> {
        self.inner.lock().expire(key, ttl_secs);
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
        let mut inner = self.inner.lock();
        inner.zrem_below(key, min_score)?;
        let count = inner.zcard(key)?;

        if count < limit {
            inner.zadd(key, member, score)?;
            inner.expire(key, ttl_secs);
            return Ok(WindowAdmission {
                admitted: true,
                count,
                oldest_score: None,
            });
        }

        Ok(WindowAdmission {
            admitted: false,
            count,
            oldest_score: inner.zfirst_with_score(key)?.map(|(_, score)| score),
        })
    }

    async fn publish(&self, channel: &str, payload: &str) -> CacheResult<u64> {
        let inner = self.inner.lock();
        let delivered = inner
            .channels
            .get(channel)
            .and_then(|tx| tx.send(payload.to_string()).ok())
            .unwrap_or(0);
        Ok(delivered as u64)
    }

    async fn subscribe(&self, channel: &str) -> CacheResult<MessageStream> {
        let rx = self
            .inner
            .lock()
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let messages = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Subscriber lagged, {} messages skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(messages))
    }

    async fn ping(&self) -> CacheResult<String> {
        Ok("PONG".to_string())
    }

    async fn info(&self) -> CacheResult<String> {
        let keys = self.len();
        let channels = self.inner.lock().channels.len();
        Ok(format!(
            "# Server\r\nredis_mode:standalone\r\nbackend:memory\r\n\r\n# Keyspace\r\nkeys:{}\r\npubsub_channels:{}\r\n",
            keys, channels
        ))
    }
}
