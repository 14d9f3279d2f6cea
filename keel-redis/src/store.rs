//! Redis atomic store
//!
//! Implements [`AtomicStore`] and [`QueueStore`] on a single Redis deployment.
//! Acquire uses `SET NX PX`; every other multi-step operation is a Lua script.

use crate::config::RedisConfig;
use crate::scripts::{Scripts, pending_member};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::{
    AtomicStore, ItemId, ItemPayload, ItemStatus, QueueItem, QueueStore, StoreError, StoreResult,
    Transition,
};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Map a client error onto the store taxonomy.
///
/// Anything that leaves the outcome of a round trip unknown is `Unavailable`.
pub(crate) fn store_error(err: redis::RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        StoreError::unavailable(err.to_string())
    } else {
        StoreError::command(err.to_string())
    }
}

/// Redis-backed coordination store.
///
/// Cloning is cheap; clones share the multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
    command_timeout: Duration,
    scripts: Scripts,
}

impl RedisStore {
    /// Connect with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn new(url: &str) -> StoreResult<Self> {
        Self::with_config(RedisConfig::new(url)).await
    }

    /// Connect using a full configuration.
    pub async fn with_config(config: RedisConfig) -> StoreResult<Self> {
        debug!(url = %config.url, prefix = %config.key_prefix, "Connecting to Redis");

        let client = redis::Client::open(config.connection_url())
            .map_err(|e| StoreError::config(e.to_string()))?;

        let conn = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::unavailable("timed out connecting to redis"))?
            .map_err(store_error)?;

        info!(prefix = %config.key_prefix, "Redis coordination store ready");

        Ok(Self::from_connection(conn, config.key_prefix)
            .with_command_timeout(config.command_timeout))
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            command_timeout: Duration::from_secs(2),
            scripts: Scripts::new(),
        }
    }

    /// Set the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Get the key prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Get the full key with prefix
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    /// Queue keys share a hash tag so cluster deployments keep them on one slot.
    fn queue_key(&self, queue: &str, suffix: &str) -> String {
        self.key(&format!("queue:{{{}}}:{}", queue, suffix))
    }

    fn item_prefix(&self, queue: &str) -> String {
        self.queue_key(queue, "item:")
    }

    async fn run<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(store_error),
            Err(_) => Err(StoreError::unavailable("redis command timed out")),
        }
    }
}

/// Longest expiry handed to Redis; larger PX values overflow its clock.
const MAX_EXPIRY_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Expiry in milliseconds, at least 1 and at most [`MAX_EXPIRY_MS`].
fn millis(duration: Duration) -> u64 {
    whole_millis(duration).clamp(1, MAX_EXPIRY_MS)
}

fn parse_micros(raw: &str) -> StoreResult<DateTime<Utc>> {
    let micros: i64 = raw
        .parse()
        .map_err(|_| StoreError::corrupt(format!("bad timestamp '{}'", raw)))?;
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::corrupt(format!("timestamp out of range '{}'", raw)))
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> StoreResult<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| StoreError::corrupt(format!("queue item missing field '{}'", name)))
}

fn item_from_hash(fields: &HashMap<String, String>) -> StoreResult<QueueItem> {
    let id = field(fields, "id")?;
    Ok(QueueItem {
        id: id
            .parse()
            .map_err(|_| StoreError::corrupt(format!("bad item id '{}'", id)))?,
        queue: field(fields, "queue")?.to_string(),
        name: field(fields, "name")?.to_string(),
        payload: serde_json::from_str(field(fields, "payload")?)?,
        status: field(fields, "status")?.parse()?,
        created_at: parse_micros(field(fields, "created_at")?)?,
        updated_at: parse_micros(field(fields, "updated_at")?)?,
    })
}

#[async_trait]
impl AtomicStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let result: Option<String> = self
            .run(
                redis::cmd("SET")
                    .arg(&full_key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(millis(ttl))
                    .query_async(&mut conn),
            )
            .await?;

        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();
        self.run(conn.get(&full_key)).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let deleted: i64 = self
            .run(
                self.scripts
                    .release
                    .key(&full_key)
                    .arg(expected)
                    .invoke_async(&mut conn),
            )
            .await?;

        Ok(deleted == 1)
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let extended: i64 = self
            .run(
                self.scripts
                    .extend
                    .key(&full_key)
                    .arg(expected)
                    .arg(millis(ttl))
                    .invoke_async(&mut conn),
            )
            .await?;

        Ok(extended == 1)
    }

    async fn record_in_window(
        &self,
        key: &str,
        member_suffix: &str,
        window: Duration,
        expire_after: Duration,
    ) -> StoreResult<u64> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        let count: u64 = self
            .run(
                self.scripts
                    .window_record
                    .key(&full_key)
                    .arg(whole_millis(window))
                    .arg(member_suffix)
                    .arg(millis(expire_after))
                    .invoke_async(&mut conn),
            )
            .await?;

        trace!(key = %key, count = count, "Redis window event recorded");
        Ok(count)
    }

    async fn count_in_window(&self, key: &str, window: Duration) -> StoreResult<u64> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();

        self.run(
            self.scripts
                .window_count
                .key(&full_key)
                .arg(whole_millis(window))
                .invoke_async(&mut conn),
        )
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let full_key = self.key(key);
        let mut conn = self.conn.clone();
        let removed: i64 = self.run(conn.del(&full_key)).await?;
        Ok(removed > 0)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn push(&self, queue: &str, name: &str, payload: &ItemPayload) -> StoreResult<QueueItem> {
        let payload_json = serde_json::to_string(payload)?;
        let mut conn = self.conn.clone();

        let (id, now): (ItemId, String) = self
            .run(
                self.scripts
                    .queue_push
                    .key(self.queue_key(queue, "seq"))
                    .key(self.queue_key(queue, "pending"))
                    .key(self.queue_key(queue, "counts"))
                    .arg(self.item_prefix(queue))
                    .arg(queue)
                    .arg(name)
                    .arg(&payload_json)
                    .invoke_async(&mut conn),
            )
            .await?;

        let created_at = parse_micros(&now)?;
        debug!(queue = %queue, id = id, "Pushed queue item to Redis");

        Ok(QueueItem {
            id,
            queue: queue.to_string(),
            name: name.to_string(),
            payload: payload.clone(),
            status: ItemStatus::Pending,
            created_at,
            updated_at: created_at,
        })
    }

    async fn claim_oldest_pending(&self, queue: &str) -> StoreResult<Option<QueueItem>> {
        let mut conn = self.conn.clone();

        let fields: Option<HashMap<String, String>> = self
            .run(
                self.scripts
                    .queue_claim
                    .key(self.queue_key(queue, "pending"))
                    .key(self.queue_key(queue, "counts"))
                    .arg(self.item_prefix(queue))
                    .invoke_async(&mut conn),
            )
            .await?;

        fields.as_ref().map(item_from_hash).transpose()
    }

    async fn transition(
        &self,
        queue: &str,
        id: ItemId,
        from: ItemStatus,
        to: ItemStatus,
    ) -> StoreResult<Transition> {
        let mut conn = self.conn.clone();

        let reply: Option<String> = self
            .run(
                self.scripts
                    .queue_transition
                    .key(self.queue_key(queue, "pending"))
                    .key(self.queue_key(queue, "counts"))
                    .key(format!("{}{}", self.item_prefix(queue), id))
                    .arg(from.as_str())
                    .arg(to.as_str())
                    .arg(pending_member(id))
                    .invoke_async(&mut conn),
            )
            .await?;

        match reply.as_deref() {
            None => Ok(Transition::Missing),
            Some("applied") => Ok(Transition::Applied),
            Some(current) => Ok(Transition::Rejected(current.parse()?)),
        }
    }

    async fn fetch(&self, queue: &str, id: ItemId) -> StoreResult<Option<QueueItem>> {
        let item_key = format!("{}{}", self.item_prefix(queue), id);
        let mut conn = self.conn.clone();

        let fields: HashMap<String, String> = self.run(conn.hgetall(&item_key)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        item_from_hash(&fields).map(Some)
    }

    async fn count(&self, queue: &str, status: ItemStatus) -> StoreResult<u64> {
        let counts_key = self.queue_key(queue, "counts");
        let mut conn = self.conn.clone();

        let count: Option<i64> = self.run(conn.hget(&counts_key, status.as_str())).await?;
        Ok(count.unwrap_or(0).max(0) as u64)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_item_from_hash() {
        let fields = hash(&[
            ("id", "42"),
            ("queue", "emails"),
            ("name", "send"),
            ("payload", r#"{"to":"a@b.c"}"#),
            ("status", "in_progress"),
            ("created_at", "1700000000000001"),
            ("updated_at", "1700000000500000"),
        ]);

        let item = item_from_hash(&fields).unwrap();
        assert_eq!(item.id, 42);
        assert_eq!(item.status, ItemStatus::InProgress);
        assert_eq!(item.payload["to"], "a@b.c");
        assert_eq!(item.created_at.timestamp_micros(), 1_700_000_000_000_001);
    }

    #[test]
    fn test_item_from_hash_missing_field_is_corrupt() {
        let fields = hash(&[("id", "1"), ("queue", "q")]);
        assert!(matches!(
            item_from_hash(&fields),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_millis_never_zero() {
        assert_eq!(millis(Duration::from_micros(10)), 1);
        assert_eq!(millis(Duration::from_secs(3)), 3000);
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(whole_millis(Duration::from_secs(3)), 3000);
        assert_eq!(whole_millis(Duration::MAX), u64::MAX);
        assert_eq!(millis(Duration::MAX), MAX_EXPIRY_MS);
    }

    #[test]
    fn test_parse_micros_rejects_garbage() {
        assert!(parse_micros("soon").is_err());
    }
}
