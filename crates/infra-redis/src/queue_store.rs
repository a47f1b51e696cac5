// Redis QueueStore / LimiterStore Implementation
//
// Key layout (all keys under the "relay:" namespace):
//   relay:{queue}:seq         counter for item ids
//   relay:{queue}:item:{id}   hash holding one item
//   relay:{queue}:waiting     list of claimable ids (RPUSH / LPOP = FIFO)
//   relay:{queue}:delayed     zset of gated ids, score = not_before
//   relay:{queue}:active      zset of claimed ids, score = claimed_at
//   relay:{queue}:failed      list of terminally failed ids
//   relay:{queue}:completed   counter (completed items are deleted)
//   relay:limiter:{queue}:{window_start}  admission counter per window
//
// Every multi-key state transition runs as a single Lua script so that
// concurrent workers sharing the store never observe a half-applied
// transition. Timestamps are supplied by the caller's TimeProvider, not
// Redis TIME, so tests can drive the clock.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;
use relay_core::domain::{Event, ItemId, ItemState, QueueCounts, QueueItem};
use relay_core::error::{AppError, Result};
use relay_core::port::{LimiterStore, QueueStore, TimeProvider};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

// Helper to convert redis::RedisError to AppError
fn map_redis_error(err: redis::RedisError) -> AppError {
    if err.is_connection_refusal() || err.is_io_error() || err.is_timeout() {
        AppError::Storage(format!("Redis unavailable: {}", err))
    } else {
        AppError::Storage(format!("Redis error: {}", err))
    }
}

const ENQUEUE_SCRIPT: &str = r#"
local id = redis.call('INCR', KEYS[1])
local item_key = ARGV[1] .. id
redis.call('HSET', item_key,
    'id', id,
    'state', 'waiting',
    'event', ARGV[2],
    'attempts', 0,
    'max_attempts', ARGV[3],
    'enqueued_at', ARGV[4])
redis.call('RPUSH', KEYS[2], id)
return id
"#;

// Due delayed items are promoted to the head in sequence order, so a
// retried item keeps its place ahead of newer arrivals
const CLAIM_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[2])
if #due > 0 then
    table.sort(due, function(a, b) return tonumber(a) < tonumber(b) end)
    for i = #due, 1, -1 do
        redis.call('ZREM', KEYS[2], due[i])
        redis.call('LPUSH', KEYS[1], due[i])
    end
end
local id = redis.call('LPOP', KEYS[1])
if not id then
    return false
end
local item_key = ARGV[1] .. id
redis.call('HSET', item_key, 'state', 'active', 'claimed_at', ARGV[2])
redis.call('HDEL', item_key, 'not_before')
redis.call('ZADD', KEYS[3], ARGV[2], id)
return redis.call('HGETALL', item_key)
"#;

const COMPLETE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'active' then
    return 0
end
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('DEL', KEYS[1])
redis.call('INCR', KEYS[3])
return 1
"#;

const RETRY_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'active' then
    return 0
end
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('HINCRBY', KEYS[1], 'attempts', 1)
redis.call('HSET', KEYS[1],
    'state', 'waiting',
    'last_error', ARGV[2],
    'not_before', ARGV[3])
redis.call('HDEL', KEYS[1], 'claimed_at')
redis.call('ZADD', KEYS[3], ARGV[3], ARGV[1])
return 1
"#;

const FAIL_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'active' then
    return 0
end
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[1],
    'state', 'failed',
    'last_error', ARGV[2],
    'finished_at', ARGV[3])
redis.call('HDEL', KEYS[1], 'claimed_at')
redis.call('RPUSH', KEYS[3], ARGV[1])
return 1
"#;

const RECLAIM_SCRIPT: &str = r#"
local stale = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[2])
for i = #stale, 1, -1 do
    local id = stale[i]
    redis.call('ZREM', KEYS[1], id)
    local item_key = ARGV[1] .. id
    redis.call('HSET', item_key, 'state', 'waiting')
    redis.call('HDEL', item_key, 'claimed_at', 'not_before')
    redis.call('LPUSH', KEYS[2], id)
end
return #stale
"#;

const LIMITER_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
if count > tonumber(ARGV[1]) then
    return 0
end
return 1
"#;

/// Redis-backed durable queue store.
///
/// Clones of the multiplexed connection share one socket, so a single
/// `RedisQueueStore` serves every worker in the process.
pub struct RedisQueueStore {
    conn: MultiplexedConnection,
    time_provider: Arc<dyn TimeProvider>,
    max_attempts: i32,
    enqueue_script: Script,
    claim_script: Script,
    complete_script: Script,
    retry_script: Script,
    fail_script: Script,
    reclaim_script: Script,
    limiter_script: Script,
}

impl RedisQueueStore {
    pub fn new(
        conn: MultiplexedConnection,
        time_provider: Arc<dyn TimeProvider>,
        max_attempts: i32,
    ) -> Self {
        Self {
            conn,
            time_provider,
            max_attempts,
            enqueue_script: Script::new(ENQUEUE_SCRIPT),
            claim_script: Script::new(CLAIM_SCRIPT),
            complete_script: Script::new(COMPLETE_SCRIPT),
            retry_script: Script::new(RETRY_SCRIPT),
            fail_script: Script::new(FAIL_SCRIPT),
            reclaim_script: Script::new(RECLAIM_SCRIPT),
            limiter_script: Script::new(LIMITER_SCRIPT),
        }
    }

    fn key(queue: &str, suffix: &str) -> String {
        format!("relay:{}:{}", queue, suffix)
    }

    fn item_key_prefix(queue: &str) -> String {
        format!("relay:{}:item:", queue)
    }

    fn item_key(queue: &str, id: ItemId) -> String {
        format!("relay:{}:item:{}", queue, id)
    }

    /// Rebuild a QueueItem from its Redis hash fields
    fn parse_item(queue: &str, fields: HashMap<String, String>) -> Result<QueueItem> {
        let get = |name: &str| -> Result<&String> {
            fields
                .get(name)
                .ok_or_else(|| AppError::Storage(format!("item hash missing field: {}", name)))
        };
        let parse_i64 = |name: &str| -> Result<i64> {
            get(name)?
                .parse::<i64>()
                .map_err(|e| AppError::Storage(format!("bad {} in item hash: {}", name, e)))
        };
        let opt_i64 = |name: &str| -> Result<Option<i64>> {
            match fields.get(name) {
                Some(v) => v
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|e| AppError::Storage(format!("bad {} in item hash: {}", name, e))),
                None => Ok(None),
            }
        };

        let event: Event = serde_json::from_str(get("event")?)?;
        let state = ItemState::from_str(get("state")?)?;

        Ok(QueueItem {
            id: parse_i64("id")?,
            queue: queue.to_string(),
            state,
            attempts: parse_i64("attempts")? as i32,
            max_attempts: parse_i64("max_attempts")? as i32,
            enqueued_at: parse_i64("enqueued_at")?,
            claimed_at: opt_i64("claimed_at")?,
            finished_at: opt_i64("finished_at")?,
            not_before: opt_i64("not_before")?,
            last_error: fields.get("last_error").cloned(),
            event,
        })
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn enqueue(&self, queue: &str, event: &Event) -> Result<QueueItem> {
        let now = self.time_provider.now_millis();
        let event_json = serde_json::to_string(event)?;

        let id: i64 = self
            .enqueue_script
            .key(Self::key(queue, "seq"))
            .key(Self::key(queue, "waiting"))
            .arg(Self::item_key_prefix(queue))
            .arg(&event_json)
            .arg(self.max_attempts)
            .arg(now)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(map_redis_error)?;

        debug!(queue = %queue, item_id = %id, "Enqueued item");
        Ok(QueueItem::new(id, queue, event.clone(), self.max_attempts, now))
    }

    async fn claim_next(&self, queue: &str) -> Result<Option<QueueItem>> {
        let now = self.time_provider.now_millis();

        let fields: Option<HashMap<String, String>> = self
            .claim_script
            .key(Self::key(queue, "waiting"))
            .key(Self::key(queue, "delayed"))
            .key(Self::key(queue, "active"))
            .arg(Self::item_key_prefix(queue))
            .arg(now)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(map_redis_error)?;

        match fields {
            Some(fields) => Ok(Some(Self::parse_item(queue, fields)?)),
            None => Ok(None),
        }
    }

    async fn complete(&self, queue: &str, id: ItemId) -> Result<()> {
        let _: i64 = self
            .complete_script
            .key(Self::item_key(queue, id))
            .key(Self::key(queue, "active"))
            .key(Self::key(queue, "completed"))
            .arg(id)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn retry(&self, queue: &str, id: ItemId, error: &str, delay_ms: i64) -> Result<()> {
        let not_before = self.time_provider.now_millis() + delay_ms.max(0);

        let _: i64 = self
            .retry_script
            .key(Self::item_key(queue, id))
            .key(Self::key(queue, "active"))
            .key(Self::key(queue, "delayed"))
            .arg(id)
            .arg(error)
            .arg(not_before)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn fail(&self, queue: &str, id: ItemId, error: &str) -> Result<()> {
        let now = self.time_provider.now_millis();

        let _: i64 = self
            .fail_script
            .key(Self::item_key(queue, id))
            .key(Self::key(queue, "active"))
            .key(Self::key(queue, "failed"))
            .arg(id)
            .arg(error)
            .arg(now)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn counts(&self, queue: &str) -> Result<QueueCounts> {
        let mut conn = self.conn.clone();
        let (waiting, delayed, active, completed, failed): (i64, i64, i64, Option<i64>, i64) =
            redis::pipe()
                .llen(Self::key(queue, "waiting"))
                .zcard(Self::key(queue, "delayed"))
                .zcard(Self::key(queue, "active"))
                .get(Self::key(queue, "completed"))
                .llen(Self::key(queue, "failed"))
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;

        Ok(QueueCounts {
            waiting: waiting + delayed,
            active,
            completed: completed.unwrap_or(0),
            failed,
        })
    }

    async fn reclaim_stuck(&self, queue: &str, older_than_ms: i64) -> Result<u64> {
        let cutoff = self.time_provider.now_millis() - older_than_ms;

        let reclaimed: u64 = self
            .reclaim_script
            .key(Self::key(queue, "active"))
            .key(Self::key(queue, "waiting"))
            .arg(Self::item_key_prefix(queue))
            .arg(cutoff)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(map_redis_error)?;
        Ok(reclaimed)
    }

    async fn find(&self, queue: &str, id: ItemId) -> Result<Option<QueueItem>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(Self::item_key(queue, id))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        if fields.is_empty() {
            return Ok(None);
        }
        Self::parse_item(queue, fields).map(Some)
    }
}

#[async_trait]
impl LimiterStore for RedisQueueStore {
    async fn try_acquire(&self, queue: &str, max_per_window: u32, window_ms: i64) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let window_start = now - now.rem_euclid(window_ms);
        let key = format!("relay:limiter:{}:{}", queue, window_start);

        // Counter expires at 2x the window so stale windows clean themselves up
        let admitted: i64 = self
            .limiter_script
            .key(key)
            .arg(max_per_window)
            .arg(window_ms * 2)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(map_redis_error)?;
        Ok(admitted == 1)
    }
}

// Integration tests against a local Redis (run with `cargo test -- --ignored`)
#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{connect, RedisConfig};
    use relay_core::domain::TrackPayload;
    use relay_core::port::time_provider::mocks::ManualTimeProvider;
    use serde_json::json;

    fn track_event(name: &str) -> Event {
        Event::Track(TrackPayload {
            event: name.to_string(),
            user_id: "u".to_string(),
            properties: json!({}),
            anonymous_id: None,
        })
    }

    // Unique queue name per test run so reruns never collide
    fn test_queue(label: &str) -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("test-{}-{}", label, nanos)
    }

    async fn store_with_clock() -> (RedisQueueStore, Arc<ManualTimeProvider>) {
        let conn = connect(&RedisConfig::default()).await.unwrap();
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        (RedisQueueStore::new(conn, clock.clone(), 3), clock)
    }

    #[tokio::test]
    #[ignore]
    async fn enqueue_claim_complete_round_trip() {
        let (store, _clock) = store_with_clock().await;
        let queue = test_queue("roundtrip");

        let a = store.enqueue(&queue, &track_event("a")).await.unwrap();
        let b = store.enqueue(&queue, &track_event("b")).await.unwrap();
        assert!(b.id > a.id);

        let claimed = store.claim_next(&queue).await.unwrap().unwrap();
        assert_eq!(claimed.id, a.id);
        assert_eq!(claimed.state, ItemState::Active);

        store.complete(&queue, a.id).await.unwrap();
        store.complete(&queue, a.id).await.unwrap(); // idempotent

        let counts = store.counts(&queue).await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.waiting, 1);
        assert!(store.find(&queue, a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn retry_gates_until_delay_passes() {
        let (store, clock) = store_with_clock().await;
        let queue = test_queue("retry");

        let item = store.enqueue(&queue, &track_event("a")).await.unwrap();
        store.claim_next(&queue).await.unwrap().unwrap();
        store.retry(&queue, item.id, "boom", 5_000).await.unwrap();

        assert!(store.claim_next(&queue).await.unwrap().is_none());

        clock.advance(5_000);
        let again = store.claim_next(&queue).await.unwrap().unwrap();
        assert_eq!(again.id, item.id);
        assert_eq!(again.attempts, 1);
        assert_eq!(again.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    #[ignore]
    async fn retried_item_outranks_newer_arrivals_once_eligible() {
        let (store, clock) = store_with_clock().await;
        let queue = test_queue("retry-order");

        let first = store.enqueue(&queue, &track_event("first")).await.unwrap();
        store.claim_next(&queue).await.unwrap().unwrap();
        store.retry(&queue, first.id, "boom", 5_000).await.unwrap();
        let second = store.enqueue(&queue, &track_event("second")).await.unwrap();

        clock.advance(5_000);
        let claimed = store.claim_next(&queue).await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        let next = store.claim_next(&queue).await.unwrap().unwrap();
        assert_eq!(next.id, second.id);
    }

    #[tokio::test]
    #[ignore]
    async fn reclaim_returns_stale_claims_to_the_front() {
        let (store, clock) = store_with_clock().await;
        let queue = test_queue("reclaim");

        let stuck = store.enqueue(&queue, &track_event("stuck")).await.unwrap();
        store.enqueue(&queue, &track_event("fresh")).await.unwrap();
        store.claim_next(&queue).await.unwrap().unwrap();

        clock.advance(600_000);
        assert_eq!(store.reclaim_stuck(&queue, 300_000).await.unwrap(), 1);

        // The reclaimed item keeps its place at the head of the queue
        let next = store.claim_next(&queue).await.unwrap().unwrap();
        assert_eq!(next.id, stuck.id);
        assert_eq!(next.attempts, 0);
    }

    #[tokio::test]
    #[ignore]
    async fn failed_item_is_retained_with_error() {
        let (store, _clock) = store_with_clock().await;
        let queue = test_queue("fail");

        let item = store.enqueue(&queue, &track_event("a")).await.unwrap();
        store.claim_next(&queue).await.unwrap().unwrap();
        store.fail(&queue, item.id, "status 400").await.unwrap();

        let found = store.find(&queue, item.id).await.unwrap().unwrap();
        assert_eq!(found.state, ItemState::Failed);
        assert_eq!(found.last_error.as_deref(), Some("status 400"));
        assert_eq!(store.counts(&queue).await.unwrap().failed, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn limiter_caps_admissions_per_window() {
        let (store, clock) = store_with_clock().await;
        let queue = test_queue("limiter");

        for _ in 0..3 {
            assert!(store.try_acquire(&queue, 3, 1_000).await.unwrap());
        }
        assert!(!store.try_acquire(&queue, 3, 1_000).await.unwrap());

        clock.advance(1_000);
        assert!(store.try_acquire(&queue, 3, 1_000).await.unwrap());
    }
}
