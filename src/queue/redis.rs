use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Script};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::types::QueueConfig;
use crate::error::{Result, RunletError};
use crate::queue::{QueueMessage, WorkQueue};

/// Returns expired leases to the pending list, then leases up to
/// `#ARGV - 1` messages under the receipts passed in ARGV[2..].
///
/// Deadlines come from the server clock so consumers with skewed clocks
/// agree on when a lease runs out.
///
/// KEYS: pending list, inflight zset, lease hash
/// ARGV: visibility (ms), receipts...
const RECEIVE_SCRIPT: &str = r#"
local time = redis.call('TIME')
local now = tonumber(time[1]) * 1000 + math.floor(tonumber(time[2]) / 1000)
local deadline = now + tonumber(ARGV[1])

local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now)
for _, receipt in ipairs(expired) do
    local envelope = redis.call('HGET', KEYS[3], receipt)
    if envelope then
        redis.call('RPUSH', KEYS[1], envelope)
    end
    redis.call('HDEL', KEYS[3], receipt)
    redis.call('ZREM', KEYS[2], receipt)
end

local out = {}
for i = 2, #ARGV do
    local envelope = redis.call('RPOP', KEYS[1])
    if not envelope then
        break
    end
    redis.call('ZADD', KEYS[2], deadline, ARGV[i])
    redis.call('HSET', KEYS[3], ARGV[i], envelope)
    table.insert(out, ARGV[i])
    table.insert(out, envelope)
end
return out
"#;

/// KEYS: inflight zset, lease hash. ARGV: receipt
const DELETE_SCRIPT: &str = r#"
local removed = redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
return removed
"#;

/// Stored form of a queued message.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    id: String,
    body: String,
}

struct QueueKeys {
    pending: String,
    inflight: String,
    leases: String,
}

impl QueueKeys {
    fn new(namespace: &str) -> Self {
        Self {
            pending: format!("{}:pending", namespace),
            inflight: format!("{}:inflight", namespace),
            leases: format!("{}:leases", namespace),
        }
    }
}

/// Work queue on Redis with SQS-style leases.
///
/// Pending messages sit in a list. Receiving moves a message into a lease
/// (sorted set scored by deadline + hash of receipt -> envelope) under a
/// fresh receipt. Leases that run out are pushed back onto the list on the
/// next receive by any consumer.
pub struct RedisWorkQueue {
    conn: ConnectionManager,
    keys: QueueKeys,
    poll_interval: Duration,
    receive_script: Script,
    delete_script: Script,
}

impl RedisWorkQueue {
    pub async fn connect(config: &QueueConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(RunletError::MissingQueueUrl)?;

        let client = redis::Client::open(url).map_err(queue_error)?;
        let conn = ConnectionManager::new(client).await.map_err(queue_error)?;

        let namespace = Self::namespace(config);
        info!(namespace = %namespace, "Connected to work queue");

        Ok(Self {
            conn,
            keys: QueueKeys::new(&namespace),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            receive_script: Script::new(RECEIVE_SCRIPT),
            delete_script: Script::new(DELETE_SCRIPT),
        })
    }

    /// Key prefix for a queue: "runlet:<region>:<name>"
    pub fn namespace(config: &QueueConfig) -> String {
        format!(
            "runlet:{}:{}",
            config.region.as_deref().unwrap_or("default"),
            config.name
        )
    }

    /// Enqueue a payload. Returns the message id.
    pub async fn send(&self, body: &str) -> Result<String> {
        let envelope = Envelope {
            id: uuid::Uuid::new_v4().to_string(),
            body: body.to_string(),
        };
        let encoded = serde_json::to_string(&envelope)?;

        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.keys.pending)
            .arg(encoded)
            .query_async(&mut conn)
            .await
            .map_err(queue_error)?;

        debug!(message_id = %envelope.id, "Enqueued message");
        Ok(envelope.id)
    }

    async fn lease_batch(&self, max: u32, visibility: Duration) -> Result<Vec<QueueMessage>> {
        let visibility_ms = u64::try_from(visibility.as_millis()).unwrap_or(u64::MAX);

        let mut invocation = self.receive_script.prepare_invoke();
        invocation
            .key(&self.keys.pending)
            .key(&self.keys.inflight)
            .key(&self.keys.leases)
            .arg(visibility_ms);
        for _ in 0..max {
            invocation.arg(uuid::Uuid::new_v4().to_string());
        }

        let mut conn = self.conn.clone();
        let flat: Vec<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(queue_error)?;

        Ok(flat
            .chunks(2)
            .filter_map(|pair| match pair {
                [receipt, raw] => Some(decode_envelope(receipt, raw)),
                _ => None,
            })
            .collect())
    }
}

/// A corrupt envelope still yields a message so it can be drained as poison.
fn decode_envelope(receipt: &str, raw: &str) -> QueueMessage {
    match serde_json::from_str::<Envelope>(raw) {
        Ok(envelope) => QueueMessage {
            message_id: envelope.id,
            receipt: receipt.to_string(),
            body: envelope.body,
        },
        Err(e) => {
            warn!(receipt = %receipt, error = %e, "Queue entry is not a valid envelope");
            QueueMessage {
                message_id: receipt.to_string(),
                receipt: receipt.to_string(),
                body: raw.to_string(),
            }
        }
    }
}

fn queue_error(e: RedisError) -> RunletError {
    RunletError::Queue(e.to_string())
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn receive(
        &self,
        max: u32,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Vec<QueueMessage>> {
        let deadline = Instant::now() + wait;

        loop {
            let messages = self.lease_batch(max, visibility).await?;
            let now = Instant::now();
            if !messages.is_empty() || now >= deadline {
                return Ok(messages);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn delete(&self, receipt: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .delete_script
            .key(&self.keys.inflight)
            .key(&self.keys.leases)
            .arg(receipt)
            .invoke_async(&mut conn)
            .await
            .map_err(queue_error)?;

        Ok(removed > 0)
    }
}
