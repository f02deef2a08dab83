mod redis;

#[cfg(test)]
pub(crate) mod local_redis;
#[cfg(test)]
pub(crate) mod memory;

use std::time::Duration;

use async_trait::async_trait;

pub use self::redis::RedisWorkQueue;

/// A message leased from the work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Stable identifier assigned when the message was enqueued
    pub message_id: String,
    /// Handle for this delivery; needed to delete the message
    pub receipt: String,
    /// Raw payload
    pub body: String,
}

/// Consumer side of a queue with visibility-timeout redelivery.
///
/// A received message is hidden from other consumers for `visibility` and
/// comes back if it is not deleted in time, so every message may be
/// delivered more than once.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Fetch up to `max` messages, waiting up to `wait` for at least one.
    async fn receive(
        &self,
        max: u32,
        wait: Duration,
        visibility: Duration,
    ) -> crate::error::Result<Vec<QueueMessage>>;

    /// Delete a received message. Returns false when the lease had already
    /// expired (the message may be delivered again).
    async fn delete(&self, receipt: &str) -> crate::error::Result<bool>;
}
