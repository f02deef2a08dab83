mod redis;

#[cfg(test)]
pub(crate) mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::types::CacheConfig;
use crate::error::Result;
use crate::model::ExecutionResult;

pub use self::redis::RedisResultStore;

/// Key-value store with per-key expiry.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Writes terminal results where the front end polls for them.
///
/// Publishing is an overwrite, so a redelivered message that runs again
/// simply replaces the earlier result.
#[derive(Clone)]
pub struct ResultPublisher {
    store: Arc<dyn ResultStore>,
    key_prefix: String,
    ttl: Duration,
}

impl ResultPublisher {
    pub fn new(store: Arc<dyn ResultStore>, key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    pub fn from_config(store: Arc<dyn ResultStore>, config: &CacheConfig) -> Self {
        Self::new(
            store,
            config.key_prefix.clone(),
            Duration::from_secs(config.ttl_secs),
        )
    }

    pub fn key(&self, task_id: &str) -> String {
        format!("{}:{}", self.key_prefix, task_id)
    }

    pub async fn publish(&self, task_id: &str, result: &ExecutionResult) -> Result<()> {
        let key = self.key(task_id);
        let value = serde_json::to_string(result)?;
        self.store.put(&key, &value, self.ttl).await?;
        debug!(key = %key, ttl_secs = self.ttl.as_secs(), "Published result");
        Ok(())
    }

    /// Read a published result, if it exists and has not expired.
    pub async fn fetch(&self, task_id: &str) -> Result<Option<ExecutionResult>> {
        match self.store.get(&self.key(task_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
