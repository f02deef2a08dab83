use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::results::ResultStore;

/// In-process store double; records the TTL of every write.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Duration)>>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, key: &str) -> Option<(String, Duration)> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Make writes fail like an unreachable cache.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.fail_writes.lock().unwrap() = unavailable;
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(redis::RedisError::from((redis::ErrorKind::IoError, "cache unreachable")).into());
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).map(|(v, _)| v.clone()))
    }
}
