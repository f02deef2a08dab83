use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{Result, RunletError};
use crate::queue::{QueueMessage, WorkQueue};

struct Lease {
    id: String,
    body: String,
    deadline: Instant,
}

#[derive(Default)]
struct State {
    pending: VecDeque<(String, String)>,
    leased: HashMap<String, Lease>,
    deleted: Vec<String>,
    late_acks: Vec<String>,
    failures: u32,
    receives: u32,
}

impl State {
    /// Put leases whose deadline has passed back on the pending list.
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .leased
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some(lease) = self.leased.remove(&receipt) {
                self.pending.push_back((lease.id, lease.body));
            }
        }
    }
}

/// In-process queue double. Leases expire on the wall clock like the real
/// queue, and can also be expired on demand.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a body; returns its message id.
    pub fn push(&self, body: impl Into<String>) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut state = self.state.lock().unwrap();
        state.pending.push_back((id.clone(), body.into()));
        id
    }

    /// Make the next `n` receives fail like an unreachable broker.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().unwrap().failures = n;
    }

    /// Expire every lease, making unacknowledged messages visible again.
    pub fn expire_leases(&self) {
        let mut state = self.state.lock().unwrap();
        let leased: Vec<_> = state
            .leased
            .drain()
            .map(|(_, lease)| (lease.id, lease.body))
            .collect();
        state.pending.extend(leased);
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn leased_len(&self) -> usize {
        self.state.lock().unwrap().leased.len()
    }

    /// Message ids deleted so far, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Message ids whose delete arrived after their lease had run out.
    pub fn late_acks(&self) -> Vec<String> {
        self.state.lock().unwrap().late_acks.clone()
    }

    pub fn receives(&self) -> u32 {
        self.state.lock().unwrap().receives
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn receive(
        &self,
        max: u32,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Vec<QueueMessage>> {
        let batch = {
            let mut state = self.state.lock().unwrap();
            state.receives += 1;
            if state.failures > 0 {
                state.failures -= 1;
                return Err(RunletError::Queue("broker unreachable".to_string()));
            }

            let now = Instant::now();
            state.requeue_expired(now);

            let mut batch = Vec::new();
            while batch.len() < max as usize {
                let Some((id, body)) = state.pending.pop_front() else {
                    break;
                };
                let receipt = uuid::Uuid::new_v4().to_string();
                state.leased.insert(
                    receipt.clone(),
                    Lease {
                        id: id.clone(),
                        body: body.clone(),
                        deadline: now + visibility,
                    },
                );
                batch.push(QueueMessage {
                    message_id: id,
                    receipt,
                    body,
                });
            }
            batch
        };

        if batch.is_empty() {
            tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
        }
        Ok(batch)
    }

    async fn delete(&self, receipt: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state.leased.remove(receipt) {
            Some(lease) if lease.deadline <= Instant::now() => {
                // another consumer may already hold this message
                state.late_acks.push(lease.id.clone());
                state.pending.push_back((lease.id, lease.body));
                Ok(false)
            }
            Some(lease) => {
                state.deleted.push(lease.id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
