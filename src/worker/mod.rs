mod message;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use message::{classify, Dispatch};

use crate::config::types::WorkerConfig;
use crate::error::Result;
use crate::model::{ExecutionRequest, ExecutionResult};
use crate::queue::{QueueMessage, WorkQueue};
use crate::results::ResultPublisher;
use crate::sandbox::SandboxExecutor;

/// Polling and fan-out parameters of the consumer loop.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_batch: u32,
    pub wait: Duration,
    pub visibility: Duration,
    pub error_backoff: Duration,
    pub max_concurrency: usize,
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            max_batch: config.max_batch,
            wait: Duration::from_secs(config.wait_seconds),
            visibility: Duration::from_secs(config.visibility_timeout_secs),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            max_concurrency: config.max_concurrency.max(1),
        }
    }
}

/// Counts for one processed batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub executed: usize,
    pub poisoned: usize,
    pub skipped: usize,
}

/// A message whose result is known or still being computed.
enum Pending {
    Ready {
        message: QueueMessage,
        task_id: String,
        result: ExecutionResult,
    },
    Running {
        message: QueueMessage,
        task_id: String,
        language: String,
        handle: JoinHandle<ExecutionResult>,
    },
}

/// The queue consumer loop.
///
/// Every handled message gets exactly one published result followed by one
/// delete. A crash between execution and delete means the message is run
/// again after its lease expires; the overwrite on publish keeps that safe.
pub struct Worker {
    queue: Arc<dyn WorkQueue>,
    publisher: ResultPublisher,
    executor: Arc<SandboxExecutor>,
    settings: WorkerSettings,
    permits: Arc<Semaphore>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        publisher: ResultPublisher,
        executor: Arc<SandboxExecutor>,
        settings: WorkerSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrency));
        Self {
            queue,
            publisher,
            executor,
            settings,
            permits,
        }
    }

    /// Poll until `shutdown` fires or a fatal error occurs.
    ///
    /// A batch already being processed is always finished before returning.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            language = %self.executor.language(),
            worker = %self.executor.worker_name(),
            max_batch = self.settings.max_batch,
            max_concurrency = self.settings.max_concurrency,
            "Worker started"
        );

        while !shutdown.is_cancelled() {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.queue.receive(
                    self.settings.max_batch,
                    self.settings.wait,
                    self.settings.visibility,
                ) => received,
            };

            let handled = match received {
                Ok(messages) => self.process_batch(messages).await.map(|_| ()),
                Err(e) => Err(e),
            };

            if let Err(e) = handled {
                if e.is_fatal() {
                    error!(error = %e, "Fatal error, stopping worker");
                    return Err(e);
                }
                error!(
                    error = %e,
                    backoff_secs = self.settings.error_backoff.as_secs(),
                    "Error in worker loop, backing off"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.error_backoff) => {}
                }
            }
        }

        info!("Worker stopped");
        Ok(())
    }

    /// Execute, publish and acknowledge one batch of messages.
    ///
    /// Errors returned here come from the broker or the cache. The message
    /// being published at that point is left unacknowledged so it is
    /// delivered again.
    pub async fn process_batch(&self, messages: Vec<QueueMessage>) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        if messages.is_empty() {
            return Ok(summary);
        }
        debug!(count = messages.len(), "Received messages");

        let language = self.executor.language();
        let mut pending = Vec::with_capacity(messages.len());

        for message in messages {
            match classify(&message, language) {
                Dispatch::Skip { language } => {
                    debug!(
                        message_id = %message.message_id,
                        language = %language,
                        "Leaving message for another worker"
                    );
                    summary.skipped += 1;
                }
                Dispatch::Poison {
                    task_id,
                    language: declared,
                    reason,
                } => {
                    warn!(
                        message_id = %message.message_id,
                        task_id = %task_id,
                        reason = %reason,
                        "Draining unprocessable message"
                    );
                    let declared = declared.unwrap_or_else(|| language.to_string());
                    let result =
                        ExecutionResult::poison(reason, &declared, self.executor.worker_name());
                    summary.poisoned += 1;
                    pending.push(Pending::Ready {
                        message,
                        task_id,
                        result,
                    });
                }
                Dispatch::Run(request) => {
                    info!(task_id = %request.task_id, "Executing submission");
                    summary.executed += 1;
                    pending.push(Pending::Running {
                        message,
                        task_id: request.task_id.clone(),
                        language: request.language.clone(),
                        handle: self.spawn_execution(request),
                    });
                }
            }
        }

        for item in pending {
            let (message, task_id, result) = self.resolve(item).await;
            self.publisher.publish(&task_id, &result).await?;
            self.acknowledge(&message).await?;
        }

        Ok(summary)
    }

    fn spawn_execution(&self, request: ExecutionRequest) -> JoinHandle<ExecutionResult> {
        let executor = Arc::clone(&self.executor);
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            // The semaphore is never closed; a failed acquire just runs unbounded.
            let _permit = permits.acquire_owned().await.ok();
            executor.execute(&request).await
        })
    }

    async fn resolve(&self, item: Pending) -> (QueueMessage, String, ExecutionResult) {
        match item {
            Pending::Ready {
                message,
                task_id,
                result,
            } => (message, task_id, result),
            Pending::Running {
                message,
                task_id,
                language,
                handle,
            } => {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(task_id = %task_id, error = %e, "Execution task failed");
                        ExecutionResult::poison(
                            format!("Execution task failed: {}", e),
                            &language,
                            self.executor.worker_name(),
                        )
                    }
                };
                (message, task_id, result)
            }
        }
    }

    async fn acknowledge(&self, message: &QueueMessage) -> Result<()> {
        if !self.queue.delete(&message.receipt).await? {
            warn!(
                message_id = %message.message_id,
                "Lease expired before acknowledgment; message may be delivered again"
            );
        }
        Ok(())
    }
}

/// Token cancelled on SIGINT or SIGTERM.
pub fn shutdown_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received, finishing current batch");
        trigger.cancel();
    });

    token
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, only handling Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
