use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, RunletError};
use crate::model::Language;

/// Fixed allowance for workspace setup and teardown around a submission.
pub const SETUP_OVERHEAD_SECS: u64 = 5;

/// Upper bound on messages fetched per poll.
pub const MAX_BATCH_LIMIT: u32 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunletConfig {
    pub worker: WorkerConfig,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub sandbox: SandboxConfig,
    pub python: PythonConfig,
    pub javascript: JavaScriptConfig,
    pub java: JavaConfig,
}

/// Queue consumer behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Language this worker executes; other messages are left on the queue
    pub language: Language,
    /// Name reported in results (defaults to "<language>-executor")
    pub name: Option<String>,
    /// Maximum messages fetched per poll
    pub max_batch: u32,
    /// Long-poll wait in seconds
    pub wait_seconds: u64,
    /// How long a received message stays hidden from other consumers
    pub visibility_timeout_secs: u64,
    /// Sleep after a broker error before polling again
    pub error_backoff_secs: u64,
    /// Submissions executed at the same time within one batch
    pub max_concurrency: usize,
    /// Optional ceiling for memory_limit_mb * max_concurrency
    pub memory_budget_mb: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            language: Language::Python,
            name: None,
            max_batch: 5,
            wait_seconds: 5,
            visibility_timeout_secs: 120,
            error_backoff_secs: 5,
            max_concurrency: 1,
            memory_budget_mb: None,
        }
    }
}

impl WorkerConfig {
    pub fn worker_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.language.default_worker_name())
    }
}

/// Work queue endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Redis URL of the queue; required to run a worker
    pub url: Option<String>,
    /// Queue name
    pub name: String,
    /// Locality label, used to namespace queue keys
    pub region: Option<String>,
    /// Retry interval while long-polling an empty queue
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: None,
            name: "execution".to_string(),
            region: None,
            poll_interval_ms: 250,
        }
    }
}

/// Result cache endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub url: String,
    /// Expiry of published results
    pub ttl_secs: u64,
    /// Results are stored under "<key_prefix>:<task_id>"
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            ttl_secs: 600,
            key_prefix: "execution".to_string(),
        }
    }
}

/// Limits applied to every submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock limit per compile or run step
    pub timeout_secs: u64,
    /// Memory ceiling in MB
    pub memory_limit_mb: u64,
    /// Directory under which per-request workspaces are created
    pub workspace_root: PathBuf,
    /// Captured bytes kept per output stream
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            memory_limit_mb: 128,
            workspace_root: std::env::temp_dir().join("runlet"),
            max_output_bytes: 1024 * 1024,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    pub interpreter: PathBuf,
    /// Modules whose literal import refuses the submission
    pub deny_imports: Vec<String>,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            deny_imports: ["os", "subprocess", "sys", "importlib", "__builtin__"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JavaScriptConfig {
    pub interpreter: PathBuf,
}

impl Default for JavaScriptConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("node"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JavaConfig {
    pub compiler: PathBuf,
    pub runtime: PathBuf,
    /// Entry class used when no class declaration is found
    pub fallback_class: String,
}

impl Default for JavaConfig {
    fn default() -> Self {
        Self {
            compiler: PathBuf::from("javac"),
            runtime: PathBuf::from("java"),
            fallback_class: "Main".to_string(),
        }
    }
}

impl RunletConfig {
    /// Number of times a full batch has to wait for a free execution slot.
    pub fn batch_rounds(&self) -> u64 {
        let concurrency = self.worker.max_concurrency.max(1) as u64;
        (self.worker.max_batch as u64).div_ceil(concurrency).max(1)
    }

    /// Lease length a batch needs before its last message is acknowledged.
    ///
    /// The whole batch is leased at once, so a message queued behind
    /// `max_concurrency` others waits for them. Every execution may spend the
    /// timeout twice (compile + run).
    pub fn required_visibility_secs(&self) -> u64 {
        self.batch_rounds() * 2 * self.sandbox.timeout_secs + SETUP_OVERHEAD_SECS
    }

    /// Check the settings a worker needs before it starts polling.
    pub fn validate(&self) -> Result<()> {
        match self.queue.url.as_deref() {
            Some(url) if !url.trim().is_empty() => {}
            _ => return Err(RunletError::MissingQueueUrl),
        }

        if self.sandbox.timeout_secs == 0 {
            return Err(RunletError::Config(
                "sandbox.timeout_secs must be positive".to_string(),
            ));
        }

        if self.worker.max_batch == 0 || self.worker.max_batch > MAX_BATCH_LIMIT {
            return Err(RunletError::Config(format!(
                "worker.max_batch must be between 1 and {}",
                MAX_BATCH_LIMIT
            )));
        }

        if self.worker.max_concurrency == 0 {
            return Err(RunletError::Config(
                "worker.max_concurrency must be at least 1".to_string(),
            ));
        }

        let required = self.required_visibility_secs();
        if self.worker.visibility_timeout_secs <= required {
            return Err(RunletError::Config(format!(
                "worker.visibility_timeout_secs ({}) must exceed {}s: {} serial round(s) of \
                 2 x timeout plus {}s overhead for a batch of {} at concurrency {}",
                self.worker.visibility_timeout_secs,
                required,
                self.batch_rounds(),
                SETUP_OVERHEAD_SECS,
                self.worker.max_batch,
                self.worker.max_concurrency
            )));
        }

        if self.cache.ttl_secs == 0 {
            return Err(RunletError::Config(
                "cache.ttl_secs must be positive".to_string(),
            ));
        }

        if let Some(budget) = self.worker.memory_budget_mb {
            let needed = self.sandbox.memory_limit_mb * self.worker.max_concurrency as u64;
            if needed > budget {
                return Err(RunletError::Config(format!(
                    "memory_limit_mb x max_concurrency ({} MB) exceeds memory_budget_mb ({} MB)",
                    needed, budget
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RunletConfig {
        let mut config = RunletConfig::default();
        config.queue.url = Some("redis://127.0.0.1:6379".to_string());
        config
    }

    #[test]
    fn test_defaults_validate_once_queue_is_set() {
        assert!(matches!(
            RunletConfig::default().validate(),
            Err(RunletError::MissingQueueUrl)
        ));
        valid().validate().unwrap();
    }

    #[test]
    fn test_visibility_must_cover_compile_and_run() {
        let mut config = valid();
        config.worker.max_batch = 1;
        config.sandbox.timeout_secs = 30;
        config.worker.visibility_timeout_secs = 60;
        assert!(matches!(config.validate(), Err(RunletError::Config(_))));

        config.worker.visibility_timeout_secs = 66;
        config.validate().unwrap();
    }

    #[test]
    fn test_visibility_must_cover_a_serial_batch() {
        let mut config = valid();
        config.sandbox.timeout_secs = 1;
        config.worker.visibility_timeout_secs = 8;
        config.worker.max_batch = 10;
        config.worker.max_concurrency = 1;
        // ten jobs one after another can take 10 x 2s before the last ack
        assert_eq!(config.batch_rounds(), 10);
        assert_eq!(config.required_visibility_secs(), 25);
        assert!(matches!(config.validate(), Err(RunletError::Config(_))));

        config.worker.max_concurrency = 5;
        assert_eq!(config.batch_rounds(), 2);
        config.validate().unwrap_err();
        config.worker.visibility_timeout_secs = 10;
        config.validate().unwrap();
    }

    #[test]
    fn test_default_visibility_covers_default_batch() {
        let config = valid();
        assert!(config.worker.visibility_timeout_secs > config.required_visibility_secs());
    }

    #[test]
    fn test_memory_budget_bounds_concurrency() {
        let mut config = valid();
        config.worker.max_concurrency = 4;
        config.worker.memory_budget_mb = Some(256);
        assert!(config.validate().is_err());

        config.worker.memory_budget_mb = Some(512);
        config.validate().unwrap();
    }

    #[test]
    fn test_batch_bounds() {
        let mut config = valid();
        config.worker.max_batch = 0;
        assert!(config.validate().is_err());
        config.worker.max_batch = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RunletConfig = toml::from_str(
            r#"
            [worker]
            language = "java"

            [sandbox]
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.worker.language, Language::Java);
        assert_eq!(config.worker.worker_name(), "java-executor");
        assert_eq!(config.sandbox.timeout_secs, 5);
        assert_eq!(config.sandbox.memory_limit_mb, 128);
        assert_eq!(config.cache.ttl_secs, 600);
        assert_eq!(config.java.fallback_class, "Main");
    }
}
