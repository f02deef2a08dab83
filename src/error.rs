use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunletError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution queue URL is not configured (set EXECUTION_QUEUE_URL or [queue].url)")]
    MissingQueueUrl,

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    // Workspace errors
    #[error("Failed to prepare workspace {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("{0}")]
    Process(String),

    // Broker errors
    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Result cache error: {0}")]
    Cache(#[from] redis::RedisError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RunletError {
    /// Errors that must stop the worker instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::MissingQueueUrl | Self::TomlParse(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Queue(_) | Self::Cache(_))
    }
}

pub type Result<T> = std::result::Result<T, RunletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_and_retryable_are_disjoint() {
        let fatal = RunletError::MissingQueueUrl;
        assert!(fatal.is_fatal());
        assert!(!fatal.is_retryable());

        let broker = RunletError::Queue("connection refused".to_string());
        assert!(broker.is_retryable());
        assert!(!broker.is_fatal());
    }
}
