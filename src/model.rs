use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::RunletError;

/// Languages a worker can be configured to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Interpreted, no runtime permission system (python3)
    Python,
    /// Interpreted on a managed runtime (node)
    #[serde(rename = "javascript")]
    #[value(name = "javascript", alias = "js")]
    JavaScript,
    /// Compiled for a managed runtime (javac + java)
    Java,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Java => "java",
        }
    }

    /// Default worker name reported in results
    pub fn default_worker_name(&self) -> String {
        format!("{}-executor", self.as_str())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = RunletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" => Ok(Self::Python),
            "javascript" => Ok(Self::JavaScript),
            "java" => Ok(Self::Java),
            other => Err(RunletError::Config(format!("Unsupported language: {}", other))),
        }
    }
}

/// A submission read off the work queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub task_id: String,
    pub code: String,
    /// Language as sent by the producer (matched case-insensitively)
    pub language: String,
}

/// Where in the pipeline a result was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SecurityCheck,
    Compilation,
    Execution,
    Setup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SecurityCheck => "security_check",
            Self::Compilation => "compilation",
            Self::Execution => "execution",
            Self::Setup => "setup",
        };
        f.write_str(s)
    }
}

pub const TIMEOUT_MESSAGE: &str = "Code execution timed out";

/// What a runner decided, before timing and worker metadata are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub success: bool,
    pub output: Option<String>,
    pub errors: Option<String>,
    pub stage: Stage,
    pub exit_code: Option<i32>,
}

impl Outcome {
    /// The program ran to completion. Success is exactly a zero exit status.
    pub fn exited(stdout: String, stderr: String, exit_code: i32) -> Self {
        let success = exit_code == 0;
        Self {
            success,
            output: Some(stdout),
            errors: if success { None } else { Some(stderr) },
            stage: Stage::Execution,
            exit_code: Some(exit_code),
        }
    }

    pub fn timed_out() -> Self {
        Self::failure(Stage::Execution, TIMEOUT_MESSAGE)
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::failure(Stage::SecurityCheck, reason)
    }

    pub fn compilation_failed(diagnostics: impl Into<String>) -> Self {
        Self::failure(Stage::Compilation, diagnostics)
    }

    pub fn setup_failed(message: impl Into<String>) -> Self {
        Self::failure(Stage::Setup, message)
    }

    fn failure(stage: Stage, errors: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            errors: Some(errors.into()),
            stage,
            exit_code: None,
        }
    }
}

/// The terminal record published for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Option<String>,
    pub errors: Option<String>,
    pub stage: Stage,
    pub exit_code: Option<i32>,
    /// Wall time in seconds
    pub execution_time: f64,
    pub language: String,
    pub worker: String,
}

pub const POISON_OUTPUT: &str =
    "There was a problem with our servers or formatting of the code, please try again later";

impl ExecutionResult {
    pub fn from_outcome(outcome: Outcome, elapsed: Duration, language: &str, worker: &str) -> Self {
        Self {
            success: outcome.success,
            output: outcome.output,
            errors: outcome.errors,
            stage: outcome.stage,
            exit_code: outcome.exit_code,
            execution_time: elapsed.as_secs_f64(),
            language: language.to_string(),
            worker: worker.to_string(),
        }
    }

    /// Result for a message that could not be processed at all.
    pub fn poison(reason: impl Into<String>, language: &str, worker: &str) -> Self {
        Self {
            success: false,
            output: Some(POISON_OUTPUT.to_string()),
            errors: Some(reason.into()),
            stage: Stage::Setup,
            exit_code: Some(500),
            execution_time: 0.0,
            language: language.to_string(),
            worker: worker.to_string(),
        }
    }
}
