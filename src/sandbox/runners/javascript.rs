use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::types::JavaScriptConfig;
use crate::error::Result;
use crate::model::{Language, Outcome};
use crate::sandbox::process::run_bounded;
use crate::sandbox::traits::Runner;
use crate::sandbox::workspace::Workspace;
use crate::sandbox::Limits;

const SOURCE_FILE: &str = "main.js";

/// Runs javascript submissions with node.
///
/// There is no deny-list for this runtime; isolation rests on the timeout
/// and the V8 heap ceiling alone.
pub struct JavaScriptRunner {
    interpreter: PathBuf,
    limits: Limits,
}

impl JavaScriptRunner {
    pub fn new(config: &JavaScriptConfig, limits: Limits) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            limits,
        }
    }
}

#[async_trait]
impl Runner for JavaScriptRunner {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn binaries(&self) -> Vec<&Path> {
        vec![self.interpreter.as_path()]
    }

    async fn run(&self, code: &str, workspace: &Workspace) -> Result<Outcome> {
        let source = workspace.write_file(SOURCE_FILE, code).await?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(format!("--max-old-space-size={}", self.limits.memory_limit_mb));
        cmd.arg(&source);
        cmd.current_dir(workspace.path());

        debug!(source = %source.display(), "Running javascript submission");
        let outcome = run_bounded(cmd, self.limits.timeout, self.limits.max_output_bytes).await?;
        Ok(outcome.into())
    }
}
