use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::config::types::JavaConfig;
use crate::error::{Result, RunletError};
use crate::model::{Language, Outcome};
use crate::sandbox::policy;
use crate::sandbox::process::{run_bounded, ProcessOutcome};
use crate::sandbox::traits::Runner;
use crate::sandbox::workspace::Workspace;
use crate::sandbox::Limits;

/// Compiles with javac, then runs under a security manager with a
/// workspace-scoped policy and a capped heap.
pub struct JavaRunner {
    compiler: PathBuf,
    runtime: PathBuf,
    fallback_class: String,
    public_class: Regex,
    any_class: Regex,
    limits: Limits,
}

impl JavaRunner {
    pub fn new(config: &JavaConfig, limits: Limits) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| RunletError::Config(format!("Bad class pattern: {}", e)))
        };

        Ok(Self {
            compiler: config.compiler.clone(),
            runtime: config.runtime.clone(),
            fallback_class: config.fallback_class.clone(),
            public_class: compile(r"public\s+class\s+(\w+)")?,
            any_class: compile(r"class\s+(\w+)")?,
            limits,
        })
    }

    /// Entry class of the submission: the public class, else the first
    /// class, else the configured fallback.
    pub fn entry_class<'a>(&'a self, code: &'a str) -> &'a str {
        self.public_class
            .captures(code)
            .or_else(|| self.any_class.captures(code))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or(&self.fallback_class)
    }
}

#[async_trait]
impl Runner for JavaRunner {
    fn language(&self) -> Language {
        Language::Java
    }

    fn binaries(&self) -> Vec<&Path> {
        vec![self.compiler.as_path(), self.runtime.as_path()]
    }

    async fn run(&self, code: &str, workspace: &Workspace) -> Result<Outcome> {
        let class_name = self.entry_class(code);
        let source = workspace
            .write_file(&format!("{}.java", class_name), code)
            .await?;

        let mut compile = Command::new(&self.compiler);
        compile.arg(&source);
        compile.current_dir(workspace.path());

        debug!(class = %class_name, "Compiling java submission");
        match run_bounded(compile, self.limits.timeout, self.limits.max_output_bytes).await? {
            ProcessOutcome::TimedOut => return Ok(Outcome::timed_out()),
            ProcessOutcome::Exited(output) if output.exit_code != 0 => {
                debug!(exit_code = output.exit_code, "Compilation failed");
                return Ok(Outcome::compilation_failed(output.stderr));
            }
            ProcessOutcome::Exited(_) => {}
        }

        let policy_path = policy::generate(workspace).await?;

        let mut cmd = Command::new(&self.runtime);
        cmd.arg("-Djava.security.manager");
        cmd.arg(format!("-Djava.security.policy={}", policy_path.display()));
        cmd.arg(format!("-Xmx{}m", self.limits.memory_limit_mb));
        cmd.arg("-cp");
        cmd.arg(workspace.path());
        cmd.arg(class_name);
        cmd.current_dir(workspace.path());

        debug!(class = %class_name, "Running java submission");
        let outcome = run_bounded(cmd, self.limits.timeout, self.limits.max_output_bytes).await?;
        Ok(outcome.into())
    }
}
