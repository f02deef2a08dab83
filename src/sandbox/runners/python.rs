use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::types::PythonConfig;
use crate::error::Result;
use crate::model::{Language, Outcome};
use crate::sandbox::filter::ImportFilter;
use crate::sandbox::process::{limit_address_space, run_bounded};
use crate::sandbox::traits::Runner;
use crate::sandbox::workspace::Workspace;
use crate::sandbox::Limits;

const SOURCE_FILE: &str = "main.py";

/// Runs python submissions as a fresh interpreter process.
///
/// CPython has no permission system of its own, so submissions first go
/// through the import deny-list. It has no heap flag either, so the memory
/// ceiling is applied as an address-space rlimit on the interpreter process.
pub struct PythonRunner {
    interpreter: PathBuf,
    filter: ImportFilter,
    limits: Limits,
}

impl PythonRunner {
    pub fn new(config: &PythonConfig, limits: Limits) -> Result<Self> {
        Ok(Self {
            interpreter: config.interpreter.clone(),
            filter: ImportFilter::new(&config.deny_imports)?,
            limits,
        })
    }
}

#[async_trait]
impl Runner for PythonRunner {
    fn language(&self) -> Language {
        Language::Python
    }

    fn binaries(&self) -> Vec<&Path> {
        vec![self.interpreter.as_path()]
    }

    fn precheck(&self, code: &str) -> Option<Outcome> {
        let module = self.filter.denied_import(code)?;
        warn!(module = %module, "Refusing submission with denied import");
        Some(Outcome::rejected(ImportFilter::rejection(module)))
    }

    async fn run(&self, code: &str, workspace: &Workspace) -> Result<Outcome> {
        let source = workspace.write_file(SOURCE_FILE, code).await?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&source);
        cmd.current_dir(workspace.path());
        cmd.env("PYTHONDONTWRITEBYTECODE", "1");
        if self.limits.memory_limit_mb > 0 {
            limit_address_space(&mut cmd, self.limits.memory_limit_mb);
        }

        debug!(source = %source.display(), "Running python submission");
        let outcome = run_bounded(cmd, self.limits.timeout, self.limits.max_output_bytes).await?;
        Ok(outcome.into())
    }
}
