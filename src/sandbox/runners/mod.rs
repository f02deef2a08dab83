mod java;
mod javascript;
mod python;

use std::path::Path;

use async_trait::async_trait;

pub use java::JavaRunner;
pub use javascript::JavaScriptRunner;
pub use python::PythonRunner;

use crate::error::Result;
use crate::model::{Language, Outcome};
use crate::sandbox::process::ProcessOutcome;
use crate::sandbox::traits::Runner;
use crate::sandbox::workspace::Workspace;

impl From<ProcessOutcome> for Outcome {
    fn from(outcome: ProcessOutcome) -> Self {
        match outcome {
            ProcessOutcome::Exited(output) => {
                Outcome::exited(output.stdout, output.stderr, output.exit_code)
            }
            ProcessOutcome::TimedOut => Outcome::timed_out(),
        }
    }
}

/// The closed set of supported runners.
pub enum LanguageRunner {
    Python(PythonRunner),
    JavaScript(JavaScriptRunner),
    Java(JavaRunner),
}

impl LanguageRunner {
    fn inner(&self) -> &dyn Runner {
        match self {
            Self::Python(runner) => runner,
            Self::JavaScript(runner) => runner,
            Self::Java(runner) => runner,
        }
    }
}

#[async_trait]
impl Runner for LanguageRunner {
    fn language(&self) -> Language {
        self.inner().language()
    }

    fn binaries(&self) -> Vec<&Path> {
        self.inner().binaries()
    }

    fn precheck(&self, code: &str) -> Option<Outcome> {
        self.inner().precheck(code)
    }

    async fn run(&self, code: &str, workspace: &Workspace) -> Result<Outcome> {
        self.inner().run(code, workspace).await
    }
}
