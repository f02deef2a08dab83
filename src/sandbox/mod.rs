mod executor;
mod factory;
mod filter;
mod policy;
mod process;
mod runners;
mod traits;
mod workspace;

use std::time::Duration;

use crate::config::types::SandboxConfig;

pub use executor::SandboxExecutor;
pub use factory::{create_runner, runtime_status, BinaryStatus};
pub use filter::ImportFilter;
pub use policy::{render_policy, POLICY_FILE_NAME};
pub use process::{run_bounded, ProcessOutcome, ProcessOutput};
pub use runners::{JavaRunner, JavaScriptRunner, LanguageRunner, PythonRunner};
pub use traits::Runner;
pub use workspace::{Workspace, WorkspaceManager};

/// Resource limits applied to every compile and run step.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub timeout: Duration,
    pub memory_limit_mb: u64,
    pub max_output_bytes: usize,
}

impl From<&SandboxConfig> for Limits {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            timeout: config.timeout(),
            memory_limit_mb: config.memory_limit_mb,
            max_output_bytes: config.max_output_bytes,
        }
    }
}
