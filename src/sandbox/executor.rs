use std::time::Instant;

use tracing::{info, warn};

use crate::config::types::RunletConfig;
use crate::error::Result;
use crate::model::{ExecutionRequest, ExecutionResult, Language, Outcome};
use crate::sandbox::factory::create_runner;
use crate::sandbox::runners::LanguageRunner;
use crate::sandbox::traits::Runner;
use crate::sandbox::workspace::WorkspaceManager;

/// Runs one request end to end: precheck, workspace, runner, cleanup.
pub struct SandboxExecutor {
    runner: LanguageRunner,
    workspaces: WorkspaceManager,
    worker_name: String,
}

impl SandboxExecutor {
    pub fn new(runner: LanguageRunner, workspaces: WorkspaceManager, worker_name: String) -> Self {
        Self {
            runner,
            workspaces,
            worker_name,
        }
    }

    /// Build an executor for the configured worker language.
    pub fn from_config(config: &RunletConfig) -> Result<Self> {
        let runner = create_runner(config.worker.language, config)?;
        let workspaces = WorkspaceManager::new(&config.sandbox.workspace_root);
        Ok(Self::new(runner, workspaces, config.worker.worker_name()))
    }

    pub fn language(&self) -> Language {
        self.runner.language()
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    pub fn runner(&self) -> &LanguageRunner {
        &self.runner
    }

    /// Execute a request. Never fails: every problem ends up in the result.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();
        let outcome = self.run_code(&request.code).await;
        let elapsed = started.elapsed();

        info!(
            task_id = %request.task_id,
            stage = %outcome.stage,
            success = outcome.success,
            exit_code = ?outcome.exit_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "Execution completed"
        );

        ExecutionResult::from_outcome(outcome, elapsed, &request.language, &self.worker_name)
    }

    async fn run_code(&self, code: &str) -> Outcome {
        if let Some(refused) = self.runner.precheck(code) {
            return refused;
        }

        let workspace = match self.workspaces.acquire().await {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!(error = %e, "Workspace setup failed");
                return Outcome::setup_failed(e.to_string());
            }
        };

        // The runner has already killed and reaped its process by the time
        // it returns, so nothing still references the directory.
        let outcome = match self.runner.run(code, &workspace).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Runner setup failed");
                Outcome::setup_failed(e.to_string())
            }
        };

        self.workspaces.release(workspace).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Stage, TIMEOUT_MESSAGE};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn executor(root: &Path, language: Language, configure: impl FnOnce(&mut RunletConfig)) -> SandboxExecutor {
        let mut config = RunletConfig::default();
        config.worker.language = language;
        config.sandbox.workspace_root = root.to_path_buf();
        configure(&mut config);
        SandboxExecutor::from_config(&config).unwrap()
    }

    fn request(task_id: &str, code: &str, language: &str) -> ExecutionRequest {
        ExecutionRequest {
            task_id: task_id.to_string(),
            code: code.to_string(),
            language: language.to_string(),
        }
    }

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_security_rejection_spawns_nothing() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor(root.path(), Language::Python, |_| {});

        let result = exec.execute(&request("t1", "import os\nos.system('id')", "Python")).await;

        assert!(!result.success);
        assert_eq!(result.stage, Stage::SecurityCheck);
        assert_eq!(result.output, None);
        assert_eq!(result.language, "Python");
        assert_eq!(result.worker, "python-executor");
        // no workspace was ever created
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_timeout_cleans_workspace() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor(root.path(), Language::Python, |c| {
            c.python.interpreter = PathBuf::from("sh");
            c.sandbox.timeout_secs = 1;
        });

        let result = exec.execute(&request("t2", "echo partial; sleep 10", "python")).await;
        assert!(!result.success);
        assert_eq!(result.stage, Stage::Execution);
        assert_eq!(result.errors.as_deref(), Some(TIMEOUT_MESSAGE));
        assert_eq!(result.output, None);
        assert!(result.execution_time >= 1.0);
        assert_eq!(entries(root.path()), 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_leaves_no_processes_behind() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let pid_file = scratch.path().join("bg.pid");
        let exec = executor(root.path(), Language::Python, |c| {
            c.python.interpreter = PathBuf::from("sh");
            c.sandbox.timeout_secs = 1;
        });

        let code = format!("sleep 47 & echo $! > '{}'; sleep 30", pid_file.display());
        let result = exec.execute(&request("t5", &code, "python")).await;
        assert_eq!(result.errors.as_deref(), Some(TIMEOUT_MESSAGE));
        assert_eq!(entries(root.path()), 0);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let stat = format!("/proc/{}/stat", pid.trim());
        let mut alive = true;
        for _ in 0..40 {
            // gone, or a zombie waiting for init to reap it
            alive = std::fs::read_to_string(&stat)
                .ok()
                .and_then(|s| s.rsplit_once(')').map(|(_, rest)| rest.trim_start().to_string()))
                .is_some_and(|state| !state.starts_with('Z'));
            if !alive {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        assert!(!alive, "background sleep {} outlived its workspace", pid.trim());
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_setup_failure() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor(root.path(), Language::JavaScript, |c| {
            c.javascript.interpreter = PathBuf::from("runlet-missing-node");
        });

        let result = exec.execute(&request("t3", "console.log(1)", "javascript")).await;
        assert!(!result.success);
        assert_eq!(result.stage, Stage::Setup);
        assert!(result.errors.unwrap().contains("runlet-missing-node"));
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_unusable_workspace_root_is_a_setup_failure() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let exec = executor(&blocker, Language::Python, |_| {});

        let result = exec.execute(&request("t4", "print(1)", "python")).await;
        assert_eq!(result.stage, Stage::Setup);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_get_separate_workspaces() {
        let root = tempfile::tempdir().unwrap();
        let exec = Arc::new(executor(root.path(), Language::Python, |c| {
            c.python.interpreter = PathBuf::from("sh");
        }));

        // Each run prints its own working directory.
        let code = "sleep 0.2; pwd";
        let a = {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.execute(&request("a", code, "python")).await })
        };
        let b = {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.execute(&request("b", code, "python")).await })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert!(a.success && b.success);
        assert_eq!(a.exit_code, Some(0));
        assert_ne!(a.output, b.output);
        assert_eq!(entries(root.path()), 0);
    }
}
