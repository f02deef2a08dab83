use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, RunletError};

/// Appended to a stream that hit the capture limit
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Captured result of a process that exited on its own.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug)]
pub enum ProcessOutcome {
    Exited(ProcessOutput),
    /// The deadline passed; the process was killed and reaped.
    TimedOut,
}

/// Run a command to completion under a wall-clock deadline.
///
/// The child leads its own process group. Both output streams are drained
/// concurrently so a chatty process cannot block on a full pipe. Each stream
/// keeps at most `max_output_bytes`; the rest is read and discarded.
///
/// Once the child exits, whatever it left running in its group is killed, so
/// background processes neither outlive the run nor hold the pipes open. When
/// the deadline passes the whole group is killed and the child reaped before
/// this returns, and whatever it printed is dropped.
pub async fn run_bounded(
    mut cmd: Command,
    timeout: Duration,
    max_output_bytes: usize,
) -> Result<ProcessOutcome> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .spawn()
        .map_err(|e| RunletError::Process(format!("Failed to start '{}': {}", program, e)))?;
    let group = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RunletError::Process("stdout was not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RunletError::Process("stderr was not captured".to_string()))?;

    let stdout_task = tokio::spawn(read_capped(stdout, max_output_bytes));
    let stderr_task = tokio::spawn(read_capped(stderr, max_output_bytes));
    let stdout_abort = stdout_task.abort_handle();
    let stderr_abort = stderr_task.abort_handle();

    let finished = tokio::time::timeout(timeout, async {
        let status = child.wait().await?;
        kill_group(group);
        let stdout = join_stream(stdout_task).await?;
        let stderr = join_stream(stderr_task).await?;
        Ok::<_, RunletError>((status, stdout, stderr))
    })
    .await;

    match finished {
        Ok(result) => {
            let (status, stdout, stderr) = result?;
            let exit_code = exit_code(status);
            debug!(
                program = %program,
                exit_code = exit_code,
                stdout_len = stdout.len(),
                stderr_len = stderr.len(),
                "Process exited"
            );
            Ok(ProcessOutcome::Exited(ProcessOutput {
                stdout,
                stderr,
                exit_code,
            }))
        }
        Err(_) => {
            kill_group(group);
            if let Err(e) = child.kill().await {
                warn!(program = %program, error = %e, "Failed to kill timed out process");
            }
            stdout_abort.abort();
            stderr_abort.abort();
            debug!(program = %program, timeout_ms = timeout.as_millis() as u64, "Process timed out");
            Ok(ProcessOutcome::TimedOut)
        }
    }
}

/// Cap the address space of the spawned process at `limit_mb` megabytes.
///
/// Only suitable for runtimes that do not reserve large virtual ranges up
/// front; the JVM and V8 fail to start under a tight RLIMIT_AS.
#[cfg(unix)]
pub fn limit_address_space(cmd: &mut Command, limit_mb: u64) {
    let bytes = limit_mb.saturating_mul(1024 * 1024) as libc::rlim_t;
    // SAFETY: the hook runs between fork and exec and only calls setrlimit,
    // which is async-signal-safe.
    unsafe {
        cmd.pre_exec(move || {
            let limit = libc::rlimit {
                rlim_cur: bytes,
                rlim_max: bytes,
            };
            if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub fn limit_address_space(_cmd: &mut Command, _limit_mb: u64) {}

/// SIGKILL every process in the group led by `leader`.
#[cfg(unix)]
fn kill_group(leader: Option<u32>) {
    let Some(pgid) = leader.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group is already gone
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid = pgid, error = %err, "Failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: Option<u32>) {}

async fn read_capped<R>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        if n > room {
            kept.extend_from_slice(&buf[..room]);
            truncated = true;
        } else {
            kept.extend_from_slice(&buf[..n]);
        }
    }

    Ok((kept, truncated))
}

async fn join_stream(task: JoinHandle<std::io::Result<(Vec<u8>, bool)>>) -> Result<String> {
    let (bytes, truncated) = task
        .await
        .map_err(|e| RunletError::Process(format!("Output reader failed: {}", e)))??;

    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    Ok(text)
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    fn exited(outcome: ProcessOutcome) -> ProcessOutput {
        match outcome {
            ProcessOutcome::Exited(output) => output,
            ProcessOutcome::TimedOut => panic!("unexpected timeout"),
        }
    }

    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let outcome = run_bounded(
            sh("echo out; echo err >&2; exit 3"),
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap();

        let output = exited(outcome);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.exit_code, 3);
    }

    #[tokio::test]
    async fn test_deadline_kills_the_process() {
        let started = Instant::now();
        let outcome = run_bounded(
            sh("echo early; sleep 10"),
            Duration::from_millis(300),
            1024,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, ProcessOutcome::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let outcome = run_bounded(
            sh("i=0; while [ $i -lt 200 ]; do echo 0123456789; i=$((i+1)); done"),
            Duration::from_secs(5),
            100,
        )
        .await
        .unwrap();

        let output = exited(outcome);
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.ends_with(TRUNCATION_MARKER));
        assert_eq!(output.stdout.len(), 100 + TRUNCATION_MARKER.len());
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let cmd = Command::new("runlet-definitely-missing-binary");
        let err = run_bounded(cmd, Duration::from_secs(1), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, RunletError::Process(_)));
        assert!(err.to_string().contains("runlet-definitely-missing-binary"));
    }

    /// Live (not zombie) process with this pid.
    #[cfg(target_os = "linux")]
    fn is_running(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    async fn wait_until_gone(pid: u32) -> bool {
        for _ in 0..40 {
            if !is_running(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_deadline_kills_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = sh("sleep 30 & echo $! > bg.pid; sleep 30");
        cmd.current_dir(dir.path());

        let outcome = run_bounded(cmd, Duration::from_millis(500), 1024)
            .await
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::TimedOut));

        let pid: u32 = std::fs::read_to_string(dir.path().join("bg.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(wait_until_gone(pid).await, "background pid {} survived", pid);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_exit_is_not_held_open_by_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = sh("sleep 30 & echo $! > bg.pid; echo done");
        cmd.current_dir(dir.path());

        let started = Instant::now();
        let outcome = run_bounded(cmd, Duration::from_secs(10), 1024)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        let output = exited(outcome);
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "done\n");

        let pid: u32 = std::fs::read_to_string(dir.path().join("bg.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(wait_until_gone(pid).await, "background pid {} survived", pid);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_death_maps_to_128_plus_signal() {
        let outcome = run_bounded(sh("kill -9 $$"), Duration::from_secs(5), 1024)
            .await
            .unwrap();
        assert_eq!(exited(outcome).exit_code, 137);
    }
}
