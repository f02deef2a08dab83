use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::cli::args::{
    ConfigAction, ConfigArgs, ExecArgs, InitArgs, OutputFormat, SubmitArgs, WorkerArgs,
};
use crate::config::loader::{apply_overrides, get_config_path};
use crate::config::types::RunletConfig;
use crate::error::{Result, RunletError};
use crate::model::{ExecutionRequest, ExecutionResult};
use crate::queue::RedisWorkQueue;
use crate::results::{RedisResultStore, ResultPublisher};
use crate::sandbox::{runtime_status, SandboxExecutor};
use crate::worker::{shutdown_on_signal, Worker, WorkerSettings};

/// Interval between result polls in `submit --wait`
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ============================================================================
// Worker Commands
// ============================================================================

/// Run the queue consumer loop until shutdown
pub async fn worker(args: WorkerArgs, mut config: RunletConfig) -> Result<()> {
    apply_overrides(&mut config, args.overrides.into_overrides(args.language));
    config.validate()?;

    let executor = SandboxExecutor::from_config(&config)?;
    for binary in runtime_status(executor.runner()) {
        match binary.resolved {
            Some(path) => info!(binary = %binary.name.display(), path = %path.display(), "Found runtime"),
            None => warn!(
                binary = %binary.name.display(),
                "Runtime not found on PATH; submissions will fail at setup"
            ),
        }
    }

    let queue = RedisWorkQueue::connect(&config.queue).await?;
    let store = RedisResultStore::connect(&config.cache.url).await?;
    let publisher = ResultPublisher::from_config(Arc::new(store), &config.cache);

    let worker = Worker::new(
        Arc::new(queue),
        publisher,
        Arc::new(executor),
        WorkerSettings::from(&config.worker),
    );

    worker.run(shutdown_on_signal()).await
}

/// Run one submission locally, without queue or cache
pub async fn exec(
    args: ExecArgs,
    mut config: RunletConfig,
    format: OutputFormat,
) -> Result<ExitCode> {
    apply_overrides(&mut config, args.overrides.into_overrides(Some(args.language)));

    let code = read_source(args.file.as_deref()).await?;
    let executor = SandboxExecutor::from_config(&config)?;

    let request = ExecutionRequest {
        task_id: args.task_id,
        code,
        language: args.language.to_string(),
    };
    let result = executor.execute(&request).await;

    output_result(&result, format)
}

/// Enqueue a submission, optionally waiting for its result
pub async fn submit(
    args: SubmitArgs,
    mut config: RunletConfig,
    format: OutputFormat,
) -> Result<ExitCode> {
    apply_overrides(&mut config, args.overrides.into_overrides(None));

    let code = read_source(Some(args.file.as_path())).await?;
    let task_id = args
        .task_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let body = serde_json::json!({
        "task_id": task_id,
        "code": code,
        "language": args.language.to_string(),
    });

    let queue = RedisWorkQueue::connect(&config.queue).await?;
    let message_id = queue.send(&body.to_string()).await?;
    info!(task_id = %task_id, message_id = %message_id, "Submitted");

    if args.wait == 0 {
        match format {
            OutputFormat::Text => println!("{}", task_id),
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({ "task_id": task_id, "message_id": message_id })
            ),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let store = RedisResultStore::connect(&config.cache.url).await?;
    let publisher = ResultPublisher::from_config(Arc::new(store), &config.cache);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.wait);

    loop {
        if let Some(result) = publisher.fetch(&task_id).await? {
            return output_result(&result, format);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(RunletError::Other(anyhow::anyhow!(
                "No result for task {} after {}s",
                task_id,
                args.wait
            )));
        }
        tokio::time::sleep(RESULT_POLL_INTERVAL).await;
    }
}

// ============================================================================
// Config Commands
// ============================================================================

pub async fn init(args: InitArgs) -> Result<()> {
    let config_path = get_config_path();

    if config_path.exists() && !args.force {
        println!("Configuration already exists at: {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    // Create parent directories if needed
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Write default configuration
    let default_config = RunletConfig::default();
    let toml_str =
        toml::to_string_pretty(&default_config).map_err(|e| RunletError::Config(e.to_string()))?;

    std::fs::write(&config_path, toml_str)?;

    println!("Created configuration at: {}", config_path.display());
    println!("\nQuick start:");
    println!("  # Run a file locally");
    println!("  runlet exec --language python hello.py");
    println!();
    println!("  # Start a worker against a queue");
    println!("  EXECUTION_QUEUE_URL=redis://127.0.0.1:6379 runlet worker --language python");
    println!();
    println!("  # Submit to the queue and wait for the result");
    println!("  runlet submit --language python --wait 30 hello.py");

    Ok(())
}

pub async fn config(args: ConfigArgs, config: RunletConfig) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let toml_str =
                toml::to_string_pretty(&config).map_err(|e| RunletError::Config(e.to_string()))?;
            println!("{}", toml_str);
        }
        ConfigAction::Path => {
            println!("{}", get_config_path().display());
        }
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

async fn read_source(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => Ok(tokio::fs::read_to_string(path).await?),
        _ => {
            let mut code = String::new();
            tokio::io::stdin().read_to_string(&mut code).await?;
            Ok(code)
        }
    }
}

fn output_result(result: &ExecutionResult, format: OutputFormat) -> Result<ExitCode> {
    match format {
        OutputFormat::Text => {
            if let Some(output) = &result.output {
                print!("{}", output);
            }
            if let Some(errors) = &result.errors {
                eprint!("{}", errors);
                if !errors.ends_with('\n') {
                    eprintln!();
                }
            }
            eprintln!(
                "[{}] stage={} exit_code={} time={:.2}s",
                if result.success { "ok" } else { "failed" },
                result.stage,
                result
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                result.execution_time
            );
            // Exit with the program's exit code
            Ok(ExitCode::from(process_exit_code(result)))
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Status for the CLI process: 0 on success, else the program's code when it
/// fits a process status, else 1.
fn process_exit_code(result: &ExecutionResult) -> u8 {
    if result.success {
        return 0;
    }
    result
        .exit_code
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}
