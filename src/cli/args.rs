use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::loader::ConfigOverrides;
use crate::model::Language;

#[derive(Parser, Debug)]
#[clap(name = "runlet")]
#[clap(version, about = "Queue-driven worker for untrusted code submissions")]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(flatten)]
    pub global_opts: GlobalOpts,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalOpts {
    /// Configuration file path
    #[clap(short, long, global = true, env = "RUNLET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[clap(long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume the execution queue and publish results
    Worker(WorkerArgs),

    /// Run one submission locally and print the result
    Exec(ExecArgs),

    /// Enqueue a submission (optionally waiting for its result)
    Submit(SubmitArgs),

    /// Initialize a new runlet configuration
    Init(InitArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

// ============================================================================
// Worker Commands
// ============================================================================

/// Settings that may come from the environment instead of the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Redis URL of the execution queue
    #[clap(long, env = "EXECUTION_QUEUE_URL")]
    pub queue_url: Option<String>,

    /// Queue name
    #[clap(long, env = "EXECUTION_QUEUE_NAME")]
    pub queue_name: Option<String>,

    /// Region/locality of the queue
    #[clap(long, env = "QUEUE_REGION")]
    pub region: Option<String>,

    /// Redis URL of the result cache
    #[clap(long, env = "RESULT_CACHE_URL")]
    pub cache_url: Option<String>,

    /// Wall-clock limit per compile/run step, in seconds
    #[clap(long, env = "EXECUTION_TIMEOUT_SECS")]
    pub timeout: Option<u64>,

    /// Memory ceiling in MB
    #[clap(long, env = "EXECUTION_MEMORY_LIMIT_MB")]
    pub memory_limit: Option<u64>,

    /// Submissions executed at once within a batch
    #[clap(long, env = "WORKER_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,
}

impl OverrideArgs {
    pub fn into_overrides(self, language: Option<Language>) -> ConfigOverrides {
        ConfigOverrides {
            language,
            queue_url: self.queue_url,
            queue_name: self.queue_name,
            region: self.region,
            cache_url: self.cache_url,
            timeout_secs: self.timeout,
            memory_limit_mb: self.memory_limit,
            max_concurrency: self.max_concurrency,
        }
    }
}

#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Language this worker executes
    #[clap(long, short = 'l', env = "WORKER_LANGUAGE", value_enum)]
    pub language: Option<Language>,

    #[clap(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Language of the submission
    #[clap(long, short = 'l', value_enum)]
    pub language: Language,

    /// Source file ("-" or omitted reads stdin)
    pub file: Option<PathBuf>,

    /// Task id reported in logs
    #[clap(long, default_value = "local")]
    pub task_id: String,

    #[clap(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Language of the submission
    #[clap(long, short = 'l', value_enum)]
    pub language: Language,

    /// Source file ("-" reads stdin)
    pub file: PathBuf,

    /// Task id (generated if omitted)
    #[clap(long)]
    pub task_id: Option<String>,

    /// Seconds to wait for the result (0 = don't wait)
    #[clap(long, default_value = "0")]
    pub wait: u64,

    #[clap(flatten)]
    pub overrides: OverrideArgs,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force overwrite existing configuration
    #[clap(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[clap(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
}

// ============================================================================
// Common Types
// ============================================================================

#[derive(Debug, Clone, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
