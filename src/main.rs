use std::process::ExitCode;

use clap::Parser;

use runlet::cli::args::{Cli, Commands};
use runlet::cli::commands;
use runlet::config::loader::load_config;
use runlet::error::Result;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.global_opts.verbose);

    // Load configuration (file + environment/CLI overrides per command)
    let config = load_config(cli.global_opts.config.as_deref())?;
    let format = cli.global_opts.format.clone();

    // Dispatch to subcommand handler
    let code = match cli.command {
        Commands::Worker(args) => {
            commands::worker(args, config).await?;
            ExitCode::SUCCESS
        }
        Commands::Exec(args) => commands::exec(args, config, format).await?,
        Commands::Submit(args) => commands::submit(args, config, format).await?,
        Commands::Init(args) => {
            commands::init(args).await?;
            ExitCode::SUCCESS
        }
        Commands::Config(args) => {
            commands::config(args, config).await?;
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}

fn init_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
