use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, warn};
use unmark_config::ConfigLoader;

mod cli;
mod context;
mod logging;
mod progress;

use cli::Command;

#[derive(Parser)]
#[command(
    name = "unmarkctl",
    version,
    about = "Watch a download folder and strip watermarks from new videos"
)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Loaded before parsing so clap's `env` fallbacks see values from `.env`.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut load = match ConfigLoader::new()
        .with_explicit_path(cli.config.clone())
        .load()
    {
        Ok(load) => load,
        Err(err) => {
            let _guard = logging::init(None);
            error!(error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    cli.command.apply_overrides(&mut load.config);

    let log_file = match &cli.command {
        Command::Watch(_) => load
            .config
            .log_directory()
            .map(|dir| logging::LogFile::new(dir, &load.config.logging.file_name)),
        _ => None,
    };
    let _guard = logging::init(log_file);

    if let Err(err) = dotenv
        && !err.not_found()
    {
        warn!(error = %err, "could not read .env file");
    }
    debug!(source = ?load.source, "configuration resolved");

    let result = match cli.command {
        Command::Watch(_) => cli::watch::run(&load.config).await,
        Command::Batch(args) => cli::batch::run(&load.config, &args).await,
        Command::Status(_) => cli::status::run(&load.config),
        Command::Classify(args) => cli::classify::run(&load.config, &args),
        Command::Doctor(_) => cli::doctor::run(&load.config),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
