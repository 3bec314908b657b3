pub mod batch;
pub mod classify;
pub mod doctor;
pub mod status;
pub mod watch;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use unmark_config::UnmarkConfig;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch the input folder and process new videos as they arrive
    Watch(WatchArgs),
    /// Process every unprocessed video in the input folder once
    Batch(BatchArgs),
    /// Print the progress of the running job, or `idle`
    Status(StatusArgs),
    /// Check filenames against the naming pattern
    Classify(ClassifyArgs),
    /// Verify the transform program, folders and ledger
    Doctor(DoctorArgs),
}

impl Command {
    /// Fold command-line flags over the loaded configuration.
    pub fn apply_overrides(&self, config: &mut UnmarkConfig) {
        match self {
            Command::Watch(args) => {
                args.roots.apply(config);
                if let Some(interval) = args.sweep_interval {
                    config.sweep.interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
                }
            }
            Command::Batch(args) => args.roots.apply(config),
            Command::Doctor(args) => args.roots.apply(config),
            Command::Status(args) => {
                if let Some(output) = &args.output {
                    config.paths.output_root = Some(output.clone());
                }
            }
            Command::Classify(_) => {}
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct RootArgs {
    /// Folder receiving downloads
    #[arg(long, short, env = "UNMARK_INPUT_ROOT")]
    pub input: Option<PathBuf>,
    /// Folder receiving processed videos
    #[arg(long, short, env = "UNMARK_OUTPUT_ROOT")]
    pub output: Option<PathBuf>,
    /// Watermark remover executable
    #[arg(long, env = "UNMARK_TRANSFORM_PROGRAM")]
    pub program: Option<String>,
}

impl RootArgs {
    fn apply(&self, config: &mut UnmarkConfig) {
        if let Some(input) = &self.input {
            config.paths.input_root = Some(input.clone());
        }
        if let Some(output) = &self.output {
            config.paths.output_root = Some(output.clone());
        }
        if let Some(program) = &self.program {
            config.transform.program = Some(program.clone());
        }
    }
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub roots: RootArgs,
    /// Time between reconciliation sweeps, e.g. `30s` or `2m`
    #[arg(long, value_parser = humantime::parse_duration)]
    pub sweep_interval: Option<Duration>,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    #[command(flatten)]
    pub roots: RootArgs,
    /// Process without asking for confirmation
    #[arg(long, short)]
    pub yes: bool,
    /// Only look at the top level of the input folder
    #[arg(long)]
    pub no_recurse: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Folder holding the progress record
    #[arg(long, short, env = "UNMARK_OUTPUT_ROOT")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Filenames to check
    #[arg(required = true)]
    pub names: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub roots: RootArgs,
}
