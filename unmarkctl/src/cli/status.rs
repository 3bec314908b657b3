use std::process::ExitCode;

use anyhow::Result;
use unmark_config::UnmarkConfig;
use unmark_core::ProgressReporter;

pub fn run(config: &UnmarkConfig) -> Result<ExitCode> {
    let reporter = ProgressReporter::new(config.progress_path()?);
    match reporter.read()? {
        Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
        None => println!("idle"),
    }
    Ok(ExitCode::SUCCESS)
}
