use std::process::ExitCode;

use anyhow::Result;
use unmark_config::UnmarkConfig;

use crate::cli::ClassifyArgs;

pub fn run(config: &UnmarkConfig, args: &ClassifyArgs) -> Result<ExitCode> {
    for name in &args.names {
        let classification = config.naming.classify(name);
        match (&classification.stamp, classification.matches) {
            (Some(stamp), true) => println!(
                "{name}: match -> {} (recency {})",
                classification.output_name,
                stamp.recency_key()
            ),
            _ => println!("{name}: no match"),
        }
    }
    Ok(ExitCode::SUCCESS)
}
