use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use dialoguer::{Confirm, console::Term};
use tracing::{info, warn};
use unmark_config::UnmarkConfig;
use unmark_core::sweep::{enumerate_matching, rank_newest_first};
use unmark_core::{DispatchOutcome, Reconciliation};

use crate::cli::BatchArgs;
use crate::context::{build_coordinator, require_input_root};
use crate::progress::create_batch_bar;

pub async fn run(config: &UnmarkConfig, args: &BatchArgs) -> Result<ExitCode> {
    let input_root = require_input_root(config)?;
    let coordinator = build_coordinator(config)?;

    let root = input_root.clone();
    let classifier = config.naming.clone();
    let recursive = !args.no_recurse;
    let files = tokio::task::spawn_blocking(move || enumerate_matching(&root, &classifier, recursive))
        .await
        .context("scanning the input folder failed")?;

    let mut pending = Vec::new();
    let mut already_done = 0usize;
    for path in files {
        match coordinator.reconcile(&path).await {
            Ok(state) if state.is_pending() => pending.push(path),
            Ok(Reconciliation::Settled) => already_done += 1,
            Ok(_) => {}
            Err(err) => warn!(path = %path.display(), error = %err, "could not check file"),
        }
    }
    rank_newest_first(&mut pending, coordinator.classifier());

    if pending.is_empty() {
        println!("Nothing to do: {already_done} video(s) already processed.");
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "Found {} unprocessed video(s) in {}:",
        pending.len(),
        input_root.display()
    );
    for path in &pending {
        let output = coordinator
            .output_path_for(path)
            .map(|output| display_name(&output))
            .unwrap_or_default();
        println!("  {} -> {}", display_name(path), output);
    }

    if !args.yes {
        let term = Term::stderr();
        if !term.is_term() {
            println!("Not running interactively; pass --yes to process these videos.");
            return Ok(ExitCode::SUCCESS);
        }
        let confirmed = Confirm::new()
            .with_prompt(format!("Process {} video(s)?", pending.len()))
            .default(true)
            .interact_on(&term)?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let bar = create_batch_bar(pending.len());
    let mut succeeded = 0usize;
    let mut skipped = 0usize;
    let mut failures: Vec<(PathBuf, String)> = Vec::new();

    for path in &pending {
        bar.set_message(display_name(path));
        match coordinator.dispatch(path).await {
            DispatchOutcome::Completed { .. } | DispatchOutcome::AlreadyComplete { .. } => {
                succeeded += 1
            }
            DispatchOutcome::Failed { error } | DispatchOutcome::Aborted { error } => {
                failures.push((path.clone(), error))
            }
            DispatchOutcome::NotMatched | DispatchOutcome::Duplicate => skipped += 1,
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    info!(succeeded, failed = failures.len(), skipped, "batch finished");
    println!(
        "Processed {} video(s): {} succeeded, {} failed.",
        pending.len(),
        succeeded,
        failures.len()
    );
    for (path, error) in &failures {
        println!("  failed: {}: {}", display_name(path), error);
    }

    Ok(if failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
