//! Builds core components from a resolved configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use unmark_config::UnmarkConfig;
use unmark_core::{DispatchCoordinator, ProcessedLedger, ProgressReporter, notifier_for};

/// The input folder, which must already exist. Resolved the same way the
/// watch runtime resolves it so both commands write identical ledger keys.
pub fn require_input_root(config: &UnmarkConfig) -> Result<PathBuf> {
    let root = config.input_root()?;
    if !root.is_dir() {
        bail!("input directory {} does not exist", root.display());
    }
    std::fs::canonicalize(root)
        .with_context(|| format!("failed to resolve input directory {}", root.display()))
}

/// Coordinator wired to the configured transform, notifier and state files.
/// Creates the output folder when missing.
pub fn build_coordinator(config: &UnmarkConfig) -> Result<Arc<DispatchCoordinator>> {
    let output_root = config.output_root()?;
    std::fs::create_dir_all(output_root)
        .with_context(|| format!("failed to create output directory {}", output_root.display()))?;

    let transform = config.transform.build()?;
    let ledger = ProcessedLedger::load(config.ledger_path()?);
    let notifier = notifier_for(config.notifications.backend);

    let coordinator = DispatchCoordinator::new(
        config.naming.clone(),
        output_root,
        ledger,
        Arc::new(transform),
        notifier,
    )
    .with_progress(ProgressReporter::new(config.progress_path()?))
    .with_notifications(config.notifications.settings());

    Ok(Arc::new(coordinator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn input_root_resolves_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("downloads");
        std::fs::create_dir_all(&real).unwrap();
        let link = dir.path().join("linked");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let mut config = UnmarkConfig::default();
        config.paths.input_root = Some(link);

        assert_eq!(
            require_input_root(&config).unwrap(),
            std::fs::canonicalize(&real).unwrap()
        );
    }

    #[test]
    fn missing_input_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = UnmarkConfig::default();
        config.paths.input_root = Some(dir.path().join("nowhere"));

        let err = require_input_root(&config).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
