//! Periodic reconciliation of the watched tree against the ledger.
//!
//! Filesystem events get lost: the watcher may start after a download
//! finished, a notify queue may overflow, or the process may die mid-run and
//! leave a ledger entry without an output. Each sweep walks the input root,
//! reopens ledger entries whose output is missing, and dispatches the newest
//! pending clip. The rest wait for later ticks.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::classify::FilenameClassifier;
use crate::dispatch::{DispatchCoordinator, DispatchOutcome, Reconciliation};
use crate::error::{Result, WatchError};
use crate::stabilize::{StabilizationPolicy, await_stable};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub interval_ms: u64,
    /// Run the first sweep as soon as the runtime starts instead of after one
    /// full interval.
    pub run_on_startup: bool,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            run_on_startup: true,
        }
    }
}

impl SweepSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// Matching clips under `root`, in walk order. Unreadable entries are logged
/// and skipped.
pub fn enumerate_matching(
    root: &Path,
    classifier: &FilenameClassifier,
    recursive: bool,
) -> Vec<PathBuf> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            classifier
                .classify_path(path)
                .is_some_and(|classification| classification.matches)
        })
        .collect()
}

/// Order clips by capture stamp, latest first. Ties fall back to the path so
/// the order is stable across runs.
pub fn rank_newest_first(paths: &mut [PathBuf], classifier: &FilenameClassifier) {
    paths.sort_by_cached_key(|path| {
        let key = classifier
            .classify_path(path)
            .and_then(|classification| classification.stamp)
            .map(|stamp| stamp.recency_key());
        (std::cmp::Reverse(key), path.clone())
    });
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub reopened: usize,
    pub pending: usize,
    pub in_flight: usize,
    /// The clip this tick handed to the coordinator, with the outcome.
    pub dispatched: Option<(PathBuf, DispatchOutcome)>,
}

#[derive(Debug)]
pub struct ReconciliationSweeper {
    root: PathBuf,
    coordinator: Arc<DispatchCoordinator>,
    policy: StabilizationPolicy,
    settings: SweepSettings,
}

impl ReconciliationSweeper {
    pub fn new(
        root: impl Into<PathBuf>,
        coordinator: Arc<DispatchCoordinator>,
        policy: StabilizationPolicy,
        settings: SweepSettings,
    ) -> Self {
        Self {
            root: root.into(),
            coordinator,
            policy,
            settings,
        }
    }

    /// One reconciliation pass.
    pub async fn tick(&self) -> Result<SweepReport> {
        if !self.root.is_dir() {
            return Err(WatchError::MissingRoot(self.root.clone()));
        }

        let root = self.root.clone();
        let classifier = self.coordinator.classifier().clone();
        let files = tokio::task::spawn_blocking(move || enumerate_matching(&root, &classifier, true))
            .await
            .map_err(|err| WatchError::Internal(format!("sweep scan failed: {err}")))?;

        let mut report = SweepReport {
            scanned: files.len(),
            ..SweepReport::default()
        };

        let mut candidates = Vec::new();
        for path in files {
            match self.coordinator.reconcile(&path).await {
                Ok(Reconciliation::Reopened) => {
                    report.reopened += 1;
                    candidates.push(path);
                }
                Ok(Reconciliation::Pending) => candidates.push(path),
                Ok(Reconciliation::InFlight) => report.in_flight += 1,
                Ok(Reconciliation::Settled | Reconciliation::Ignored) => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "could not reconcile");
                }
            }
        }
        report.pending = candidates.len();

        rank_newest_first(&mut candidates, self.coordinator.classifier());
        let Some(newest) = candidates.into_iter().next() else {
            debug!(scanned = report.scanned, "sweep found nothing to do");
            return Ok(report);
        };

        info!(
            path = %newest.display(),
            pending = report.pending,
            "sweep picked up unprocessed clip"
        );

        let stable = await_stable(&newest, &self.policy).await?;
        if !stable.exists {
            debug!(path = %newest.display(), "clip vanished before the sweep could dispatch it");
            return Ok(report);
        }

        let outcome = self.coordinator.dispatch(&newest).await;
        report.dispatched = Some((newest, outcome));
        Ok(report)
    }

    /// Tick on a fixed interval until `shutdown` fires. Errors and panics
    /// inside a tick are logged and the loop carries on.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(self.settings.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.settings.run_on_startup {
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match AssertUnwindSafe(self.tick()).catch_unwind().await {
                Ok(Ok(report)) => {
                    if let Some((path, outcome)) = &report.dispatched {
                        info!(path = %path.display(), %outcome, "sweep dispatch finished");
                    }
                }
                Ok(Err(err)) => warn!(error = %err, "sweep failed"),
                Err(_) => error!("sweep tick panicked"),
            }
        }

        debug!("sweeper stopped");
    }
}
