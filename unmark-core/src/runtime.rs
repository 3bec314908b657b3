//! Long-running watch mode: notify watcher, event loop and sweeper bound to a
//! single shutdown token.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatch::DispatchCoordinator;
use crate::error::{Result, WatchError};
use crate::fs_watch::{EVENT_CHANNEL_CAPACITY, EventSourceAdapter, init_watcher, run_event_loop};
use crate::stabilize::StabilizationPolicy;
use crate::sweep::{ReconciliationSweeper, SweepSettings};

#[derive(Debug)]
pub struct WatchRuntime {
    root: PathBuf,
    coordinator: Arc<DispatchCoordinator>,
    policy: StabilizationPolicy,
    sweep: SweepSettings,
}

impl WatchRuntime {
    /// Resolve `input_root` once so the watcher, the adapter and the sweeper
    /// all key candidates by the same path form.
    pub fn new(
        input_root: &Path,
        coordinator: Arc<DispatchCoordinator>,
        policy: StabilizationPolicy,
        sweep: SweepSettings,
    ) -> Result<Self> {
        let root = match std::fs::canonicalize(input_root) {
            Ok(root) if root.is_dir() => root,
            _ => return Err(WatchError::MissingRoot(input_root.to_path_buf())),
        };

        Ok(Self {
            root,
            coordinator,
            policy,
            sweep,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Watch until `shutdown` is cancelled. A dispatch already running on the
    /// event loop finishes first; the sweeper is aborted afterwards.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let adapter = Arc::new(EventSourceAdapter::new(
            self.root.clone(),
            Arc::clone(&self.coordinator),
            self.policy,
        )?);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let watch_root = self.root.clone();
        let watcher = tokio::task::spawn_blocking(move || init_watcher(&watch_root, tx))
            .await
            .map_err(|err| WatchError::Watcher(format!("watcher initialization panicked: {err}")))??;

        // A previous run killed mid-dispatch leaves its record behind.
        self.coordinator.progress().clear();

        let sweeper = Arc::new(ReconciliationSweeper::new(
            self.root.clone(),
            Arc::clone(&self.coordinator),
            self.policy,
            self.sweep,
        ));
        let sweep_task = tokio::spawn(sweeper.run(shutdown.child_token()));

        info!(
            root = %self.root.display(),
            output = %self.coordinator.output_root().display(),
            sweep_interval_ms = self.sweep.interval_ms,
            "watching for new videos"
        );

        run_event_loop(adapter, rx, shutdown).await;

        drop(watcher);
        sweep_task.abort();
        if let Err(err) = sweep_task.await
            && !err.is_cancelled()
        {
            warn!(error = %err, "sweeper task ended abnormally");
        }

        info!("watcher stopped");
        Ok(())
    }
}
