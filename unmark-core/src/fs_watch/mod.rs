//! Filesystem watch pipeline.
//!
//! A thin wrapper around `notify` that turns raw notifications into
//! [`WatchEvent`]s and feeds qualifying ones, one at a time, through
//! stabilization and into the dispatch coordinator.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, EventKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchCoordinator, DispatchOutcome};
use crate::error::{Result, WatchError};
use crate::stabilize::{StabilizationPolicy, await_stable};

/// Capacity of the channel between the notify thread and the event loop.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Candidate-producing filesystem events. Everything else notify reports is
/// dropped during conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Moved { from: Option<PathBuf>, to: PathBuf },
}

impl WatchEvent {
    /// Path the event leaves a file at.
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(path) => path,
            WatchEvent::Moved { to, .. } => to,
        }
    }
}

/// Map a notify event onto a [`WatchEvent`].
///
/// Renames reported as a single `Both` event carry `[from, to]`; backends that
/// report the halves separately (or cannot tell which half they saw) yield a
/// move without a source. A half that turns out to be the old name is dropped
/// later because the file no longer exists there.
pub fn convert_event(event: &Event) -> Option<WatchEvent> {
    let mut paths = event.paths.iter();
    let first = paths.next()?;

    match event.kind {
        EventKind::Create(CreateKind::Folder) => None,
        EventKind::Create(_) => Some(WatchEvent::Created(first.clone())),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let to = paths.next()?;
            Some(WatchEvent::Moved {
                from: Some(first.clone()),
                to: to.clone(),
            })
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
            Some(WatchEvent::Moved {
                from: None,
                to: first.clone(),
            })
        }
        _ => None,
    }
}

/// What the adapter did with one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventDisposition {
    /// Wrong extension or the name does not match the convention.
    Filtered,
    /// A move whose destination resolves outside the watched root.
    OutsideRoot,
    /// Already in the ledger or in flight; no stabilization wait was spent.
    AlreadyKnown,
    /// The file disappeared while stabilizing.
    Vanished,
    /// Stabilization could not read the file.
    Unreadable { error: String },
    Dispatched(DispatchOutcome),
}

/// Filters events and hands qualifying files to the coordinator.
#[derive(Debug)]
pub struct EventSourceAdapter {
    canonical_root: PathBuf,
    coordinator: Arc<DispatchCoordinator>,
    policy: StabilizationPolicy,
}

impl EventSourceAdapter {
    /// Fails with [`WatchError::MissingRoot`] when `root` is not an existing
    /// directory.
    pub fn new(
        root: impl Into<PathBuf>,
        coordinator: Arc<DispatchCoordinator>,
        policy: StabilizationPolicy,
    ) -> Result<Self> {
        let root = root.into();
        let canonical_root = match std::fs::canonicalize(&root) {
            Ok(path) if path.is_dir() => path,
            _ => return Err(WatchError::MissingRoot(root)),
        };

        Ok(Self {
            canonical_root,
            coordinator,
            policy,
        })
    }

    /// Run one event through filtering, stabilization and dispatch. Returns
    /// only after the dispatch (if any) has finished.
    pub async fn handle(&self, event: WatchEvent) -> EventDisposition {
        let path = event.path();
        let classifier = self.coordinator.classifier();

        if !classifier.is_media_file(path) {
            return EventDisposition::Filtered;
        }
        if !classifier
            .classify_path(path)
            .is_some_and(|classification| classification.matches)
        {
            debug!(path = %path.display(), "media file does not match naming pattern");
            return EventDisposition::Filtered;
        }

        if let WatchEvent::Moved { from, to } = &event
            && !self.contains(to).await
        {
            warn!(
                from = ?from.as_ref().map(|p| p.display().to_string()),
                to = %to.display(),
                root = %self.canonical_root.display(),
                "moved file resolves outside the watched root, ignoring"
            );
            return EventDisposition::OutsideRoot;
        }

        if self.coordinator.is_known(path).await {
            debug!(path = %path.display(), "already processed, skipping");
            return EventDisposition::AlreadyKnown;
        }

        // Unpaired rename halves may carry the old name.
        if let WatchEvent::Moved { from: None, .. } = &event
            && !tokio::fs::try_exists(path).await.unwrap_or(false)
        {
            debug!(path = %path.display(), "rename names a path that no longer exists");
            return EventDisposition::Vanished;
        }

        info!(path = %path.display(), "new video detected, waiting for it to settle");
        match await_stable(path, &self.policy).await {
            Ok(stable) if !stable.exists => {
                debug!(path = %path.display(), "file vanished before processing");
                return EventDisposition::Vanished;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not check file size");
                return EventDisposition::Unreadable {
                    error: err.to_string(),
                };
            }
        }

        EventDisposition::Dispatched(self.coordinator.dispatch(path).await)
    }

    async fn contains(&self, path: &Path) -> bool {
        match resolve_lenient(path).await {
            Some(resolved) => resolved.starts_with(&self.canonical_root),
            None => false,
        }
    }
}

/// Canonicalize `path`, falling back to the canonical parent joined with the
/// file name when the file itself cannot be resolved.
async fn resolve_lenient(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = tokio::fs::canonicalize(path).await {
        return Some(resolved);
    }
    let parent = path.parent()?;
    let name = path.file_name()?;
    let parent = tokio::fs::canonicalize(parent).await.ok()?;
    Some(parent.join(name))
}

/// Message sent from the notify callback thread to the event loop.
pub enum WatchMessage {
    Event(Event),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => {
                let path_count = event.paths.len();
                f.debug_struct("WatchMessage::Event")
                    .field("kind", &event.kind)
                    .field("path_count", &path_count)
                    .finish()
            }
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

/// Start a recursive notify watcher on `root`. Events stop when the returned
/// watcher is dropped.
pub fn init_watcher(
    root: &Path,
    watcher_tx: mpsc::Sender<WatchMessage>,
) -> Result<RecommendedWatcher> {
    let path_clone = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                if let Err(err) = watcher_tx.blocking_send(WatchMessage::Event(event)) {
                    warn!(
                        "fs_watch channel send failed for {}: {}",
                        path_clone.display(),
                        err
                    );
                }
            }
            Err(err) => {
                let msg = err.to_string();
                let _ = watcher_tx.blocking_send(WatchMessage::Error(msg));
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|err| {
        WatchError::Watcher(format!(
            "failed to create watcher for {}: {}",
            root.display(),
            err
        ))
    })?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|err| WatchError::Watcher(format!("failed to watch {}: {}", root.display(), err)))?;

    Ok(watcher)
}

/// Consume watcher messages sequentially until shutdown or until the sender
/// side closes. An event already being handled runs to completion before
/// shutdown is observed.
pub async fn run_event_loop(
    adapter: Arc<EventSourceAdapter>,
    mut rx: mpsc::Receiver<WatchMessage>,
    shutdown: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            msg = rx.recv() => msg,
        };

        let Some(msg) = msg else {
            debug!("watch channel closed");
            break;
        };

        match msg {
            WatchMessage::Event(event) => {
                let Some(event) = convert_event(&event) else {
                    continue;
                };
                let disposition = adapter.handle(event).await;
                debug!(?disposition, "event handled");
            }
            WatchMessage::Error(error) => {
                warn!(error = %error, "filesystem watcher reported an error");
            }
        }
    }

    info!("event loop stopped");
}
