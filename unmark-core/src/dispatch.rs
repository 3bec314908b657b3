//! Single entry point for "process this file".
//!
//! Every candidate, whether it came from a filesystem event, a reconciliation
//! sweep or the batch command, goes through [`DispatchCoordinator::dispatch`].
//! A dispatch moves through `Idle -> Admitted -> Running -> Completed|Failed`.
//!
//! Two locks guard the coordinator:
//!
//! * the ledger state lock makes admission atomic. Classification, the
//!   duplicate check, the output check and the ledger write all happen while
//!   it is held, and an admitted path is marked in flight before it is
//!   released.
//! * the flight lock serializes transform runs, so at most one transform is
//!   running no matter how many callers are waiting. The output is checked
//!   again once it is held, since inputs sharing a capture stamp share an
//!   output artifact.

use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::classify::FilenameClassifier;
use crate::error::{Result, WatchError};
use crate::ledger::{ProcessedLedger, ledger_key};
use crate::notifier::{DEFAULT_SUMMARY_LIMIT, DEFAULT_TITLE, Notification, Notifier, truncate_summary};
use crate::progress::{DEFAULT_PROGRESS_FILE, ProgressReporter};
use crate::transform::{Transform, TransformError};

/// What a single [`DispatchCoordinator::dispatch`] call did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The filename does not follow the naming convention.
    NotMatched,
    /// Already processed, or currently admitted by another caller.
    Duplicate,
    /// The output artifact already exists. `healed` is true when the ledger
    /// was missing the entry and it was added.
    AlreadyComplete { healed: bool },
    /// The transform ran and produced `output`.
    Completed { output: PathBuf },
    /// The transform ran and failed; the ledger entry was rolled back.
    Failed { error: String },
    /// Admission hit an I/O error; nothing ran and the ledger is unchanged.
    Aborted { error: String },
}

impl DispatchOutcome {
    pub fn ran_transform(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotMatched => f.write_str("not matched"),
            Self::Duplicate => f.write_str("duplicate"),
            Self::AlreadyComplete { healed: true } => f.write_str("already complete (ledger healed)"),
            Self::AlreadyComplete { healed: false } => f.write_str("already complete"),
            Self::Completed { output } => write!(f, "completed: {}", output.display()),
            Self::Failed { error } => write!(f, "failed: {error}"),
            Self::Aborted { error } => write!(f, "aborted: {error}"),
        }
    }
}

/// Result of comparing one input against the ledger and its output artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    /// Not a candidate at all.
    Ignored,
    /// Admitted or running right now; left alone.
    InFlight,
    /// The output exists; nothing to do.
    Settled,
    /// The ledger claimed the input was processed but the output is missing.
    /// The entry was removed and the input is pending again.
    Reopened,
    /// Never processed and no output.
    Pending,
}

impl Reconciliation {
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Reopened | Self::Pending)
    }
}

/// Notification wording knobs.
#[derive(Clone, Debug)]
pub struct NotificationSettings {
    pub title: String,
    pub summary_limit: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }
}

#[derive(Debug)]
struct LedgerState {
    ledger: ProcessedLedger,
    in_flight: HashSet<String>,
}

struct Admitted {
    key: String,
    name: String,
    output: PathBuf,
}

enum Admission {
    Admitted(Admitted),
    Settled(DispatchOutcome),
}

pub struct DispatchCoordinator {
    classifier: FilenameClassifier,
    output_root: PathBuf,
    state: Mutex<LedgerState>,
    flight: Mutex<()>,
    progress: ProgressReporter,
    transform: Arc<dyn Transform>,
    notifier: Arc<dyn Notifier>,
    notifications: NotificationSettings,
}

impl fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("DispatchCoordinator");
        debug
            .field("classifier", &self.classifier)
            .field("output_root", &self.output_root)
            .field("progress", &self.progress.path());

        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("ledger_entries", &state.ledger.len())
                    .field("in_flight", &state.in_flight.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }

        debug.finish()
    }
}

impl DispatchCoordinator {
    /// Build a coordinator writing outputs under `output_root`. Progress goes
    /// to the default record inside the output root until overridden with
    /// [`with_progress`](Self::with_progress).
    pub fn new(
        classifier: FilenameClassifier,
        output_root: impl Into<PathBuf>,
        ledger: ProcessedLedger,
        transform: Arc<dyn Transform>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let output_root = output_root.into();
        let progress = ProgressReporter::new(output_root.join(DEFAULT_PROGRESS_FILE));
        Self {
            classifier,
            output_root,
            state: Mutex::new(LedgerState {
                ledger,
                in_flight: HashSet::new(),
            }),
            flight: Mutex::new(()),
            progress,
            transform,
            notifier,
            notifications: NotificationSettings::default(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationSettings) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn classifier(&self) -> &FilenameClassifier {
        &self.classifier
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    /// Output artifact path for `input`, or `None` when the name does not
    /// match the convention.
    pub fn output_path_for(&self, input: &Path) -> Option<PathBuf> {
        self.classifier
            .classify_path(input)
            .filter(|classification| classification.matches)
            .map(|classification| self.output_root.join(classification.output_name))
    }

    /// Whether `input` is recorded in the ledger or currently in flight.
    pub async fn is_known(&self, input: &Path) -> bool {
        let key = candidate_key(input);
        let state = self.state.lock().await;
        state.in_flight.contains(&key) || state.ledger.contains(&key)
    }

    pub async fn processed_count(&self) -> usize {
        self.state.lock().await.ledger.len()
    }

    /// Announce that watching has begun.
    pub async fn notify_watch_started(&self, watched: &Path) {
        let dir_name = watched
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| watched.display().to_string());
        self.notify(
            "Watcher started successfully",
            format!("Monitoring: {dir_name}"),
        )
        .await;
    }

    /// Process `input` at most once.
    pub async fn dispatch(&self, input: &Path) -> DispatchOutcome {
        let file = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let span = info_span!("dispatch", file = %file);
        self.dispatch_inner(input).instrument(span).await
    }

    async fn dispatch_inner(&self, input: &Path) -> DispatchOutcome {
        let admitted = match self.admit(input).await {
            Ok(Admission::Admitted(admitted)) => admitted,
            Ok(Admission::Settled(outcome)) => return outcome,
            Err(err) => {
                warn!(path = %input.display(), error = %err, "candidate aborted");
                return DispatchOutcome::Aborted {
                    error: err.to_string(),
                };
            }
        };

        let _flight = self.flight.lock().await;

        // Another input mapping to the same output may have finished while
        // this one was queued behind it.
        match output_exists(&admitted.output).await {
            Ok(false) => self.run(input, admitted).await,
            Ok(true) => {
                self.state.lock().await.in_flight.remove(&admitted.key);
                info!(
                    output = %admitted.output.display(),
                    "output appeared while queued, skipping"
                );
                DispatchOutcome::AlreadyComplete { healed: false }
            }
            Err(err) => {
                let mut state = self.state.lock().await;
                if let Err(ledger_err) = state.ledger.remove(&admitted.key) {
                    warn!(error = %ledger_err, "could not roll back ledger entry on disk");
                }
                state.in_flight.remove(&admitted.key);
                warn!(path = %input.display(), error = %err, "candidate aborted");
                DispatchOutcome::Aborted {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn admit(&self, input: &Path) -> Result<Admission> {
        let Some(classification) = self
            .classifier
            .classify_path(input)
            .filter(|classification| classification.matches)
        else {
            debug!(path = %input.display(), "filename does not match, ignoring");
            return Ok(Admission::Settled(DispatchOutcome::NotMatched));
        };

        let key = candidate_key(input);
        let output = self.output_root.join(&classification.output_name);

        let mut state = self.state.lock().await;
        if state.in_flight.contains(&key) || state.ledger.contains(&key) {
            debug!(path = %input.display(), "already processed or in flight");
            return Ok(Admission::Settled(DispatchOutcome::Duplicate));
        }

        if output_exists(&output).await? {
            let healed = state.ledger.add(&key)?;
            info!(
                path = %input.display(),
                output = %output.display(),
                healed,
                "output already exists, skipping"
            );
            return Ok(Admission::Settled(DispatchOutcome::AlreadyComplete { healed }));
        }

        state.ledger.add(&key)?;
        state.in_flight.insert(key.clone());

        Ok(Admission::Admitted(Admitted {
            key,
            name: input
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            output,
        }))
    }

    async fn run(&self, input: &Path, admitted: Admitted) -> DispatchOutcome {
        let Admitted { key, name, output } = admitted;
        info!(output = %output.display(), "processing");

        self.progress.report(1, Some(&name));
        self.notify(
            format!("New video detected: {name}"),
            "Starting watermark removal...",
        )
        .await;

        let progress = &self.progress;
        let progress_name = name.as_str();
        let hook = move |percent: u8| progress.report(percent.max(1), Some(progress_name));

        let result = AssertUnwindSafe(self.transform.run(input, &output, &hook))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(TransformError::Failed("transform panicked".to_string())));

        self.progress.clear();

        let mut state = self.state.lock().await;
        match result {
            Ok(()) => {
                state.in_flight.remove(&key);
                drop(state);

                info!(output = %output.display(), "processing complete");
                let output_name = output
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.notify(
                    format!("Watermark removed: {output_name}"),
                    "Processing complete",
                )
                .await;

                DispatchOutcome::Completed { output }
            }
            Err(err) => {
                if let Err(ledger_err) = state.ledger.remove(&key) {
                    warn!(error = %ledger_err, "could not roll back ledger entry on disk");
                }
                state.in_flight.remove(&key);
                drop(state);

                let error = err.to_string();
                warn!(error = %error, "processing failed");
                self.notify(
                    format!("Error processing: {name}"),
                    truncate_summary(&error, self.notifications.summary_limit),
                )
                .await;

                DispatchOutcome::Failed { error }
            }
        }
    }

    /// Compare `input` with the ledger and its output artifact. A ledger entry
    /// whose output is missing is removed so the input becomes eligible again;
    /// inputs in flight are never touched.
    pub async fn reconcile(&self, input: &Path) -> Result<Reconciliation> {
        let Some(output) = self.output_path_for(input) else {
            return Ok(Reconciliation::Ignored);
        };
        let key = candidate_key(input);

        let mut state = self.state.lock().await;
        if state.in_flight.contains(&key) {
            return Ok(Reconciliation::InFlight);
        }

        if output_exists(&output).await? {
            return Ok(Reconciliation::Settled);
        }

        if !state.ledger.contains(&key) {
            return Ok(Reconciliation::Pending);
        }

        info!(
            path = %input.display(),
            output = %output.display(),
            "ledger entry has no output, reopening"
        );
        if let Err(err) = state.ledger.remove(&key) {
            warn!(path = %input.display(), error = %err, "could not rewrite ledger");
        }
        Ok(Reconciliation::Reopened)
    }

    async fn notify(&self, message: impl Into<String>, subtitle: impl Into<String>) {
        let notification =
            Notification::new(self.notifications.title.clone(), message).with_subtitle(subtitle);
        self.notifier.notify(&notification).await;
    }
}

/// Ledger key for a candidate: the absolute, un-canonicalized path.
fn candidate_key(input: &Path) -> String {
    match std::path::absolute(input) {
        Ok(absolute) => ledger_key(&absolute),
        Err(_) => ledger_key(input),
    }
}

async fn output_exists(output: &Path) -> Result<bool> {
    tokio::fs::try_exists(output)
        .await
        .map_err(|source| WatchError::OutputCheck {
            path: output.to_path_buf(),
            source,
        })
}
