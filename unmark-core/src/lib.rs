//! Core library for unmark.
//!
//! Watches a download folder for clips named `YYYYMMDD_<time>_<anything>.mp4`
//! and hands each finished clip exactly once to an external watermark remover.
//!
//! The pieces, leaf first:
//!
//! * [`classify`] recognises the naming convention and derives output names.
//! * [`stabilize`] waits for a file to stop growing.
//! * [`ledger`] remembers which inputs were dispatched, across restarts.
//! * [`dispatch`] is the single-flight coordinator every candidate goes through.
//! * [`fs_watch`] turns notify events into candidates.
//! * [`sweep`] periodically catches what the events missed.
//! * [`progress`] publishes the running dispatch for outside observers.
//!
//! [`runtime::WatchRuntime`] wires the watcher, the event loop and the sweeper
//! together for long-running use.

pub mod classify;
pub mod dispatch;
pub mod error;
pub mod fs_watch;
pub mod ledger;
pub mod notifier;
pub mod progress;
pub mod runtime;
pub mod stabilize;
pub mod sweep;
pub mod transform;

pub use classify::{CaptureStamp, Classification, FilenameClassifier, RecencyKey};
pub use dispatch::{DispatchCoordinator, DispatchOutcome, NotificationSettings, Reconciliation};
pub use error::{Result, WatchError};
pub use fs_watch::{EventDisposition, EventSourceAdapter, WatchEvent};
pub use ledger::{DEFAULT_LEDGER_FILE, ProcessedLedger, ledger_key};
pub use notifier::{Notification, Notifier, NotifierBackend, notifier_for};
pub use progress::{DEFAULT_PROGRESS_FILE, ProgressReporter, ProgressStatus};
pub use runtime::WatchRuntime;
pub use stabilize::{StabilizationPolicy, StableResult, await_stable};
pub use sweep::{ReconciliationSweeper, SweepReport, SweepSettings};
pub use transform::{CommandTransform, Transform, TransformError};
