#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;
use unmark_core::transform::ProgressHook;
use unmark_core::{
    DEFAULT_LEDGER_FILE, DispatchCoordinator, FilenameClassifier, Notification, Notifier,
    ProcessedLedger, StabilizationPolicy, Transform, TransformError,
};

/// Copies input to output, optionally failing or pausing on a gate.
#[derive(Default)]
pub struct FakeTransform {
    calls: AtomicUsize,
    inputs: Mutex<Vec<PathBuf>>,
    pub fail_with: Option<String>,
    pub gate: Option<Gate>,
}

#[derive(Clone, Default)]
pub struct Gate {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl FakeTransform {
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn gated(gate: Gate) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<PathBuf> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transform for FakeTransform {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        on_progress: ProgressHook<'_>,
    ) -> Result<(), TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.to_path_buf());

        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }

        on_progress(40);
        if let Some(message) = &self.fail_with {
            return Err(TransformError::Failed(message.clone()));
        }
        std::fs::copy(input, output)?;
        on_progress(100);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) {
        self.seen.lock().unwrap().push(notification.clone());
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub input: PathBuf,
    pub output: PathBuf,
    pub transform: Arc<FakeTransform>,
    pub notifier: Arc<RecordingNotifier>,
    pub coordinator: Arc<DispatchCoordinator>,
}

impl Harness {
    pub fn new(transform: FakeTransform) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("downloads");
        let output = dir.path().join("processed");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(&output).unwrap();
        Self::with_dirs(dir, input, output, transform)
    }

    /// Like [`Harness::new`] but with ledger entries already on disk.
    pub fn with_ledger(transform: FakeTransform, entries: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("downloads");
        let output = dir.path().join("processed");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::create_dir_all(&output).unwrap();

        let contents: String = entries
            .iter()
            .map(|name| format!("{}\n", input.join(name).display()))
            .collect();
        std::fs::write(output.join(DEFAULT_LEDGER_FILE), contents).unwrap();

        Self::with_dirs(dir, input, output, transform)
    }

    fn with_dirs(dir: TempDir, input: PathBuf, output: PathBuf, transform: FakeTransform) -> Self {
        let transform = Arc::new(transform);
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = DispatchCoordinator::new(
            FilenameClassifier::default(),
            &output,
            ProcessedLedger::load(output.join(DEFAULT_LEDGER_FILE)),
            transform.clone(),
            notifier.clone(),
        );

        Self {
            dir,
            input,
            output,
            transform,
            notifier,
            coordinator: Arc::new(coordinator),
        }
    }

    /// Write a clip into the input folder (or a nested path below it).
    pub fn clip(&self, relative: &str) -> PathBuf {
        let path = self.input.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, b"frames").unwrap();
        path
    }

    pub fn ledger_on_disk(&self) -> ProcessedLedger {
        ProcessedLedger::load(self.output.join(DEFAULT_LEDGER_FILE))
    }
}

pub fn quick_policy() -> StabilizationPolicy {
    StabilizationPolicy {
        initial_delay_ms: 1,
        settle_window_ms: 5,
        extra_wait_on_change_ms: 1,
    }
}
