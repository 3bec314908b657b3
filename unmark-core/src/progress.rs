//! Progress record for external observers.
//!
//! While a dispatch runs, the coordinator keeps a small JSON record at a
//! well-known path up to date. Observers (a UI, `unmarkctl status`) poll that
//! file; its absence means the watcher is idle.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::Result;

pub const DEFAULT_PROGRESS_FILE: &str = ".watermark_progress.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStatus {
    pub percent: u8,
    /// Unix timestamp in seconds.
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub is_active: bool,
}

impl ProgressStatus {
    pub fn new(percent: u8, filename: Option<&str>) -> Self {
        let percent = percent.min(100);
        Self {
            percent,
            timestamp: Utc::now().timestamp_millis() as f64 / 1_000.0,
            filename: filename.map(str::to_string),
            is_active: percent > 0 && percent < 100,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProgressReporter {
    path: PathBuf,
}

impl ProgressReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the record. Failures are logged and otherwise ignored.
    pub fn report(&self, percent: u8, filename: Option<&str>) {
        let status = ProgressStatus::new(percent, filename);
        if let Err(err) = self.write(&status) {
            debug!(
                progress_file = %self.path.display(),
                error = %err,
                "could not write progress"
            );
        }
    }

    /// Delete the record, signalling idleness.
    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => debug!(
                progress_file = %self.path.display(),
                error = %err,
                "could not clear progress"
            ),
        }
    }

    /// Current record, or `None` when idle.
    pub fn read(&self) -> Result<Option<ProgressStatus>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, status: &ProgressStatus) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(parent)?;
        serde_json::to_writer(&mut tmp, status)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}
