//! Durable record of dispatched inputs.
//!
//! The ledger is an in-memory set mirrored to a plain text file with one path
//! per line. Additions append a line; removals rewrite the whole file without
//! the removed path, going through a temp file and a rename so a crash never
//! leaves a half-written log behind.
//!
//! Membership means "completed or in flight": a path in the ledger is never
//! dispatched again until something removes it.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Result, WatchError};

pub const DEFAULT_LEDGER_FILE: &str = ".processed_files.txt";

/// Ledger key for a path. Keys are opaque strings; callers must use the same
/// path form (absolute, un-canonicalized) for the same file.
pub fn ledger_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[derive(Debug)]
pub struct ProcessedLedger {
    path: PathBuf,
    entries: HashSet<String>,
}

impl ProcessedLedger {
    /// Load the ledger from `path`. A missing file yields an empty ledger; an
    /// unreadable one is logged and also starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => parse_entries(&String::from_utf8_lossy(&bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(ledger = %path.display(), "no ledger yet, starting empty");
                HashSet::new()
            }
            Err(err) => {
                warn!(
                    ledger = %path.display(),
                    error = %err,
                    "failed to load processed files ledger, starting empty"
                );
                HashSet::new()
            }
        };

        info!(
            ledger = %path.display(),
            entries = entries.len(),
            "loaded processed files ledger"
        );

        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record `key`. Returns `false` when it was already present (nothing is
    /// appended). If the append fails the in-memory insert is undone so memory
    /// and disk stay in agreement.
    pub fn add(&mut self, key: &str) -> Result<bool> {
        if !self.entries.insert(key.to_string()) {
            return Ok(false);
        }

        if let Err(source) = self.append_line(key) {
            self.entries.remove(key);
            return Err(WatchError::Ledger {
                path: self.path.clone(),
                source,
            });
        }

        Ok(true)
    }

    /// Forget `key`. Returns `false` when it was not present in memory. The
    /// memory set is updated first; if the rewrite fails the key stays
    /// forgotten for this run and the error is returned for logging.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let was_present = self.entries.remove(key);

        self.rewrite_without(key).map_err(|source| WatchError::Ledger {
            path: self.path.clone(),
            source,
        })?;

        Ok(was_present)
    }

    fn append_line(&self, key: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format!("{key}\n").as_bytes())?;
        file.flush()
    }

    fn rewrite_without(&self, key: &str) -> std::io::Result<()> {
        let existing = match fs::read(&self.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };

        let kept: String = existing
            .lines()
            .filter(|line| line.trim() != key)
            .map(|line| format!("{line}\n"))
            .collect();

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(kept.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

fn parse_entries(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
