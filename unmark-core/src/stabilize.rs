//! File size stability detection.
//!
//! A freshly created or moved file may still be written to. The detector
//! samples its size a bounded number of times: after an initial settle delay,
//! again after a settle window, and once more after an extra grace period if
//! the size moved in between. It never polls indefinitely, so a file written
//! slowly over a long period can still be admitted while growing.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Result, WatchError};

/// Wait budget for a single stabilization check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizationPolicy {
    /// Delay before the first size sample, letting the filesystem settle after
    /// the create/move notification.
    pub initial_delay_ms: u64,
    /// Gap between the first and second size samples.
    pub settle_window_ms: u64,
    /// Single extra grace period granted when the size changed.
    pub extra_wait_on_change_ms: u64,
}

impl Default for StabilizationPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2_000,
            settle_window_ms: 1_000,
            extra_wait_on_change_ms: 3_000,
        }
    }
}

impl StabilizationPolicy {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    pub fn extra_wait_on_change(&self) -> Duration {
        Duration::from_millis(self.extra_wait_on_change_ms)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StableResult {
    pub exists: bool,
    pub final_size: Option<u64>,
    /// True when the size moved during the settle window and the extra grace
    /// period was spent.
    pub size_changed: bool,
}

impl StableResult {
    fn vanished() -> Self {
        Self {
            exists: false,
            final_size: None,
            size_changed: false,
        }
    }

    fn present(size: u64, size_changed: bool) -> Self {
        Self {
            exists: true,
            final_size: Some(size),
            size_changed,
        }
    }
}

/// Wait until `path` looks fully written, within the policy's budget.
///
/// A path that disappears (or turns out not to be a regular file) yields
/// `exists = false`; callers treat that as a lost event. Any other metadata
/// error is returned and the candidate should be skipped for now.
pub async fn await_stable(path: &Path, policy: &StabilizationPolicy) -> Result<StableResult> {
    sleep(policy.initial_delay()).await;

    let Some(initial) = read_size(path).await? else {
        debug!(path = %path.display(), "file vanished before the first size sample");
        return Ok(StableResult::vanished());
    };

    sleep(policy.settle_window()).await;

    let Some(current) = read_size(path).await? else {
        return Ok(StableResult::vanished());
    };

    if current == initial {
        debug!(path = %path.display(), size = current, "file size stable");
        return Ok(StableResult::present(current, false));
    }

    warn!(
        path = %path.display(),
        initial,
        current,
        extra_wait_ms = policy.extra_wait_on_change_ms,
        "file still being written, granting one extra wait"
    );
    sleep(policy.extra_wait_on_change()).await;

    match read_size(path).await? {
        Some(final_size) => Ok(StableResult::present(final_size, true)),
        None => Ok(StableResult::vanished()),
    }
}

async fn read_size(path: &Path) -> Result<Option<u64>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Ok(None),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(WatchError::Stabilization {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::io::Write;

    use tempfile::tempdir;

    fn quick() -> StabilizationPolicy {
        StabilizationPolicy {
            initial_delay_ms: 5,
            settle_window_ms: 20,
            extra_wait_on_change_ms: 5,
        }
    }

    #[test]
    fn default_waits_match_download_timing() {
        let policy = StabilizationPolicy::default();
        assert_eq!(policy.initial_delay(), Duration::from_secs(2));
        assert_eq!(policy.settle_window(), Duration::from_secs(1));
        assert_eq!(policy.extra_wait_on_change(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn stable_file_reports_its_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        fs::write(&path, b"0123456789").unwrap();

        let result = await_stable(&path, &quick()).await.unwrap();
        assert!(result.exists);
        assert_eq!(result.final_size, Some(10));
        assert!(!result.size_changed);
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.mp4");

        let result = await_stable(&path, &quick()).await.unwrap();
        assert!(!result.exists);
        assert_eq!(result.final_size, None);
    }

    #[tokio::test]
    async fn directory_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let result = await_stable(dir.path(), &quick()).await.unwrap();
        assert!(!result.exists);
    }

    #[tokio::test]
    async fn growing_file_gets_one_extra_wait() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("growing.mp4");
        fs::write(&path, b"head").unwrap();

        let policy = StabilizationPolicy {
            initial_delay_ms: 0,
            settle_window_ms: 300,
            extra_wait_on_change_ms: 10,
        };

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let mut file = fs::OpenOptions::new()
                .append(true)
                .open(&writer_path)
                .unwrap();
            file.write_all(b"-more-bytes").unwrap();
        });

        let result = await_stable(&path, &policy).await.unwrap();
        writer.await.unwrap();

        assert!(result.exists);
        assert!(result.size_changed);
        assert_eq!(result.final_size, Some(15));
    }
}
