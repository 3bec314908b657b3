use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use unmark_core::dispatch::NotificationSettings;
use unmark_core::notifier::{DEFAULT_SUMMARY_LIMIT, DEFAULT_TITLE};
use unmark_core::transform::{INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};
use unmark_core::{
    CommandTransform, DEFAULT_LEDGER_FILE, DEFAULT_PROGRESS_FILE, FilenameClassifier,
    NotifierBackend, StabilizationPolicy, SweepSettings,
};

use crate::error::ConfigLoadError;

pub const DEFAULT_LOG_FILE: &str = "watcher.log";

/// Everything the watcher and the batch command need to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnmarkConfig {
    pub paths: PathsConfig,
    /// Output prefix and media extension.
    pub naming: FilenameClassifier,
    /// How long to wait for a new file to stop growing.
    pub stabilization: StabilizationPolicy,
    /// Reconciliation sweep cadence.
    pub sweep: SweepSettings,
    pub transform: TransformConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Folder watched for new downloads.
    pub input_root: Option<PathBuf>,
    /// Folder receiving processed clips.
    pub output_root: Option<PathBuf>,
    /// Processed-files ledger. Relative paths resolve against the output root.
    pub ledger_file: PathBuf,
    /// Progress record. Relative paths resolve against the output root.
    pub progress_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_root: None,
            output_root: None,
            ledger_file: PathBuf::from(DEFAULT_LEDGER_FILE),
            progress_file: PathBuf::from(DEFAULT_PROGRESS_FILE),
        }
    }
}

/// External watermark remover invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Program to launch, looked up on `PATH` when not absolute.
    pub program: Option<String>,
    /// Argument templates; `{input}` and `{output}` are substituted per clip.
    pub args: Vec<String>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: vec![INPUT_PLACEHOLDER.to_string(), OUTPUT_PLACEHOLDER.to_string()],
        }
    }
}

impl TransformConfig {
    pub fn build(&self) -> Result<CommandTransform, ConfigLoadError> {
        let program = self
            .program
            .as_deref()
            .map(str::trim)
            .filter(|program| !program.is_empty())
            .ok_or(ConfigLoadError::Missing("transform.program"))?;
        Ok(CommandTransform::new(program, self.args.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub backend: NotifierBackend,
    pub title: String,
    /// Maximum characters of an error message shown in a failure notification.
    pub summary_limit: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            backend: NotifierBackend::default(),
            title: DEFAULT_TITLE.to_string(),
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }
}

impl NotificationConfig {
    pub fn settings(&self) -> NotificationSettings {
        NotificationSettings {
            title: self.title.clone(),
            summary_limit: self.summary_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write a daily-rotated log file while watching.
    pub write_file: bool,
    /// Log directory; the output root when unset.
    pub directory: Option<PathBuf>,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            write_file: true,
            directory: None,
            file_name: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl UnmarkConfig {
    pub fn input_root(&self) -> Result<&Path, ConfigLoadError> {
        self.paths
            .input_root
            .as_deref()
            .ok_or(ConfigLoadError::Missing("paths.input_root"))
    }

    pub fn output_root(&self) -> Result<&Path, ConfigLoadError> {
        self.paths
            .output_root
            .as_deref()
            .ok_or(ConfigLoadError::Missing("paths.output_root"))
    }

    pub fn ledger_path(&self) -> Result<PathBuf, ConfigLoadError> {
        Ok(resolve_against(self.output_root()?, &self.paths.ledger_file))
    }

    pub fn progress_path(&self) -> Result<PathBuf, ConfigLoadError> {
        Ok(resolve_against(self.output_root()?, &self.paths.progress_file))
    }

    /// Directory for the log file, when file logging is enabled and a
    /// location is known.
    pub fn log_directory(&self) -> Option<PathBuf> {
        if !self.logging.write_file {
            return None;
        }
        self.logging
            .directory
            .clone()
            .or_else(|| self.paths.output_root.clone())
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.naming.extension.trim().is_empty() {
            return Err(ConfigLoadError::Invalid {
                field: "naming.extension",
                reason: "must not be empty".to_string(),
            });
        }
        if self.naming.output_prefix.is_empty() {
            // An empty prefix would let outputs overwrite their inputs when
            // both roots are the same folder.
            return Err(ConfigLoadError::Invalid {
                field: "naming.output_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        if self.sweep.interval_ms == 0 {
            return Err(ConfigLoadError::Invalid {
                field: "sweep.interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.notifications.summary_limit == 0 {
            return Err(ConfigLoadError::Invalid {
                field: "notifications.summary_limit",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.logging.file_name.trim().is_empty() {
            return Err(ConfigLoadError::Invalid {
                field: "logging.file_name",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = UnmarkConfig::default();
        assert_eq!(config.naming.output_prefix, "wr_");
        assert_eq!(config.naming.extension, "mp4");
        assert_eq!(config.stabilization.initial_delay_ms, 2_000);
        assert_eq!(config.stabilization.settle_window_ms, 1_000);
        assert_eq!(config.stabilization.extra_wait_on_change_ms, 3_000);
        assert_eq!(config.sweep.interval_ms, 30_000);
        assert!(config.sweep.run_on_startup);
        assert_eq!(config.transform.args, vec!["{input}", "{output}"]);
        assert_eq!(config.notifications.title, "Watermark Remover");
        assert_eq!(config.notifications.summary_limit, 100);
        assert_eq!(config.logging.file_name, "watcher.log");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn relative_state_files_resolve_under_output_root() {
        let mut config = UnmarkConfig::default();
        assert!(matches!(
            config.ledger_path(),
            Err(ConfigLoadError::Missing("paths.output_root"))
        ));

        config.paths.output_root = Some(PathBuf::from("/videos/out"));
        assert_eq!(
            config.ledger_path().unwrap(),
            PathBuf::from("/videos/out/.processed_files.txt")
        );

        config.paths.progress_file = PathBuf::from("/tmp/progress.json");
        assert_eq!(
            config.progress_path().unwrap(),
            PathBuf::from("/tmp/progress.json")
        );
    }

    #[test]
    fn transform_requires_a_program() {
        let mut transform = TransformConfig::default();
        assert!(matches!(
            transform.build(),
            Err(ConfigLoadError::Missing("transform.program"))
        ));

        transform.program = Some("  ".to_string());
        assert!(transform.build().is_err());

        transform.program = Some("sorawm".to_string());
        assert_eq!(transform.build().unwrap().program(), "sorawm");
    }

    #[test]
    fn log_directory_falls_back_to_output_root() {
        let mut config = UnmarkConfig::default();
        assert_eq!(config.log_directory(), None);

        config.paths.output_root = Some(PathBuf::from("/videos/out"));
        assert_eq!(config.log_directory(), Some(PathBuf::from("/videos/out")));

        config.logging.directory = Some(PathBuf::from("/var/log/unmark"));
        assert_eq!(config.log_directory(), Some(PathBuf::from("/var/log/unmark")));

        config.logging.write_file = false;
        assert_eq!(config.log_directory(), None);
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        let mut config = UnmarkConfig::default();
        config.sweep.interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigLoadError::Invalid { field: "sweep.interval_ms", .. })
        ));

        let mut config = UnmarkConfig::default();
        config.naming.output_prefix.clear();
        assert!(config.validate().is_err());
    }
}
