//! Subscriber setup: console on stderr, plus an optional daily-rotated file.

use std::path::PathBuf;

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone)]
pub struct LogFile {
    pub directory: PathBuf,
    pub file_name: String,
}

impl LogFile {
    pub fn new(directory: PathBuf, file_name: &str) -> Self {
        Self {
            directory,
            file_name: file_name.to_string(),
        }
    }
}

/// Install the global subscriber. The returned guard flushes the file writer
/// on drop and must live until the process exits.
pub fn init(file: Option<LogFile>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let mut open_error = None;
    let mut guard = None;
    let file_layer = file.and_then(|file| {
        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(&file.file_name)
            .build(&file.directory)
        {
            Ok(appender) => {
                let (writer, worker) = tracing_appender::non_blocking(appender);
                guard = Some(worker);
                Some(fmt::layer().with_ansi(false).with_writer(writer))
            }
            Err(err) => {
                open_error = Some((file.directory, err));
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some((directory, err)) = open_error {
        warn!(
            directory = %directory.display(),
            error = %err,
            "could not open log file, logging to the console only"
        );
    }

    guard
}
