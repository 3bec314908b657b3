use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ledger write failed for {path}: {source}")]
    Ledger {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read size of {path}: {source}")]
    Stabilization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not check output artifact {path}: {source}")]
    OutputCheck {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("watched root does not exist or is not a directory: {0}")]
    MissingRoot(PathBuf),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, WatchError>;
