//! Configuration for unmark.
//!
//! The model mirrors the watcher's moving parts section by section; the
//! loader resolves a file from flags, environment or well-known locations.
//! Command-line overrides are applied by the binary on top of the result.

pub mod error;
pub mod loader;
pub mod models;

pub use error::ConfigLoadError;
pub use loader::{CONFIG_JSON_ENV, CONFIG_PATH_ENV, ConfigLoad, ConfigLoader, ConfigSource};
pub use models::{
    DEFAULT_LOG_FILE, LoggingConfig, NotificationConfig, PathsConfig, TransformConfig,
    UnmarkConfig,
};
