//! Locating and parsing the configuration file.
//!
//! Evaluation order:
//! 1) an explicit path (the `--config` flag),
//! 2) `$UNMARK_CONFIG_PATH` (TOML or JSON file),
//! 3) `$UNMARK_CONFIG_JSON` (inline JSON),
//! 4) the first default file found under the search root,
//! 5) built-in defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use unmark_core::FilenameClassifier;

use crate::error::ConfigLoadError;
use crate::models::UnmarkConfig;

pub const CONFIG_PATH_ENV: &str = "UNMARK_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "UNMARK_CONFIG_JSON";

const DEFAULT_CANDIDATES: &[&str] = &["unmark.toml", "unmark.json", "config/unmark.toml"];

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: UnmarkConfig,
    pub source: ConfigSource,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    explicit: Option<PathBuf>,
    search_root: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_explicit_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    /// Directory searched for default config files. The working directory
    /// when unset.
    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = Some(root.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        self.load_with_env(|key| env::var(key).ok())
    }

    /// [`load`](Self::load) with a custom environment lookup.
    pub fn load_with_env<F>(&self, lookup: F) -> Result<ConfigLoad, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let (config, source) = if let Some(path) = &self.explicit {
            (load_from_file(path)?, ConfigSource::Explicit(path.clone()))
        } else if let Some(path) = non_empty(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            (load_from_file(&path)?, ConfigSource::EnvPath(path))
        } else if let Some(raw) = non_empty(CONFIG_JSON_ENV) {
            (parse_json(&raw, CONFIG_JSON_ENV)?, ConfigSource::EnvInline)
        } else if let Some(path) = self.find_default_file() {
            (load_from_file(&path)?, ConfigSource::File(path))
        } else {
            (UnmarkConfig::default(), ConfigSource::Default)
        };

        let config = normalize(config);
        config.validate()?;
        debug!(?source, "configuration loaded");

        Ok(ConfigLoad { config, source })
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        let root = self.search_root.clone().unwrap_or_default();
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| root.join(candidate))
            .find(|path| path.is_file())
    }
}

pub fn load_from_file(path: &Path) -> Result<UnmarkConfig, ConfigLoadError> {
    if !path.exists() {
        return Err(ConfigLoadError::NotFound(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let origin = path.display().to_string();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents, &origin),
        Some("toml") | Some("tml") => parse_toml(&contents, &origin),
        _ => parse_from_str(&contents, &origin),
    }
}

/// Try TOML first, then JSON.
pub fn parse_from_str(contents: &str, origin: &str) -> Result<UnmarkConfig, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Parse {
            origin: origin.to_string(),
            reason: format!("toml error: {toml_err}; json error: {json_err}"),
        })
    })
}

fn parse_toml(contents: &str, origin: &str) -> Result<UnmarkConfig, ConfigLoadError> {
    toml::from_str(contents).map_err(|err| ConfigLoadError::Parse {
        origin: origin.to_string(),
        reason: err.to_string(),
    })
}

fn parse_json(contents: &str, origin: &str) -> Result<UnmarkConfig, ConfigLoadError> {
    serde_json::from_str(contents).map_err(|err| ConfigLoadError::Parse {
        origin: origin.to_string(),
        reason: err.to_string(),
    })
}

fn normalize(mut config: UnmarkConfig) -> UnmarkConfig {
    config.naming = FilenameClassifier::new(
        std::mem::take(&mut config.naming.output_prefix),
        std::mem::take(&mut config.naming.extension),
    );
    config
}
