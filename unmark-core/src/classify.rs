//! Filename recognition for downloaded clips.
//!
//! Downloads are named `YYYYMMDD_<time>_<anything>.<ext>`. The classifier
//! recognises that shape and derives the canonical output name
//! `<prefix>YYYYMMDD_<time>.<ext>`, dropping the arbitrary suffix so the same
//! clip always maps to the same output artifact.

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Prefix-anchored capture of the date and time tokens. ASCII digits only.
static STAMP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{8})_([0-9]+)_").expect("stamp pattern is valid"));

pub const DEFAULT_OUTPUT_PREFIX: &str = "wr_";
pub const DEFAULT_MEDIA_EXTENSION: &str = "mp4";

/// Naming rules shared by every component that needs to decide whether a
/// file is ours and where its output goes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilenameClassifier {
    /// Fixed prefix prepended to every output name.
    pub output_prefix: String,
    /// Media extension (without the dot) accepted as input and used for output.
    pub extension: String,
}

impl Default for FilenameClassifier {
    fn default() -> Self {
        Self {
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            extension: DEFAULT_MEDIA_EXTENSION.to_string(),
        }
    }
}

/// Date and time tokens parsed from the head of a filename.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CaptureStamp {
    pub date: String,
    pub time: String,
}

impl CaptureStamp {
    /// `YYYYMMDD_<time>`, the part of the name that survives into the output.
    pub fn prefix(&self) -> String {
        format!("{}_{}", self.date, self.time)
    }

    pub fn recency_key(&self) -> RecencyKey {
        RecencyKey::from_digits(&format!("{}{}", self.date, self.time))
    }
}

/// Result of classifying one filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub matches: bool,
    pub output_name: String,
    pub stamp: Option<CaptureStamp>,
}

/// Date and time digits read as a single integer. Compared numerically
/// without parsing, so arbitrarily long time tokens cannot overflow.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecencyKey(String);

impl RecencyKey {
    fn from_digits(digits: &str) -> Self {
        let trimmed = digits.trim_start_matches('0');
        Self(trimmed.to_string())
    }

    pub fn as_str(&self) -> &str {
        if self.0.is_empty() { "0" } else { &self.0 }
    }
}

impl Ord for RecencyKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for RecencyKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RecencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FilenameClassifier {
    pub fn new(output_prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            output_prefix: output_prefix.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// Classify a bare filename (no directory components).
    pub fn classify(&self, name: &str) -> Classification {
        let stamp = parse_stamp(name);
        let matches = stamp.is_some() && self.has_extension(name);

        let output_name = match &stamp {
            Some(stamp) => format!(
                "{}{}.{}",
                self.output_prefix,
                stamp.prefix(),
                self.extension.to_ascii_lowercase()
            ),
            None => format!("{}{}", self.output_prefix, name),
        };

        Classification {
            matches,
            output_name,
            stamp,
        }
    }

    /// Classify the final component of `path`. Paths without a UTF-8 file
    /// name never match.
    pub fn classify_path(&self, path: &Path) -> Option<Classification> {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| self.classify(name))
    }

    /// Case-insensitive media extension check on a path.
    pub fn is_media_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    fn has_extension(&self, name: &str) -> bool {
        self.is_media_file(Path::new(name))
    }
}

fn parse_stamp(name: &str) -> Option<CaptureStamp> {
    let captures = STAMP_PATTERN.captures(name)?;
    Some(CaptureStamp {
        date: captures.get(1)?.as_str().to_string(),
        time: captures.get(2)?.as_str().to_string(),
    })
}
