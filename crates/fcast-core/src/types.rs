//! Identification types for tracked inputs, models and result rows.
//!
//! Bar files are named `<symbol>-<timeframe>.csv`. A timeframe tag may itself
//! contain dashes (`60-0`) or even a symbol prefix (`BTCUSDT-60-0`), so the tag
//! is matched as a filename suffix rather than parsed positionally.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extension of every bar and result file.
pub const CSV_EXTENSION: &str = ".csv";

fn has_path_chars(s: &str) -> bool {
    s.chars().any(|c| c == '/' || c == '\\' || c.is_whitespace())
}

/// Timeframe tag used to select input files (e.g. `60`, `60-20`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe(String);

impl Timeframe {
    pub fn new(tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        if tag.is_empty() || has_path_chars(&tag) || tag.starts_with('-') {
            return Err(CoreError::InvalidTimeframe(tag));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filename suffix selecting bar files of this timeframe: `-<tag>.csv`.
    pub fn file_suffix(&self) -> String {
        format!("-{}{}", self.0, CSV_EXTENSION)
    }

    /// Filename suffix of result files of this timeframe for `model`:
    /// `-<tag>x<model>.csv`.
    pub fn result_suffix(&self, model: &ModelId) -> String {
        format!("-{}x{}{}", self.0, model, CSV_EXTENSION)
    }

    /// Check whether a bar file name belongs to this timeframe.
    pub fn matches(&self, file_name: &str) -> bool {
        let suffix = self.file_suffix();
        file_name.len() > suffix.len() && file_name.ends_with(&suffix)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.0
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Model variant passed to the signal generator (e.g. `FDS2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || has_path_chars(&id) || id.starts_with('-') {
            return Err(CoreError::InvalidModel(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModelId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ModelId> for String {
    fn from(model: ModelId) -> Self {
        model.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One input time series selected for incremental processing.
///
/// Lives only in memory for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedFile {
    /// File name inside the input directory (`BTCUSDT-60.csv`).
    name: String,
    /// File name without the `.csv` extension (`BTCUSDT-60`).
    stem: String,
    /// Requested timeframe this file matched.
    timeframe: Timeframe,
}

impl TrackedFile {
    /// Select a file by name against the requested timeframes.
    ///
    /// Returns `None` when the name matches none of them. When several tags
    /// match (`60-0` and `0`), the longest one wins.
    pub fn select(file_name: &str, timeframes: &[Timeframe]) -> Option<Self> {
        let timeframe = timeframes
            .iter()
            .filter(|tf| tf.matches(file_name))
            .max_by_key(|tf| tf.as_str().len())?;
        let stem = file_name.strip_suffix(CSV_EXTENSION)?;
        Some(Self {
            name: file_name.to_string(),
            stem: stem.to_string(),
            timeframe: timeframe.clone(),
        })
    }

    /// Build directly from a file name and its timeframe.
    pub fn new(file_name: &str, timeframe: Timeframe) -> Result<Self> {
        if !timeframe.matches(file_name) {
            return Err(CoreError::InvalidFileName(file_name.to_string()));
        }
        let stem = file_name
            .strip_suffix(CSV_EXTENSION)
            .ok_or_else(|| CoreError::InvalidFileName(file_name.to_string()))?;
        Ok(Self {
            name: file_name.to_string(),
            stem: stem.to_string(),
            timeframe,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn timeframe(&self) -> &Timeframe {
        &self.timeframe
    }

    /// Name of the per-model result file: `<stem>x<model>.csv`.
    pub fn result_file_name(&self, model: &ModelId) -> String {
        format!("{}x{}{}", self.stem, model, CSV_EXTENSION)
    }
}

impl fmt::Display for TrackedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One forecast row captured from the signal generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Tracked file name.
    pub file: String,
    pub model: ModelId,
    /// Zero-based index of the source line that produced this row.
    pub line_index: u64,
    /// Last line of the generator output, without line terminator.
    pub line: String,
}
