//! Directory layout, preparation and input discovery.
//!
//! Layout (directory names come from configuration):
//! - `input_dir`:   bar files `<symbol>-<timeframe>.csv`
//! - `buffer_dir`:  working buffers, same file names as the inputs
//! - `results_dir`: result files `<stem>x<model>.csv`
//! - `raw_dir`:     raw generator output, same names as the result files
//!
//! Reset never wipes a directory. It only removes files whose names end with a
//! suffix of the requested timeframes, so runs for other timeframes sharing the
//! same directories keep their state.

use crate::error::{StoreError, StoreResult};
use fcast_core::{ModelId, Timeframe, TrackedFile};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of preparing one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirPrepared {
    /// The directory did not exist and was created.
    pub created: bool,
    /// Files removed by reset.
    pub removed: Vec<PathBuf>,
}

/// Suffixes selecting bar files and working buffers of `timeframes`.
pub fn timeframe_suffixes(timeframes: &[Timeframe]) -> Vec<String> {
    timeframes.iter().map(Timeframe::file_suffix).collect()
}

/// Suffixes selecting result and raw output files of `timeframes` x `models`.
pub fn result_suffixes(timeframes: &[Timeframe], models: &[ModelId]) -> Vec<String> {
    timeframes
        .iter()
        .flat_map(|tf| models.iter().map(move |m| tf.result_suffix(m)))
        .collect()
}

/// Create `dir` if missing; with `reset`, delete its `*-<timeframe>.csv` files.
pub async fn prepare_dir(
    dir: &Path,
    timeframes: &[Timeframe],
    reset: bool,
) -> StoreResult<DirPrepared> {
    prepare_dir_with_suffixes(dir, &timeframe_suffixes(timeframes), reset).await
}

/// Create `dir` if missing; with `reset`, delete regular files whose name
/// ends with one of `suffixes`.
///
/// Calling it repeatedly with `reset = false` is a no-op after creation.
pub async fn prepare_dir_with_suffixes(
    dir: &Path,
    suffixes: &[String],
    reset: bool,
) -> StoreResult<DirPrepared> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if !meta.is_dir() => return Err(StoreError::NotADirectory(dir.to_path_buf())),
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tokio::fs::create_dir_all(dir).await?;
            info!(dir = %dir.display(), "Created directory");
            return Ok(DirPrepared {
                created: true,
                removed: Vec::new(),
            });
        }
        Err(e) => return Err(e.into()),
    }

    let mut prepared = DirPrepared::default();
    if !reset {
        return Ok(prepared);
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if suffixes.iter().any(|s| name.len() > s.len() && name.ends_with(s.as_str())) {
            let path = entry.path();
            tokio::fs::remove_file(&path).await?;
            debug!(path = %path.display(), "Removed by reset");
            prepared.removed.push(path);
        }
    }
    prepared.removed.sort();

    if !prepared.removed.is_empty() {
        info!(
            dir = %dir.display(),
            removed = prepared.removed.len(),
            "Reset directory"
        );
    }
    Ok(prepared)
}

/// Paths of every directory the driver reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    pub input_dir: PathBuf,
    pub buffer_dir: PathBuf,
    pub results_dir: PathBuf,
    pub raw_dir: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        buffer_dir: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
        raw_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            buffer_dir: buffer_dir.into(),
            results_dir: results_dir.into(),
            raw_dir: raw_dir.into(),
        }
    }

    /// Conventional layout under one root: `bars/`, `bars/Temp/`, `incr/`, `incr/Temp/`.
    pub fn under(root: &Path) -> Self {
        Self::new(
            root.join("bars"),
            root.join("bars").join("Temp"),
            root.join("incr"),
            root.join("incr").join("Temp"),
        )
    }

    pub fn source_path(&self, file: &TrackedFile) -> PathBuf {
        self.input_dir.join(file.name())
    }

    pub fn buffer_path(&self, file: &TrackedFile) -> PathBuf {
        self.buffer_dir.join(file.name())
    }

    pub fn result_path(&self, file: &TrackedFile, model: &ModelId) -> PathBuf {
        self.results_dir.join(file.result_file_name(model))
    }

    pub fn raw_path(&self, file: &TrackedFile, model: &ModelId) -> PathBuf {
        self.raw_dir.join(file.result_file_name(model))
    }

    /// Prepare every output directory.
    ///
    /// With `reset`, removes working buffers of `timeframes` and the result and
    /// raw files of `timeframes` x `models`. Returns all removed paths.
    pub async fn prepare(
        &self,
        timeframes: &[Timeframe],
        models: &[ModelId],
        reset: bool,
    ) -> StoreResult<Vec<PathBuf>> {
        match tokio::fs::metadata(&self.input_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(StoreError::NotADirectory(self.input_dir.clone())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::InputDirMissing(self.input_dir.clone()))
            }
            Err(e) => return Err(e.into()),
        }

        let buffer_suffixes = timeframe_suffixes(timeframes);
        let output_suffixes = result_suffixes(timeframes, models);

        let mut removed = Vec::new();
        for (dir, suffixes) in [
            (&self.buffer_dir, &buffer_suffixes),
            (&self.results_dir, &output_suffixes),
            (&self.raw_dir, &output_suffixes),
        ] {
            removed.extend(prepare_dir_with_suffixes(dir, suffixes, reset).await?.removed);
        }
        Ok(removed)
    }

    /// Input files matching one of `timeframes`, sorted by name.
    pub async fn discover(&self, timeframes: &[Timeframe]) -> StoreResult<Vec<TrackedFile>> {
        let mut entries = match tokio::fs::read_dir(&self.input_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::InputDirMissing(self.input_dir.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // Follow symlinks: a linked bar file is still a bar file.
            let is_file = tokio::fs::metadata(entry.path())
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(file) = TrackedFile::select(name, timeframes) {
                files.push(file);
            }
        }
        files.sort_by(|a, b| a.name().cmp(b.name()));

        debug!(
            dir = %self.input_dir.display(),
            files = ?files.iter().map(TrackedFile::name).collect::<Vec<_>>(),
            "Discovered input files"
        );
        Ok(files)
    }
}
