//! Temporary workspace with the conventional `bars/` and `incr/` layout.

use fcast_core::{ModelId, Timeframe};
use fcast_driver::RunSettings;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Workspace {
    tmp: TempDir,
}

impl Workspace {
    /// Workspace with an empty input directory.
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("bars")).unwrap();
        Self { tmp }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    /// Settings for this workspace with fast test-friendly defaults.
    pub fn settings(&self, timeframes: &[&str], models: &[&str]) -> RunSettings {
        let mut settings = RunSettings::under(
            self.root(),
            timeframes.iter().map(|t| Timeframe::new(*t).unwrap()).collect(),
            models.iter().map(|m| ModelId::new(*m).unwrap()).collect(),
        );
        settings.progress_every = 0;
        settings
    }

    /// Write `<root>/bars/<name>` with `lines` numbered bar rows. Returns the content.
    pub fn write_source(&self, name: &str, lines: usize) -> String {
        let content = bars(lines);
        std::fs::write(self.source_path(name), &content).unwrap();
        content
    }

    pub fn append_source(&self, name: &str, content: &str) {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(self.source_path(name))
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    pub fn source_path(&self, name: &str) -> PathBuf {
        self.root().join("bars").join(name)
    }

    pub fn buffer_path(&self, name: &str) -> PathBuf {
        self.root().join("bars").join("Temp").join(name)
    }

    pub fn result_path(&self, name: &str) -> PathBuf {
        self.root().join("incr").join(name)
    }

    pub fn raw_path(&self, name: &str) -> PathBuf {
        self.root().join("incr").join("Temp").join(name)
    }

    pub fn buffer(&self, name: &str) -> String {
        std::fs::read_to_string(self.buffer_path(name)).unwrap()
    }

    /// Rows of a result file; empty when it does not exist.
    pub fn result_rows(&self, name: &str) -> Vec<String> {
        match std::fs::read_to_string(self.result_path(name)) {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Create `path` relative to the root with `content`, making parent dirs.
    pub fn put(&self, path: &str, content: &str) {
        let path = self.root().join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

/// `n` numbered bar rows.
pub fn bars(n: usize) -> String {
    (1..=n)
        .map(|i| format!("2024-01-01 {:02}:{:02},{i}.0,{i}.5,{i}.25\n", i / 60, i % 60))
        .collect()
}

/// First `n` lines of `content`, terminators included.
pub fn head(content: &str, n: usize) -> String {
    content.split_inclusive('\n').take(n).collect()
}
