//! Incremental line feeder.
//!
//! Copies source lines into a per-file working buffer one at a time. Each line
//! is appended and flushed before it is handed out, so the buffer's line count
//! is the resume point: a restarted run continues right after the last line
//! that reached the buffer and never appends it twice.
//!
//! The feeder sees the source as it was when opened. Lines appended to the
//! source later are only picked up after `refresh()`.
//!
//! Only newline-terminated lines are consumed. A trailing fragment without a
//! terminator is held back until it is completed, so the working buffer is
//! always a sequence of whole source lines.

use crate::error::{StoreError, StoreResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

/// One line handed to the working buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FedLine {
    /// Zero-based line index in the source.
    pub index: u64,
    /// Raw line bytes including the terminator.
    pub bytes: Vec<u8>,
}

impl FedLine {
    /// One-based line number.
    pub fn number(&self) -> u64 {
        self.index + 1
    }
}

/// Feeds one source file into its working buffer.
pub struct LineFeeder {
    source_path: PathBuf,
    buffer_path: PathBuf,
    source: BufReader<File>,
    buffer: File,
    /// Source bytes read so far, including a held fragment.
    read_bytes: u64,
    /// Source length visible to this feeder.
    limit: u64,
    /// Bytes of an unterminated trailing line.
    fragment: Vec<u8>,
    start_line: u64,
    next_index: u64,
    sync_writes: bool,
}

impl LineFeeder {
    /// Open a source and its working buffer.
    ///
    /// An existing buffer must be a line-by-line prefix of the source; the feeder
    /// then resumes right after it. A missing buffer is created empty.
    pub async fn open(
        source_path: &Path,
        buffer_path: &Path,
        sync_writes: bool,
    ) -> StoreResult<Self> {
        let source = match File::open(source_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::SourceMissing(source_path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let limit = source.metadata().await?.len();
        let mut source = BufReader::new(source);

        let (start_line, read_bytes) = match File::open(buffer_path).await {
            Ok(buffer) => {
                verify_prefix(&mut source, limit, BufReader::new(buffer), buffer_path).await?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => (0, 0),
            Err(e) => return Err(e.into()),
        };

        let buffer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(buffer_path)
            .await?;

        debug!(
            source = %source_path.display(),
            start_line,
            source_bytes = limit,
            "Opened line feeder"
        );

        Ok(Self {
            source_path: source_path.to_path_buf(),
            buffer_path: buffer_path.to_path_buf(),
            source,
            buffer,
            read_bytes,
            limit,
            fragment: Vec::new(),
            start_line,
            next_index: start_line,
            sync_writes,
        })
    }

    /// Lines already in the working buffer when opened.
    pub fn start_line(&self) -> u64 {
        self.start_line
    }

    /// Lines in the working buffer now.
    pub fn lines_consumed(&self) -> u64 {
        self.next_index
    }

    /// Whether every visible source byte has been read.
    pub fn is_exhausted(&self) -> bool {
        self.read_bytes >= self.limit
    }

    /// Length of a held unterminated trailing fragment.
    pub fn pending_fragment(&self) -> usize {
        self.fragment.len()
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn buffer_path(&self) -> &Path {
        &self.buffer_path
    }

    /// Append the next complete source line to the working buffer and return it.
    ///
    /// Returns `None` once the visible part of the source is exhausted.
    pub async fn next_line(&mut self) -> StoreResult<Option<FedLine>> {
        loop {
            let remaining = self.limit.saturating_sub(self.read_bytes);
            if remaining == 0 {
                return Ok(None);
            }

            let n = (&mut self.source)
                .take(remaining)
                .read_until(b'\n', &mut self.fragment)
                .await?;
            if n == 0 {
                return Err(StoreError::SourceTruncated {
                    path: self.source_path.clone(),
                    consumed: self.read_bytes,
                    len: self.read_bytes,
                });
            }
            self.read_bytes += n as u64;

            if self.fragment.last() == Some(&b'\n') {
                let bytes = std::mem::take(&mut self.fragment);
                self.append(&bytes).await?;
                let index = self.next_index;
                self.next_index += 1;
                return Ok(Some(FedLine { index, bytes }));
            }
        }
    }

    /// Re-read the source length so lines appended since opening become visible.
    ///
    /// Returns whether the source grew.
    pub async fn refresh(&mut self) -> StoreResult<bool> {
        let len = tokio::fs::metadata(&self.source_path).await?.len();
        if len < self.read_bytes {
            return Err(StoreError::SourceTruncated {
                path: self.source_path.clone(),
                consumed: self.read_bytes,
                len,
            });
        }
        let grew = len > self.limit;
        self.limit = len;
        Ok(grew)
    }

    async fn append(&mut self, bytes: &[u8]) -> StoreResult<()> {
        self.buffer.write_all(bytes).await?;
        self.buffer.flush().await?;
        if self.sync_writes {
            self.buffer.sync_data().await?;
        }
        Ok(())
    }
}

/// Walk buffer and source together, checking the buffer is a prefix of the
/// source. Leaves `source` positioned right after the matched prefix.
///
/// Returns (lines, bytes) matched.
async fn verify_prefix(
    source: &mut BufReader<File>,
    limit: u64,
    mut buffer: BufReader<File>,
    buffer_path: &Path,
) -> StoreResult<(u64, u64)> {
    let mut lines = 0u64;
    let mut bytes = 0u64;
    let mut expected = Vec::new();
    let mut actual = Vec::new();

    loop {
        expected.clear();
        if buffer.read_until(b'\n', &mut expected).await? == 0 {
            return Ok((lines, bytes));
        }

        actual.clear();
        let n = (&mut *source)
            .take(limit - bytes)
            .read_until(b'\n', &mut actual)
            .await?;
        if n == 0 {
            return Err(StoreError::BufferAhead {
                buffer: buffer_path.to_path_buf(),
                line: lines + 1,
            });
        }
        if actual != expected {
            return Err(StoreError::BufferMismatch {
                buffer: buffer_path.to_path_buf(),
                line: lines + 1,
            });
        }

        lines += 1;
        bytes += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("2024-01-01 00:{i:02},{i}.0\n")).collect()
    }

    fn paths(tmp: &TempDir) -> (PathBuf, PathBuf) {
        (tmp.path().join("X-60.csv"), tmp.path().join("buffer-X-60.csv"))
    }

    async fn drain(feeder: &mut LineFeeder) -> Vec<FedLine> {
        let mut lines = Vec::new();
        while let Some(line) = feeder.next_line().await.unwrap() {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn test_buffer_tracks_fed_prefix() {
        let tmp = TempDir::new().unwrap();
        let (source, buffer) = paths(&tmp);
        let content = numbered(5);
        std::fs::write(&source, &content).unwrap();

        let mut feeder = LineFeeder::open(&source, &buffer, false).await.unwrap();
        assert_eq!(feeder.start_line(), 0);

        let mut expected = String::new();
        for (i, src_line) in content.split_inclusive('\n').enumerate() {
            let line = feeder.next_line().await.unwrap().unwrap();
            assert_eq!(line.index, i as u64);
            assert_eq!(line.bytes, src_line.as_bytes());
            expected.push_str(src_line);
            // After N steps the buffer holds exactly the first N lines.
            assert_eq!(std::fs::read_to_string(&buffer).unwrap(), expected);
        }
        assert!(feeder.is_exhausted());
        assert!(feeder.next_line().await.unwrap().is_none());
        assert_eq!(feeder.lines_consumed(), 5);
    }

    #[tokio::test]
    async fn test_resume_matches_uninterrupted_run() {
        let tmp = TempDir::new().unwrap();
        let (source, buffer) = paths(&tmp);
        let content = numbered(8);
        std::fs::write(&source, &content).unwrap();

        // Uninterrupted reference run.
        let reference = tmp.path().join("reference.csv");
        let mut full = LineFeeder::open(&source, &reference, false).await.unwrap();
        drain(&mut full).await;

        // Interrupted after 3 lines, then resumed.
        {
            let mut feeder = LineFeeder::open(&source, &buffer, false).await.unwrap();
            for _ in 0..3 {
                feeder.next_line().await.unwrap().unwrap();
            }
        }
        let mut resumed = LineFeeder::open(&source, &buffer, false).await.unwrap();
        assert_eq!(resumed.start_line(), 3);
        let rest = drain(&mut resumed).await;
        assert_eq!(rest.first().unwrap().index, 3);
        assert_eq!(rest.len(), 5);

        assert_eq!(
            std::fs::read(&buffer).unwrap(),
            std::fs::read(&reference).unwrap()
        );
        assert_eq!(std::fs::read_to_string(&buffer).unwrap(), content);
    }

    #[tokio::test]
    async fn test_missing_source() {
        let tmp = TempDir::new().unwrap();
        let (source, buffer) = paths(&tmp);
        let err = LineFeeder::open(&source, &buffer, false).await.err().unwrap();
        assert!(matches!(err, StoreError::SourceMissing(_)));
    }

    #[tokio::test]
    async fn test_buffer_longer_than_source_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let (source, buffer) = paths(&tmp);
        std::fs::write(&source, numbered(2)).unwrap();
        std::fs::write(&buffer, numbered(3)).unwrap();

        let err = LineFeeder::open(&source, &buffer, false).await.err().unwrap();
        assert!(matches!(err, StoreError::BufferAhead { line: 3, .. }));
        assert!(err.is_state_mismatch());
    }

    #[tokio::test]
    async fn test_corrupted_buffer_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let (source, buffer) = paths(&tmp);
        std::fs::write(&source, "a\nb\nc\n").unwrap();
        std::fs::write(&buffer, "a\nX\n").unwrap();

        let err = LineFeeder::open(&source, &buffer, false).await.err().unwrap();
        assert!(matches!(err, StoreError::BufferMismatch { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_held_back() {
        let tmp = TempDir::new().unwrap();
        let (source, buffer) = paths(&tmp);
        std::fs::write(&source, "a\nb\npartial").unwrap();

        let mut feeder = LineFeeder::open(&source, &buffer, false).await.unwrap();
        let lines = drain(&mut feeder).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(feeder.pending_fragment(), "partial".len());
        assert_eq!(std::fs::read_to_string(&buffer).unwrap(), "a\nb\n");
    }

    #[tokio::test]
    async fn test_snapshot_ignores_later_appends_until_refresh() {
        let tmp = TempDir::new().unwrap();
        let (source, buffer) = paths(&tmp);
        std::fs::write(&source, "a\nb\n").unwrap();

        let mut feeder = LineFeeder::open(&source, &buffer, false).await.unwrap();
        feeder.next_line().await.unwrap().unwrap();

        let mut f = std::fs::OpenOptions::new().append(true).open(&source).unwrap();
        std::io::Write::write_all(&mut f, b"c\nd").unwrap();

        assert_eq!(drain(&mut feeder).await.len(), 1);

        assert!(feeder.refresh().await.unwrap());
        let lines = drain(&mut feeder).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].bytes, b"c\n");
        assert_eq!(feeder.pending_fragment(), 1);

        // Completing the fragment releases it as one whole line.
        std::io::Write::write_all(&mut f, b"d\n").unwrap();
        assert!(feeder.refresh().await.unwrap());
        let lines = drain(&mut feeder).await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].bytes, b"dd\n");
        assert_eq!(lines[0].index, 3);
        assert_eq!(std::fs::read_to_string(&buffer).unwrap(), "a\nb\nc\ndd\n");
    }

    #[tokio::test]
    async fn test_refresh_detects_truncated_source() {
        let tmp = TempDir::new().unwrap();
        let (source, buffer) = paths(&tmp);
        std::fs::write(&source, "a\nb\n").unwrap();

        let mut feeder = LineFeeder::open(&source, &buffer, false).await.unwrap();
        drain(&mut feeder).await;
        std::fs::write(&source, "a\n").unwrap();

        let err = feeder.refresh().await.unwrap_err();
        assert!(matches!(err, StoreError::SourceTruncated { len: 2, .. }));
    }

    #[tokio::test]
    async fn test_sync_writes() {
        let tmp = TempDir::new().unwrap();
        let (source, buffer) = paths(&tmp);
        std::fs::write(&source, numbered(3)).unwrap();

        let mut feeder = LineFeeder::open(&source, &buffer, true).await.unwrap();
        assert_eq!(drain(&mut feeder).await.len(), 3);
        assert_eq!(std::fs::read_to_string(&buffer).unwrap(), numbered(3));
    }
}
