//! Raw generator output capture.

use std::io::{ErrorKind, SeekFrom};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const CHUNK_SIZE: u64 = 4096;

/// Read the last non-empty line of `path`.
///
/// Reads backwards in fixed chunks, so cost does not grow with the file.
/// Trailing line terminators are ignored. Returns `Ok(None)` when the file is
/// missing or holds no line.
pub async fn read_last_line(path: &Path) -> std::io::Result<Option<String>> {
    read_last_line_after(path, 0).await
}

/// Current length of `path`, 0 when it does not exist.
pub async fn output_len(path: &Path) -> std::io::Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// Like `read_last_line`, but only looks at bytes written past `offset`.
///
/// Returns `Ok(None)` when nothing was appended after `offset`. A file that
/// shrank below `offset` was rewritten and is read from the start.
pub async fn read_last_line_after(path: &Path, offset: u64) -> std::io::Result<Option<String>> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let len = file.metadata().await?.len();
    let floor = if len < offset { 0 } else { offset };
    let mut pos = len;
    // Bytes from `pos` to the end of the file, in order.
    let mut tail: Vec<u8> = Vec::new();

    while pos > floor {
        let step = CHUNK_SIZE.min(pos - floor);
        pos -= step;
        file.seek(SeekFrom::Start(pos)).await?;
        let mut chunk = vec![0u8; step as usize];
        file.read_exact(&mut chunk).await?;
        chunk.extend_from_slice(&tail);
        tail = chunk;

        let content = trim_terminators(&tail);
        if let Some(newline) = content.iter().rposition(|&b| b == b'\n') {
            return Ok(Some(decode(&content[newline + 1..])));
        }
    }

    let content = trim_terminators(&tail);
    if content.is_empty() {
        Ok(None)
    } else {
        Ok(Some(decode(content)))
    }
}

fn trim_terminators(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != b'\n' && b != b'\r')
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn last_line_of(content: &[u8]) -> Option<String> {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("raw.csv");
        std::fs::write(&path, content).unwrap();
        read_last_line(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_last_line_variants() {
        assert_eq!(last_line_of(b"a\nb\nc\n").await.as_deref(), Some("c"));
        assert_eq!(last_line_of(b"a\nb\nc").await.as_deref(), Some("c"));
        assert_eq!(last_line_of(b"a\r\nb\r\n").await.as_deref(), Some("b"));
        assert_eq!(last_line_of(b"only").await.as_deref(), Some("only"));
        assert_eq!(last_line_of(b"a\nb\n\n\n").await.as_deref(), Some("b"));
        assert_eq!(last_line_of(b"").await, None);
        assert_eq!(last_line_of(b"\n\n").await, None);
    }

    #[tokio::test]
    async fn test_last_line_across_chunks() {
        let mut content = Vec::new();
        for i in 0..2000 {
            content.extend_from_slice(format!("2024-01-01,{i},0.25\n").as_bytes());
        }
        let long_last = "x".repeat(3 * CHUNK_SIZE as usize);
        content.extend_from_slice(long_last.as_bytes());
        content.push(b'\n');

        assert_eq!(last_line_of(&content).await, Some(long_last));
    }

    #[tokio::test]
    async fn test_last_line_after_offset() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("raw.csv");
        std::fs::write(&path, "old,1\nold,2\n").unwrap();
        let offset = output_len(&path).await.unwrap();

        assert_eq!(read_last_line_after(&path, offset).await.unwrap(), None);

        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("new,3\n");
        std::fs::write(&path, &content).unwrap();
        assert_eq!(
            read_last_line_after(&path, offset).await.unwrap().as_deref(),
            Some("new,3")
        );

        // Rewritten shorter than before: read from the start.
        std::fs::write(&path, "x\n").unwrap();
        assert_eq!(
            read_last_line_after(&path, offset).await.unwrap().as_deref(),
            Some("x")
        );
        assert_eq!(output_len(&tmp.path().join("none.csv")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            read_last_line(&tmp.path().join("missing.csv")).await.unwrap(),
            None
        );
    }
}
