// crates/monitor/src/tail.rs
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::source::{split_lines, SourceError};

/// Backward read chunk size.
const CHUNK_SIZE: u64 = 8 * 1024;

/// Last `n` lines of `path`, oldest first, reading backwards from EOF in
/// fixed-size chunks so large logs are never loaded whole.
///
/// A trailing newline does not count as an empty last line, a final line
/// without a newline is included, and blank lines are skipped without
/// counting toward `n`.
pub async fn tail_lines(path: &Path, n: usize) -> Result<Vec<String>, SourceError> {
    tail_lines_before(path, n, u64::MAX).await
}

/// Like [`tail_lines`], but ignores everything at or after byte `end`.
pub async fn tail_lines_before(
    path: &Path,
    n: usize,
    end: u64,
) -> Result<Vec<String>, SourceError> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| SourceError::io(path, e))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| SourceError::io(path, e))?
        .len()
        .min(end);

    // `tail` holds bytes [pos, len). Stop once it contains a newline that
    // starts the n-th line from the end.
    let mut tail: Vec<u8> = Vec::new();
    let mut pos = len;
    let mut start = None;

    while pos > 0 && start.is_none() {
        let chunk = pos.min(CHUNK_SIZE);
        pos -= chunk;

        file.seek(std::io::SeekFrom::Start(pos))
            .await
            .map_err(|e| SourceError::io(path, e))?;
        let mut buf = vec![0u8; chunk as usize];
        file.read_exact(&mut buf)
            .await
            .map_err(|e| SourceError::io(path, e))?;
        buf.extend_from_slice(&tail);
        tail = buf;

        start = nth_line_start(&tail, n);
    }

    let lines = split_lines(&tail[start.unwrap_or(0)..]);
    let skip = lines.len().saturating_sub(n);
    Ok(lines.into_iter().skip(skip).collect())
}

/// Offset where the `n`-th non-blank line from the end of `bytes` starts,
/// if a newline before it is already in `bytes`.
fn nth_line_start(bytes: &[u8], n: usize) -> Option<usize> {
    let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let mut line_end = body.len();
    let mut seen = 0;
    for newline in memchr::memrchr_iter(b'\n', body) {
        let line = &body[newline + 1..line_end];
        line_end = newline;
        if !line.strip_suffix(b"\r").unwrap_or(line).is_empty() {
            seen += 1;
            if seen == n {
                return Some(newline + 1);
            }
        }
    }
    None
}

/// Byte offset just past the last newline before `end`, or 0 when there is none.
/// Anything after it is a line the writer has not finished yet.
pub(crate) async fn complete_prefix_len(path: &Path, end: u64) -> Result<u64, SourceError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| SourceError::io(path, e))?;
    let mut pos = end;
    while pos > 0 {
        let chunk = pos.min(CHUNK_SIZE);
        pos -= chunk;

        file.seek(std::io::SeekFrom::Start(pos))
            .await
            .map_err(|e| SourceError::io(path, e))?;
        let mut buf = vec![0u8; chunk as usize];
        file.read_exact(&mut buf)
            .await
            .map_err(|e| SourceError::io(path, e))?;
        if let Some(i) = memchr::memrchr(b'\n', &buf) {
            return Ok(pos + i as u64 + 1);
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(text: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "{text}").unwrap();
        f.flush().unwrap();
        f
    }

    #[tokio::test]
    async fn zero_lines() {
        let f = file_with("a\nb\n");
        assert!(tail_lines(f.path(), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_file() {
        let f = file_with("");
        assert!(tail_lines(f.path(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fewer_lines_than_requested() {
        let f = file_with("alpha\nbeta\ngamma\n");
        assert_eq!(tail_lines(f.path(), 100).await.unwrap(), ["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn last_lines_of_many_chunks() {
        let text: String = (0..5000).map(|i| format!("{{\"n\":{i}}}\n")).collect();
        let f = file_with(&text);
        let lines = tail_lines(f.path(), 3).await.unwrap();
        assert_eq!(lines, ["{\"n\":4997}", "{\"n\":4998}", "{\"n\":4999}"]);

        let lines = tail_lines(f.path(), 1000).await.unwrap();
        assert_eq!(lines.len(), 1000);
        assert_eq!(lines[0], "{\"n\":4000}");
    }

    #[tokio::test]
    async fn no_trailing_newline() {
        let f = file_with("one\ntwo\nthree");
        assert_eq!(tail_lines(f.path(), 2).await.unwrap(), ["two", "three"]);
    }

    #[tokio::test]
    async fn lines_longer_than_a_chunk() {
        let a = "A".repeat(10_000);
        let b = "B".repeat(12_000);
        let c = "C".repeat(9_000);
        let f = file_with(&format!("{a}\n{b}\n{c}\n"));
        assert_eq!(tail_lines(f.path(), 2).await.unwrap(), [b, c]);
    }

    #[tokio::test]
    async fn stops_at_given_offset() {
        let f = file_with("a\nb\nc\nd\n");
        assert_eq!(tail_lines_before(f.path(), 2, 6).await.unwrap(), ["b", "c"]);
    }

    #[tokio::test]
    async fn blank_lines_do_not_count() {
        let f = file_with("a\n\n\nb\r\n\r\nc\n\n");
        assert_eq!(tail_lines(f.path(), 2).await.unwrap(), ["b", "c"]);
        assert_eq!(tail_lines(f.path(), 3).await.unwrap(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn blank_lines_across_chunks() {
        let mut text = String::from("first\n");
        text.push_str(&"\n".repeat(20_000));
        text.push_str("last\n");
        let f = file_with(&text);
        assert_eq!(tail_lines(f.path(), 2).await.unwrap(), ["first", "last"]);
    }

    #[tokio::test]
    async fn complete_prefix_stops_before_unfinished_line() {
        let f = file_with("one\ntwo\nthr");
        assert_eq!(complete_prefix_len(f.path(), 11).await.unwrap(), 8);
        assert_eq!(complete_prefix_len(f.path(), 8).await.unwrap(), 8);
        assert_eq!(complete_prefix_len(f.path(), 3).await.unwrap(), 0);

        let long = format!("done\n{}", "x".repeat(20_000));
        let f = file_with(&long);
        assert_eq!(complete_prefix_len(f.path(), long.len() as u64).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn missing_file() {
        let err = tail_lines(Path::new("/no/such/file.log"), 5).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
    }
}
