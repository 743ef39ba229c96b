// crates/monitor/src/source.rs
//! Append-only line sources the monitor can follow.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log_bench_core::parser::sanitize_utf8;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;

use crate::tail::complete_prefix_len;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Log file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied reading log file: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// A source of newly appended lines.
///
/// `next_batch` waits until at least one new complete line exists and
/// returns every line available at that point, oldest first. Lines are
/// valid UTF-8 with invalid byte sequences already removed.
#[async_trait]
pub trait LineSource: Send {
    async fn next_batch(&mut self) -> Result<Vec<String>, SourceError>;
}

/// Follows a log file by byte offset, polling for appended lines.
///
/// Only newline-terminated lines are returned; a partial last line stays
/// in the file until it is completed. If the file shrinks below the stored
/// offset (truncation or rotation) reading restarts at offset 0.
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    offset: u64,
    poll_interval: Duration,
}

impl LogFile {
    /// Follow `path` from its first byte.
    pub fn from_start(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            poll_interval,
        }
    }

    /// Follow `path` from the end of its last complete line, skipping
    /// existing content. A line still being written when this is called is
    /// returned whole by the first poll after it is finished.
    pub async fn from_end(
        path: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Result<Self, SourceError> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| SourceError::io(&path, e))?;
        let offset = complete_prefix_len(&path, metadata.len()).await?;
        Ok(Self {
            offset,
            path,
            poll_interval,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// One poll: the complete lines appended since the last call (possibly none).
    pub async fn read_appended(&mut self) -> Result<Vec<String>, SourceError> {
        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| SourceError::io(&self.path, e))?
            .len();

        if len < self.offset {
            tracing::info!(path = %self.path.display(), "Log file shrank, reading from start");
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(std::io::SeekFrom::Start(self.offset))
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;
        let mut buf = Vec::with_capacity((len - self.offset) as usize);
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;

        let Some(last_newline) = memchr::memrchr(b'\n', &buf) else {
            return Ok(Vec::new());
        };
        let complete = &buf[..=last_newline];
        self.offset += complete.len() as u64;
        Ok(split_lines(complete))
    }
}

#[async_trait]
impl LineSource for LogFile {
    async fn next_batch(&mut self) -> Result<Vec<String>, SourceError> {
        loop {
            let lines = self.read_appended().await?;
            if !lines.is_empty() {
                return Ok(lines);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Lines pushed in-process, one batch per message.
///
/// Once every sender is dropped the source never yields again; the monitor
/// keeps waiting until it is stopped.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<String>>,
}

impl ChannelSource {
    pub fn new(buffer: usize) -> (mpsc::Sender<Vec<String>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl LineSource for ChannelSource {
    async fn next_batch(&mut self) -> Result<Vec<String>, SourceError> {
        loop {
            match self.rx.recv().await {
                Some(batch) if batch.is_empty() => continue,
                Some(batch) => return Ok(batch),
                None => std::future::pending::<()>().await,
            }
        }
    }
}

/// Split newline-terminated bytes into non-empty lines.
pub(crate) fn split_lines(bytes: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;
    for end in memchr::memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len())) {
        let line = &bytes[start..end];
        start = end + 1;
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if !line.is_empty() {
            lines.push(sanitize_utf8(line));
        }
    }
    lines
}
