// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading configuration.
///
/// Line parsing itself never fails: malformed lines are dropped, so there is
/// no error type for the parsing pipeline.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied reading config file: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed TOML in config {path}: {message}")]
    MalformedToml { path: PathBuf, message: String },

    #[error("Invalid value for {key} in config {path}: {message}")]
    InvalidValue {
        path: PathBuf,
        key: &'static str,
        message: String,
    },

    #[error("Unknown logger type: {0} (expected \"lograge\" or \"semantic_logger\")")]
    UnknownLoggerType(String),
}

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}
