//! Runtime configuration.
//!
//! Precedence, lowest to highest: built-in defaults, TOML file, environment
//! variables. Command-line flags are layered on top by the binary.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Env var selecting the emitting format (`lograge` / `semantic_logger`).
pub const ENV_LOGGER_TYPE: &str = "LOG_BENCH_LOGGER_TYPE";
/// Env var overriding the log file to follow.
pub const ENV_LOG_PATH: &str = "LOG_BENCH_LOG_PATH";
/// Env var overriding the poll interval in milliseconds.
pub const ENV_POLL_MS: &str = "LOG_BENCH_POLL_MS";

/// Which logger ecosystem produced the lines being read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggerType {
    /// One JSON object per line (lograge / JSON formatter).
    #[default]
    Lograge,
    /// SemanticLogger; human-readable lines are converted to JSON before parsing.
    SemanticLogger,
}

impl LoggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lograge => "lograge",
            Self::SemanticLogger => "semantic_logger",
        }
    }
}

impl FromStr for LoggerType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lograge" | "json" => Ok(Self::Lograge),
            "semantic_logger" | "semantic-logger" | "semantic" => Ok(Self::SemanticLogger),
            other => Err(ConfigError::UnknownLoggerType(other.to_string())),
        }
    }
}

/// An environment override that was set but could not be used.
///
/// Returned instead of logged, since configuration is loaded before the
/// tracing subscriber exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredEnv {
    pub key: &'static str,
    pub value: String,
}

/// Application configuration. Every field has a default, so an empty TOML
/// file (or no file at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logger_type: LoggerType,
    pub log_path: PathBuf,
    pub poll_interval_ms: u64,
    pub backfill_lines: usize,
    pub slow_threshold_ms: f64,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logger_type: LoggerType::Lograge,
            log_path: PathBuf::from("log/development.log"),
            poll_interval_ms: 500,
            backfill_lines: 1000,
            slow_threshold_ms: 1000.0,
            log_file: None,
        }
    }
}

impl Config {
    /// `<config_dir>/log-bench/config.toml`, e.g. `~/.config/log-bench/config.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("log-bench").join("config.toml"))
    }

    /// Load configuration from `explicit` (which must exist) or from the
    /// default location (skipped when absent), then apply env overrides.
    /// Also returns the env overrides that were ignored as invalid.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Vec<IgnoredEnv>), ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        let ignored = config.apply_env(|key| std::env::var(key).ok())?;
        Ok((config, ignored))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_toml_str(&raw, path)
    }

    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::MalformedToml {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if config.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                path: path.to_path_buf(),
                key: "poll_interval_ms",
                message: "must be greater than 0".into(),
            });
        }
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    ///
    /// An unknown logger type is an error. An unparseable or zero poll
    /// interval is skipped and reported in the returned list, for the caller
    /// to warn about once logging is up.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<Vec<IgnoredEnv>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();
        if let Some(raw) = lookup(ENV_LOGGER_TYPE) {
            self.logger_type = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_LOG_PATH) {
            if !raw.trim().is_empty() {
                self.log_path = PathBuf::from(raw);
            }
        }
        if let Some(raw) = lookup(ENV_POLL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.poll_interval_ms = ms,
                _ => ignored.push(IgnoredEnv {
                    key: ENV_POLL_MS,
                    value: raw,
                }),
            }
        }
        Ok(ignored)
    }
}
