//! Command-line flags, layered over [`Config`].

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log_bench_core::{Collection, Config, LoggerType};

#[derive(Parser, Debug)]
#[command(
    name = "log-bench",
    version,
    about = "Follow a Rails log and group every line under the request that caused it"
)]
pub struct Args {
    /// Log file to read [default: config `log_path`, else log/development.log]
    pub path: Option<PathBuf>,

    /// Config file [default: <config dir>/log-bench/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Format the application writes its log in
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Print the current tail of the log and exit instead of following it
    #[arg(long)]
    pub once: bool,

    /// Trailing lines to read before following [default: config `backfill_lines`]
    #[arg(long, short = 'n')]
    pub lines: Option<usize>,

    /// Only requests with this HTTP method
    #[arg(long)]
    pub method: Option<String>,

    /// Only requests whose path contains this text
    #[arg(long = "path", value_name = "SUBSTR")]
    pub path_contains: Option<String>,

    /// Only requests with a status in LO-HI (or exactly CODE)
    #[arg(long, value_name = "LO-HI", value_parser = parse_status_range)]
    pub status: Option<StatusRange>,

    /// Only requests slower than MS [default threshold: config `slow_threshold_ms`]
    #[arg(long, value_name = "MS", num_args = 0..=1)]
    pub slow: Option<Option<f64>>,

    #[arg(long, value_enum)]
    pub sort: Option<SortArg>,

    /// Print related log lines under each request
    #[arg(long)]
    pub related: bool,

    /// One JSON object per request
    #[arg(long)]
    pub json: bool,

    /// Write diagnostics to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Lograge,
    SemanticLogger,
}

impl From<FormatArg> for LoggerType {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Lograge => LoggerType::Lograge,
            FormatArg::SemanticLogger => LoggerType::SemanticLogger,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    /// Slowest first
    Duration,
    /// Oldest first
    Timestamp,
}

/// Inclusive status code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRange {
    pub lo: u16,
    pub hi: u16,
}

fn parse_status_range(raw: &str) -> Result<StatusRange, String> {
    let parse = |s: &str| {
        s.trim()
            .parse::<u16>()
            .map_err(|_| format!("invalid status code: {s:?}"))
    };
    let (lo, hi) = match raw.split_once('-') {
        Some((lo, hi)) => (parse(lo)?, parse(hi)?),
        None => {
            let code = parse(raw)?;
            (code, code)
        }
    };
    if lo > hi {
        return Err(format!("empty status range: {raw}"));
    }
    Ok(StatusRange { lo, hi })
}

impl Args {
    /// Flags win over config file and environment.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(path) = &self.path {
            config.log_path = path.clone();
        }
        if let Some(format) = self.format {
            config.logger_type = format.into();
        }
        if let Some(lines) = self.lines {
            config.backfill_lines = lines;
        }
        if let Some(Some(ms)) = self.slow {
            config.slow_threshold_ms = ms;
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = Some(log_file.clone());
        }
    }

    /// Apply the filter and sort flags to `requests`.
    pub fn view(&self, requests: &Collection, config: &Config) -> Collection {
        let mut view = Collection::from_requests(requests.requests().to_vec());
        if let Some(method) = &self.method {
            view = view.filter_by_method(method);
        }
        if let Some(pattern) = &self.path_contains {
            view = view.filter_by_path(pattern);
        }
        if let Some(range) = self.status {
            view = view.filter_by_status(range.lo..=range.hi);
        }
        if self.slow.is_some() {
            view = view.slow_requests(config.slow_threshold_ms);
        }
        match self.sort {
            Some(SortArg::Duration) => view.sort_by_duration(),
            Some(SortArg::Timestamp) => view.sort_by_timestamp(),
            None => view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use log_bench_core::{CorrelationTable, LineParser};
    use pretty_assertions::assert_eq;

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("log-bench").chain(argv.iter().copied()))
    }

    #[test]
    fn command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn status_range_parsing() {
        assert_eq!(parse_status_range("200-299"), Ok(StatusRange { lo: 200, hi: 299 }));
        assert_eq!(parse_status_range("404"), Ok(StatusRange { lo: 404, hi: 404 }));
        assert!(parse_status_range("500-400").is_err());
        assert!(parse_status_range("abc").is_err());
    }

    #[test]
    fn flags_override_config() {
        let mut config = Config::default();
        args(&[
            "/tmp/app.log",
            "--format",
            "semantic-logger",
            "-n",
            "50",
            "--slow",
            "250",
        ])
        .apply_to(&mut config);
        assert_eq!(config.log_path, PathBuf::from("/tmp/app.log"));
        assert_eq!(config.logger_type, LoggerType::SemanticLogger);
        assert_eq!(config.backfill_lines, 50);
        assert_eq!(config.slow_threshold_ms, 250.0);
    }

    #[test]
    fn bare_slow_uses_config_threshold() {
        let a = args(&["--slow"]);
        assert_eq!(a.slow, Some(None));
        let mut config = Config::default();
        a.apply_to(&mut config);
        assert_eq!(config.slow_threshold_ms, 1000.0);
    }

    #[test]
    fn view_applies_filters_and_sort() {
        let parser = LineParser::new(LoggerType::Lograge, CorrelationTable::new());
        let all = Collection::from_lines(
            &parser,
            [
                r#"{"method":"GET","path":"/a","status":200,"duration":10.0,"request_id":"1"}"#,
                r#"{"method":"GET","path":"/b","status":500,"duration":2000.0,"request_id":"2"}"#,
                r#"{"method":"GET","path":"/b","status":200,"duration":1500.0,"request_id":"3"}"#,
                r#"{"method":"POST","path":"/b","status":201,"duration":5000.0,"request_id":"4"}"#,
            ],
        );
        let a = args(&["--method", "get", "--path", "/b", "--slow", "--sort", "duration"]);
        let ids: Vec<_> = a
            .view(&all, &Config::default())
            .iter()
            .filter_map(|r| r.request_id().map(str::to_string))
            .collect();
        assert_eq!(ids, ["2", "3"]);

        let a = args(&["--status", "200-299"]);
        assert_eq!(a.view(&all, &Config::default()).requests().len(), 3);
    }
}
