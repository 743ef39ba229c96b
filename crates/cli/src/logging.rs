use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log_bench_core::IgnoredEnv;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

/// Env var holding the diagnostics filter, e.g. `LOG_BENCH_LOG=log_bench_monitor=debug`.
pub const LOG_ENV: &str = "LOG_BENCH_LOG";

/// Install the global subscriber.
///
/// - Filter from `LOG_BENCH_LOG`, defaulting to `warn`
/// - With `log_file`, output goes through a non-blocking file writer so it
///   never interleaves with the request display; keep the returned guard
///   alive until exit or buffered lines are lost
/// - Otherwise compact output on stderr
pub fn init(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    let Some(path) = log_file else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("log file path has no file name: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;
    Ok(Some(guard))
}

/// Report env overrides that config loading skipped. Call after [`init`].
pub fn warn_ignored_env(ignored: &[IgnoredEnv]) {
    for env in ignored {
        tracing::warn!(key = env.key, value = %env.value, "Ignoring invalid environment override");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn ignored_env_is_reported_as_warning() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = fmt()
            .with_env_filter(EnvFilter::new("warn"))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            warn_ignored_env(&[IgnoredEnv {
                key: "LOG_BENCH_POLL_MS",
                value: "soon".into(),
            }]);
        });

        let output = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("LOG_BENCH_POLL_MS"));
        assert!(output.contains("soon"));
    }

    #[test]
    fn nothing_ignored_logs_nothing() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = fmt().with_writer(move || writer.clone()).finish();
        tracing::subscriber::with_default(subscriber, || warn_ignored_env(&[]));
        assert!(capture.0.lock().unwrap().is_empty());
    }
}
