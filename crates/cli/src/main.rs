// crates/cli/src/main.rs
//! log-bench: follow a Rails log and print each request with the lines it caused.

mod args;
mod logging;
mod render;

use std::collections::HashSet;
use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log_bench_core::{Collection, Config, CorrelationTable, LineParser, Request};
use log_bench_monitor::{open_log, tail_lines, Monitor, MonitorEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::args::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (mut config, ignored_env) = Config::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    let _log_guard = logging::init(config.log_file.as_deref())?;
    logging::warn_ignored_env(&ignored_env);

    info!(
        path = %config.log_path.display(),
        logger_type = config.logger_type.as_str(),
        "Starting log-bench"
    );

    let parser = LineParser::new(config.logger_type, CorrelationTable::new());
    if args.once {
        run_once(&args, &config, parser).await
    } else {
        run_live(&args, &config, parser).await
    }
}

async fn run_once(args: &Args, config: &Config, parser: LineParser) -> Result<()> {
    let lines = tail_lines(&config.log_path, config.backfill_lines)
        .await
        .with_context(|| format!("reading {}", config.log_path.display()))?;
    let all = Collection::from_lines(&parser, &lines);
    let view = args.view(&all, config);

    render::write_requests(&mut io::stdout().lock(), &view, args.related, args.json)?;
    if !all.orphan_requests().is_empty() {
        eprintln!(
            "{} request id(s) had log lines but no request line",
            all.orphan_requests().len()
        );
    }
    Ok(())
}

async fn run_live(args: &Args, config: &Config, parser: LineParser) -> Result<()> {
    let monitor = Monitor::new(parser);
    let (backfill, log) = open_log(
        &config.log_path,
        config.backfill_lines,
        Duration::from_millis(config.poll_interval_ms),
    )
    .await
    .with_context(|| format!("opening {}", config.log_path.display()))?;

    monitor.ingest(&backfill).await;
    let mut seen = HashSet::new();
    print_new(args, config, &monitor.snapshot().await, &mut seen)?;

    let mut rx = monitor.subscribe();
    monitor.start(log);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
            event = rx.recv() => match event {
                Ok(MonitorEvent::BatchApplied(_)) | Err(RecvError::Lagged(_)) => {
                    print_new(args, config, &monitor.snapshot().await, &mut seen)?;
                }
                Ok(_) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    monitor.shutdown().await;
    Ok(())
}

/// Print requests from `snapshot` that pass the filters and were not printed before.
fn print_new(
    args: &Args,
    config: &Config,
    snapshot: &Collection,
    seen: &mut HashSet<String>,
) -> Result<()> {
    let view = args.view(snapshot, config);
    let fresh: Vec<&Request> = view
        .iter()
        .filter(|r| r.request_id().is_some_and(|id| !seen.contains(id)))
        .collect();
    render::write_requests(&mut io::stdout().lock(), fresh.iter().copied(), args.related, args.json)?;

    seen.extend(
        fresh
            .iter()
            .filter_map(|r| r.request_id().map(str::to_string)),
    );
    // Evicted requests can't be printed again; forget them.
    let present: HashSet<&str> = snapshot.iter().filter_map(Request::request_id).collect();
    seen.retain(|id| present.contains(id.as_str()));
    Ok(())
}
