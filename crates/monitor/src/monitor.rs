// crates/monitor/src/monitor.rs
//! The live monitor task.
//!
//! Idle until [`Monitor::start`], which spawns a loop that waits on a
//! [`LineSource`], parses and groups every batch, and merges the result into
//! the shared [`MonitorState`]. Consumers read snapshots or subscribe to
//! [`MonitorEvent`]s.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log_bench_core::{group_by_request, Collection, CorrelationTable, LineParser};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::source::LineSource;
use crate::state::{BatchSummary, MonitorState};

/// Pause after a failed read before trying again. Retries never stop.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    Started,
    BatchApplied(BatchSummary),
    SourceError { message: String },
    Stopped,
}

struct Shared {
    parser: LineParser,
    state: RwLock<MonitorState>,
    tx: broadcast::Sender<MonitorEvent>,
}

impl Shared {
    async fn ingest(&self, lines: &[String]) -> BatchSummary {
        let requests = group_by_request(self.parser.parse_lines(lines));
        let summary = self.state.write().await.apply(requests);
        debug!(
            lines = lines.len(),
            new_requests = summary.new_requests,
            new_orphans = summary.new_orphans,
            reconciled = summary.reconciled,
            pending_orphans = summary.pending_orphans,
            "Applied batch"
        );
        let _ = self.tx.send(MonitorEvent::BatchApplied(summary));
        summary
    }
}

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Monitor {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl Monitor {
    pub fn new(parser: LineParser) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            shared: Arc::new(Shared {
                parser,
                state: RwLock::new(MonitorState::new()),
                tx,
            }),
            running: Mutex::new(None),
        }
    }

    /// The correlation table the parser registers jobs in.
    pub fn correlation(&self) -> &CorrelationTable {
        self.shared.parser.correlation()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        match self.running.lock() {
            Ok(running) => running.is_some(),
            Err(e) => {
                tracing::error!("Mutex poisoned reading monitor task: {e}");
                false
            }
        }
    }

    /// Start following `source`. Returns `false` (and drops `source`) when
    /// the monitor is already running.
    pub fn start<S>(&self, source: S) -> bool
    where
        S: LineSource + 'static,
    {
        let mut running = match self.running.lock() {
            Ok(running) => running,
            Err(e) => {
                tracing::error!("Mutex poisoned starting monitor: {e}");
                return false;
            }
        };
        if running.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run(self.shared.clone(), source, token.clone()));
        *running = Some(Running { token, handle });
        true
    }

    /// Ask the loop to finish. Returns immediately; safe to call when idle.
    pub fn stop(&self) {
        if let Some(running) = self.take_running() {
            running.token.cancel();
        }
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(&self) {
        if let Some(running) = self.take_running() {
            running.token.cancel();
            if let Err(e) = running.handle.await {
                warn!(error = %e, "Monitor task ended abnormally");
            }
        }
    }

    fn take_running(&self) -> Option<Running> {
        match self.running.lock() {
            Ok(mut running) => running.take(),
            Err(e) => {
                tracing::error!("Mutex poisoned stopping monitor: {e}");
                None
            }
        }
    }

    /// Feed lines directly, e.g. the backfill read before following a file.
    pub async fn ingest(&self, lines: &[String]) -> BatchSummary {
        self.shared.ingest(lines).await
    }

    /// Owned copy of the current requests and pending orphans.
    pub async fn snapshot(&self) -> Collection {
        self.shared.state.read().await.snapshot()
    }

    pub async fn orphan_count(&self) -> usize {
        self.shared.state.read().await.orphan_requests().len()
    }

    /// Drop all requests, orphans and job mappings.
    pub async fn reset(&self) {
        self.shared.state.write().await.clear();
        self.correlation().reset();
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run<S: LineSource>(shared: Arc<Shared>, mut source: S, token: CancellationToken) {
    info!("Monitor started");
    let _ = shared.tx.send(MonitorEvent::Started);

    loop {
        let batch = tokio::select! {
            _ = token.cancelled() => break,
            batch = source.next_batch() => batch,
        };

        match batch {
            Ok(lines) => {
                shared.ingest(&lines).await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read log source, retrying in {:?}", RETRY_DELAY);
                let _ = shared.tx.send(MonitorEvent::SourceError {
                    message: e.to_string(),
                });
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }

    info!("Monitor stopped");
    let _ = shared.tx.send(MonitorEvent::Stopped);
}
