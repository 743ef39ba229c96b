// Integration tests for the live monitor: file following, cross-batch job
// attribution, retry on read failures, and stop semantics.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log_bench_core::{CorrelationTable, LineParser, LoggerType};
use log_bench_monitor::{
    open_log, ChannelSource, LineSource, Monitor, MonitorEvent, SourceError,
};
use tokio::sync::broadcast;
use tokio_test::assert_pending;

fn monitor() -> Monitor {
    Monitor::new(LineParser::new(LoggerType::Lograge, CorrelationTable::new()))
}

fn append(path: &Path, lines: &[&str]) {
    // One write, so the poller sees the whole group in a single batch.
    let text: String = lines.iter().map(|line| format!("{line}\n")).collect();
    let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(text.as_bytes()).unwrap();
}

async fn next_batch_event(rx: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event @ MonitorEvent::BatchApplied(_)) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event channel failed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a batch")
}

#[tokio::test]
async fn follows_file_and_attributes_job_output() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let path = tmp.path();
    append(
        path,
        &[
            r#"{"method":"POST","path":"/orders","status":201,"duration":80.0,"request_id":"R","timestamp":"2025-01-01T10:00:00Z"}"#,
            r#"{"message":"Enqueued ChargeJob (Job ID: J1) to Async(default)","request_id":"R","tags":["ActiveJob"],"timestamp":"2025-01-01T10:00:00Z"}"#,
        ],
    );

    let m = monitor();
    let (backfill, log) = open_log(path, 1000, Duration::from_millis(10)).await.unwrap();
    assert_eq!(backfill.len(), 2);
    m.ingest(&backfill).await;
    assert_eq!(m.correlation().lookup("J1").as_deref(), Some("R"));

    let mut rx = m.subscribe();
    assert!(m.start(log));

    append(
        path,
        &[
            r#"{"message":"Performing ChargeJob","tags":["ActiveJob","ChargeJob","J1"],"timestamp":"2025-01-01T10:00:01Z"}"#,
            r#"{"message":"Enqueued ReceiptJob (Job ID: J2) to Async(default)","tags":["ActiveJob","ChargeJob","J1"],"timestamp":"2025-01-01T10:00:01Z"}"#,
        ],
    );
    match next_batch_event(&mut rx).await {
        MonitorEvent::BatchApplied(summary) => {
            assert_eq!(summary.new_requests, 0);
            assert_eq!(summary.reconciled, 1);
            assert_eq!(summary.pending_orphans, 0);
        }
        other => panic!("unexpected event {other:?}"),
    }

    append(
        path,
        &[r#"{"message":"Performing ReceiptJob","tags":["ActiveJob","ReceiptJob","J2"],"timestamp":"2025-01-01T10:00:02Z"}"#],
    );
    next_batch_event(&mut rx).await;

    m.shutdown().await;

    assert_eq!(m.correlation().lookup("J2").as_deref(), Some("R"));
    let snapshot = m.snapshot().await;
    assert_eq!(snapshot.requests().len(), 1);
    assert!(snapshot.orphan_requests().is_empty());
    let related = snapshot.requests()[0].related_logs();
    assert_eq!(related.len(), 4);
    assert!(related[1].content().contains("[ChargeJob#J1]"));
    assert!(related[3].content().contains("[ReceiptJob#J2]"));
}

#[tokio::test]
async fn line_in_progress_at_open_is_followed_whole() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let path = tmp.path();
    let first = r#"{"method":"GET","path":"/a","status":200,"request_id":"r1"}"#;
    std::fs::write(path, format!("{first}\n{{\"method\":\"GET\",\"path\":\"/b\",")).unwrap();

    let (backfill, mut log) = open_log(path, 1000, Duration::from_millis(10)).await.unwrap();
    assert_eq!(backfill, [first]);

    append(path, &[r#""status":200,"request_id":"r2"}"#]);
    let followed = log.read_appended().await.unwrap();
    assert_eq!(
        followed,
        [r#"{"method":"GET","path":"/b","status":200,"request_id":"r2"}"#]
    );

    let m = monitor();
    m.ingest(&backfill).await;
    m.ingest(&followed).await;
    let paths: Vec<_> = m
        .snapshot()
        .await
        .iter()
        .filter_map(|r| r.path().map(str::to_string))
        .collect();
    assert_eq!(paths, ["/a", "/b"]);
}

#[tokio::test]
async fn orphan_from_live_batch_waits_for_its_request() {
    let m = monitor();
    let (tx, source) = ChannelSource::new(4);
    let mut rx = m.subscribe();
    m.start(source);

    tx.send(vec![r#"{"message":"early line","request_id":"r1"}"#.to_string()])
        .await
        .unwrap();
    next_batch_event(&mut rx).await;
    assert_eq!(m.orphan_count().await, 1);

    tx.send(vec![r#"{"method":"GET","path":"/","status":200,"request_id":"r1"}"#.to_string()])
        .await
        .unwrap();
    next_batch_event(&mut rx).await;
    assert_eq!(m.orphan_count().await, 0);
    assert_eq!(m.snapshot().await.requests()[0].related_logs().len(), 1);

    m.shutdown().await;
}

/// Fails a fixed number of reads, then yields one batch, then blocks forever.
struct FlakySource {
    failures_left: usize,
    attempts: Arc<AtomicUsize>,
    delivered: bool,
}

#[async_trait]
impl LineSource for FlakySource {
    async fn next_batch(&mut self) -> Result<Vec<String>, SourceError> {
        if self.delivered {
            std::future::pending::<()>().await;
        }
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(SourceError::io(
                "/var/log/app.log",
                std::io::Error::new(std::io::ErrorKind::Interrupted, "rotating"),
            ));
        }
        self.delivered = true;
        Ok(vec![r#"{"method":"GET","path":"/","status":200,"request_id":"r1"}"#.to_string()])
    }
}

#[tokio::test(start_paused = true)]
async fn read_errors_are_retried_until_success() {
    let m = monitor();
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut rx = m.subscribe();
    m.start(FlakySource {
        failures_left: 3,
        attempts: attempts.clone(),
        delivered: false,
    });

    let mut errors = 0;
    loop {
        match rx.recv().await.unwrap() {
            MonitorEvent::SourceError { message } => {
                assert!(message.contains("/var/log/app.log"));
                errors += 1;
            }
            MonitorEvent::BatchApplied(summary) => {
                assert_eq!(summary.new_requests, 1);
                break;
            }
            _ => {}
        }
    }

    assert_eq!(errors, 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert!(m.is_running());
    m.shutdown().await;
}

#[tokio::test]
async fn stop_does_not_wait_for_a_blocked_read() {
    let m = monitor();
    let (_tx, source) = ChannelSource::new(1);
    let mut rx = m.subscribe();
    m.start(source);

    m.stop();
    m.stop();
    assert!(!m.is_running());

    let stopped = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(MonitorEvent::Stopped) = rx.recv().await {
                return;
            }
        }
    })
    .await;
    assert!(stopped.is_ok());

    // Restart after stop.
    let (_tx, source) = ChannelSource::new(1);
    assert!(m.start(source));
    m.shutdown().await;
}

#[tokio::test]
async fn closed_channel_source_stays_pending() {
    let (tx, mut source) = ChannelSource::new(1);
    drop(tx);
    let mut next = tokio_test::task::spawn(source.next_batch());
    assert_pending!(next.poll());
}
