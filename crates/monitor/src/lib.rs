// crates/monitor/src/lib.rs
pub mod monitor;
pub mod source;
pub mod state;
pub mod tail;

use std::path::Path;
use std::time::Duration;

pub use monitor::{Monitor, MonitorEvent, RETRY_DELAY};
pub use source::{ChannelSource, LineSource, LogFile, SourceError};
pub use state::{BatchSummary, MonitorState, MAX_REQUESTS};
pub use tail::tail_lines;

/// Open `path` for a live session: the last `backfill` complete lines already
/// in the file, plus a [`LogFile`] positioned right after them. An unfinished
/// last line is left to the follower.
pub async fn open_log(
    path: &Path,
    backfill: usize,
    poll_interval: Duration,
) -> Result<(Vec<String>, LogFile), SourceError> {
    let log = LogFile::from_end(path, poll_interval).await?;
    let lines = tail::tail_lines_before(path, backfill, log.offset()).await?;
    Ok((lines, log))
}
