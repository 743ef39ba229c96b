// crates/core/src/correlation.rs
//! Job id → request id table used to attribute job output to the request
//! that (transitively) enqueued the job.
//!
//! One table per session. Clones share the same underlying map, so the parser
//! and the monitor can hold their own handles.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Default)]
pub struct CorrelationTable {
    jobs: Arc<RwLock<HashMap<String, String>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `job_id` to `request_id`, replacing any earlier mapping.
    /// Does nothing when either id is missing.
    pub fn register(&self, job_id: Option<&str>, request_id: Option<&str>) {
        let (Some(job_id), Some(request_id)) = (job_id, request_id) else {
            return;
        };
        match self.jobs.write() {
            Ok(mut jobs) => {
                jobs.insert(job_id.to_string(), request_id.to_string());
            }
            Err(e) => tracing::error!("RwLock poisoned writing correlation table: {e}"),
        }
    }

    pub fn lookup(&self, job_id: &str) -> Option<String> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(job_id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading correlation table: {e}");
                None
            }
        }
    }

    /// Forget every mapping.
    pub fn reset(&self) {
        match self.jobs.write() {
            Ok(mut jobs) => jobs.clear(),
            Err(e) => tracing::error!("RwLock poisoned resetting correlation table: {e}"),
        }
    }

    /// Number of registered jobs. The table never evicts, so this only grows
    /// between resets.
    pub fn len(&self) -> usize {
        match self.jobs.read() {
            Ok(jobs) => jobs.len(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading correlation table: {e}");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
