//! Long-lived monitor state: bounded request list plus pending orphans.

use std::collections::VecDeque;

use log_bench_core::{Collection, Request};
use serde::Serialize;

/// Requests kept in memory; older ones are evicted first.
pub const MAX_REQUESTS: usize = 1000;

/// What applying one batch did to the state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub new_requests: usize,
    pub new_orphans: usize,
    /// Orphans whose entries moved onto a known request.
    pub reconciled: usize,
    /// Orphans still waiting for their request.
    pub pending_orphans: usize,
    pub evicted: usize,
}

#[derive(Debug, Default)]
pub struct MonitorState {
    requests: VecDeque<Request>,
    orphans: Vec<Request>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one grouped batch.
    ///
    /// New requests are appended in batch order and the list is cut back to
    /// [`MAX_REQUESTS`]. New orphans join the pending list, then every pending
    /// orphan whose request id matches a kept request hands its entries over
    /// (to the first match) and is dropped.
    pub fn apply(&mut self, batch: Vec<Request>) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for request in batch {
            if request.is_orphan() {
                summary.new_orphans += 1;
                self.orphans.push(request);
            } else {
                summary.new_requests += 1;
                self.requests.push_back(request);
            }
        }

        while self.requests.len() > MAX_REQUESTS {
            self.requests.pop_front();
            summary.evicted += 1;
        }

        for orphan in std::mem::take(&mut self.orphans) {
            let target = orphan
                .request_id()
                .and_then(|id| self.requests.iter().position(|r| r.request_id() == Some(id)));
            match target {
                Some(idx) => {
                    self.requests[idx].absorb(orphan);
                    summary.reconciled += 1;
                }
                None => self.orphans.push(orphan),
            }
        }

        summary.pending_orphans = self.orphans.len();
        summary
    }

    pub fn requests(&self) -> &VecDeque<Request> {
        &self.requests
    }

    pub fn orphan_requests(&self) -> &[Request] {
        &self.orphans
    }

    /// Owned copy of requests and orphans, in insertion order.
    pub fn snapshot(&self) -> Collection {
        Collection::from_requests(self.requests.iter().chain(&self.orphans).cloned())
    }

    pub fn clear(&mut self) {
        self.requests.clear();
        self.orphans.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log_bench_core::{group_by_request, CorrelationTable, LineParser, LoggerType};
    use pretty_assertions::assert_eq;

    fn batch(lines: &[String]) -> Vec<Request> {
        let parser = LineParser::new(LoggerType::Lograge, CorrelationTable::new());
        group_by_request(parser.parse_lines(lines))
    }

    fn request(id: &str) -> String {
        format!(
            r#"{{"method":"GET","path":"/{id}","status":200,"request_id":"{id}","timestamp":"2025-01-01T10:00:00Z"}}"#
        )
    }

    fn related(id: &str, message: &str) -> String {
        format!(r#"{{"message":"{message}","request_id":"{id}"}}"#)
    }

    #[test]
    fn orphan_waits_then_reconciles() {
        let mut state = MonitorState::new();

        let first = state.apply(batch(&[related("r1", "early")]));
        assert_eq!(first.new_orphans, 1);
        assert_eq!(first.pending_orphans, 1);
        assert_eq!(first.reconciled, 0);

        let second = state.apply(batch(&[request("r1")]));
        assert_eq!(second.new_requests, 1);
        assert_eq!(second.reconciled, 1);
        assert_eq!(second.pending_orphans, 0);

        let req = &state.requests()[0];
        assert_eq!(req.related_logs().len(), 1);
        assert_eq!(req.related_logs()[0].content(), "early");
        assert!(state.orphan_requests().is_empty());
    }

    #[test]
    fn late_lines_for_known_request_are_appended_in_order() {
        let mut state = MonitorState::new();
        state.apply(batch(&[request("r1"), related("r1", "a")]));
        state.apply(batch(&[related("r1", "b"), related("r1", "c")]));

        let contents: Vec<_> = state.requests()[0]
            .related_logs()
            .iter()
            .map(|e| e.content().to_string())
            .collect();
        assert_eq!(contents, ["a", "b", "c"]);
    }

    #[test]
    fn unmatched_orphans_stay_pending() {
        let mut state = MonitorState::new();
        state.apply(batch(&[related("x", "1")]));
        let summary = state.apply(batch(&[request("y")]));
        assert_eq!(summary.pending_orphans, 1);
        assert_eq!(state.orphan_requests()[0].request_id(), Some("x"));
    }

    #[test]
    fn request_list_is_bounded() {
        let mut state = MonitorState::new();
        let mut evicted = 0;
        for chunk in 0..3 {
            let lines: Vec<String> = (0..450).map(|i| request(&format!("r{chunk}-{i}"))).collect();
            evicted += state.apply(batch(&lines)).evicted;
            assert!(state.requests().len() <= MAX_REQUESTS);
        }
        assert_eq!(state.requests().len(), MAX_REQUESTS);
        assert_eq!(evicted, 350);
        // Oldest go first: everything from the first chunk before r0-350 is gone.
        assert_eq!(state.requests()[0].request_id(), Some("r0-350"));
        assert_eq!(state.requests()[MAX_REQUESTS - 1].request_id(), Some("r2-449"));
    }

    #[test]
    fn snapshot_is_detached() {
        let mut state = MonitorState::new();
        state.apply(batch(&[request("r1"), related("r2", "o")]));
        let snap = state.snapshot();
        state.clear();
        assert_eq!(snap.requests().len(), 1);
        assert_eq!(snap.orphan_requests().len(), 1);
        assert!(state.requests().is_empty());
    }
}
