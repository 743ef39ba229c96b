//! Filterable, sortable views over grouped requests.

use std::ops::RangeBounds;

use crate::grouping::group_by_request;
use crate::parser::LineParser;
use crate::request::Request;

/// A set of requests plus the orphans from the same input.
///
/// Every filter and sort works on the non-orphan requests and returns a new
/// collection (without orphans); the source is never modified.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    requests: Vec<Request>,
    orphans: Vec<Request>,
}

impl Collection {
    /// Parse and group `lines` in one go.
    pub fn from_lines<I, S>(parser: &LineParser, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_requests(group_by_request(parser.parse_lines(lines)))
    }

    /// Split `requests` into real requests and orphans, keeping order.
    pub fn from_requests(requests: impl IntoIterator<Item = Request>) -> Self {
        let (orphans, requests) = requests.into_iter().partition(Request::is_orphan);
        Self { requests, orphans }
    }

    /// Real and orphan requests together.
    pub fn len(&self) -> usize {
        self.requests.len() + self.orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn orphan_requests(&self) -> &[Request] {
        &self.orphans
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Request> {
        self.requests.iter()
    }

    fn select(&self, keep: impl Fn(&Request) -> bool) -> Self {
        Self {
            requests: self.requests.iter().filter(|r| keep(r)).cloned().collect(),
            orphans: Vec::new(),
        }
    }

    /// Case-insensitive on the argument: `"get"` matches `GET` requests.
    pub fn filter_by_method(&self, method: &str) -> Self {
        let method = method.to_uppercase();
        self.select(|r| r.method() == Some(method.as_str()))
    }

    /// Requests whose path contains `pattern`.
    pub fn filter_by_path(&self, pattern: &str) -> Self {
        self.select(|r| r.path().is_some_and(|p| p.contains(pattern)))
    }

    /// Requests whose status lies in `range`; requests without a status never match.
    pub fn filter_by_status<R: RangeBounds<u16>>(&self, range: R) -> Self {
        self.select(|r| r.status().is_some_and(|s| range.contains(&s)))
    }

    /// Requests slower than `threshold_ms` (strictly greater).
    pub fn slow_requests(&self, threshold_ms: f64) -> Self {
        self.select(|r| r.duration().is_some_and(|d| d > threshold_ms))
    }

    /// Slowest first; requests without a duration count as 0 ms.
    pub fn sort_by_duration(&self) -> Self {
        let mut requests = self.requests.clone();
        requests.sort_by(|a, b| {
            let (a, b) = (a.duration().unwrap_or(0.0), b.duration().unwrap_or(0.0));
            b.total_cmp(&a)
        });
        Self {
            requests,
            orphans: Vec::new(),
        }
    }

    /// Oldest first.
    pub fn sort_by_timestamp(&self) -> Self {
        let mut requests = self.requests.clone();
        requests.sort_by_key(Request::timestamp);
        Self {
            requests,
            orphans: Vec::new(),
        }
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Request;
    type IntoIter = std::slice::Iter<'a, Request>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
