//! HTTP requests and the log lines attached to them.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::entry::{Entry, HttpFields, Params};

/// One HTTP request/response cycle plus every related entry seen for its
/// correlation key.
///
/// Orphans are shells synthesized for a correlation key whose request line
/// has not been seen (yet). They carry no HTTP fields.
#[derive(Debug, Clone)]
pub struct Request {
    entry: Entry,
    related_logs: Vec<Entry>,
    orphan: bool,
    derived: OnceLock<Derived>,
}

/// Index-based views over `related_logs`, rebuilt on first access after a change.
#[derive(Debug, Clone, Default)]
struct Derived {
    queries: Vec<usize>,
    cache_operations: Vec<usize>,
    sql_queries: Vec<usize>,
    total_query_time: f64,
}

impl Request {
    /// Wrap an HTTP-request entry. Any other kind is handed back unchanged.
    pub fn from_entry(entry: Entry) -> Result<Self, Entry> {
        if !entry.is_http_request() {
            return Err(entry);
        }
        Ok(Self {
            entry,
            related_logs: Vec::new(),
            orphan: false,
            derived: OnceLock::new(),
        })
    }

    pub fn new_orphan(request_id: impl Into<String>) -> Self {
        Self {
            entry: Entry::request_shell(request_id.into()),
            related_logs: Vec::new(),
            orphan: true,
            derived: OnceLock::new(),
        }
    }

    /// Append a related entry. HTTP-request entries are ignored.
    pub fn add_related_log(&mut self, entry: Entry) {
        if entry.is_related_log() {
            self.related_logs.push(entry);
            self.derived = OnceLock::new();
        }
    }

    /// Move every related entry of `orphan` onto this request, keeping order.
    pub fn absorb(&mut self, orphan: Request) {
        for entry in orphan.related_logs {
            self.add_related_log(entry);
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn is_orphan(&self) -> bool {
        self.orphan
    }

    pub fn request_id(&self) -> Option<&str> {
        self.entry.request_id()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.entry.timestamp()
    }

    pub fn content(&self) -> &str {
        self.entry.content()
    }

    fn fields(&self) -> Option<&HttpFields> {
        self.entry.http()
    }

    pub fn method(&self) -> Option<&str> {
        self.fields()?.method.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.fields()?.path.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.fields()?.status
    }

    /// Milliseconds.
    pub fn duration(&self) -> Option<f64> {
        self.fields()?.duration
    }

    pub fn controller(&self) -> Option<&str> {
        self.fields()?.controller.as_deref()
    }

    pub fn action(&self) -> Option<&str> {
        self.fields()?.action.as_deref()
    }

    pub fn params(&self) -> Option<&Params> {
        self.fields()?.params.as_ref()
    }

    pub fn related_logs(&self) -> &[Entry] {
        &self.related_logs
    }

    fn derived(&self) -> &Derived {
        self.derived.get_or_init(|| {
            let mut derived = Derived::default();
            for (idx, entry) in self.related_logs.iter().enumerate() {
                let Some(query) = entry.as_query() else {
                    continue;
                };
                derived.queries.push(idx);
                derived.total_query_time += query.duration_ms.unwrap_or(0.0);
                if query.is_cached() {
                    derived.cache_operations.push(idx);
                } else {
                    derived.sql_queries.push(idx);
                }
            }
            derived
        })
    }

    fn pick(&self, indices: &[usize]) -> Vec<&Entry> {
        indices.iter().map(|&i| &self.related_logs[i]).collect()
    }

    /// SQL and cache entries, in arrival order.
    pub fn queries(&self) -> Vec<&Entry> {
        self.pick(&self.derived().queries)
    }

    pub fn cache_operations(&self) -> Vec<&Entry> {
        self.pick(&self.derived().cache_operations)
    }

    pub fn sql_queries(&self) -> Vec<&Entry> {
        self.pick(&self.derived().sql_queries)
    }

    pub fn query_count(&self) -> usize {
        self.derived().queries.len()
    }

    pub fn cached_query_count(&self) -> usize {
        self.derived().cache_operations.len()
    }

    /// Sum of query durations in milliseconds; queries without a duration count as 0.
    pub fn total_query_time(&self) -> f64 {
        self.derived().total_query_time
    }

    pub fn is_success(&self) -> bool {
        self.status().is_some_and(|s| (200..300).contains(&s))
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }
}

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Request", 14)?;
        state.serialize_field("request_id", &self.request_id())?;
        state.serialize_field("timestamp", &self.timestamp())?;
        state.serialize_field("method", &self.method())?;
        state.serialize_field("path", &self.path())?;
        state.serialize_field("status", &self.status())?;
        state.serialize_field("duration", &self.duration())?;
        state.serialize_field("controller", &self.controller())?;
        state.serialize_field("action", &self.action())?;
        state.serialize_field("params", &self.params())?;
        state.serialize_field("orphan", &self.orphan)?;
        state.serialize_field("query_count", &self.query_count())?;
        state.serialize_field("cached_query_count", &self.cached_query_count())?;
        state.serialize_field("total_query_time", &self.total_query_time())?;
        state.serialize_field("related_logs", &self.related_logs)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn entry(value: Value) -> Entry {
        match value {
            Value::Object(map) => Entry::from_data(map),
            other => panic!("expected object, got {other}"),
        }
    }

    fn request(status: u16) -> Request {
        Request::from_entry(entry(json!({
            "method": "GET", "path": "/users", "status": status, "duration": 45.2,
            "controller": "UsersController", "action": "index", "request_id": "abc123"
        })))
        .unwrap()
    }

    #[test]
    fn test_from_entry_rejects_non_requests() {
        let other = entry(json!({"message": "hello", "request_id": "r"}));
        let back = Request::from_entry(other).unwrap_err();
        assert_eq!(back.content(), "hello");
    }

    #[test]
    fn test_accessors() {
        let req = request(200);
        assert_eq!(req.method(), Some("GET"));
        assert_eq!(req.path(), Some("/users"));
        assert_eq!(req.status(), Some(200));
        assert_eq!(req.duration(), Some(45.2));
        assert_eq!(req.controller(), Some("UsersController"));
        assert_eq!(req.action(), Some("index"));
        assert_eq!(req.request_id(), Some("abc123"));
        assert!(!req.is_orphan());
    }

    #[test]
    fn test_status_classes() {
        assert!(request(200).is_success());
        assert!(request(404).is_client_error());
        assert!(request(500).is_server_error());
        assert!(!request(302).is_success());
        assert!(!Request::new_orphan("x").is_success());
    }

    #[test]
    fn test_orphan_shell() {
        let orphan = Request::new_orphan("req-1");
        assert!(orphan.is_orphan());
        assert_eq!(orphan.request_id(), Some("req-1"));
        assert_eq!(orphan.method(), None);
        assert!(orphan.related_logs().is_empty());
    }

    #[test]
    fn test_query_views_refresh_after_add() {
        let mut req = request(200);
        req.add_related_log(entry(json!({"message": "User Load (1.5ms)  SELECT * FROM users"})));
        assert_eq!(req.query_count(), 1);
        assert_eq!(req.cached_query_count(), 0);

        req.add_related_log(entry(json!({"message": "CACHE User Load (0.1ms)  SELECT * FROM users"})));
        req.add_related_log(entry(json!({"message": "  ↳ app/controllers/users_controller.rb:5"})));
        req.add_related_log(entry(json!({"message": "Post Load (2.0ms)  SELECT * FROM posts"})));

        assert_eq!(req.related_logs().len(), 4);
        assert_eq!(req.query_count(), 3);
        assert_eq!(req.cached_query_count(), 1);
        assert_eq!(req.sql_queries().len(), 2);
        assert_eq!(req.cache_operations()[0].content(), "CACHE User Load (0.1ms)  SELECT * FROM users");
        assert!((req.total_query_time() - 3.6).abs() < 1e-9);
    }

    #[test]
    fn test_add_related_log_ignores_requests() {
        let mut req = request(200);
        req.add_related_log(entry(json!({"method": "GET", "path": "/x", "status": 200})));
        assert!(req.related_logs().is_empty());
    }

    #[test]
    fn test_absorb_keeps_order() {
        let mut req = request(200);
        req.add_related_log(entry(json!({"message": "first"})));
        let mut orphan = Request::new_orphan("abc123");
        orphan.add_related_log(entry(json!({"message": "second"})));
        orphan.add_related_log(entry(json!({"message": "third"})));

        req.absorb(orphan);
        let contents: Vec<_> = req.related_logs().iter().map(Entry::content).collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[test]
    fn test_serialize_summary() {
        let mut req = request(201);
        req.add_related_log(entry(json!({"message": "User Load (1.0ms)  SELECT 1"})));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["method"], "GET");
        assert_eq!(value["status"], 201);
        assert_eq!(value["query_count"], 1);
        assert_eq!(value["orphan"], false);
        assert_eq!(value["related_logs"][0]["content"], "User Load (1.0ms)  SELECT 1");
    }
}
