// crates/core/src/entry.rs
//! Classified log entries.
//!
//! Every decoded JSON line becomes one [`Entry`]. Its [`EntryKind`] is decided
//! once, in [`Entry::from_data`], by the first matching rule:
//!
//! 1. `method` + `path` + `status` at the top level or under `payload` → HTTP request
//! 2. message contains `CACHE` → cache query
//! 3. message contains an SQL verb → SQL query
//! 4. message contains the `↳` call-site marker → SQL call line
//! 5. message matches `Enqueued <Job> (Job ID: <id>)` → job enqueue
//! 6. anything else → other

use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use regex_lite::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::text_format::strip_ansi_codes;

/// Keywords that mark a line as an SQL statement.
pub const SQL_KEYWORDS: [&str; 9] = [
    "SELECT",
    "INSERT",
    "UPDATE",
    "DELETE",
    "TRANSACTION",
    "BEGIN",
    "COMMIT",
    "ROLLBACK",
    "SAVEPOINT",
];

/// Marker ActiveRecord prints before the source location of a query.
pub const CALL_LINE_MARKER: &str = "↳";

static JOB_ENQUEUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Enqueued .+ \(Job ID: .+\)").expect("static pattern compiles"));
static JOB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Job ID: ([^\)]+)").expect("static pattern compiles"));
static QUERY_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((\d+(?:\.\d+)?)ms\)").expect("static pattern compiles")
});

/// Flat discriminant of [`EntryKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    HttpRequest,
    SqlQuery,
    CacheQuery,
    SqlCallLine,
    JobEnqueue,
    Other,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpRequest => "http_request",
            Self::SqlQuery => "sql_query",
            Self::CacheQuery => "cache_query",
            Self::SqlCallLine => "sql_call_line",
            Self::JobEnqueue => "job_enqueue",
            Self::Other => "other",
        }
    }
}

/// Request parameters as logged: decoded JSON, or the raw string when the
/// logged string was not valid JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Params {
    Decoded(Value),
    Raw(String),
}

impl Params {
    fn from_value(value: Option<&Value>) -> Option<Self> {
        match value? {
            Value::String(s) => Some(match serde_json::from_str(s) {
                Ok(decoded) => Self::Decoded(decoded),
                Err(_) => Self::Raw(s.clone()),
            }),
            obj @ Value::Object(_) => Some(Self::Decoded(obj.clone())),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Decoded(v) => v.as_object(),
            Self::Raw(_) => None,
        }
    }
}

/// Fields of an HTTP request/response cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpFields {
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<u16>,
    /// Milliseconds; top-level `duration_ms` (SemanticLogger) or `duration` (lograge).
    pub duration: Option<f64>,
    pub controller: Option<String>,
    pub action: Option<String>,
    pub params: Option<Params>,
}

impl HttpFields {
    fn from_data(data: &Map<String, Value>) -> Self {
        let source = data
            .get("payload")
            .and_then(Value::as_object)
            .unwrap_or(data);

        Self {
            method: scalar_text(source.get("method")),
            path: scalar_text(source.get("path")),
            status: source.get("status").and_then(status_code),
            duration: data
                .get("duration_ms")
                .and_then(Value::as_f64)
                .or_else(|| source.get("duration").and_then(Value::as_f64)),
            controller: scalar_text(source.get("controller")),
            action: scalar_text(source.get("action")),
            params: Params::from_value(source.get("params")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryOperation {
    Select,
    Insert,
    Update,
    Delete,
    Transaction,
}

impl QueryOperation {
    fn detect(message: &str) -> Option<Self> {
        if message.contains("SELECT") {
            Some(Self::Select)
        } else if message.contains("INSERT") {
            Some(Self::Insert)
        } else if message.contains("UPDATE") {
            Some(Self::Update)
        } else if message.contains("DELETE") {
            Some(Self::Delete)
        } else if ["TRANSACTION", "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT"]
            .iter()
            .any(|kw| message.contains(kw))
        {
            Some(Self::Transaction)
        } else {
            None
        }
    }
}

/// An SQL or cache access line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryEntry {
    pub cached: bool,
    pub operation: Option<QueryOperation>,
    pub duration_ms: Option<f64>,
}

impl QueryEntry {
    fn from_message(message: &str, data: &Map<String, Value>, cached: bool) -> Self {
        let plain = strip_ansi_codes(message);
        let duration_ms = QUERY_DURATION
            .captures(&plain)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .or_else(|| data.get("duration_ms").and_then(Value::as_f64))
            .or_else(|| data.get("duration").and_then(Value::as_f64));

        Self {
            cached,
            operation: QueryOperation::detect(&plain),
            duration_ms,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Cache lines are always hits; misses fall through to a real query.
    pub fn is_hit(&self) -> bool {
        self.cached
    }

    pub fn is_select(&self) -> bool {
        self.operation == Some(QueryOperation::Select)
    }

    pub fn is_insert(&self) -> bool {
        self.operation == Some(QueryOperation::Insert)
    }

    pub fn is_update(&self) -> bool {
        self.operation == Some(QueryOperation::Update)
    }

    pub fn is_delete(&self) -> bool {
        self.operation == Some(QueryOperation::Delete)
    }

    pub fn is_transaction(&self) -> bool {
        self.operation == Some(QueryOperation::Transaction)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEnqueue {
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    HttpRequest(HttpFields),
    Query(QueryEntry),
    SqlCallLine,
    JobEnqueue(JobEnqueue),
    Other,
}

/// One classified log line.
///
/// The kind is fixed at construction. The only post-construction changes are
/// the parser's enrichment steps, which consume the entry and return a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    kind: EntryKind,
    timestamp: DateTime<Utc>,
    content: String,
    request_id: Option<String>,
    data: Map<String, Value>,
}

impl Entry {
    /// Classify a decoded JSON object and build the matching entry.
    pub fn from_data(data: Map<String, Value>) -> Self {
        let content = normalize_message(data.get("message"));
        let kind = match classify(&data) {
            EntryType::HttpRequest => EntryKind::HttpRequest(HttpFields::from_data(&data)),
            EntryType::CacheQuery => EntryKind::Query(QueryEntry::from_message(&content, &data, true)),
            EntryType::SqlQuery => EntryKind::Query(QueryEntry::from_message(&content, &data, false)),
            EntryType::SqlCallLine => EntryKind::SqlCallLine,
            EntryType::JobEnqueue => EntryKind::JobEnqueue(JobEnqueue {
                job_id: extract_job_id(&content),
            }),
            EntryType::Other => EntryKind::Other,
        };

        Self {
            kind,
            timestamp: parse_timestamp(data.get("timestamp")),
            request_id: extract_request_id(&data),
            content,
            data,
        }
    }

    /// An empty HTTP-request entry carrying only a correlation key.
    pub(crate) fn request_shell(request_id: String) -> Self {
        let mut data = Map::new();
        data.insert("request_id".into(), Value::from(request_id.clone()));
        Self {
            kind: EntryKind::HttpRequest(HttpFields::default()),
            timestamp: Utc::now(),
            content: String::new(),
            request_id: Some(request_id),
            data,
        }
    }

    pub(crate) fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub(crate) fn with_content(mut self, content: String) -> Self {
        self.content = content;
        self
    }

    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    pub fn entry_type(&self) -> EntryType {
        match &self.kind {
            EntryKind::HttpRequest(_) => EntryType::HttpRequest,
            EntryKind::Query(q) if q.cached => EntryType::CacheQuery,
            EntryKind::Query(_) => EntryType::SqlQuery,
            EntryKind::SqlCallLine => EntryType::SqlCallLine,
            EntryKind::JobEnqueue(_) => EntryType::JobEnqueue,
            EntryKind::Other => EntryType::Other,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// The decoded JSON object backing this entry.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn level(&self) -> Option<&str> {
        self.data.get("level").and_then(Value::as_str)
    }

    pub fn tags(&self) -> Option<&Value> {
        self.data.get("tags")
    }

    pub fn is_http_request(&self) -> bool {
        matches!(self.kind, EntryKind::HttpRequest(_))
    }

    /// Everything except HTTP requests can hang off a request.
    pub fn is_related_log(&self) -> bool {
        !self.is_http_request()
    }

    pub fn http(&self) -> Option<&HttpFields> {
        match &self.kind {
            EntryKind::HttpRequest(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&QueryEntry> {
        match &self.kind {
            EntryKind::Query(q) => Some(q),
            _ => None,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::JobEnqueue(job) => job.job_id.as_deref(),
            _ => None,
        }
    }
}

/// Pick the entry type for a decoded object; first matching rule wins.
pub fn classify(data: &Map<String, Value>) -> EntryType {
    if is_http_request(data) {
        return EntryType::HttpRequest;
    }
    let message = normalize_message(data.get("message"));
    if message.contains("CACHE") {
        EntryType::CacheQuery
    } else if SQL_KEYWORDS.iter().any(|kw| message.contains(kw)) {
        EntryType::SqlQuery
    } else if message.contains(CALL_LINE_MARKER) {
        EntryType::SqlCallLine
    } else if JOB_ENQUEUE.is_match(&message) {
        EntryType::JobEnqueue
    } else {
        EntryType::Other
    }
}

/// `method`, `path` and `status` all present, either at the top level
/// (lograge) or under `payload` (SemanticLogger).
pub fn is_http_request(data: &Map<String, Value>) -> bool {
    let has_request_fields = |source: &Map<String, Value>| {
        ["method", "path", "status"]
            .iter()
            .all(|key| is_present(source.get(*key)))
    };
    has_request_fields(data)
        || data
            .get("payload")
            .and_then(Value::as_object)
            .is_some_and(has_request_fields)
}

/// Collapse a message value to one string: lists are space-joined, a
/// missing or null message is empty.
pub fn normalize_message(message: Option<&Value>) -> String {
    match message {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| normalize_message(Some(item)))
            .collect::<Vec<_>>()
            .join(" "),
        Some(other) => other.to_string(),
    }
}

/// Job id from an `Enqueued X (Job ID: <id>) ...` message.
pub fn extract_job_id(message: &str) -> Option<String> {
    JOB_ID
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse a logged timestamp, falling back to now when absent or unparseable.
pub fn parse_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .and_then(parse_timestamp_str)
        .unwrap_or_else(Utc::now)
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| match Local.from_local_datetime(&naive).earliest() {
            Some(local) => local.with_timezone(&Utc),
            None => naive.and_utc(),
        })
}

fn extract_request_id(data: &Map<String, Value>) -> Option<String> {
    scalar_text(data.get("request_id")).or_else(|| {
        data.get("payload")
            .and_then(Value::as_object)
            .and_then(|payload| scalar_text(payload.get("request_id")))
    })
}

fn is_present(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null) | Some(Value::Bool(false)))
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn status_code(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u16::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
