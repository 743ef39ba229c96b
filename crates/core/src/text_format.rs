//! Converter for SemanticLogger's human-readable line format.
//!
//! SemanticLogger can write colorized text instead of JSON:
//! ```text
//! 2025-11-19 23:54:33.339411 \e[36mI\e[0m [1085:33304] \e[36mRails\e[0m -- Initializing AppLabels
//! 2025-11-19 23:55:26.926956 I [1176:puma] {request_id: 4e55e219-...} (203.2ms) UsersController -- Completed #new -- {method: "GET", ...}
//! ```
//! and, when piped through Ruby's `Logger`, each such line is wrapped again:
//! ```text
//! I, [2025-11-20T15:51:32.434612 #161]  INFO -- : 2025-11-20 15:51:32.434402 ...
//! ```
//! [`convert`] rewrites both shapes into the JSON object the line parser
//! already understands. Anything it cannot make sense of yields `None`.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::{json, Map, Value};

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| regex(r"^(\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d+)"));
static REQUEST_ID: LazyLock<Regex> = LazyLock::new(|| regex(r"request_id:\s*([a-f0-9\-]+)"));
static DURATION: LazyLock<Regex> = LazyLock::new(|| regex(r"\(([0-9.]+)(ms|s)\)"));
static COMPLETED_DATA: LazyLock<Regex> =
    LazyLock::new(|| regex(r"--\s+Completed\s+#\w+\s+--\s+\{(.+)\}\s*$"));
static LOGGER_WRAPPER: LazyLock<Regex> =
    LazyLock::new(|| regex(r"^[A-Z], \[[^\]]+\]\s+[A-Z]+\s+--\s*:\s*"));
static ANSI_CODE: LazyLock<Regex> = LazyLock::new(|| regex(r"\x1b\[[0-9;]*m"));
// Escape byte already stripped by an upstream wrapper, e.g. "[36mRails[0m".
static LITERAL_ANSI: LazyLock<Regex> = LazyLock::new(|| regex(r"\[[0-9;]*m"));

/// Keys read from a "Completed #action" payload, each with its compiled pattern.
static HASH_FIELDS: LazyLock<[(&str, Regex); 5]> = LazyLock::new(|| {
    ["method", "path", "status", "controller", "action"]
        .map(|key| (key, regex(&hash_field_pattern(key))))
});

static PLAIN_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"^\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d+\s+.*?\s+\[.*?\]\s+.*?--\s+")
});
static WRAPPED_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"^[A-Z], \[.*?\].*?--\s*:\s*\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d+")
});
static BASIC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    regex(
        r"^(\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d+)\s+(.*?)\s+\[(.*?)\]\s+(\{.*?\}\s+)?(\(.*?\)\s+)?(.*?)\s+--\s+(.+)$",
    )
});

/// Does `line` look like SemanticLogger text output (bare or logger-wrapped)?
pub fn is_human_readable(line: &str) -> bool {
    PLAIN_SHAPE.is_match(line) || WRAPPED_SHAPE.is_match(line)
}

/// Convert a human-readable line into a single-line JSON object string.
pub fn convert(line: &str) -> Option<String> {
    let value = convert_to_value(line)?;
    serde_json::to_string(&value).ok()
}

/// Same as [`convert`] but returns the decoded object.
pub fn convert_to_value(line: &str) -> Option<Value> {
    let line = strip_logger_wrapper(line);
    let converted = if line.contains("Completed #") {
        convert_completed_request(line)
    } else {
        convert_basic_log(line)
    };
    if converted.is_none() {
        tracing::debug!(line, "Could not convert SemanticLogger line");
    }
    converted
}

/// Remove real (`ESC[..m`) and literal (`[..m`) color codes.
pub fn strip_ansi_codes(text: &str) -> String {
    let without_escapes = ANSI_CODE.replace_all(text, "");
    LITERAL_ANSI.replace_all(&without_escapes, "").into_owned()
}

/// Strip a leading Ruby `Logger` envelope (`I, [ts #pid]  INFO -- : `), if any.
pub fn strip_logger_wrapper(line: &str) -> &str {
    match LOGGER_WRAPPER.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

/// Pull `key`'s value out of a Ruby-inspect style hash string.
///
/// Accepts `key: value`, `key: "value"` and `"key" => value`; the value ends
/// at a quote, comma, closing brace or whitespace.
pub fn extract_value_from_hash(hash: &str, key: &str) -> Option<String> {
    let compiled;
    let re = match HASH_FIELDS.iter().find(|(name, _)| *name == key) {
        Some((_, re)) => re,
        None => {
            compiled = Regex::new(&hash_field_pattern(key)).ok()?;
            &compiled
        }
    };
    re.captures(hash)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn hash_field_pattern(key: &str) -> String {
    let key = regex_lite::escape(key);
    format!(r#"(?:\b{key}|["']{key}["'])\s*(?::|=>)\s*["']?([^"',}}\s]+)"#)
}

fn map_level(level: &str) -> String {
    match level {
        "T" => "trace".into(),
        "D" => "debug".into(),
        "I" => "info".into(),
        "W" => "warn".into(),
        "E" => "error".into(),
        "F" => "fatal".into(),
        other => other.to_lowercase(),
    }
}

fn extract_request_id(text: &str) -> Option<String> {
    REQUEST_ID
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_duration_ms(line: &str) -> Option<f64> {
    let plain = strip_ansi_codes(line);
    let caps = DURATION.captures(&plain)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    match caps.get(2)?.as_str() {
        "s" => Some(value * 1000.0),
        _ => Some(value),
    }
}

fn convert_basic_log(line: &str) -> Option<Value> {
    let caps = BASIC_LINE.captures(line)?;
    let timestamp = caps.get(1)?.as_str();
    let level = caps.get(2)?.as_str();
    let logger_name = caps.get(6)?.as_str();
    let message = caps.get(7)?.as_str();

    let mut data = Map::new();
    data.insert("timestamp".into(), Value::from(timestamp));
    data.insert("level".into(), Value::from(map_level(&strip_ansi_codes(level))));
    data.insert("name".into(), Value::from(strip_ansi_codes(logger_name)));
    data.insert("message".into(), Value::from(strip_ansi_codes(message)));

    if let Some(request_id) = caps.get(4).and_then(|tags| extract_request_id(tags.as_str())) {
        data.insert("request_id".into(), Value::from(request_id));
    }

    Some(Value::Object(data))
}

fn convert_completed_request(line: &str) -> Option<Value> {
    let timestamp = TIMESTAMP.captures(line)?.get(1)?.as_str();

    let hash = COMPLETED_DATA
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| format!("{{{}}}", m.as_str()));
    let field = |key: &str| hash.as_deref().and_then(|h| extract_value_from_hash(h, key));

    let method = field("method")?;
    let path = field("path")?;
    let status: i64 = field("status")?.parse().ok()?;
    let controller = field("controller");
    let action = field("action");

    Some(json!({
        "timestamp": timestamp,
        "level": "info",
        "name": controller.clone().unwrap_or_else(|| "Rails".to_string()),
        "message": "Completed",
        "duration_ms": extract_duration_ms(line),
        "payload": {
            "method": method,
            "path": path,
            "status": status,
            "controller": controller,
            "action": action,
            "request_id": extract_request_id(line),
        }
    }))
}
