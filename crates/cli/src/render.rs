//! Plain-text and JSON rendering of requests for the terminal.

use std::io::{self, Write};

use chrono::Local;
use log_bench_core::{Entry, EntryType, Request};

/// `10:00:01.234  GET     200  /users  45.2ms  3q (1 cached)`
pub fn request_line(request: &Request) -> String {
    let time = request.timestamp().with_timezone(&Local).format("%H:%M:%S%.3f");
    let status = request
        .status()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "---".to_string());
    let duration = request
        .duration()
        .map(|ms| format!("{ms:.1}ms"))
        .unwrap_or_else(|| "-".to_string());

    let mut line = format!(
        "{time}  {:<7} {status}  {}  {duration}",
        request.method().unwrap_or("?"),
        request.path().unwrap_or("?"),
    );
    if request.query_count() > 0 {
        line.push_str(&format!(
            "  {}q ({} cached, {:.1}ms)",
            request.query_count(),
            request.cached_query_count(),
            request.total_query_time()
        ));
    }
    line
}

fn entry_line(entry: &Entry) -> String {
    let marker = match entry.entry_type() {
        EntryType::SqlQuery => "sql",
        EntryType::CacheQuery => "cache",
        EntryType::SqlCallLine => "  ↳",
        EntryType::JobEnqueue => "job",
        EntryType::HttpRequest | EntryType::Other => "log",
    };
    format!("    {marker:<5} {}", entry.content().trim())
}

/// Write `requests`, one per line (or one JSON object per line).
pub fn write_requests<'a, W, I>(out: &mut W, requests: I, related: bool, json: bool) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Request>,
{
    for request in requests {
        if json {
            let encoded = serde_json::to_string(request).map_err(io::Error::other)?;
            writeln!(out, "{encoded}")?;
            continue;
        }
        writeln!(out, "{}", request_line(request))?;
        if related {
            for entry in request.related_logs() {
                writeln!(out, "{}", entry_line(entry))?;
            }
        }
    }
    out.flush()
}
