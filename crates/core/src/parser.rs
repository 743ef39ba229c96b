// crates/core/src/parser.rs
//! Line parser: raw log line → classified, job-enriched [`Entry`].

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::Value;
use tracing::debug;

use crate::config::LoggerType;
use crate::correlation::CorrelationTable;
use crate::entry::Entry;
use crate::job_prefix::{colored_job_prefix, extract_job_info};
use crate::text_format;

/// `[JobClass#job_id]` at the start of already-prefixed content.
static JOB_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[\w:]+#[^\]]+\]").expect("static pattern compiles"));

/// Parses lines for one session, registering job enqueues in (and resolving
/// job output through) the shared [`CorrelationTable`].
#[derive(Debug, Clone)]
pub struct LineParser {
    logger_type: LoggerType,
    correlation: CorrelationTable,
}

impl LineParser {
    pub fn new(logger_type: LoggerType, correlation: CorrelationTable) -> Self {
        Self {
            logger_type,
            correlation,
        }
    }

    pub fn logger_type(&self) -> LoggerType {
        self.logger_type
    }

    pub fn correlation(&self) -> &CorrelationTable {
        &self.correlation
    }

    /// Parse raw bytes, dropping invalid UTF-8 sequences first.
    pub fn parse_bytes(&self, raw: &[u8]) -> Option<Entry> {
        self.parse_line(&sanitize_utf8(raw))
    }

    /// Parse one line into an entry.
    ///
    /// # Features
    /// - Human-readable SemanticLogger lines are converted to JSON first when
    ///   the parser is configured for that logger
    /// - Non-JSON lines and JSON that is not an object yield `None` (logged at debug)
    /// - Job enqueue lines are registered in the correlation table, inheriting
    ///   the parent job's request id when they carry none of their own
    /// - Lines emitted from inside a job get a colored `[JobClass#id]` prefix
    ///   and, when missing, the request id resolved from the table
    pub fn parse_line(&self, raw: &str) -> Option<Entry> {
        let line = raw.trim();

        let converted = match self.logger_type {
            LoggerType::SemanticLogger if text_format::is_human_readable(line) => {
                text_format::convert(line)
            }
            _ => None,
        };
        let line = converted.as_deref().unwrap_or(line);

        let data = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                debug!("Skipping JSON line that is not an object");
                return None;
            }
            Err(e) => {
                debug!(error = %e, "Failed to parse line as JSON");
                return None;
            }
        };

        let entry = Entry::from_data(data);
        self.register_job_enqueue(&entry);
        Some(self.enrich_job_entry(entry))
    }

    /// Parse every line, dropping the ones that do not parse.
    pub fn parse_lines<I, S>(&self, lines: I) -> Vec<Entry>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .filter_map(|line| self.parse_line(line.as_ref()))
            .collect()
    }

    fn register_job_enqueue(&self, entry: &Entry) {
        let Some(job_id) = entry.job_id() else {
            return;
        };

        let request_id = match entry.request_id() {
            Some(id) => Some(id.to_string()),
            // Enqueued from inside another job: inherit that job's request.
            None => extract_job_info(entry.tags())
                .and_then(|parent| self.correlation.lookup(&parent.job_id)),
        };

        debug!(job_id, request_id = ?request_id, "Registering job enqueue");
        self.correlation.register(Some(job_id), request_id.as_deref());
    }

    fn enrich_job_entry(&self, entry: Entry) -> Entry {
        let Some(job) = extract_job_info(entry.tags()) else {
            return entry;
        };

        let entry = if has_job_prefix(entry.content()) {
            entry
        } else {
            let content = format!(
                "{} {}",
                colored_job_prefix(&job.job_class, &job.job_id),
                entry.content()
            );
            entry.with_content(content)
        };

        if entry.request_id().is_some() {
            return entry;
        }
        match self.correlation.lookup(&job.job_id) {
            Some(request_id) => entry.with_request_id(request_id),
            None => entry,
        }
    }
}

/// Drop invalid UTF-8 byte sequences.
pub fn sanitize_utf8(raw: &[u8]) -> String {
    let mut clean = String::with_capacity(raw.len());
    for chunk in raw.utf8_chunks() {
        clean.push_str(chunk.valid());
    }
    clean
}

fn has_job_prefix(content: &str) -> bool {
    let plain = text_format::strip_ansi_codes(content);
    JOB_PREFIX.is_match(plain.trim_start())
}
