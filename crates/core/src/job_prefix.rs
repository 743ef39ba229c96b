//! Job attribution helpers shared by the parser: reading ActiveJob tags and
//! rendering the colored `[JobClass#job_id]` prefix.

use serde_json::Value;

/// First element of a tags array emitted from inside a job.
pub const ACTIVE_JOB_TAG: &str = "ActiveJob";

/// ANSI foreground colors used for job prefixes (red, green, yellow, blue, magenta, cyan).
pub const JOB_COLORS: [u8; 6] = [31, 32, 33, 34, 35, 36];

/// Job identity recovered from a `["ActiveJob", "<JobClass>", "<job id>", ...]` tags array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub job_id: String,
    pub job_class: String,
}

/// Extract job info from a tags value. Returns `None` unless the value is an
/// array of at least three elements whose first is the ActiveJob marker and
/// whose second and third are strings.
pub fn extract_job_info(tags: Option<&Value>) -> Option<JobInfo> {
    let tags = tags?.as_array()?;
    if tags.len() < 3 || tags[0].as_str() != Some(ACTIVE_JOB_TAG) {
        return None;
    }
    let job_class = tags[1].as_str()?;
    let job_id = tags[2].as_str()?;
    Some(JobInfo {
        job_id: job_id.to_string(),
        job_class: job_class.to_string(),
    })
}

/// Stable color for a job id: byte sum modulo the palette size.
pub fn job_color(job_id: &str) -> u8 {
    let sum: usize = job_id.bytes().map(usize::from).sum();
    JOB_COLORS[sum % JOB_COLORS.len()]
}

/// `ESC[1m ESC[<color>m [JobClass#job_id] ESC[0m`
pub fn colored_job_prefix(job_class: &str, job_id: &str) -> String {
    format!(
        "\u{1b}[1m\u{1b}[{}m[{}#{}]\u{1b}[0m",
        job_color(job_id),
        job_class,
        job_id
    )
}
