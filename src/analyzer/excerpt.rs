//! Bounding log text before it goes to the model.
//!
//! Policy: strip the timestamp GitHub puts on every line. If the rest fits in
//! `MAX_EXCERPT_CHARS`, send it whole. Otherwise anchor on the first failure
//! marker and send a window starting `LEAD_CONTEXT_CHARS` before it; without
//! a marker send the tail. Anything cut is flagged with `TRUNCATION_MARKER`.

use regex::Regex;
use std::sync::LazyLock;

pub const MAX_EXCERPT_CHARS: usize = 8000;
pub const LEAD_CONTEXT_CHARS: usize = 2000;
pub const TRUNCATION_MARKER: &str = "...[truncated]...";

/// Checked in order; the earliest occurrence in the log wins.
pub const FAILURE_MARKERS: &[&str] = &[
    "##[error]",
    "Error:",
    "error:",
    "FAILED",
    "npm ERR!",
    "Traceback",
    "fatal:",
    "Process completed with exit code",
];

static TIMESTAMP_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z ").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub text: String,
    pub truncated: bool,
}

pub fn strip_timestamps(log: &str) -> String {
    TIMESTAMP_PREFIX.replace_all(log, "").into_owned()
}

/// Byte offset of the first failure marker, if any.
pub fn first_marker(text: &str) -> Option<usize> {
    FAILURE_MARKERS.iter().filter_map(|m| text.find(m)).min()
}

/// Substring between two char positions.
fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let byte_at = |pos: usize| {
        text.char_indices()
            .nth(pos)
            .map(|(i, _)| i)
            .unwrap_or(text.len())
    };
    &text[byte_at(start)..byte_at(end)]
}

pub fn extract_excerpt(log: &str) -> Excerpt {
    let cleaned = strip_timestamps(log);
    let total = cleaned.chars().count();

    if total <= MAX_EXCERPT_CHARS {
        return Excerpt {
            text: cleaned,
            truncated: false,
        };
    }

    let (start, end) = match first_marker(&cleaned) {
        Some(byte) => {
            let marker_char = cleaned[..byte].chars().count();
            let start = marker_char.saturating_sub(LEAD_CONTEXT_CHARS);
            let end = (start + MAX_EXCERPT_CHARS).min(total);
            // Keep the window full when the marker sits near the end.
            let start = end.saturating_sub(MAX_EXCERPT_CHARS);
            (start, end)
        }
        None => (total - MAX_EXCERPT_CHARS, total),
    };

    let mut text = String::with_capacity(MAX_EXCERPT_CHARS + 2 * TRUNCATION_MARKER.len() + 2);
    if start > 0 {
        text.push_str(TRUNCATION_MARKER);
        text.push('\n');
    }
    text.push_str(char_slice(&cleaned, start, end));
    if end < total {
        text.push('\n');
        text.push_str(TRUNCATION_MARKER);
    }

    Excerpt {
        text,
        truncated: true,
    }
}
