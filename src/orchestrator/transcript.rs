//! Agent transcript parsing.
//!
//! The agent CLI writes one JSON object per line. At the end of a run the
//! transcript is summarised into the record's `context` field.

use std::path::Path;

use serde_json::{json, Value};

use crate::Result;

/// Number of trailing transcript entries kept in the summary.
pub const TAIL_ENTRIES: usize = 20;

/// Summarise JSONL `text` into `{entries, parseErrors, lastEntries}`.
///
/// Blank lines are skipped; lines that are not valid JSON are counted but
/// otherwise ignored.
#[must_use]
pub fn summarize(text: &str) -> Value {
    let mut entries: Vec<Value> = Vec::new();
    let mut parse_errors = 0_u64;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<Value>(line) {
            Ok(value) => entries.push(value),
            Err(_) => parse_errors += 1,
        }
    }

    let total = entries.len();
    let tail: Vec<Value> = entries.split_off(total.saturating_sub(TAIL_ENTRIES));

    json!({
        "entries": total,
        "parseErrors": parse_errors,
        "lastEntries": tail,
    })
}

/// Read and summarise the transcript at `path`.
///
/// # Errors
///
/// Returns `AppError::Io` if the file cannot be read.
pub async fn load_context(path: &Path) -> Result<Value> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(summarize(&text))
}
