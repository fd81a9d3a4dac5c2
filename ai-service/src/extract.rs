//! SQL extraction from model output.

use std::sync::LazyLock;

use common::errors::{AppError, AppResult};
use common::utils::SqlValidator;
use regex::Regex;

/// First fenced block. Any info string on the opening fence line is skipped;
/// a known SQL tag may also share the line with the statement.
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)```(?:[\w+-]*[ \t]*\r?\n|(?:sql|postgresql|postgres|duckdb|redshift)[ \t]+)?([\s\S]*?)```",
    )
    .expect("valid regex")
});

/// Isolates exactly one SQL statement from a model response.
///
/// A fenced code block wins when present; otherwise the whole response is taken
/// if it opens with a statement keyword (leading `--` comments allowed). The
/// statement is cut at its first top-level `;`, which is kept.
pub fn extract_sql(response: &str) -> AppResult<String> {
    let text = response.trim();
    let candidate = match FENCED_BLOCK.captures(text) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim(),
        None => text,
    };

    if !SqlValidator::starts_with_statement(candidate) {
        return Err(AppError::Extraction(preview(text)));
    }
    SqlValidator::first_statement(candidate)
        .map(str::to_string)
        .ok_or_else(|| AppError::Extraction(preview(text)))
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(MAX)
        .collect();
    if text.chars().count() > MAX {
        format!("{}...", flat)
    } else {
        flat
    }
}
