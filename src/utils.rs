//! Utility functions for date parsing, log truncation, and file system operations.
//!
//! This module provides helper functions used throughout the application:
//! - Lenient date parsing for the many formats vendors print on release pages
//! - String truncation for logging response previews
//! - Output path validation

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

static ORDINAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d)(?:st|nd|rd|th)\b").expect("ordinal suffix pattern"));

/// Parse a human-written date with an explicit `strftime` format.
///
/// Release pages decorate their dates: `"Released - Monday, March 4th, 2019"`,
/// `"Dec 22, 2023 "`. Ordinal suffixes are removed, then the whole text is
/// tried, then the part after the last `-` or `|` separator.
///
/// # Examples
///
/// ```ignore
/// let d = parse_loose_date("Tuesday, May 21st, 2024", "%A, %B %d, %Y");
/// assert_eq!(d, NaiveDate::from_ymd_opt(2024, 5, 21));
/// ```
pub fn parse_loose_date(text: &str, format: &str) -> Option<NaiveDate> {
    let cleaned = ORDINAL_SUFFIX.replace_all(text.trim(), "$1");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
        return Some(date);
    }

    cleaned
        .rsplit(['-', '|'])
        .next()
        .map(str::trim)
        .filter(|tail| tail.len() < cleaned.len())
        .and_then(|tail| NaiveDate::parse_from_str(tail, format).ok())
}

/// Parse a machine timestamp (RFC 3339 or RFC 2822) into UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_rfc2822(text))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse the date part of a feed or API timestamp.
///
/// Falls back to a leading `YYYY-MM-DD` when the full timestamp is not
/// RFC 3339 / RFC 2822 (e.g. `"2024-05-01 10:00:00 +0200"`).
pub fn parse_feed_date(text: &str) -> Option<NaiveDate> {
    if let Some(ts) = parse_timestamp(text) {
        return Some(ts.date_naive());
    }
    text.trim()
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (backing off to a char
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Collapse runs of whitespace (including newlines from nested markup) to single spaces.
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ensure the parent directory of an output file exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).await?;
            debug!(dir = %parent.display(), "Output directory ready");
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_char_boundary() {
        let result = truncate_for_log("ééé", 3);
        assert!(result.starts_with('é'));
        assert!(result.contains("(+4 bytes)"));
    }

    #[test]
    fn test_parse_loose_date_plain() {
        assert_eq!(
            parse_loose_date("December 12, 2023", "%B %d, %Y"),
            NaiveDate::from_ymd_opt(2023, 12, 12)
        );
        assert_eq!(
            parse_loose_date("  Dec 22, 2023 \n", "%b %d, %Y"),
            NaiveDate::from_ymd_opt(2023, 12, 22)
        );
    }

    #[test]
    fn test_parse_loose_date_ordinal_and_prefix() {
        assert_eq!(
            parse_loose_date("Released - Monday, March 4th, 2019", "%A, %B %d, %Y"),
            NaiveDate::from_ymd_opt(2019, 3, 4)
        );
        assert_eq!(
            parse_loose_date("Tuesday, May 21st, 2024", "%A, %B %d, %Y"),
            NaiveDate::from_ymd_opt(2024, 5, 21)
        );
    }

    #[test]
    fn test_parse_loose_date_garbage() {
        assert_eq!(parse_loose_date("soon", "%B %d, %Y"), None);
        assert_eq!(parse_loose_date("", "%B %d, %Y"), None);
    }

    #[test]
    fn test_parse_feed_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 16);
        assert_eq!(parse_feed_date("2024-05-16T00:00:00Z"), expected);
        assert_eq!(parse_feed_date("Thu, 16 May 2024 00:00:00 +0000"), expected);
        assert_eq!(parse_feed_date("2024-05-16 10:00:00 +0200"), expected);
        assert_eq!(parse_feed_date("yesterday"), None);
    }

    #[test]
    fn test_squash_whitespace() {
        assert_eq!(squash_whitespace("  GitLab\n  16.11 \t released "), "GitLab 16.11 released");
    }

    #[tokio::test]
    async fn test_ensure_parent_dir_bare_filename() {
        assert!(ensure_parent_dir(Path::new("releases.md")).await.is_ok());
    }
}
