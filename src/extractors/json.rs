//! JSON payload extractor.
//!
//! Covers both the GitHub releases API (one array per page, per-entry
//! `html_url`) and static changelog files that only carry version numbers,
//! where every record points at a fixed release-notes page.

use super::VersionPattern;
use crate::models::{RawDocument, ReleaseRecord};
use crate::utils::{parse_feed_date, truncate_for_log};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, trace};

/// Field mapping for an array of release objects.
#[derive(Debug)]
pub struct JsonRule {
    /// Field holding the version or tag name.
    pub version_field: &'static str,
    /// Optional field holding an RFC 3339 / `YYYY-MM-DD` timestamp.
    pub date_field: Option<&'static str>,
    /// Optional field holding the per-entry URL.
    pub url_field: Option<&'static str>,
    /// URL used when the entry has none.
    pub release_notes_url: Option<&'static str>,
    /// Applied to the version field; entries that do not match are skipped.
    pub version: Option<VersionPattern>,
}

impl JsonRule {
    /// Rule for the GitHub `GET /repos/{owner}/{repo}/releases` payload.
    pub fn github_releases(version: VersionPattern) -> Self {
        Self {
            version_field: "tag_name",
            date_field: Some("published_at"),
            url_field: Some("html_url"),
            release_notes_url: None,
            version: Some(version),
        }
    }

    pub fn extract(&self, product: &str, doc: &RawDocument) -> Vec<ReleaseRecord> {
        let mut records = Vec::new();
        for (index, page) in doc.pages.iter().enumerate() {
            let entries = match serde_json::from_str::<Value>(page) {
                Ok(Value::Array(entries)) => entries,
                Ok(other) => {
                    debug!(page = index + 1, kind = json_kind(&other), "JSON page is not an array");
                    continue;
                }
                Err(e) => {
                    debug!(
                        page = index + 1,
                        error = %e,
                        preview = %truncate_for_log(page, 120),
                        "JSON page did not parse"
                    );
                    continue;
                }
            };
            records.extend(entries.iter().filter_map(|entry| self.record_for(product, entry)));
        }
        records
    }

    /// Oldest `date_field` value on one page, `None` if the page has no dates.
    pub fn oldest_date(&self, page: &str) -> Option<NaiveDate> {
        let field = self.date_field?;
        let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(page) else {
            return None;
        };
        entries
            .iter()
            .filter_map(|entry| entry.get(field).and_then(Value::as_str))
            .filter_map(parse_feed_date)
            .min()
    }

    fn record_for(&self, product: &str, entry: &Value) -> Option<ReleaseRecord> {
        if is_true(entry, "draft") || is_true(entry, "prerelease") {
            trace!("Skipping draft or prerelease");
            return None;
        }
        let raw = scalar_text(entry.get(self.version_field)?)?;
        let version = match &self.version {
            Some(pattern) => pattern.version_of(&raw)?,
            None => raw,
        };
        let url = self
            .url_field
            .and_then(|field| entry.get(field))
            .and_then(Value::as_str)
            .filter(|u| !u.trim().is_empty())
            .or(self.release_notes_url)?;
        let date = self
            .date_field
            .and_then(|field| entry.get(field))
            .and_then(Value::as_str)
            .and_then(parse_feed_date);
        ReleaseRecord::new(product, &version, date, url)
    }
}

/// Versions are usually strings, but some changelogs emit bare numbers.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_true(entry: &Value, field: &str) -> bool {
    entry.get(field).and_then(Value::as_bool).unwrap_or(false)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn desktop_rule() -> JsonRule {
        JsonRule {
            version_field: "version",
            date_field: Some("pub_date"),
            url_field: None,
            release_notes_url: Some("https://desktop.github.com/release-notes/"),
            version: None,
        }
    }

    #[test]
    fn test_changelog_uses_fixed_url() {
        let page = include_str!("../../tests/fixtures/github-desktop.json");
        let records = desktop_rule().extract("GitHub Desktop", &RawDocument::new("github-desktop", page));
        let labels: Vec<_> = records.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["3.4.0", "3.3.18"]);
        assert!(records
            .iter()
            .all(|r| r.url() == "https://desktop.github.com/release-notes/"));
        assert_eq!(records[0].date(), NaiveDate::from_ymd_opt(2024, 6, 5));
    }

    #[test]
    fn test_github_releases_across_pages() {
        let rule = JsonRule::github_releases(VersionPattern::new(
            r"^v(\d+\.\d+\.\d+)\.windows\.(\d+)$",
        ));
        let doc = RawDocument::from_pages(
            "git-for-windows",
            vec![
                include_str!("../../tests/fixtures/git-for-windows.json").to_string(),
                include_str!("../../tests/fixtures/git-for-windows.2.json").to_string(),
            ],
            false,
        );
        let records = rule.extract("Git for Windows", &doc);
        let labels: Vec<_> = records.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["2.45.2(1)", "2.45.1(1)", "2.44.0(1)"]);
        assert_eq!(
            records[0].url(),
            "https://github.com/git-for-windows/git/releases/tag/v2.45.2.windows.1"
        );
        assert_eq!(records[2].date(), NaiveDate::from_ymd_opt(2024, 2, 23));
    }

    #[test]
    fn test_oldest_date_of_page() {
        let rule = JsonRule::github_releases(VersionPattern::new(r"^v(.*)$"));
        let page = include_str!("../../tests/fixtures/git-for-windows.json");
        assert_eq!(rule.oldest_date(page), NaiveDate::from_ymd_opt(2024, 5, 14));
        assert_eq!(rule.oldest_date("[]"), None);
        assert_eq!(rule.oldest_date("not json"), None);
        assert_eq!(desktop_rule().oldest_date(r#"[{"version": "1.0"}]"#), None);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let page = r#"[
            {"version": ""},
            {"version": null},
            {"nothing": "here"},
            "just a string",
            {"version": 3},
            {"version": "3.1.0", "draft": true}
        ]"#;
        let records = desktop_rule().extract("GitHub Desktop", &RawDocument::new("x", page));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label(), "3");
        assert_eq!(records[0].date(), None);
    }

    #[test]
    fn test_entry_without_any_url_is_skipped() {
        let rule = JsonRule {
            release_notes_url: None,
            ..desktop_rule()
        };
        let records = rule.extract("X", &RawDocument::new("x", r#"[{"version": "1.0"}]"#));
        assert!(records.is_empty());
    }

    #[test]
    fn test_empty_and_garbage_documents() {
        let rule = desktop_rule();
        assert!(rule.extract("X", &RawDocument::new("x", "")).is_empty());
        assert!(rule.extract("X", &RawDocument::new("x", "<html>")).is_empty());
        assert!(rule
            .extract("X", &RawDocument::new("x", r#"{"message": "Bad credentials"}"#))
            .is_empty());
    }
}
