//! Data models shared by fetchers, extractors and the aggregator.
//!
//! This module defines the core data structures used throughout the application:
//! - [`RawDocument`]: Text retrieved for one source, before extraction
//! - [`ReleaseRecord`]: One normalized release (product, version, date, link)
//! - [`FetchResult`]: Per-source outcome consumed by the aggregator
//! - [`Credentials`]: GitHub API user and token

use crate::error::SourceError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// Text retrieved for a single source.
///
/// Paginated API walks produce one entry in `pages` per response; every
/// other fetch produces exactly one page. The document is dropped as soon
/// as the extractor has run.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Name of the [`SourceSpec`](crate::registry::SourceSpec) this came from.
    pub source: String,
    /// When the document was retrieved.
    pub fetched_at: DateTime<Utc>,
    /// Response bodies in retrieval order.
    pub pages: Vec<String>,
    /// Set when the page cap stopped a walk that still had a next page.
    pub truncated: bool,
}

impl RawDocument {
    /// Single-page document retrieved now.
    pub fn new(source: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fetched_at: Utc::now(),
            pages: vec![body.into()],
            truncated: false,
        }
    }

    /// Multi-page document retrieved now.
    pub fn from_pages(source: impl Into<String>, pages: Vec<String>, truncated: bool) -> Self {
        Self {
            source: source.into(),
            fetched_at: Utc::now(),
            pages,
            truncated,
        }
    }

    /// `true` when no page carries anything but whitespace.
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|p| p.trim().is_empty())
    }

    /// Total size of all pages in bytes.
    pub fn len(&self) -> usize {
        self.pages.iter().map(String::len).sum()
    }
}

/// A normalized release.
///
/// Only [`ReleaseRecord::new`] creates records, and it refuses an empty
/// label or URL, so every record that exists is renderable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseRecord {
    product: String,
    label: String,
    date: Option<NaiveDate>,
    url: String,
}

impl ReleaseRecord {
    /// Build a record, trimming `label` and `url`.
    ///
    /// # Returns
    ///
    /// `None` when either the label or the URL is empty after trimming.
    pub fn new(
        product: impl Into<String>,
        label: &str,
        date: Option<NaiveDate>,
        url: &str,
    ) -> Option<Self> {
        let label = label.trim();
        let url = url.trim();
        if label.is_empty() || url.is_empty() {
            return None;
        }
        Some(Self {
            product: product.into(),
            label: label.to_string(),
            date,
            url: url.to_string(),
        })
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Render as a Markdown link, `[label](url)`.
    pub fn to_markdown(&self) -> String {
        format!("[{}]({})", self.label, self.url)
    }
}

/// Outcome of processing one source.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Registry name of the source.
    pub source: String,
    pub status: FetchStatus,
}

/// Success or failure of one source.
#[derive(Debug, Clone)]
pub enum FetchStatus {
    /// Records were extracted. `warning` carries a soft problem such as a
    /// truncated pagination walk or an empty extraction.
    Succeeded {
        records: Vec<ReleaseRecord>,
        warning: Option<SourceError>,
    },
    /// The source produced nothing usable.
    Failed(SourceError),
}

impl FetchResult {
    pub fn succeeded(source: impl Into<String>, records: Vec<ReleaseRecord>) -> Self {
        Self {
            source: source.into(),
            status: FetchStatus::Succeeded {
                records,
                warning: None,
            },
        }
    }

    /// Attach a soft problem to a successful result; no-op on a failed one.
    pub fn with_warning(mut self, warning: Option<SourceError>) -> Self {
        if let FetchStatus::Succeeded { warning: slot, .. } = &mut self.status {
            *slot = warning;
        }
        self
    }

    pub fn failed(source: impl Into<String>, error: SourceError) -> Self {
        Self {
            source: source.into(),
            status: FetchStatus::Failed(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, FetchStatus::Succeeded { .. })
    }

    /// Records of a successful source, empty for a failed one.
    pub fn records(&self) -> &[ReleaseRecord] {
        match &self.status {
            FetchStatus::Succeeded { records, .. } => records,
            FetchStatus::Failed(_) => &[],
        }
    }
}

/// GitHub API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub token: String,
}

impl Credentials {
    /// Pair a user with a token; either part missing or blank yields `None`.
    pub fn from_parts(user: Option<String>, token: Option<String>) -> Option<Self> {
        match (user, token) {
            (Some(user), Some(token)) if !user.trim().is_empty() && !token.trim().is_empty() => {
                Some(Self { user, token })
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("token", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip_markdown() {
        let record =
            ReleaseRecord::new("Example", "v1.2.3", None, "https://example.com/v1.2.3").unwrap();
        assert_eq!(record.to_markdown(), "[v1.2.3](https://example.com/v1.2.3)");
    }

    #[test]
    fn test_record_rejects_blank_fields() {
        assert!(ReleaseRecord::new("Git", "   ", None, "https://example.com").is_none());
        assert!(ReleaseRecord::new("Git", "2.45.0", None, "").is_none());
    }

    #[test]
    fn test_record_trims_label() {
        let record = ReleaseRecord::new("Git", "  2.45.0\n", None, " https://example.com ").unwrap();
        assert_eq!(record.label(), "2.45.0");
        assert_eq!(record.url(), "https://example.com");
    }

    #[test]
    fn test_record_serialization() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1);
        let record = ReleaseRecord::new("tig", "2.5.10", date, "https://example.com").unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"product\":\"tig\""));
        assert!(json.contains("\"date\":\"2024-06-01\""));
    }

    #[test]
    fn test_raw_document_blank() {
        assert!(RawDocument::new("git", "  \n").is_blank());
        assert!(!RawDocument::new("git", "<html/>").is_blank());
        let doc = RawDocument::from_pages("libgit2", vec!["[]".into(), "[1]".into()], false);
        assert_eq!(doc.len(), 5);
    }

    #[test]
    fn test_fetch_result_records() {
        let ok = FetchResult::succeeded("a", vec![]);
        let failed = FetchResult::failed("b", SourceError::Network("down".into()));
        assert!(ok.is_success());
        assert!(!failed.is_success());
        assert!(failed.records().is_empty());
    }

    #[test]
    fn test_credentials_from_parts() {
        assert!(Credentials::from_parts(Some("me".into()), None).is_none());
        assert!(Credentials::from_parts(Some("me".into()), Some(" ".into())).is_none());
        let creds = Credentials::from_parts(Some("me".into()), Some("tok".into())).unwrap();
        assert!(!format!("{creds:?}").contains("tok\""));
    }
}
