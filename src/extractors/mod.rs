//! Extractors turning raw documents into release records.
//!
//! One variant per document shape, each holding the source-specific rule
//! that the [registry](crate::registry) attaches to a product:
//!
//! | Variant | Module | Input | Notes |
//! |---------|--------|-------|-------|
//! | [`Extractor::Html`] | [`html`] | HTML page | CSS selectors + version regex |
//! | [`Extractor::Feed`] | [`feed`] | RSS 2.0 / Atom | `(title, link)` pairs in document order |
//! | [`Extractor::Json`] | [`json`] | JSON array(s) | one page per API response |
//! | [`Extractor::Bucket`] | [`bucket`] | storage-bucket XML listing | grouped, newest first, capped |
//!
//! # Edge Policy
//!
//! Extraction never fails. An entry whose label cannot be parsed is dropped
//! and the rest continue; an empty or garbage document yields an empty
//! vector. Deciding whether an empty result deserves a warning is the
//! pipeline's job.

pub mod bucket;
pub mod feed;
pub mod html;
pub mod json;

use crate::models::{RawDocument, ReleaseRecord};
use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, instrument};
use url::Url;

pub use bucket::BucketRule;
pub use feed::FeedRule;
pub use html::HtmlRule;
pub use json::JsonRule;

/// Default number of releases kept from a storage-bucket listing.
pub const DEFAULT_BUCKET_LIMIT: usize = 20;

/// Runtime knobs that are not part of a source's static rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Most recent releases kept by [`BucketRule`].
    pub bucket_limit: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            bucket_limit: DEFAULT_BUCKET_LIMIT,
        }
    }
}

/// Parser selected by a source's registry entry.
#[derive(Debug)]
pub enum Extractor {
    Html(HtmlRule),
    Feed(FeedRule),
    Json(JsonRule),
    Bucket(BucketRule),
}

impl Extractor {
    /// Parse every page of `doc` into records for `product`.
    #[instrument(level = "debug", skip_all, fields(source = %doc.source, product))]
    pub fn extract(
        &self,
        product: &str,
        doc: &RawDocument,
        options: &ExtractOptions,
    ) -> Vec<ReleaseRecord> {
        let records = match self {
            Extractor::Html(rule) => rule.extract(product, doc),
            Extractor::Feed(rule) => rule.extract(product, doc),
            Extractor::Json(rule) => rule.extract(product, doc),
            Extractor::Bucket(rule) => rule.extract(product, doc, options.bucket_limit),
        };
        debug!(count = records.len(), bytes = doc.len(), "Extracted records");
        records
    }

    /// File extension of the raw document, used for offline fixtures and dumps.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Extractor::Html(_) => "html",
            Extractor::Feed(_) | Extractor::Bucket(_) => "xml",
            Extractor::Json(_) => "json",
        }
    }

    /// Whether a page of a newest-first walk already reaches before `since`.
    ///
    /// Only JSON release arrays are ordered by date; other shapes never stop
    /// a walk early.
    pub fn page_predates(&self, page: &str, since: NaiveDate) -> bool {
        match self {
            Extractor::Json(rule) => rule.oldest_date(page).is_some_and(|oldest| oldest < since),
            _ => false,
        }
    }

    /// Short name of the document shape, used in warnings.
    pub fn shape(&self) -> &'static str {
        match self {
            Extractor::Html(_) => "html",
            Extractor::Feed(_) => "feed",
            Extractor::Json(_) => "json",
            Extractor::Bucket(_) => "bucket",
        }
    }
}

/// Regex that pulls the version out of a label.
///
/// Group 1 is the version. When group 2 also participates it is appended in
/// parentheses, so `v2.45.1.windows.2` with `^v(\d+\.\d+\.\d+)\.windows\.(\d+)$`
/// becomes `2.45.1(2)`. A pattern without groups yields the whole match.
/// With `join_all`, every match in the text is collected and joined with
/// `", "` (a single post announcing `16.11` and `16.10.4`).
#[derive(Debug)]
pub struct VersionPattern {
    regex: Regex,
    join_all: bool,
}

impl VersionPattern {
    /// Compile `pattern`; patterns are compile-time constants in the catalog.
    pub fn new(pattern: &str) -> Self {
        Self {
            regex: Regex::new(pattern).unwrap_or_else(|e| panic!("invalid version pattern {pattern:?}: {e}")),
            join_all: false,
        }
    }

    /// Collect every match instead of only the first.
    pub fn all(mut self) -> Self {
        self.join_all = true;
        self
    }

    /// Apply the pattern to `text`.
    pub fn version_of(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if self.join_all {
            let versions: Vec<String> = self
                .regex
                .captures_iter(text)
                .filter_map(|caps| Self::format_captures(&caps))
                .collect();
            return (!versions.is_empty()).then(|| versions.join(", "));
        }
        self.regex
            .captures(text)
            .and_then(|caps| Self::format_captures(&caps))
    }

    fn format_captures(caps: &regex::Captures<'_>) -> Option<String> {
        let version = match (caps.get(1), caps.get(2)) {
            (Some(v), Some(n)) => format!("{}({})", v.as_str().trim(), n.as_str().trim()),
            (Some(v), None) => v.as_str().trim().to_string(),
            (None, _) => caps.get(0)?.as_str().trim().to_string(),
        };
        (!version.is_empty()).then_some(version)
    }
}

/// How the canonical URL of a record is derived.
#[derive(Debug, Clone)]
pub enum LinkPolicy {
    /// Use the extracted href, resolved against this base when relative.
    Relative(&'static str),
    /// Ignore hrefs; every record points at this page.
    Fixed(&'static str),
}

impl LinkPolicy {
    /// Turn an optional extracted href into an absolute URL.
    pub fn resolve(&self, href: Option<&str>) -> Option<String> {
        match self {
            LinkPolicy::Fixed(url) => Some((*url).to_string()),
            LinkPolicy::Relative(base) => {
                let href = href.map(str::trim).filter(|h| !h.is_empty())?;
                let base = Url::parse(base).ok()?;
                base.join(href).ok().map(String::from)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_single_group() {
        let p = VersionPattern::new(r"^\[ANNOUNCE\] Git v(.*)$");
        assert_eq!(p.version_of("[ANNOUNCE] Git v2.45.0").as_deref(), Some("2.45.0"));
        assert_eq!(p.version_of("[PATCH] something"), None);
    }

    #[test]
    fn test_version_two_groups() {
        let p = VersionPattern::new(r"^v(\d+\.\d+\.\d+)\.windows\.(\d+)$");
        assert_eq!(p.version_of("v2.45.1.windows.2").as_deref(), Some("2.45.1(2)"));
    }

    #[test]
    fn test_version_optional_second_group() {
        let p = VersionPattern::new(r"^v(\d+\.\d+)(?:\.(\d+))?$");
        assert_eq!(p.version_of("v0.30").as_deref(), Some("0.30"));
    }

    #[test]
    fn test_version_without_groups() {
        let p = VersionPattern::new(r"\d+\.\d+\.\d+");
        assert_eq!(p.version_of("Version 9.1.0 notes").as_deref(), Some("9.1.0"));
    }

    #[test]
    fn test_version_join_all() {
        let p = VersionPattern::new(r"(\d{2}\.\d+(?:\.\d+)?)").all();
        assert_eq!(
            p.version_of("GitLab Patch Release: 16.11.1, 16.10.4").as_deref(),
            Some("16.11.1, 16.10.4")
        );
    }

    #[test]
    fn test_version_empty_capture_dropped() {
        let p = VersionPattern::new(r"^\[ANNOUNCE\] tig-(.*)$");
        assert_eq!(p.version_of("[ANNOUNCE] tig-"), None);
    }

    #[test]
    fn test_link_policy_relative() {
        let policy = LinkPolicy::Relative("https://public-inbox.org/git/");
        assert_eq!(
            policy.resolve(Some("abc@example.com/")).as_deref(),
            Some("https://public-inbox.org/git/abc@example.com/")
        );
        assert_eq!(
            policy.resolve(Some("https://other.example/x")).as_deref(),
            Some("https://other.example/x")
        );
        assert_eq!(policy.resolve(None), None);
        assert_eq!(policy.resolve(Some("  ")), None);
    }

    #[test]
    fn test_link_policy_fixed() {
        let policy = LinkPolicy::Fixed("https://example.com/notes");
        assert_eq!(policy.resolve(None).as_deref(), Some("https://example.com/notes"));
        assert_eq!(
            policy.resolve(Some("/elsewhere")).as_deref(),
            Some("https://example.com/notes")
        );
    }
}
