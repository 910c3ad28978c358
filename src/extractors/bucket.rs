//! Storage-bucket listing extractor.
//!
//! Some projects publish releases only as artifacts in a public bucket
//! (`<ListBucketResult><Contents><Key>…</Key><LastModified>…</LastModified>`).
//! One release often shows up as several objects uploaded together (the
//! archive plus its signature and checksum), all sharing one modification
//! time, so entries are grouped by timestamp before anything else happens.
//! The listing has no useful order, so records are sorted newest first and
//! capped to the most recent `limit`.
//!
//! A listing holds at most 1000 keys. Larger buckets answer with
//! `<IsTruncated>true</IsTruncated>`, and the next part is requested with
//! `?marker=` set to [`BucketListing::continuation`].

use super::VersionPattern;
use crate::models::{RawDocument, ReleaseRecord};
use crate::utils::parse_timestamp;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Rule for a bucket listing.
#[derive(Debug)]
pub struct BucketRule {
    /// Selects release artifacts by key and yields their version.
    pub key: VersionPattern,
    /// Prefix joined with the object key to build the download URL.
    pub base_url: &'static str,
}

/// One parsed listing response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketListing {
    pub entries: Vec<BucketEntry>,
    /// `<IsTruncated>true</IsTruncated>`: more keys follow in another response.
    pub truncated: bool,
    pub next_marker: Option<String>,
    /// Last `<Key>` of the response, the marker when no `NextMarker` is sent.
    pub last_key: Option<String>,
}

impl BucketListing {
    /// Marker for the next request, `None` once the listing is complete.
    pub fn continuation(&self) -> Option<&str> {
        if !self.truncated {
            return None;
        }
        self.next_marker.as_deref().or(self.last_key.as_deref())
    }
}

/// One `<Contents>` element of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

impl BucketRule {
    pub fn extract(&self, product: &str, doc: &RawDocument, limit: usize) -> Vec<ReleaseRecord> {
        let listings: Vec<BucketListing> = doc.pages.iter().map(|page| parse_listing(page)).collect();
        if listings.last().is_some_and(|listing| listing.truncated) {
            warn!(
                source = %doc.source,
                pages = listings.len(),
                "Bucket listing is still truncated; newest objects may be missing"
            );
        }
        let entries = listings.into_iter().flat_map(|listing| listing.entries);
        latest_releases(entries, &self.key, limit)
            .into_iter()
            .filter_map(|(version, entry)| {
                let url = format!("{}{}", self.base_url, entry.key);
                ReleaseRecord::new(product, &version, Some(entry.last_modified.date_naive()), &url)
            })
            .collect()
    }
}

/// Group matching entries by timestamp, newest first, at most `limit` groups.
///
/// The first key seen for a timestamp (in listing order) represents the
/// group. Entries whose key the pattern rejects never form a group.
pub fn latest_releases(
    entries: impl IntoIterator<Item = BucketEntry>,
    pattern: &VersionPattern,
    limit: usize,
) -> Vec<(String, BucketEntry)> {
    let mut groups: BTreeMap<DateTime<Utc>, (String, BucketEntry)> = BTreeMap::new();
    for entry in entries {
        let Some(version) = pattern.version_of(&entry.key) else {
            trace!(key = %entry.key, "Skipping non-release object");
            continue;
        };
        groups.entry(entry.last_modified).or_insert((version, entry));
    }

    let total = groups.len();
    let latest = groups
        .into_iter()
        .rev()
        .take(limit)
        .map(|(_, group)| group)
        .collect_vec();
    debug!(groups = total, kept = latest.len(), limit, "Grouped bucket listing");
    latest
}

/// Read `(Key, LastModified)` pairs and the continuation state from an
/// S3/GCS-style XML listing.
///
/// Objects with an unparsable timestamp are skipped; parsing stops at the
/// first XML error.
pub fn parse_listing(xml: &str) -> BucketListing {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Field {
        Key,
        LastModified,
        IsTruncated,
        NextMarker,
    }

    let mut reader = Reader::from_str(xml);
    let mut listing = BucketListing::default();
    let mut in_contents = false;
    let mut field = None;
    let mut key = String::new();
    let mut modified = String::new();
    let mut is_truncated = String::new();
    let mut next_marker = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Contents" => {
                    in_contents = true;
                    key.clear();
                    modified.clear();
                }
                b"Key" if in_contents => field = Some(Field::Key),
                b"LastModified" if in_contents => field = Some(Field::LastModified),
                b"IsTruncated" if !in_contents => field = Some(Field::IsTruncated),
                b"NextMarker" if !in_contents => field = Some(Field::NextMarker),
                _ => field = None,
            },
            Ok(Event::Text(t)) => {
                let text = String::from_utf8_lossy(&t);
                match field {
                    Some(Field::Key) => key.push_str(&text),
                    Some(Field::LastModified) => modified.push_str(&text),
                    Some(Field::IsTruncated) => is_truncated.push_str(&text),
                    Some(Field::NextMarker) => next_marker.push_str(&text),
                    None => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"Contents" {
                    in_contents = false;
                    let trimmed = key.trim();
                    if !trimmed.is_empty() {
                        listing.last_key = Some(trimmed.to_string());
                    }
                    match parse_timestamp(&modified) {
                        Some(last_modified) if !trimmed.is_empty() => listing.entries.push(BucketEntry {
                            key: trimmed.to_string(),
                            last_modified,
                        }),
                        _ => trace!(key = %key, modified = %modified, "Skipping unusable object"),
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Bucket listing parse stopped");
                break;
            }
        }
    }

    listing.truncated = is_truncated.trim().eq_ignore_ascii_case("true");
    let next_marker = next_marker.trim();
    if !next_marker.is_empty() {
        listing.next_marker = Some(next_marker.to_string());
    }
    trace!(
        entries = listing.entries.len(),
        truncated = listing.truncated,
        "Parsed bucket listing"
    );
    listing
}
