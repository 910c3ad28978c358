//! RSS 2.0 and Atom feed extractor.
//!
//! Feeds are read with the `quick-xml` pull parser rather than a typed
//! deserializer so that RSS `<item>` and Atom `<entry>` documents share one
//! pass, and a malformed tail still yields the entries read before it.

use super::{LinkPolicy, VersionPattern};
use crate::models::{RawDocument, ReleaseRecord};
use crate::utils::{parse_feed_date, squash_whitespace};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, trace};

/// Rule for a release feed.
#[derive(Debug)]
pub struct FeedRule {
    /// Pulls the version out of each entry title; `None` keeps the whole title.
    pub version: Option<VersionPattern>,
    /// Base for relative entry links.
    pub links: LinkPolicy,
}

/// One `(title, link, date)` triple as it appears in the feed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Date,
}

impl FeedRule {
    pub fn extract(&self, product: &str, doc: &RawDocument) -> Vec<ReleaseRecord> {
        doc.pages
            .iter()
            .flat_map(|page| parse_entries(page))
            .filter_map(|entry| self.record_for(product, &entry))
            .collect()
    }

    fn record_for(&self, product: &str, entry: &FeedEntry) -> Option<ReleaseRecord> {
        let label = match &self.version {
            Some(pattern) => pattern.version_of(&entry.title)?,
            None => entry.title.clone(),
        };
        let href = (!entry.link.is_empty()).then_some(entry.link.as_str());
        let url = self.links.resolve(href)?;
        ReleaseRecord::new(product, &label, parse_feed_date(&entry.date), &url)
    }
}

/// Read all entries of an RSS or Atom document, in document order.
///
/// Parsing stops at the first XML error; entries completed before it are
/// kept.
pub fn parse_entries(xml: &str) -> Vec<FeedEntry> {
    let mut reader = Reader::from_str(xml);

    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => current = Some(FeedEntry::default()),
                name => {
                    if let Some(entry) = current.as_mut() {
                        field = field_for(name);
                        if field == Some(Field::Link) {
                            take_atom_href(&e, entry);
                        }
                    }
                }
            },
            Ok(Event::Empty(e)) => {
                if let (Some(entry), b"link") = (current.as_mut(), e.local_name().as_ref()) {
                    take_atom_href(&e, entry);
                }
            }
            Ok(Event::Text(t)) => push_text(&mut current, field, &String::from_utf8_lossy(&t)),
            Ok(Event::CData(t)) => push_text(&mut current, field, &String::from_utf8_lossy(&t)),
            Ok(Event::GeneralRef(r)) => {
                if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(&r)) {
                    push_text(&mut current, field, &resolved);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    if let Some(mut entry) = current.take() {
                        entry.title = squash_whitespace(&entry.title);
                        entry.link = entry.link.trim().to_string();
                        entry.date = entry.date.trim().to_string();
                        entries.push(entry);
                    }
                    field = None;
                }
                _ => field = None,
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, position = reader.buffer_position(), "Feed parse stopped");
                break;
            }
        }
    }

    trace!(count = entries.len(), "Parsed feed entries");
    entries
}

fn field_for(name: &[u8]) -> Option<Field> {
    match name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"pubDate" | b"published" | b"updated" | b"date" => Some(Field::Date),
        _ => None,
    }
}

fn push_text(current: &mut Option<FeedEntry>, field: Option<Field>, text: &str) {
    let (Some(entry), Some(field)) = (current.as_mut(), field) else {
        return;
    };
    match field {
        Field::Title => entry.title.push_str(text),
        Field::Link => entry.link.push_str(text),
        // `updated` follows `published` in Atom; keep the first date seen.
        Field::Date if entry.date.is_empty() => entry.date.push_str(text),
        Field::Date => {}
    }
}

/// Atom links carry the URL in `href`; only the alternate (or unlabelled) one counts.
fn take_atom_href(e: &BytesStart<'_>, entry: &mut FeedEntry) {
    if !entry.link.is_empty() {
        return;
    }
    let mut href = None;
    let mut rel_ok = true;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(String::from_utf8_lossy(&attr.value).into_owned()),
            b"rel" => rel_ok = &*attr.value == b"alternate",
            _ => {}
        }
    }
    if let (Some(href), true) = (href, rel_ok) {
        entry.link = href;
    }
}

fn resolve_entity(name: &str) -> Option<String> {
    let resolved = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            return char::from_u32(value).map(String::from);
        }
    };
    Some(resolved.to_string())
}
