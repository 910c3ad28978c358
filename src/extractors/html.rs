//! HTML release-page extractor.
//!
//! Vendors publish release notes as plain HTML: a list of headings or
//! anchors, each naming a version, sometimes with a date next to it. An
//! [`HtmlRule`] describes where those pieces live with CSS selectors.
//!
//! # Selection Model
//!
//! - `item`: one element per release (`h3`, `a[rel="nofollow"]`, ...)
//! - `label`: element inside the item holding the version text (default: the item)
//! - `link`: element inside the item holding the `href` (default: the item
//!   when it is an anchor, else its first `a[href]`), or anywhere on the page
//!   when the link text names the same version (`link_by_version`)
//! - `date`: inside the item, the next sibling element, or an element inside
//!   that sibling (`<h2>` followed by `<p><strong>21 May 2024</strong></p>`)

use super::{LinkPolicy, VersionPattern};
use crate::models::{RawDocument, ReleaseRecord};
use crate::utils::{parse_loose_date, squash_whitespace};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::trace;

static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a[href]"));

/// Parse a constant CSS selector from the source catalog.
pub fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

/// Where the release date of an item is printed.
#[derive(Debug)]
pub enum DateLocation {
    /// First element matching the selector inside the item.
    Within(Selector),
    /// The element right after the item (`<h2>` followed by `<p>Released ...</p>`).
    NextSibling,
    /// First element matching the selector inside the element right after the item.
    NextSiblingWithin(Selector),
}

/// Date location plus its `strftime` format.
#[derive(Debug)]
pub struct DateRule {
    pub location: DateLocation,
    pub format: &'static str,
}

impl DateRule {
    fn find(&self, item: ElementRef<'_>) -> Option<NaiveDate> {
        let text = match &self.location {
            DateLocation::Within(sel) => item.select(sel).next().map(element_text)?,
            DateLocation::NextSibling => next_element(item).map(element_text)?,
            DateLocation::NextSiblingWithin(sel) => {
                next_element(item)?.select(sel).next().map(element_text)?
            }
        };
        parse_loose_date(&text, self.format)
    }
}

/// Selectors and patterns locating releases on one HTML page.
#[derive(Debug)]
pub struct HtmlRule {
    pub item: Selector,
    pub label: Option<Selector>,
    pub link: Option<Selector>,
    /// Page-wide elements whose text carries the version; their `href` wins over `link`.
    pub version_links: Option<Selector>,
    pub date: Option<DateRule>,
    pub version: VersionPattern,
    pub links: LinkPolicy,
}

impl HtmlRule {
    pub fn new(item: &str, version: VersionPattern, links: LinkPolicy) -> Self {
        Self {
            item: selector(item),
            label: None,
            link: None,
            version_links: None,
            date: None,
            version,
            links,
        }
    }

    pub fn label(mut self, css: &str) -> Self {
        self.label = Some(selector(css));
        self
    }

    pub fn link(mut self, css: &str) -> Self {
        self.link = Some(selector(css));
        self
    }

    pub fn link_by_version(mut self, css: &str) -> Self {
        self.version_links = Some(selector(css));
        self
    }

    pub fn date_within(mut self, css: &str, format: &'static str) -> Self {
        self.date = Some(DateRule {
            location: DateLocation::Within(selector(css)),
            format,
        });
        self
    }

    pub fn date_after(mut self, format: &'static str) -> Self {
        self.date = Some(DateRule {
            location: DateLocation::NextSibling,
            format,
        });
        self
    }

    pub fn date_after_within(mut self, css: &str, format: &'static str) -> Self {
        self.date = Some(DateRule {
            location: DateLocation::NextSiblingWithin(selector(css)),
            format,
        });
        self
    }

    /// Extract records from every page of `doc`, in document order.
    pub fn extract(&self, product: &str, doc: &RawDocument) -> Vec<ReleaseRecord> {
        let mut records = Vec::new();
        for page in &doc.pages {
            let document = Html::parse_document(page);
            let links = self.links_by_version(&document);
            for item in document.select(&self.item) {
                if let Some(record) = self.record_for(product, item, &links) {
                    records.push(record);
                }
            }
        }
        records
    }

    /// Version to `href` of the first matching `version_links` element.
    fn links_by_version<'a>(&self, document: &'a Html) -> HashMap<String, &'a str> {
        let mut links = HashMap::new();
        let Some(sel) = &self.version_links else {
            return links;
        };
        for element in document.select(sel) {
            let (Some(version), Some(href)) = (
                self.version.version_of(&element_text(element)),
                element.value().attr("href"),
            ) else {
                continue;
            };
            links.entry(version).or_insert(href);
        }
        links
    }

    fn record_for(
        &self,
        product: &str,
        item: ElementRef<'_>,
        links: &HashMap<String, &str>,
    ) -> Option<ReleaseRecord> {
        let label_text = match &self.label {
            Some(sel) => item.select(sel).next().map(element_text)?,
            None => element_text(item),
        };
        let Some(version) = self.version.version_of(&label_text) else {
            trace!(label = %label_text, "Skipping item without version");
            return None;
        };
        let href = match &self.version_links {
            Some(_) => links.get(&version).copied(),
            None => self.href_of(item),
        };
        let url = self.links.resolve(href)?;
        let date = self.date.as_ref().and_then(|rule| rule.find(item));
        ReleaseRecord::new(product, &version, date, &url)
    }

    fn href_of<'a>(&self, item: ElementRef<'a>) -> Option<&'a str> {
        match &self.link {
            Some(sel) => item.select(sel).next()?.value().attr("href"),
            None if item.value().name() == "a" => item.value().attr("href"),
            None => item.select(&ANCHOR).next()?.value().attr("href"),
        }
    }
}

fn next_element<'a>(item: ElementRef<'a>) -> Option<ElementRef<'a>> {
    item.next_siblings().find_map(ElementRef::wrap)
}

fn element_text(element: ElementRef<'_>) -> String {
    squash_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}
