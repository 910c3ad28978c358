//! Network fetcher.
//!
//! Plain sources are a single GET. Sources with
//! [`FetchStrategy::ApiPaginated`] are walked page by page through the
//! `Link: <…>; rel="next"` header the GitHub REST API returns, with basic
//! auth on every request and a hard cap on the number of pages. The walk
//! stops early once a page reaches releases older than `since`.
//! [`FetchStrategy::BucketListing`] sources are continued with `?marker=`
//! while the listing reports itself truncated, under the same cap.
//!
//! Nothing is retried: a failing source fails alone and the rest of the run
//! carries on.

use super::{Fetch, document_path};
use crate::error::SourceError;
use crate::extractors::bucket::parse_listing;
use crate::models::{Credentials, RawDocument};
use crate::registry::{FetchStrategy, SourceSpec};
use chrono::NaiveDate;
use reqwest::header::{ACCEPT, LINK};
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Default page cap for paginated API walks.
pub const DEFAULT_MAX_PAGES: usize = 10;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Network settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Timeout applied to every single request.
    pub timeout: Duration,
    pub user_agent: String,
    /// Pages fetched at most for one paginated source.
    pub max_pages: usize,
    /// Where to write a copy of every fetched page, if anywhere.
    pub dump_dir: Option<PathBuf>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            max_pages: DEFAULT_MAX_PAGES,
            dump_dir: None,
        }
    }
}

/// Fetcher backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_pages: usize,
    dump_dir: Option<PathBuf>,
}

impl HttpFetcher {
    /// Build the shared client.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the TLS backend cannot be initialized.
    pub fn new(options: HttpOptions) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()
            .map_err(|e| SourceError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            max_pages: options.max_pages.max(1),
            dump_dir: options.dump_dir,
        })
    }

    /// GET one page, returning its body and the next-page link if any.
    #[instrument(level = "debug", skip_all, fields(%url, auth = credentials.is_some()))]
    async fn get_page(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<(String, Option<String>), SourceError> {
        let t0 = Instant::now();
        let mut request = self.client.get(url);
        if let Some(creds) = credentials {
            request = request
                .basic_auth(&creds.user, Some(&creds.token))
                .header(ACCEPT, GITHUB_ACCEPT);
        }

        let response = request.send().await?;
        let status = response.status();
        if credentials.is_some()
            && (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN)
        {
            return Err(SourceError::Auth(format!("HTTP {status} from {url}")));
        }
        if !status.is_success() {
            return Err(SourceError::Network(format!("HTTP {status} from {url}")));
        }

        let next = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_link);
        let body = response.text().await?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            has_next = next.is_some(),
            "Fetched page"
        );
        Ok((body, next))
    }

    /// Request pages from `first_url` until `next_url` has nothing more, the
    /// walk reaches before `since`, or the page cap is hit.
    ///
    /// `next_url` sees each body and its `rel="next"` link.
    async fn walk<N>(
        &self,
        spec: &SourceSpec,
        first_url: String,
        credentials: Option<&Credentials>,
        since: Option<NaiveDate>,
        next_url: N,
    ) -> Result<RawDocument, SourceError>
    where
        N: Fn(&str, Option<String>) -> Option<String>,
    {
        let mut pages = Vec::new();
        let mut url = first_url;
        let mut truncated = false;

        loop {
            let (body, link) = self.get_page(&url, credentials).await?;
            let next = next_url(&body, link);
            let reached_since =
                since.is_some_and(|since| spec.extractor.page_predates(&body, since));
            pages.push(body);
            match next {
                Some(_) if reached_since => {
                    debug!(source = spec.name, pages = pages.len(), "Reached releases older than since");
                    break;
                }
                Some(next) if pages.len() >= self.max_pages => {
                    warn!(source = spec.name, max_pages = self.max_pages, %next, "Page cap reached before last page");
                    truncated = true;
                    break;
                }
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(RawDocument::from_pages(spec.name, pages, truncated))
    }

    /// Write every page of `doc` under the dump directory; failures are only logged.
    async fn dump(&self, spec: &SourceSpec, doc: &RawDocument) {
        let Some(dir) = &self.dump_dir else {
            return;
        };
        if let Err(e) = fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %e, "Cannot create dump directory");
            return;
        }
        for (index, page) in doc.pages.iter().enumerate() {
            let path = document_path(dir, spec, index + 1);
            match fs::write(&path, page).await {
                Ok(()) => debug!(path = %path.display(), "Dumped raw document"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to dump raw document"),
            }
        }
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(source = spec.name, strategy = %spec.strategy))]
    async fn fetch(
        &self,
        spec: &SourceSpec,
        credentials: Option<&Credentials>,
        since: Option<NaiveDate>,
    ) -> Result<RawDocument, SourceError> {
        if spec.requires_auth && credentials.is_none() {
            return Err(SourceError::Auth(format!(
                "`{}` needs GitHub credentials (--user and --password)",
                spec.name
            )));
        }

        let url = spec.request_url(since);
        let doc = match spec.strategy {
            FetchStrategy::ApiPaginated => {
                self.walk(spec, url, credentials, since, |_, link| link).await?
            }
            FetchStrategy::BucketListing => {
                let base = url.clone();
                self.walk(spec, url, credentials, None, move |body, _| {
                    with_marker(&base, parse_listing(body).continuation()?)
                })
                .await?
            }
            FetchStrategy::Html | FetchStrategy::Rss | FetchStrategy::Json => {
                let (body, _) = self.get_page(&url, credentials).await?;
                RawDocument::new(spec.name, body)
            }
        };

        info!(pages = doc.pages.len(), bytes = doc.len(), truncated = doc.truncated, "Fetched source");
        self.dump(spec, &doc).await;
        Ok(doc)
    }
}

/// `base` with a `marker` query parameter, the continuation of a bucket listing.
fn with_marker(base: &str, marker: &str) -> Option<String> {
    let mut url = Url::parse(base).ok()?;
    url.query_pairs_mut().append_pair("marker", marker);
    Some(url.into())
}

/// Target of the `rel="next"` entry of an RFC 8288 `Link` header.
///
/// # Examples
///
/// ```ignore
/// let header = r#"<https://api.github.com/x?page=2>; rel="next", <https://api.github.com/x?page=5>; rel="last""#;
/// assert_eq!(next_link(header).as_deref(), Some("https://api.github.com/x?page=2"));
/// ```
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        is_next.then(|| target.to_string())
    })
}
