//! Catalog of known release sources.
//!
//! Each [`SourceSpec`] pairs a document location with a fetch strategy and
//! an [`Extractor`]. Supporting a new product means adding one entry to
//! [`builtin_specs`]; nothing else in the pipeline changes.
//!
//! # Built-in Sources
//!
//! | Name | Product | Strategy | Notes |
//! |------|---------|----------|-------|
//! | `git` | Git | html | public-inbox search for `[ANNOUNCE] Git v…` |
//! | `git-for-windows` | Git for Windows | api-paginated | GitHub releases, needs credentials |
//! | `libgit2` | libgit2 | api-paginated | GitHub releases, needs credentials |
//! | `libgit2sharp` | libgit2sharp | api-paginated | GitHub releases, needs credentials |
//! | `github-enterprise` | GitHub Enterprise | html | release list with dates |
//! | `gitlab` | GitLab | rss | release-post feed |
//! | `bitbucket` | Bitbucket Server | html | release-notes page, dated headings |
//! | `gerrit` | Gerrit | bucket | storage-bucket listing, newest 20 |
//! | `gitkraken` | GitKraken | html | single release-notes page |
//! | `github-desktop` | GitHub Desktop | json | changelog feed |
//! | `tig` | tig | html | public-inbox search for `[ANNOUNCE] tig-…` |

use crate::error::SourceError;
use crate::extractors::{
    BucketRule, Extractor, FeedRule, HtmlRule, JsonRule, LinkPolicy, VersionPattern,
};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fmt;

const PUBLIC_INBOX: &str = "https://public-inbox.org/git/";

/// How the raw document of a source is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    Html,
    Rss,
    Json,
    /// Authenticated API walk following `Link: rel="next"` headers.
    ApiPaginated,
    /// S3/GCS XML listing, continued with `?marker=` while `IsTruncated`.
    BucketListing,
}

impl FetchStrategy {
    /// Whether one document may span several responses.
    pub fn is_paged(self) -> bool {
        matches!(self, FetchStrategy::ApiPaginated | FetchStrategy::BucketListing)
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            FetchStrategy::Html => "html",
            FetchStrategy::Rss => "rss",
            FetchStrategy::Json => "json",
            FetchStrategy::ApiPaginated => "api-paginated",
            FetchStrategy::BucketListing => "bucket",
        })
    }
}

/// Query terms added to the source URL at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinceQuery {
    /// Plain URL.
    None,
    /// public-inbox search, `?q=d:YYYYMMDD.. <subject>`.
    PublicInbox { subject: &'static str },
}

/// Static description of one release source.
#[derive(Debug)]
pub struct SourceSpec {
    /// Unique key, used by `--get` and for offline fixture names.
    pub name: &'static str,
    /// Product name printed in the output.
    pub product: &'static str,
    /// Document URL (first page for paginated sources).
    pub url: &'static str,
    pub strategy: FetchStrategy,
    pub extractor: Extractor,
    pub requires_auth: bool,
    pub since_query: SinceQuery,
}

impl SourceSpec {
    /// URL to request, narrowed to `since` where the source supports it.
    pub fn request_url(&self, since: Option<NaiveDate>) -> String {
        match self.since_query {
            SinceQuery::None => self.url.to_string(),
            SinceQuery::PublicInbox { subject } => {
                let query = match since {
                    Some(date) => format!("d:{}.. {subject}", date.format("%Y%m%d")),
                    None => subject.to_string(),
                };
                format!("{}?q={}", self.url, urlencoding::encode(&query))
            }
        }
    }
}

/// Read-only collection of [`SourceSpec`]s in catalog order.
#[derive(Debug)]
pub struct Registry {
    specs: Vec<SourceSpec>,
}

static BUILTIN: Lazy<Registry> = Lazy::new(|| {
    Registry::from_specs(builtin_specs()).unwrap_or_else(|e| panic!("built-in catalog: {e}"))
});

impl Registry {
    /// The process-wide built-in catalog.
    pub fn builtin() -> &'static Registry {
        &BUILTIN
    }

    /// Build a registry from custom specs.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] when two specs share a name.
    pub fn from_specs(specs: Vec<SourceSpec>) -> Result<Self, SourceError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name) {
                return Err(SourceError::Config(format!("duplicate source name `{}`", spec.name)));
            }
        }
        Ok(Self { specs })
    }

    /// All sources in catalog order.
    pub fn list(&self) -> Vec<&SourceSpec> {
        self.specs.iter().collect()
    }

    /// Find a source by name.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::UnknownSource`] when no source has that name.
    pub fn lookup(&self, name: &str) -> Result<&SourceSpec, SourceError> {
        self.specs
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| SourceError::UnknownSource(name.to_string()))
    }

    /// Sources for a run: the named one, or all of them.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<&SourceSpec>, SourceError> {
        match name {
            Some(name) => self.lookup(name).map(|spec| vec![spec]),
            None => Ok(self.list()),
        }
    }
}

fn public_inbox(name: &'static str, product: &'static str, pattern: &str) -> SourceSpec {
    SourceSpec {
        name,
        product,
        url: PUBLIC_INBOX,
        strategy: FetchStrategy::Html,
        extractor: Extractor::Html(HtmlRule::new(
            "a[href]",
            VersionPattern::new(pattern),
            LinkPolicy::Relative(PUBLIC_INBOX),
        )),
        requires_auth: false,
        since_query: SinceQuery::PublicInbox {
            subject: "[ANNOUNCE]",
        },
    }
}

fn github_releases(
    name: &'static str,
    product: &'static str,
    url: &'static str,
    pattern: &str,
) -> SourceSpec {
    SourceSpec {
        name,
        product,
        url,
        strategy: FetchStrategy::ApiPaginated,
        extractor: Extractor::Json(JsonRule::github_releases(VersionPattern::new(pattern))),
        requires_auth: true,
        since_query: SinceQuery::None,
    }
}

/// The built-in catalog, in output order.
pub fn builtin_specs() -> Vec<SourceSpec> {
    vec![
        public_inbox("git", "Git", r"^\[ANNOUNCE\] Git v(.*)$"),
        github_releases(
            "git-for-windows",
            "Git for Windows",
            "https://api.github.com/repos/git-for-windows/git/releases?per_page=100",
            r"^v(\d+\.\d+\.\d+)\.windows\.(\d+)$",
        ),
        github_releases(
            "libgit2",
            "libgit2",
            "https://api.github.com/repos/libgit2/libgit2/releases?per_page=100",
            r"^v(\d+\.\d+\.\d+)$",
        ),
        github_releases(
            "libgit2sharp",
            "libgit2sharp",
            "https://api.github.com/repos/libgit2/libgit2sharp/releases?per_page=100",
            r"^v(\d+\.\d+(?:\.\d+)?)$",
        ),
        SourceSpec {
            name: "github-enterprise",
            product: "GitHub Enterprise",
            url: "https://enterprise.github.com/releases/",
            strategy: FetchStrategy::Html,
            extractor: Extractor::Html(
                HtmlRule::new(
                    "h3",
                    VersionPattern::new(r"(\d+\.\d+\.\d+)"),
                    LinkPolicy::Relative("https://enterprise.github.com/releases/"),
                )
                .label("a")
                .link("a")
                .date_within("small", "%B %d, %Y"),
            ),
            requires_auth: false,
            since_query: SinceQuery::None,
        },
        SourceSpec {
            name: "gitlab",
            product: "GitLab",
            url: "https://about.gitlab.com/releases.xml",
            strategy: FetchStrategy::Rss,
            extractor: Extractor::Feed(FeedRule {
                version: Some(VersionPattern::new(r"(\d{2}\.\d+(?:\.\d+)?)").all()),
                links: LinkPolicy::Relative("https://about.gitlab.com/"),
            }),
            requires_auth: false,
            since_query: SinceQuery::None,
        },
        SourceSpec {
            name: "bitbucket",
            product: "Bitbucket Server",
            url: "https://confluence.atlassian.com/bitbucketserver/bitbucket-server-release-notes-872139866.html",
            strategy: FetchStrategy::Html,
            extractor: Extractor::Html(
                HtmlRule::new(
                    r#"h2[id^="BitbucketServerreleasenotes"]"#,
                    VersionPattern::new(r"^Bitbucket (?:Server|Data Center) (\d+\.\d+)"),
                    LinkPolicy::Relative("https://confluence.atlassian.com/bitbucketserver/"),
                )
                .link_by_version(r#"a[rel="nofollow"]"#)
                .date_after_within("strong", "%d %B %Y"),
            ),
            requires_auth: false,
            since_query: SinceQuery::None,
        },
        SourceSpec {
            name: "gerrit",
            product: "Gerrit",
            url: "https://gerrit-releases.storage.googleapis.com/",
            strategy: FetchStrategy::BucketListing,
            extractor: Extractor::Bucket(BucketRule {
                key: VersionPattern::new(r"^gerrit-(\d+\.\d+(?:\.\d+)?(?:-rc\d+)?)\.war"),
                base_url: "https://gerrit-releases.storage.googleapis.com/",
            }),
            requires_auth: false,
            since_query: SinceQuery::None,
        },
        SourceSpec {
            name: "gitkraken",
            product: "GitKraken",
            url: "https://support.gitkraken.com/release-notes/current",
            strategy: FetchStrategy::Html,
            extractor: Extractor::Html(
                HtmlRule::new(
                    r#"h2[id^="version-"]"#,
                    VersionPattern::new(r"(\d+\.\d+\.\d+)"),
                    LinkPolicy::Fixed("https://support.gitkraken.com/release-notes/current"),
                )
                .date_after("%A, %B %d, %Y"),
            ),
            requires_auth: false,
            since_query: SinceQuery::None,
        },
        SourceSpec {
            name: "github-desktop",
            product: "GitHub Desktop",
            url: "https://central.github.com/deployments/desktop/desktop/changelog.json",
            strategy: FetchStrategy::Json,
            extractor: Extractor::Json(JsonRule {
                version_field: "version",
                date_field: Some("pub_date"),
                url_field: None,
                release_notes_url: Some("https://desktop.github.com/release-notes/"),
                version: None,
            }),
            requires_auth: false,
            since_query: SinceQuery::None,
        },
        public_inbox("tig", "tig", r"^\[ANNOUNCE\] tig-(.*)$"),
    ]
}
