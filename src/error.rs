//! Error taxonomy for release sources.
//!
//! Every failure a single source can run into is a [`SourceError`]. The
//! pipeline catches them at the per-source boundary and turns them into a
//! [`FetchStatus`](crate::models::FetchStatus), so apart from
//! [`SourceError::UnknownSource`] and [`SourceError::Config`] none of these
//! ever abort a run.

use thiserror::Error;

/// Errors raised while resolving, fetching or parsing one release source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// `--get` named a source that is not in the registry.
    #[error("unknown source `{0}` (see --list)")]
    UnknownSource(String),

    /// Transport failure, non-2xx status, or unreadable local file.
    #[error("network error: {0}")]
    Network(String),

    /// Credentials missing, or rejected by the remote API (401/403).
    #[error("authentication error: {0}")]
    Auth(String),

    /// The API walk still had a next page when the page cap was reached.
    #[error("pagination limit of {limit} pages exceeded; kept collected pages")]
    PaginationLimitExceeded { limit: usize },

    /// Nothing could be extracted from a document that should have matched.
    #[error("parse error: {0}")]
    Parse(String),

    /// Interrupted by the user before the source finished.
    #[error("cancelled")]
    Cancelled,

    /// Invalid configuration file or option value.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SourceError {
    /// Short machine-friendly kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::UnknownSource(_) => "unknown_source",
            SourceError::Network(_) => "network",
            SourceError::Auth(_) => "auth",
            SourceError::PaginationLimitExceeded { .. } => "pagination_limit",
            SourceError::Parse(_) => "parse",
            SourceError::Cancelled => "cancelled",
            SourceError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Network(format!("request timed out: {e}"))
        } else {
            SourceError::Network(e.to_string())
        }
    }
}
