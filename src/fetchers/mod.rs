//! Strategies for obtaining raw source documents.
//!
//! # Architecture
//!
//! - [`Fetch`]: Core trait, one raw document per source
//! - [`HttpFetcher`]: Network access, plain GET or authenticated paginated walk
//! - [`LocalFileFetcher`]: Reads previously saved documents, for offline runs and tests
//!
//! Both implementations agree on one on-disk layout ([`document_path`]), so a
//! run with `--dump-dir` can be replayed later with `--offline`.

pub mod http;
pub mod local;

use crate::error::SourceError;
use crate::models::{Credentials, RawDocument};
use crate::registry::SourceSpec;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub use http::HttpFetcher;
pub use local::LocalFileFetcher;

/// Capability to retrieve the raw document of a source.
pub trait Fetch {
    /// Retrieve the document for `spec`.
    ///
    /// # Arguments
    ///
    /// * `spec` - The source to fetch
    /// * `credentials` - API credentials, required by sources with `requires_auth`
    /// * `since` - Lower date bound, for sources that can narrow their query
    ///
    /// # Errors
    ///
    /// [`SourceError::Network`] for transport, status or I/O failures and
    /// [`SourceError::Auth`] for missing or rejected credentials.
    async fn fetch(
        &self,
        spec: &SourceSpec,
        credentials: Option<&Credentials>,
        since: Option<NaiveDate>,
    ) -> Result<RawDocument, SourceError>;
}

/// Path of page `page` (1-based) of a source's document inside `dir`.
///
/// The first page is `<name>.<ext>`; later pages of a paginated walk are
/// `<name>.<page>.<ext>`.
pub fn document_path(dir: &Path, spec: &SourceSpec, page: usize) -> PathBuf {
    let ext = spec.extractor.file_extension();
    if page <= 1 {
        dir.join(format!("{}.{ext}", spec.name))
    } else {
        dir.join(format!("{}.{page}.{ext}", spec.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn test_document_path_layout() {
        let registry = Registry::builtin();
        let dir = Path::new("/tmp/dump");
        let libgit2 = registry.lookup("libgit2").unwrap();
        assert_eq!(document_path(dir, libgit2, 1), dir.join("libgit2.json"));
        assert_eq!(document_path(dir, libgit2, 3), dir.join("libgit2.3.json"));
        let gerrit = registry.lookup("gerrit").unwrap();
        assert_eq!(document_path(dir, gerrit, 1), dir.join("gerrit.xml"));
        let git = registry.lookup("git").unwrap();
        assert_eq!(document_path(dir, git, 1), dir.join("git.html"));
    }
}
