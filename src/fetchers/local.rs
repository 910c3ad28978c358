//! Offline fetcher reading previously saved documents.

use super::{Fetch, document_path};
use crate::error::SourceError;
use crate::models::{Credentials, RawDocument};
use crate::registry::SourceSpec;
use chrono::NaiveDate;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

/// Reads `<dir>/<name>.<ext>` (plus `<name>.<n>.<ext>` pages) instead of the network.
#[derive(Debug, Clone)]
pub struct LocalFileFetcher {
    dir: PathBuf,
}

impl LocalFileFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Fetch for LocalFileFetcher {
    #[instrument(level = "info", skip_all, fields(source = spec.name, dir = %self.dir.display()))]
    async fn fetch(
        &self,
        spec: &SourceSpec,
        _credentials: Option<&Credentials>,
        _since: Option<NaiveDate>,
    ) -> Result<RawDocument, SourceError> {
        let first = document_path(&self.dir, spec, 1);
        let body = fs::read_to_string(&first)
            .await
            .map_err(|e| SourceError::Network(format!("cannot read {}: {e}", first.display())))?;
        let mut pages = vec![body];

        if spec.strategy.is_paged() {
            // Later pages are optional; stop at the first gap.
            while let Ok(body) = fs::read_to_string(document_path(&self.dir, spec, pages.len() + 1)).await {
                pages.push(body);
            }
        }

        info!(pages = pages.len(), "Read saved document");
        Ok(RawDocument::from_pages(spec.name, pages, false))
    }
}
