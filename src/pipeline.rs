//! Fan-out of fetch + extract over the selected sources.
//!
//! # Failure Isolation
//!
//! Every source runs its own fetch and extraction and ends as exactly one
//! [`FetchResult`]. Errors never cross that boundary: a source that cannot
//! be fetched becomes [`FetchStatus::Failed`](crate::models::FetchStatus::Failed), while soft problems (a
//! truncated page walk, a page without any match) ride along as a warning
//! next to whatever records were found.
//!
//! # Concurrency
//!
//! Up to `concurrency` sources are in flight at once via
//! `futures::stream::buffered`, which also hands results back in the order
//! the sources were given. Sources share nothing mutable.
//!
//! # Interrupts
//!
//! The pipeline watches a `bool` channel flipped on Ctrl-C. Sources that
//! have not started yet resolve to [`SourceError::Cancelled`] right away;
//! sources already in flight get `grace` to finish before they are
//! abandoned the same way. Results completed earlier are kept.

use crate::error::SourceError;
use crate::extractors::ExtractOptions;
use crate::fetchers::Fetch;
use crate::models::{Credentials, FetchResult};
use crate::registry::SourceSpec;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Runs selected sources through a [`Fetch`] implementation and their extractors.
pub struct Pipeline<'a, F> {
    fetcher: &'a F,
    credentials: Option<&'a Credentials>,
    since: Option<NaiveDate>,
    options: ExtractOptions,
    concurrency: usize,
    grace: Duration,
    cancel: watch::Receiver<bool>,
}

impl<'a, F: Fetch> Pipeline<'a, F> {
    pub fn new(fetcher: &'a F, cancel: watch::Receiver<bool>) -> Self {
        Self {
            fetcher,
            credentials: None,
            since: None,
            options: ExtractOptions::default(),
            concurrency: 4,
            grace: Duration::from_secs(5),
            cancel,
        }
    }

    pub fn credentials(mut self, credentials: Option<&'a Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn since(mut self, since: Option<NaiveDate>) -> Self {
        self.since = since;
        self
    }

    pub fn options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Process `specs`, returning one result per source in the same order.
    #[instrument(level = "info", skip_all, fields(sources = specs.len(), concurrency = self.concurrency))]
    pub async fn run(&self, specs: &[&SourceSpec]) -> Vec<FetchResult> {
        let t0 = Instant::now();
        let results: Vec<FetchResult> = stream::iter(specs.iter().copied())
            .map(|spec| self.process(spec))
            .buffered(self.concurrency)
            .collect()
            .await;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Processed all sources"
        );
        results
    }

    async fn process(&self, spec: &SourceSpec) -> FetchResult {
        if *self.cancel.borrow() {
            debug!(source = spec.name, "Not starting source after interrupt");
            return FetchResult::failed(spec.name, SourceError::Cancelled);
        }

        let mut cancel = self.cancel.clone();
        tokio::select! {
            result = self.fetch_and_extract(spec) => result,
            () = interrupted(&mut cancel, self.grace) => {
                warn!(source = spec.name, grace_ms = self.grace.as_millis() as u64, "Abandoning source after interrupt");
                FetchResult::failed(spec.name, SourceError::Cancelled)
            }
        }
    }

    #[instrument(level = "info", skip_all, fields(source = spec.name))]
    async fn fetch_and_extract(&self, spec: &SourceSpec) -> FetchResult {
        let t0 = Instant::now();
        let doc = match self.fetcher.fetch(spec, self.credentials, self.since).await {
            Ok(doc) => doc,
            Err(error) => {
                warn!(
                    kind = error.kind(),
                    error = %error,
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Source failed"
                );
                return FetchResult::failed(spec.name, error);
            }
        };

        debug!(fetched_at = %doc.fetched_at, pages = doc.pages.len(), "Extracting");
        let records = spec.extractor.extract(spec.product, &doc, &self.options);
        let warning = if doc.truncated {
            Some(SourceError::PaginationLimitExceeded {
                limit: doc.pages.len(),
            })
        } else if doc.is_blank() {
            Some(SourceError::Parse("empty document".into()))
        } else if records.is_empty() {
            Some(SourceError::Parse(format!(
                "no releases found in {} bytes of {} content",
                doc.len(),
                spec.extractor.shape()
            )))
        } else {
            None
        };

        info!(
            count = records.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Source processed"
        );
        FetchResult::succeeded(spec.name, records).with_warning(warning)
    }
}

/// Resolves `grace` after the cancel flag turns `true`; never if the sender goes away first.
async fn interrupted(cancel: &mut watch::Receiver<bool>, grace: Duration) {
    loop {
        if *cancel.borrow_and_update() {
            break;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
    sleep(grace).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{RunSummary, UndatedPolicy, aggregate};
    use crate::fetchers::LocalFileFetcher;
    use crate::models::{FetchStatus, RawDocument};
    use crate::registry::Registry;
    use std::collections::HashMap;

    /// Serves canned bodies by source name, optionally after a delay.
    #[derive(Default)]
    struct FakeFetcher {
        bodies: HashMap<&'static str, Result<String, SourceError>>,
        truncated: bool,
        delay: Option<Duration>,
    }

    impl FakeFetcher {
        fn with(mut self, name: &'static str, body: Result<&str, SourceError>) -> Self {
            self.bodies.insert(name, body.map(str::to_string));
            self
        }
    }

    impl Fetch for FakeFetcher {
        async fn fetch(
            &self,
            spec: &SourceSpec,
            _credentials: Option<&Credentials>,
            _since: Option<NaiveDate>,
        ) -> Result<RawDocument, SourceError> {
            if let Some(delay) = self.delay {
                sleep(delay).await;
            }
            let body = self
                .bodies
                .get(spec.name)
                .cloned()
                .unwrap_or_else(|| Err(SourceError::Network("no canned body".into())))?;
            Ok(RawDocument::from_pages(spec.name, vec![body], self.truncated))
        }
    }

    const DESKTOP: &str = include_str!("../tests/fixtures/github-desktop.json");

    fn specs(names: &[&str]) -> Vec<&'static SourceSpec> {
        names
            .iter()
            .map(|name| Registry::builtin().lookup(name).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_failed_source_does_not_affect_others() {
        let fetcher = FakeFetcher::default()
            .with("gitlab", Err(SourceError::Network("HTTP 503".into())))
            .with("github-desktop", Ok(DESKTOP));
        let (_tx, rx) = watch::channel(false);
        let results = Pipeline::new(&fetcher, rx)
            .run(&specs(&["gitlab", "github-desktop"]))
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, "gitlab");
        assert!(matches!(
            results[0].status,
            FetchStatus::Failed(SourceError::Network(_))
        ));
        assert!(results[1].is_success());

        let records = aggregate(&results, None, UndatedPolicy::Include);
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| r.product() == "GitHub Desktop"));
        assert_eq!(RunSummary::from_results(&results).exit_code(), 0);
    }

    #[tokio::test]
    async fn test_results_keep_input_order_under_concurrency() {
        let fetcher = FakeFetcher::default()
            .with("github-desktop", Ok(DESKTOP))
            .with("gitlab", Ok(include_str!("../tests/fixtures/gitlab.xml")))
            .with("gerrit", Ok(include_str!("../tests/fixtures/gerrit.xml")));
        let (_tx, rx) = watch::channel(false);
        let names = ["gerrit", "github-desktop", "gitlab"];
        let results = Pipeline::new(&fetcher, rx)
            .concurrency(3)
            .run(&specs(&names))
            .await;
        let order: Vec<_> = results.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(order, names);
    }

    #[tokio::test]
    async fn test_empty_extraction_is_soft_parse_warning() {
        let fetcher = FakeFetcher::default().with("gitlab", Ok("<html>maintenance</html>"));
        let (_tx, rx) = watch::channel(false);
        let results = Pipeline::new(&fetcher, rx).run(&specs(&["gitlab"])).await;
        match &results[0].status {
            FetchStatus::Succeeded { records, warning } => {
                assert!(records.is_empty());
                assert!(matches!(warning, Some(SourceError::Parse(_))));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(RunSummary::from_results(&results).exit_code(), 0);
    }

    #[tokio::test]
    async fn test_truncated_walk_keeps_records_with_warning() {
        let fetcher = FakeFetcher {
            truncated: true,
            ..FakeFetcher::default()
        }
        .with(
            "libgit2",
            Ok(r#"[{"tag_name": "v1.8.1", "html_url": "https://github.com/libgit2/libgit2/releases/tag/v1.8.1"}]"#),
        );
        let (_tx, rx) = watch::channel(false);
        let results = Pipeline::new(&fetcher, rx).run(&specs(&["libgit2"])).await;
        match &results[0].status {
            FetchStatus::Succeeded { records, warning } => {
                assert_eq!(records.len(), 1);
                assert_eq!(
                    warning,
                    &Some(SourceError::PaginationLimitExceeded { limit: 1 })
                );
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_source_starts_after_interrupt() {
        let fetcher = FakeFetcher::default().with("github-desktop", Ok(DESKTOP));
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let results = Pipeline::new(&fetcher, rx)
            .run(&specs(&["github-desktop", "gitlab"]))
            .await;
        assert!(results
            .iter()
            .all(|r| matches!(r.status, FetchStatus::Failed(SourceError::Cancelled))));
        assert_eq!(RunSummary::from_results(&results).exit_code(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_source_is_abandoned_after_grace() {
        let fetcher = FakeFetcher {
            delay: Some(Duration::from_secs(30)),
            ..FakeFetcher::default()
        }
        .with("github-desktop", Ok(DESKTOP));
        let (tx, rx) = watch::channel(false);
        let pipeline = Pipeline::new(&fetcher, rx).grace(Duration::from_millis(20));
        let selected = specs(&["github-desktop"]);

        let started = Instant::now();
        let (results, _) = tokio::join!(pipeline.run(&selected), async {
            sleep(Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        });

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            results[0].status,
            FetchStatus::Failed(SourceError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_offline_run_over_fixtures() {
        let fetcher = LocalFileFetcher::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures"));
        let (_tx, rx) = watch::channel(false);
        let all = Registry::builtin().list();
        let results = Pipeline::new(&fetcher, rx).run(&all).await;

        assert_eq!(results.len(), all.len());
        // libgit2sharp has no saved document; it fails alone.
        let failed: Vec<_> = results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.source.as_str())
            .collect();
        assert_eq!(failed, vec!["libgit2sharp"]);
        assert!(results
            .iter()
            .filter(|r| r.is_success())
            .all(|r| !r.records().is_empty()));

        let since = NaiveDate::from_ymd_opt(2024, 5, 1);
        let records = aggregate(&results, since, UndatedPolicy::Include);
        assert!(records
            .iter()
            .all(|r| r.date().is_none_or(|d| Some(d) >= since)));
        assert!(records.iter().any(|r| r.product() == "Gerrit" && r.label() == "3.10.0"));
        assert!(!records.iter().any(|r| r.product() == "Gerrit" && r.label() == "3.9.4"));
        assert!(records.iter().any(|r| r.product() == "Bitbucket Server" && r.label() == "8.19"));
        assert!(!records.iter().any(|r| r.product() == "Bitbucket Server" && r.label() == "8.18"));
        assert_eq!(RunSummary::from_results(&results).exit_code(), 0);
    }
}
