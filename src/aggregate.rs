//! Merging per-source results into one ordered release list.
//!
//! # Ordering
//!
//! Results arrive in registry order and every source keeps the order its
//! extractor produced, so the output is grouped by source without sorting.
//!
//! # Undated Records
//!
//! Some sources (the public-inbox searches) print no dates. With a
//! `since` bound such records cannot be proven stale, so by default they are
//! kept ([`UndatedPolicy::Include`]); `--exclude-undated` drops them instead.

use crate::models::{FetchResult, FetchStatus, ReleaseRecord};
use chrono::NaiveDate;
use itertools::Itertools;
use serde::Deserialize;
use tracing::{info, instrument, warn};

/// What to do with records that carry no date when filtering by date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UndatedPolicy {
    #[default]
    Include,
    Exclude,
}

/// Filter, deduplicate and order the records of all successful sources.
///
/// # Arguments
///
/// * `results` - Per-source results, in registry order
/// * `since` - Drop records dated strictly before this day
/// * `undated` - Policy for records without a date when `since` is set
///
/// # Returns
///
/// Records grouped by source, first occurrence of each `(product, label)` pair.
#[instrument(level = "info", skip_all, fields(sources = results.len(), ?since))]
pub fn aggregate(
    results: &[FetchResult],
    since: Option<NaiveDate>,
    undated: UndatedPolicy,
) -> Vec<ReleaseRecord> {
    let records = results
        .iter()
        .flat_map(FetchResult::records)
        .filter(|record| is_recent(record, since, undated))
        .unique_by(|record| (record.product().to_string(), record.label().to_string()))
        .cloned()
        .collect::<Vec<_>>();
    info!(count = records.len(), "Aggregated releases");
    records
}

fn is_recent(record: &ReleaseRecord, since: Option<NaiveDate>, undated: UndatedPolicy) -> bool {
    match (since, record.date()) {
        (None, _) => true,
        (Some(since), Some(date)) => date >= since,
        (Some(_), None) => undated == UndatedPolicy::Include,
    }
}

/// Outcome counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub warnings: usize,
}

impl RunSummary {
    /// Count outcomes, logging one line per failed or degraded source.
    pub fn from_results(results: &[FetchResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match &result.status {
                FetchStatus::Succeeded { warning: None, .. } => summary.succeeded += 1,
                FetchStatus::Succeeded {
                    warning: Some(warning),
                    ..
                } => {
                    summary.succeeded += 1;
                    summary.warnings += 1;
                    warn!(source = %result.source, kind = warning.kind(), "{warning}");
                }
                FetchStatus::Failed(error) => {
                    summary.failed += 1;
                    warn!(source = %result.source, kind = error.kind(), "{error}");
                }
            }
        }
        summary
    }

    /// Process exit code: success as long as one source could be processed.
    pub fn exit_code(&self) -> u8 {
        if self.succeeded > 0 { 0 } else { 1 }
    }
}

/// One line per failed source, for the diagnostic stream.
pub fn failure_lines(results: &[FetchResult]) -> Vec<String> {
    results
        .iter()
        .filter_map(|result| match &result.status {
            FetchStatus::Failed(error) => Some(format!("warning: {} failed: {error}", result.source)),
            FetchStatus::Succeeded {
                warning: Some(warning),
                ..
            } => Some(format!("warning: {}: {warning}", result.source)),
            FetchStatus::Succeeded { warning: None, .. } => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn record(product: &str, label: &str, date: Option<NaiveDate>) -> ReleaseRecord {
        ReleaseRecord::new(product, label, date, &format!("https://example.com/{label}")).unwrap()
    }

    #[test]
    fn test_since_filter_keeps_recent_and_undated() {
        let results = vec![FetchResult::succeeded(
            "x",
            vec![
                record("X", "old", date(2024, 1, 1)),
                record("X", "new", date(2024, 6, 1)),
                record("X", "undated", None),
            ],
        )];
        let out = aggregate(&results, date(2024, 3, 1), UndatedPolicy::Include);
        let labels: Vec<_> = out.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["new", "undated"]);
    }

    #[test]
    fn test_since_filter_is_inclusive() {
        let results = vec![FetchResult::succeeded("x", vec![record("X", "same-day", date(2024, 3, 1))])];
        assert_eq!(aggregate(&results, date(2024, 3, 1), UndatedPolicy::Include).len(), 1);
    }

    #[test]
    fn test_exclude_undated_policy() {
        let results = vec![FetchResult::succeeded(
            "x",
            vec![record("X", "new", date(2024, 6, 1)), record("X", "undated", None)],
        )];
        let out = aggregate(&results, date(2024, 3, 1), UndatedPolicy::Exclude);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label(), "new");
        // Without a bound nothing is filtered, whatever the policy.
        assert_eq!(aggregate(&results, None, UndatedPolicy::Exclude).len(), 2);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let results = vec![
            FetchResult::succeeded(
                "a",
                vec![record("Git", "2.45.0", None), record("Git", "2.45.0", date(2024, 4, 29))],
            ),
            FetchResult::succeeded("b", vec![record("tig", "2.45.0", None)]),
        ];
        let out = aggregate(&results, None, UndatedPolicy::Include);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].date(), None);
        assert_eq!(out[1].product(), "tig");
    }

    #[test]
    fn test_order_follows_results_then_extractor() {
        let results = vec![
            FetchResult::succeeded("b", vec![record("B", "2", None), record("B", "1", None)]),
            FetchResult::failed("c", SourceError::Network("down".into())),
            FetchResult::succeeded("a", vec![record("A", "9", None)]),
        ];
        let out = aggregate(&results, None, UndatedPolicy::Include);
        let labels: Vec<_> = out.iter().map(|r| (r.product(), r.label())).collect();
        assert_eq!(labels, vec![("B", "2"), ("B", "1"), ("A", "9")]);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let results = vec![
            FetchResult::succeeded("a", vec![record("A", "1", date(2024, 5, 1)), record("A", "1", None)]),
            FetchResult::succeeded("b", vec![record("B", "2", None)]),
        ];
        let first = aggregate(&results, date(2024, 1, 1), UndatedPolicy::Include);
        let second = aggregate(&results, date(2024, 1, 1), UndatedPolicy::Include);
        assert_eq!(first, second);
    }

    #[test]
    fn test_summary_and_exit_code() {
        let results = vec![
            FetchResult::failed("a", SourceError::Network("down".into())),
            FetchResult::succeeded("b", vec![record("B", "1", None)]),
        ];
        let summary = RunSummary::from_results(&results);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.exit_code(), 0);

        let all_failed = vec![FetchResult::failed("a", SourceError::Cancelled)];
        assert_eq!(RunSummary::from_results(&all_failed).exit_code(), 1);
    }

    #[test]
    fn test_failure_lines() {
        let results = vec![
            FetchResult::failed("gitlab", SourceError::Network("HTTP 503".into())),
            FetchResult::succeeded("git", vec![]),
        ];
        assert_eq!(
            failure_lines(&results),
            vec!["warning: gitlab failed: network error: HTTP 503".to_string()]
        );
    }
}
