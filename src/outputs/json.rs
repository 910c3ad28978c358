//! JSON output of the aggregated release list.
//!
//! Written next to the Markdown file when `--json` is given, so scripts
//! can consume the same list without scraping the Markdown.
//!
//! # Output Structure
//!
//! ```text
//! {
//!   "generated_at": "2024-06-01T08:00:00Z",
//!   "since": "2024-05-02",
//!   "releases": [
//!     { "product": "Git", "label": "2.45.1", "date": null, "url": "https://…" }
//!   ]
//! }
//! ```

use crate::models::ReleaseRecord;
use crate::utils::ensure_parent_dir;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Document written to the JSON file.
#[derive(Debug, Serialize)]
pub struct ReleaseList<'a> {
    pub generated_at: DateTime<Utc>,
    pub since: Option<NaiveDate>,
    pub releases: &'a [ReleaseRecord],
}

/// Serialize `records` and overwrite `path`.
///
/// # Errors
///
/// Returns an error if serialization, directory creation or writing fails.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub async fn write_releases(
    path: &Path,
    records: &[ReleaseRecord],
    since: Option<NaiveDate>,
) -> Result<(), Box<dyn Error>> {
    let list = ReleaseList {
        generated_at: Utc::now(),
        since,
        releases: records,
    };
    let json = serde_json::to_string_pretty(&list)?;
    ensure_parent_dir(path).await?;
    fs::write(path, json).await?;
    info!("Wrote JSON release list");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_release_list_serialization() {
        let records = vec![
            ReleaseRecord::new(
                "libgit2",
                "1.8.1",
                NaiveDate::from_ymd_opt(2024, 5, 20),
                "https://github.com/libgit2/libgit2/releases/tag/v1.8.1",
            )
            .unwrap(),
        ];
        let list = ReleaseList {
            generated_at: Utc::now(),
            since: NaiveDate::from_ymd_opt(2024, 5, 1),
            releases: &records,
        };
        let value = serde_json::to_value(&list).unwrap();
        assert_eq!(value["since"], "2024-05-01");
        assert_eq!(value["releases"][0]["label"], "1.8.1");
        assert_eq!(value["releases"][0]["date"], "2024-05-20");
    }

    #[tokio::test]
    async fn test_write_releases_creates_parent_dir() {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let dir = std::env::temp_dir().join(format!("git_releases_json_{nanos}"));
        let path = dir.join("nested/releases.json");

        write_releases(&path, &[], None).await.unwrap();

        let written = fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["releases"], serde_json::json!([]));
        assert!(value["since"].is_null());
        let _ = fs::remove_dir_all(&dir).await;
    }
}
