//! Markdown rendering of release records.
//!
//! # Output Shape
//!
//! ```text
//! # Releases
//!
//! ## Git
//!
//! + [Git 2.45.1](https://public-inbox.org/git/…/)
//! + [Git 2.45.0](https://public-inbox.org/git/…/)
//!
//! ## GitHub Desktop
//!
//! + [GitHub Desktop 3.4.0](https://desktop.github.com/release-notes/)
//! ```
//!
//! Extractors emit bare versions. The product name is added to the link
//! text here, unless the label already mentions it.

use crate::models::ReleaseRecord;
use crate::utils::ensure_parent_dir;
use itertools::Itertools;
use serde::Deserialize;
use std::error::Error;
use std::fmt::Write;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Whether link texts get the product name in front of the version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductPrefix {
    /// `[GitLab 17.0](…)`, unless the label already contains the product.
    #[default]
    WhenMissing,
    /// `[17.0](…)`.
    Never,
}

/// Render one record as a Markdown link under `prefix`.
pub fn render_link(record: &ReleaseRecord, prefix: ProductPrefix) -> String {
    let embeds_product = record
        .label()
        .to_lowercase()
        .contains(&record.product().to_lowercase());
    match prefix {
        ProductPrefix::WhenMissing if !embeds_product => {
            format!("[{} {}]({})", record.product(), record.label(), record.url())
        }
        _ => record.to_markdown(),
    }
}

/// Render the full document, one `+ [link]` line per record, grouped by product.
pub fn render(records: &[ReleaseRecord], prefix: ProductPrefix) -> String {
    let mut md = String::from("# Releases\n");

    if records.is_empty() {
        md.push_str("\nNo releases found.\n");
        return md;
    }

    for (product, group) in &records.iter().chunk_by(|&record| record.product()) {
        let _ = writeln!(md, "\n## {product}\n");
        for record in group {
            let _ = writeln!(md, "+ {}", render_link(record, prefix));
        }
    }
    md
}

/// Render `records` and overwrite `path` with the result.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or the file
/// cannot be written.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub async fn write_markdown(
    path: &Path,
    records: &[ReleaseRecord],
    prefix: ProductPrefix,
) -> Result<(), Box<dyn Error>> {
    ensure_parent_dir(path).await?;
    fs::write(path, render(records, prefix)).await?;
    info!("Wrote Markdown release list");
    Ok(())
}
