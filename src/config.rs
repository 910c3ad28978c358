//! Run configuration.
//!
//! Settings come from an optional YAML file (`--config`) and are then
//! overridden by command-line flags. Every field has a default, so an empty
//! file, or no file at all, is a valid configuration.
//!
//! ```yaml
//! output: releases.md
//! lookback_days: 30
//! concurrency: 4
//! timeout_secs: 30
//! max_pages: 10
//! bucket_limit: 20
//! undated: include        # or: exclude
//! product_prefix: when-missing   # or: never
//! ```

use crate::aggregate::UndatedPolicy;
use crate::cli::Cli;
use crate::error::SourceError;
use crate::extractors::{DEFAULT_BUCKET_LIMIT, ExtractOptions};
use crate::fetchers::http::{DEFAULT_MAX_PAGES, HttpOptions};
use crate::outputs::markdown::ProductPrefix;
use chrono::{Duration as DateDuration, NaiveDate};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Longest lookback window accepted, about a century.
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// Effective settings of one run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Markdown output file, overwritten on every run.
    pub output: PathBuf,
    /// Optional JSON output file.
    pub json_output: Option<PathBuf>,
    /// Days before today used as `since` when `--since` is absent.
    pub lookback_days: i64,
    /// Sources fetched at the same time.
    pub concurrency: usize,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// How long in-flight sources may keep running after Ctrl-C.
    pub grace_secs: u64,
    /// Page cap for paginated API sources.
    pub max_pages: usize,
    /// Releases kept from storage-bucket listings.
    pub bucket_limit: usize,
    pub user_agent: String,
    pub undated: UndatedPolicy,
    pub product_prefix: ProductPrefix,
    /// Directory receiving a copy of every fetched document.
    pub dump_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output: PathBuf::from("releases.md"),
            json_output: None,
            lookback_days: 30,
            concurrency: 4,
            timeout_secs: 30,
            grace_secs: 5,
            max_pages: DEFAULT_MAX_PAGES,
            bucket_limit: DEFAULT_BUCKET_LIMIT,
            user_agent: HttpOptions::default().user_agent,
            undated: UndatedPolicy::default(),
            product_prefix: ProductPrefix::default(),
            dump_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if the file cannot be read or parsed.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Config(format!("cannot read {}: {e}", path.display())))?;
        let settings = Self::from_yaml(&text)
            .map_err(|e| SourceError::Config(format!("{}: {e}", path.display())))?;
        debug!(?settings, "Loaded configuration");
        Ok(settings)
    }

    /// Parse settings from YAML text; blank text yields the defaults.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Defaults, or the contents of `--config` when given, with CLI flags applied.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] for an unreadable file or invalid values.
    pub fn resolve(cli: &Cli) -> Result<Self, SourceError> {
        let mut settings = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply_cli(cli);
        settings.validate()?;
        Ok(settings)
    }

    /// Let explicit command-line flags win over file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(output) = &cli.output {
            self.output = output.clone();
        }
        if let Some(json) = &cli.json {
            self.json_output = Some(json.clone());
        }
        if let Some(concurrency) = cli.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(dir) = &cli.dump_dir {
            self.dump_dir = Some(dir.clone());
        }
        if cli.exclude_undated {
            self.undated = UndatedPolicy::Exclude;
        }
        if cli.no_product_prefix {
            self.product_prefix = ProductPrefix::Never;
        }
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), SourceError> {
        if self.concurrency == 0 {
            return Err(SourceError::Config("concurrency must be at least 1".into()));
        }
        if !(0..=MAX_LOOKBACK_DAYS).contains(&self.lookback_days) {
            return Err(SourceError::Config(format!(
                "lookback_days must be between 0 and {MAX_LOOKBACK_DAYS}"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(SourceError::Config("timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// `since` for this run: the explicit date, else today minus the lookback window.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] when the window reaches outside the
    /// representable date range.
    pub fn since(&self, explicit: Option<NaiveDate>, today: NaiveDate) -> Result<NaiveDate, SourceError> {
        if let Some(date) = explicit {
            return Ok(date);
        }
        DateDuration::try_days(self.lookback_days)
            .and_then(|window| today.checked_sub_signed(window))
            .ok_or_else(|| {
                SourceError::Config(format!("lookback_days {} is out of range", self.lookback_days))
            })
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
            max_pages: self.max_pages,
            dump_dir: self.dump_dir.clone(),
        }
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            bucket_limit: self.bucket_limit,
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}
