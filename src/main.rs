//! # git_releases
//!
//! Collects release announcements for Git-related software (Git, Git for
//! Windows, libgit2, GitLab, Gerrit, GitHub Desktop, ...) from their
//! vendors' pages, feeds and APIs, and writes them as one Markdown list of
//! links ready to paste into a newsletter edition.
//!
//! ## Usage
//!
//! ```sh
//! git_releases --list
//! git_releases --since 2024-05-01 -u octocat -p "$GITHUB_TOKEN"
//! git_releases --get gerrit -o gerrit.md
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Selection**: Pick sources from the [`registry`] (`--get` or all)
//! 2. **Fetching**: Retrieve each raw document ([`fetchers`]), several at a time
//! 3. **Extraction**: Parse documents into release records ([`extractors`])
//! 4. **Aggregation**: Date filter, dedup and order ([`aggregate`])
//! 5. **Output**: Write Markdown (and optionally JSON) ([`outputs`])
//!
//! A failing source is reported and skipped; the run succeeds as long as
//! one source could be processed.

use chrono::{Local, NaiveDate};
use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregate;
mod cli;
mod config;
mod error;
mod extractors;
mod fetchers;
mod models;
mod outputs;
mod pipeline;
mod registry;
mod utils;

use aggregate::{RunSummary, aggregate, failure_lines};
use cli::Cli;
use config::Settings;
use error::SourceError;
use fetchers::{Fetch, HttpFetcher, LocalFileFetcher};
use models::{Credentials, FetchResult};
use outputs::{json, markdown};
use pipeline::Pipeline;
use registry::{Registry, SourceSpec};

/// Exit code for usage errors: bad config, unknown source, missing credentials.
const USAGE_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args.get, ?args.since, ?args.offline, "Parsed CLI arguments");

    let registry = Registry::builtin();
    if args.list {
        for spec in registry.list() {
            println!("{}", list_line(spec));
        }
        return Ok(ExitCode::SUCCESS);
    }

    let settings = match Settings::resolve(&args) {
        Ok(settings) => settings,
        Err(e) => return Ok(usage_error(&e)),
    };

    let specs = match registry.select(args.get.as_deref()) {
        Ok(specs) => specs,
        Err(e) => return Ok(usage_error(&e)),
    };

    let credentials = Credentials::from_parts(args.user.clone(), args.password.clone());
    if args.get.is_some() && args.offline.is_none() {
        if let Err(e) = require_credentials(&specs, credentials.as_ref()) {
            return Ok(usage_error(&e));
        }
    }

    let since = match settings.since(args.since, Local::now().date_naive()) {
        Ok(since) => since,
        Err(e) => return Ok(usage_error(&e)),
    };
    info!(%since, sources = specs.len(), output = %settings.output.display(), "Collecting releases");

    // --- Interrupt handling ---
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; letting in-flight sources finish");
            let _ = cancel_tx.send(true);
        }
    });

    let results = match &args.offline {
        Some(dir) => {
            let fetcher = LocalFileFetcher::new(dir);
            run_sources(&fetcher, &specs, &settings, credentials.as_ref(), since, cancel_rx).await
        }
        None => {
            let fetcher = HttpFetcher::new(settings.http_options())?;
            run_sources(&fetcher, &specs, &settings, credentials.as_ref(), since, cancel_rx).await
        }
    };

    let summary = RunSummary::from_results(&results);
    for line in failure_lines(&results) {
        eprintln!("{line}");
    }

    if summary.succeeded == 0 {
        error!(failed = summary.failed, "No source could be processed; output left untouched");
        return Ok(ExitCode::from(summary.exit_code()));
    }

    let records = aggregate(&results, Some(since), settings.undated);
    markdown::write_markdown(&settings.output, &records, settings.product_prefix).await?;
    if let Some(path) = &settings.json_output {
        json::write_releases(path, &records, Some(since)).await?;
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        releases = records.len(),
        succeeded = summary.succeeded,
        failed = summary.failed,
        warnings = summary.warnings,
        "Execution complete"
    );
    Ok(ExitCode::from(summary.exit_code()))
}

/// Run the pipeline with one concrete fetcher.
#[instrument(level = "debug", skip_all)]
async fn run_sources<F: Fetch>(
    fetcher: &F,
    specs: &[&SourceSpec],
    settings: &Settings,
    credentials: Option<&Credentials>,
    since: NaiveDate,
    cancel: watch::Receiver<bool>,
) -> Vec<FetchResult> {
    Pipeline::new(fetcher, cancel)
        .credentials(credentials)
        .since(Some(since))
        .options(settings.extract_options())
        .concurrency(settings.concurrency)
        .grace(settings.grace_period())
        .run(specs)
        .await
}

/// Fail when a selected source needs credentials and none were given.
fn require_credentials(
    specs: &[&SourceSpec],
    credentials: Option<&Credentials>,
) -> Result<(), SourceError> {
    if credentials.is_some() {
        return Ok(());
    }
    match specs.iter().find(|spec| spec.requires_auth) {
        Some(spec) => Err(SourceError::Auth(format!(
            "`{}` needs GitHub credentials (--user/--password or GITHUB_USER/GITHUB_TOKEN)",
            spec.name
        ))),
        None => Ok(()),
    }
}

/// Report a usage error on stderr and pick the matching exit code.
fn usage_error(e: &SourceError) -> ExitCode {
    error!(kind = e.kind(), error = %e, "Cannot start run");
    eprintln!("error: {e}");
    ExitCode::from(USAGE_ERROR)
}

/// One `--list` row: name, product, strategy, URL, and an auth marker.
fn list_line(spec: &SourceSpec) -> String {
    let auth = if spec.requires_auth { "  (needs credentials)" } else { "" };
    format!(
        "{:<18} {:<18} {:<14} {}{auth}",
        spec.name, spec.product, spec.strategy, spec.url
    )
}
