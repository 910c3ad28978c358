//! Command-line interface definitions for git_releases.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials can also be provided via environment variables.

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for git_releases.
///
/// # Examples
///
/// ```sh
/// # Everything released in the last 30 days
/// git_releases -u octocat -p "$GITHUB_TOKEN"
///
/// # One source, since a given date
/// git_releases --get gitlab --since 2024-05-01
///
/// # Show the catalog
/// git_releases --list
///
/// # Replay saved documents without network access
/// git_releases --offline ./dump
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Print every known source and exit
    #[arg(short, long)]
    pub list: bool,

    /// Fetch only this source (see --list)
    #[arg(short, long, value_name = "NAME", conflicts_with = "list")]
    pub get: Option<String>,

    /// Only keep releases on or after this date (YYYY-MM-DD); default is 30 days ago
    #[arg(short, long, value_name = "DATE")]
    pub since: Option<NaiveDate>,

    /// GitHub API user, needed by GitHub-hosted sources
    #[arg(short, long, env = "GITHUB_USER")]
    pub user: Option<String>,

    /// GitHub API token
    #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub password: Option<String>,

    /// Markdown output file [default: releases.md]
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Also write the release list as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Optional path to a YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Read saved documents from this directory instead of the network
    #[arg(long, value_name = "DIR")]
    pub offline: Option<PathBuf>,

    /// Save a copy of every fetched document in this directory
    #[arg(long, value_name = "DIR", conflicts_with = "offline")]
    pub dump_dir: Option<PathBuf>,

    /// Number of sources fetched at the same time [default: 4]
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Drop releases without a date when filtering by date
    #[arg(long)]
    pub exclude_undated: bool,

    /// Print bare versions as link text, without the product name
    #[arg(long)]
    pub no_product_prefix: bool,
}
