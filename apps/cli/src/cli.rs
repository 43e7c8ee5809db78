//! Command-line argument definitions and timestamp parsing.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "histsync",
    about = "histsync — incremental downloader for historical time-series data"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download missing history for a provider's entities.
    Download {
        /// Provider id to fetch from (see `histsync providers`).
        #[arg(long)]
        provider: String,

        /// Entities to synchronize (e.g. AAPL MSFT). Omit when using --all.
        entities: Vec<String>,

        /// Synchronize every entity the provider knows.
        #[arg(long, default_value_t = false)]
        all: bool,

        /// Window start, RFC 3339 or YYYY-MM-DD.
        #[arg(long)]
        start: String,

        /// Window end, RFC 3339 or YYYY-MM-DD. Defaults to now.
        #[arg(long)]
        end: Option<String>,

        /// Print the full report as JSON instead of the one-line summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List registered providers with their capabilities and limits.
    Providers,
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("'{raw}' is not an RFC 3339 timestamp or YYYY-MM-DD date"))?;
    match date.and_hms_opt(0, 0, 0) {
        Some(naive) => Ok(DateTime::from_naive_utc_and_offset(naive, Utc)),
        None => bail!("'{raw}' has no midnight representation"),
    }
}
