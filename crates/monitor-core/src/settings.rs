use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{MonitorError, Result};
use crate::models::TargetClass;
use crate::time_utils::{WeekRef, DEFAULT_OLD_NEW_CUTOFF};

/// Directory name of the default data root under the home directory.
pub const DEFAULT_DATA_DIR: &str = ".market-monitor";

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 20;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Weekly mobile-game market monitor
#[derive(Parser, Debug, Clone)]
#[command(
    name = "market-monitor",
    about = "Weekly mobile-game market monitor",
    version
)]
pub struct Settings {
    #[command(subcommand)]
    pub command: Command,

    /// Data root holding raw extracts, reference tables and outputs
    #[arg(long, global = true, env = "MARKET_MONITOR_DATA")]
    pub data_root: Option<PathBuf>,

    /// Rule configuration file (defaults to {data_root}/config/monitor_rules.json)
    #[arg(long, global = true)]
    pub rules: Option<PathBuf>,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the full weekly pipeline for one or more weeks
    Run(RunArgs),
    /// Re-run only the per-country fetch and tier join from saved targets
    Join(JoinArgs),
    /// Re-classify targets from a saved weekly report
    Classify(ClassifyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WeekArgs {
    /// Week tags, either MMDD-MMDD (with --year) or YYYY-MMDD-MMDD
    #[arg(required = true, num_args = 1..)]
    pub weeks: Vec<String>,

    /// Year for bare MMDD-MMDD week tags (defaults to the current year)
    #[arg(long)]
    pub year: Option<i32>,
}

impl WeekArgs {
    /// Resolve every requested week, failing on the first malformed tag.
    pub fn resolve(&self, default_year: i32) -> Result<Vec<WeekRef>> {
        let year = self.year.unwrap_or(default_year);
        self.weeks
            .iter()
            .map(|w| WeekRef::parse(w, Some(year)))
            .collect()
    }
}

/// How many target ids to fetch per week.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdLimit {
    Top1,
    Top5,
    Top10,
    #[default]
    All,
}

impl IdLimit {
    pub fn max_ids(&self) -> Option<usize> {
        match self {
            IdLimit::Top1 => Some(1),
            IdLimit::Top5 => Some(5),
            IdLimit::Top10 => Some(10),
            IdLimit::All => None,
        }
    }
}

/// Which target sets feed the fetch and tier join.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetSelection {
    #[default]
    Strategy,
    #[value(alias = "non_strategy")]
    NonStrategy,
    Both,
}

impl TargetSelection {
    pub fn includes(&self, class: TargetClass) -> bool {
        match self {
            TargetSelection::Strategy => class == TargetClass::Strategy,
            TargetSelection::NonStrategy => class == TargetClass::NonStrategy,
            TargetSelection::Both => true,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Concurrent per-country fetches (clamped to 1-20)
    #[arg(long, default_value = "1")]
    pub concurrency: usize,

    /// Abort the week when any id fails after all retries
    #[arg(long)]
    pub strict: bool,

    /// Fixed delay between retry attempts, in seconds
    #[arg(long, default_value = "3")]
    pub retry_delay_secs: u64,

    /// Per-request timeout, in seconds
    #[arg(long, default_value = "90")]
    pub request_timeout_secs: u64,

    /// Limit the number of ids fetched per week
    #[arg(long, value_enum, default_value = "all")]
    pub limit: IdLimit,

    /// Target sets to fetch and join
    #[arg(long, value_enum, default_value = "strategy")]
    pub targets: TargetSelection,

    /// Directory of per-app country JSON files (defaults to {data_root}/country_data/{year}/{week})
    #[arg(long)]
    pub country_dir: Option<PathBuf>,
}

impl FetchArgs {
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub weeks: WeekArgs,

    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Release dates before this are "old" (YYYY-MM-DD)
    #[arg(long, default_value = DEFAULT_OLD_NEW_CUTOFF, value_parser = parse_cutoff)]
    pub old_new_cutoff: NaiveDate,

    /// Stop after target classification
    #[arg(long)]
    pub skip_join: bool,
}

#[derive(Args, Debug, Clone)]
pub struct JoinArgs {
    #[command(flatten)]
    pub weeks: WeekArgs,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ClassifyArgs {
    #[command(flatten)]
    pub weeks: WeekArgs,

    /// Release dates before this are "old" (YYYY-MM-DD)
    #[arg(long, default_value = DEFAULT_OLD_NEW_CUTOFF, value_parser = parse_cutoff)]
    pub old_new_cutoff: NaiveDate,
}

fn parse_cutoff(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| format!("{}: {}", s, e))
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// The log level after applying `--debug`.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "DEBUG"
        } else {
            &self.log_level
        }
    }

    /// Data root from `--data-root` / `$MARKET_MONITOR_DATA`, else `~/.market-monitor`.
    pub fn resolve_data_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.data_root {
            return Ok(root.clone());
        }
        default_data_root()
    }

    /// Fetch settings; `classify` never fetches.
    pub fn fetch_args(&self) -> Option<&FetchArgs> {
        match &self.command {
            Command::Run(args) => Some(&args.fetch),
            Command::Join(args) => Some(&args.fetch),
            Command::Classify(_) => None,
        }
    }

    pub fn week_args(&self) -> &WeekArgs {
        match &self.command {
            Command::Run(args) => &args.weeks,
            Command::Join(args) => &args.weeks,
            Command::Classify(args) => &args.weeks,
        }
    }
}

/// `~/.market-monitor`.
pub fn default_data_root() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_DATA_DIR))
        .ok_or_else(|| MonitorError::Config("cannot determine home directory; pass --data-root".into()))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
