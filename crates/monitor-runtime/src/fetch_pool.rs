//! Bounded, retrying per-country fetch pool.
//!
//! Target ids are fetched through a [`CountryFetcher`] with at most
//! `concurrency` requests in flight. Every id gets up to
//! [`MAX_RETRY_ATTEMPTS`] attempts separated by a fixed delay, each bounded
//! by the request timeout. Ids that keep failing are logged and skipped, or
//! abort the whole batch in strict mode.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use monitor_core::error::{MonitorError, Result};
use monitor_core::ids::{normalize_app_id, NormalizedId};
use monitor_core::models::{CountryRecord, DataQualityWarning, TargetSets};
use monitor_core::settings::{FetchArgs, IdLimit, TargetSelection};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Attempts per id before it counts as failed.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

// ── CountryFetcher ────────────────────────────────────────────────────────────

/// Source of per-country figures for one app over a date window.
#[async_trait]
pub trait CountryFetcher: Send + Sync {
    async fn fetch(&self, app_id: &str, window: (NaiveDate, NaiveDate)) -> Result<Vec<CountryRecord>>;
}

/// Reads `{dir}/{app_id}.json` files left by an external downloader.
///
/// A file holds either a JSON array of records or an object with a `data`
/// array. A missing file means no coverage for that id.
#[derive(Debug, Clone)]
pub struct JsonDirFetcher {
    dir: PathBuf,
}

impl JsonDirFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl CountryFetcher for JsonDirFetcher {
    async fn fetch(&self, app_id: &str, _window: (NaiveDate, NaiveDate)) -> Result<Vec<CountryRecord>> {
        let path = self.dir.join(format!("{app_id}.json"));
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(app_id, path = %path.display(), "no country file");
                return Ok(Vec::new());
            }
            Err(e) => return Err(MonitorError::FileRead { path, source: e }),
        };
        parse_country_records(app_id, &text)
    }
}

/// Parse a country payload: a bare array or `{"data": [...]}`.
pub fn parse_country_records(app_id: &str, text: &str) -> Result<Vec<CountryRecord>> {
    let value: Value = serde_json::from_str(text)?;
    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(MonitorError::Config(format!(
                    "country payload for {app_id} has no data array"
                )))
            }
        },
        _ => {
            return Err(MonitorError::Config(format!(
                "country payload for {app_id} is not a list"
            )))
        }
    };

    let mut records = Vec::with_capacity(list.len());
    for item in list {
        let mut record: CountryRecord = serde_json::from_value(item)?;
        if record.app_id.is_empty() {
            record.app_id = app_id.to_string();
        }
        records.push(record);
    }
    Ok(records)
}

// ── Options ───────────────────────────────────────────────────────────────────

/// Pool sizing and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub concurrency: usize,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub strict: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            retry_delay: Duration::from_secs(3),
            request_timeout: Duration::from_secs(90),
            strict: false,
        }
    }
}

impl From<&FetchArgs> for FetchOptions {
    fn from(args: &FetchArgs) -> Self {
        Self {
            concurrency: args.effective_concurrency(),
            retry_delay: args.retry_delay(),
            request_timeout: args.request_timeout(),
            strict: args.strict,
        }
    }
}

// ── Id selection ──────────────────────────────────────────────────────────────

/// Ordered, de-duplicated ids to fetch from the selected target sets.
///
/// Blank ids are skipped; scientific-notation ids are skipped with a
/// warning since they cannot address a record.
pub fn select_ids(
    sets: &TargetSets,
    selection: TargetSelection,
    limit: IdLimit,
) -> (Vec<String>, Vec<DataQualityWarning>) {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut warnings = Vec::new();

    let candidates = sets
        .labeled()
        .into_iter()
        .filter(|(class, _, _)| selection.includes(*class))
        .flat_map(|(_, _, records)| records.iter());

    for record in candidates {
        match normalize_app_id(record.report.row.unified_id().unwrap_or("")) {
            NormalizedId::Id(id) => {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
            NormalizedId::Scientific(value) => {
                let w = DataQualityWarning::ScientificNotationId { value };
                tracing::warn!("{}", w);
                warnings.push(w);
            }
            NormalizedId::Empty => {}
        }
    }

    if let Some(max) = limit.max_ids() {
        ids.truncate(max);
    }
    (ids, warnings)
}

// ── Pool ──────────────────────────────────────────────────────────────────────

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// Records per id that was fetched successfully (possibly empty).
    pub records: HashMap<String, Vec<CountryRecord>>,
    /// Ids that failed every attempt.
    pub failed: Vec<String>,
}

/// Fetch every id with bounded concurrency.
///
/// Returns an error only in strict mode, on the first id that exhausts its
/// retries; outstanding requests are then cancelled.
pub async fn fetch_all(
    fetcher: Arc<dyn CountryFetcher>,
    ids: Vec<String>,
    window: (NaiveDate, NaiveDate),
    options: FetchOptions,
) -> Result<FetchOutcome> {
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let total = ids.len();

    for id in ids {
        let fetcher = Arc::clone(&fetcher);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => fetch_with_retry(fetcher.as_ref(), &id, window, &options).await,
                Err(e) => Err(MonitorError::Other(e.into())),
            };
            (id, result)
        });
    }

    let mut outcome = FetchOutcome::default();
    while let Some(joined) = tasks.join_next().await {
        let (id, result) = joined.map_err(|e| MonitorError::Other(e.into()))?;
        match result {
            Ok(records) => {
                outcome.records.insert(id, records);
            }
            Err(e) if options.strict => {
                tracing::error!(app_id = %id, error = %e, "fetch failed; aborting batch");
                tasks.abort_all();
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(app_id = %id, error = %e, "fetch failed; skipping id");
                outcome.failed.push(id);
            }
        }
    }

    outcome.failed.sort();
    tracing::info!(
        fetched = outcome.records.len(),
        failed = outcome.failed.len(),
        total,
        "per-country fetch finished"
    );
    Ok(outcome)
}

/// Attempt up to [`MAX_RETRY_ATTEMPTS`] fetches with a fixed delay between them.
async fn fetch_with_retry(
    fetcher: &dyn CountryFetcher,
    app_id: &str,
    window: (NaiveDate, NaiveDate),
    options: &FetchOptions,
) -> Result<Vec<CountryRecord>> {
    let mut last_err = String::new();

    for attempt in 1..=MAX_RETRY_ATTEMPTS {
        if attempt > 1 {
            tracing::debug!(app_id, attempt, "retrying fetch after delay");
            tokio::time::sleep(options.retry_delay).await;
        }

        match tokio::time::timeout(options.request_timeout, fetcher.fetch(app_id, window)).await {
            Ok(Ok(records)) => return Ok(records),
            Ok(Err(e)) => {
                tracing::warn!(app_id, attempt, error = %e, "fetch attempt failed");
                last_err = e.to_string();
            }
            Err(_) => {
                tracing::warn!(app_id, attempt, "fetch attempt timed out");
                last_err = format!("timed out after {:?}", options.request_timeout);
            }
        }
    }

    Err(MonitorError::Network {
        app_id: app_id.to_string(),
        attempts: MAX_RETRY_ATTEMPTS,
        message: last_err,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
