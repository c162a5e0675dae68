//! Per-week pipeline orchestration.
//!
//! [`WeekPipeline`] runs the transformation chain for one (year, week) at a
//! time, persisting each stage's artifact under the data root. Structural
//! failures abort only the week that hit them and are reported with the
//! name of the failing stage; [`RunSummary`] collects the per-week outcomes.

use std::sync::Arc;

use chrono::NaiveDate;
use monitor_core::error::{MonitorError, Result};
use monitor_core::layout::{
    DataLayout, MAPPED_FILE, MARKET_TIERS_FILE, MERGED_FILE, METRICS_FILE, PIVOT_FILE,
    PRODUCT_ATTRIBUTION_FILE,
};
use monitor_core::models::{
    DataQualityWarning, ReportRow, Stage, TargetAge, TargetClass, TargetSets,
};
use monitor_core::rules::RuleBook;
use monitor_core::settings::{FetchArgs, IdLimit, TargetSelection};
use monitor_core::time_utils::WeekRef;
use monitor_data::aggregator::PivotAggregator;
use monitor_data::artifacts;
use monitor_data::dedup::{DedupStats, Ingestor};
use monitor_data::mapping::{load_strategy_products, AttributeMapper, ReferenceTables};
use monitor_data::metrics::MetricsCalculator;
use monitor_data::reader::load_week_extracts;
use monitor_data::report::{ReportStats, Reporter};
use monitor_data::targets::{ClassifierConfig, TargetClassifier};
use monitor_data::tiers::{TierJoiner, TierTable};

use crate::fetch_pool::{fetch_all, select_ids, CountryFetcher, FetchOptions, JsonDirFetcher};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Which targets to fetch and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    pub selection: TargetSelection,
    pub limit: IdLimit,
    pub options: FetchOptions,
    /// Overrides the per-week `country_data/{year}/{week}` directory.
    pub country_dir: Option<std::path::PathBuf>,
}

impl Default for JoinPlan {
    fn default() -> Self {
        Self {
            selection: TargetSelection::Strategy,
            limit: IdLimit::All,
            options: FetchOptions::default(),
            country_dir: None,
        }
    }
}

impl From<&FetchArgs> for JoinPlan {
    fn from(args: &FetchArgs) -> Self {
        Self {
            selection: args.targets,
            limit: args.limit,
            options: FetchOptions::from(args),
            country_dir: args.country_dir.clone(),
        }
    }
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// What the fetch and tier join did for one week.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinSummary {
    pub ids_requested: usize,
    pub ids_fetched: usize,
    pub ids_failed: Vec<String>,
    /// Rows written across the selected tier-joined artifacts.
    pub rows_joined: usize,
}

/// Everything a successful week produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeekOutcome {
    pub dedup: Option<DedupStats>,
    pub report_stats: Option<ReportStats>,
    pub report: Vec<ReportRow>,
    pub targets: TargetSets,
    pub join: Option<JoinSummary>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Result of one week in a multi-week run.
#[derive(Debug)]
pub struct WeekResult {
    pub week: WeekRef,
    pub outcome: Result<WeekOutcome>,
}

impl WeekResult {
    /// The stage that failed, when the week failed in a named stage.
    pub fn failed_stage(&self) -> Option<Stage> {
        self.outcome.as_ref().err().and_then(MonitorError::stage)
    }
}

/// Per-week results of a run, in request order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub weeks: Vec<WeekResult>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.weeks.iter().filter(|w| w.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.weeks.len() - self.succeeded()
    }

    /// A run fails only when every requested week failed.
    pub fn all_failed(&self) -> bool {
        !self.weeks.is_empty() && self.succeeded() == 0
    }
}

// ── WeekPipeline ──────────────────────────────────────────────────────────────

/// Runs the weekly stages against one data root.
pub struct WeekPipeline {
    layout: DataLayout,
    rules: RuleBook,
    classifier: ClassifierConfig,
    join: JoinPlan,
    /// Replaces the per-week JSON directory fetcher when set.
    fetcher: Option<Arc<dyn CountryFetcher>>,
}

impl WeekPipeline {
    pub fn new(layout: DataLayout, rules: RuleBook) -> Self {
        Self {
            layout,
            rules,
            classifier: ClassifierConfig::default(),
            join: JoinPlan::default(),
            fetcher: None,
        }
    }

    pub fn with_cutoff(mut self, cutoff: NaiveDate) -> Self {
        self.classifier = ClassifierConfig::with_cutoff(cutoff);
        self
    }

    pub fn with_join_plan(mut self, plan: JoinPlan) -> Self {
        self.join = plan;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn CountryFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Run the full pipeline for each week independently.
    pub async fn run_weeks(&self, weeks: &[WeekRef], skip_join: bool) -> RunSummary {
        let mut summary = RunSummary::default();
        for week in weeks {
            let outcome = self.run_week(week, skip_join).await;
            log_week(week, &outcome);
            summary.weeks.push(WeekResult {
                week: *week,
                outcome,
            });
        }
        summary
    }

    /// Re-run only fetch and tier join for each week from saved targets.
    pub async fn join_weeks(&self, weeks: &[WeekRef]) -> RunSummary {
        let mut summary = RunSummary::default();
        for week in weeks {
            let outcome = self.join_week(week).await;
            log_week(week, &outcome);
            summary.weeks.push(WeekResult {
                week: *week,
                outcome,
            });
        }
        summary
    }

    /// Re-classify targets for each week from its saved report.
    pub fn classify_weeks(&self, weeks: &[WeekRef]) -> RunSummary {
        let mut summary = RunSummary::default();
        for week in weeks {
            let outcome = self.classify_week(week);
            log_week(week, &outcome);
            summary.weeks.push(WeekResult {
                week: *week,
                outcome,
            });
        }
        summary
    }

    /// Ingest through classification, then the tier join unless skipped.
    pub async fn run_week(&self, week: &WeekRef, skip_join: bool) -> Result<WeekOutcome> {
        tracing::info!(week = %week, "starting weekly pipeline");
        let mut outcome = WeekOutcome::default();
        let inter = self.layout.intermediate_dir(week);

        // Ingest
        let (deduped, columns, stats) = (|| -> Result<_> {
            let batch = load_week_extracts(&self.layout.raw_week_dir(week), &week.tag.to_string())?;
            let columns = batch.columns;
            let (deduped, stats) = Ingestor::deduplicate(batch)?;
            artifacts::merged_table(&deduped).write(&inter.join(MERGED_FILE))?;
            Ok((deduped, columns, stats))
        })()
        .map_err(|e| e.in_stage(Stage::Ingest))?;
        tracing::info!(week = %week, rows = stats.output, "ingest complete");
        outcome.dedup = Some(stats);

        // Mapping
        let mapped = (|| -> Result<_> {
            let refs = ReferenceTables::load(&self.layout)?;
            let (mapped, warnings) = AttributeMapper::map(deduped, &refs);
            artifacts::mapped_table(&mapped).write(&inter.join(MAPPED_FILE))?;
            outcome.warnings.extend(warnings);
            Ok(mapped)
        })()
        .map_err(|e| e.in_stage(Stage::Mapping))?;

        // Metrics
        let metrics = MetricsCalculator::compute(mapped, &columns)
            .and_then(|m| {
                artifacts::metrics_table(&m).write(&inter.join(METRICS_FILE))?;
                Ok(m)
            })
            .map_err(|e| e.in_stage(Stage::Metrics))?;

        // Aggregate
        let pivot = PivotAggregator::aggregate(&metrics);
        artifacts::pivot_table(&pivot)
            .write(&inter.join(PIVOT_FILE))
            .map_err(|e| e.in_stage(Stage::Aggregate))?;

        // Report
        let (report, report_stats) = Reporter::build(pivot, &self.rules);
        artifacts::report_table(&report)
            .write(&self.layout.report_file(week))
            .map_err(|e| e.in_stage(Stage::Report))?;
        tracing::info!(
            week = %week,
            rows = report.len(),
            deleted = report_stats.deleted,
            "report written"
        );
        outcome.report_stats = Some(report_stats);

        // Targets
        let targets = self.classify(week, &report, &mut outcome.warnings)?;
        outcome.report = report;

        if !skip_join {
            outcome.join = Some(self.join_targets(week, &targets, &mut outcome.warnings).await?);
        }
        outcome.targets = targets;
        Ok(outcome)
    }

    /// Load saved targets for `week` and run fetch plus tier join.
    pub async fn join_week(&self, week: &WeekRef) -> Result<WeekOutcome> {
        tracing::info!(week = %week, "starting tier join");
        let mut outcome = WeekOutcome::default();
        let mut targets = TargetSets::default();
        for (class, age) in selected_sets(self.join.selection) {
            let path = self.layout.target_file(week, class, age);
            *targets.set_mut(class, age) = artifacts::read_targets(&path, class, age)
                .map_err(|e| e.in_stage(Stage::TierJoin))?;
        }
        outcome.join = Some(self.join_targets(week, &targets, &mut outcome.warnings).await?);
        outcome.targets = targets;
        Ok(outcome)
    }

    /// Classify targets from the persisted report artifact of `week`.
    pub fn classify_week(&self, week: &WeekRef) -> Result<WeekOutcome> {
        tracing::info!(week = %week, "classifying from saved report");
        let mut outcome = WeekOutcome::default();
        let report = artifacts::read_report(&self.layout.report_file(week))
            .map_err(|e| e.in_stage(Stage::Targets))?;
        outcome.targets = self.classify(week, &report, &mut outcome.warnings)?;
        outcome.report = report;
        Ok(outcome)
    }

    fn classify(
        &self,
        week: &WeekRef,
        report: &[ReportRow],
        warnings: &mut Vec<DataQualityWarning>,
    ) -> Result<TargetSets> {
        let strategy = load_strategy_products(&self.layout.mapping_file(PRODUCT_ATTRIBUTION_FILE))
            .map_err(|e| e.in_stage(Stage::Targets))?;
        let (targets, found) = TargetClassifier::classify(report, &strategy, &self.classifier);
        warnings.extend(found);

        for (class, age, records) in targets.labeled() {
            artifacts::target_table(records)
                .write(&self.layout.target_file(week, class, age))
                .map_err(|e| e.in_stage(Stage::Targets))?;
        }
        tracing::info!(week = %week, targets = targets.total(), "targets classified");
        Ok(targets)
    }

    async fn join_targets(
        &self,
        week: &WeekRef,
        targets: &TargetSets,
        warnings: &mut Vec<DataQualityWarning>,
    ) -> Result<JoinSummary> {
        let (ids, id_warnings) = select_ids(targets, self.join.selection, self.join.limit);
        warnings.extend(id_warnings);

        let fetcher = self.fetcher.clone().unwrap_or_else(|| {
            let dir = self
                .join
                .country_dir
                .clone()
                .unwrap_or_else(|| self.layout.country_data_dir(week));
            Arc::new(JsonDirFetcher::new(dir)) as Arc<dyn CountryFetcher>
        });

        let window = week.window().map_err(|e| e.in_stage(Stage::Fetch))?;
        let requested = ids.len();
        let fetched = fetch_all(fetcher, ids, window, self.join.options)
            .await
            .map_err(|e| e.in_stage(Stage::Fetch))?;

        let tiers = TierTable::load(&self.layout.mapping_file(MARKET_TIERS_FILE))
            .map_err(|e| e.in_stage(Stage::TierJoin))?;

        let mut rows_joined = 0;
        for (class, age) in selected_sets(self.join.selection) {
            let (joined, found) = TierJoiner::join(targets.set(class, age), &fetched.records, &tiers);
            warnings.extend(found);
            rows_joined += joined.len();
            artifacts::tier_join_table(&joined)
                .write(&self.layout.final_join_file(week, class, age))
                .map_err(|e| e.in_stage(Stage::TierJoin))?;
        }

        tracing::info!(week = %week, rows = rows_joined, "tier join written");
        Ok(JoinSummary {
            ids_requested: requested,
            ids_fetched: fetched.records.len(),
            ids_failed: fetched.failed,
            rows_joined,
        })
    }
}

/// (class, age) pairs of the selected target sets, in canonical order.
fn selected_sets(selection: TargetSelection) -> Vec<(TargetClass, TargetAge)> {
    [TargetClass::Strategy, TargetClass::NonStrategy]
        .into_iter()
        .filter(|c| selection.includes(*c))
        .flat_map(|c| [(c, TargetAge::Old), (c, TargetAge::New)])
        .collect()
}

fn log_week(week: &WeekRef, outcome: &Result<WeekOutcome>) {
    match outcome {
        Ok(o) => tracing::info!(
            week = %week,
            targets = o.targets.total(),
            warnings = o.warnings.len(),
            "week complete"
        ),
        Err(e) => tracing::error!(week = %week, error = %e, "week failed"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
