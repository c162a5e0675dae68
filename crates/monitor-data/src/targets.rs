//! Strategy / non-strategy target classification with an old/new split.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use monitor_core::models::{
    DataQualityWarning, ReportRow, TargetAge, TargetClass, TargetRecord, TargetSets,
};
use monitor_core::stats::median;
use monitor_core::time_utils::{default_cutoff, is_blank_date, parse_release_date};
use tracing::{debug, warn};

/// Minimum this-week installs for a strategy target.
pub const STRATEGY_MIN_INSTALLS: f64 = 1000.0;
/// Non-strategy targets need install growth strictly above this, in percent.
pub const NON_STRATEGY_MIN_CHANGE_PCT: f64 = 20.0;

/// Classification thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    /// Release dates strictly before this are old.
    pub cutoff: NaiveDate,
    pub strategy_min_installs: f64,
    pub non_strategy_min_change_pct: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            cutoff: default_cutoff(),
            strategy_min_installs: STRATEGY_MIN_INSTALLS,
            non_strategy_min_change_pct: NON_STRATEGY_MIN_CHANGE_PCT,
        }
    }
}

impl ClassifierConfig {
    pub fn with_cutoff(cutoff: NaiveDate) -> Self {
        Self {
            cutoff,
            ..Default::default()
        }
    }
}

/// Splits a week's report into the four target sets.
pub struct TargetClassifier;

impl TargetClassifier {
    /// Classify every non-summary report row.
    ///
    /// * strategy: product listed in `strategy_products` with enough installs
    /// * non-strategy: any other row with installs at or above the median of
    ///   all other rows and install growth above the threshold
    ///
    /// Each target is then aged by release date against the cutoff.
    pub fn classify(
        rows: &[ReportRow],
        strategy_products: &BTreeSet<String>,
        config: &ClassifierConfig,
    ) -> (TargetSets, Vec<DataQualityWarning>) {
        let mut sets = TargetSets::default();
        let mut warnings = Vec::new();

        let (strategy, others): (Vec<&ReportRow>, Vec<&ReportRow>) = rows
            .iter()
            .filter(|r| !r.is_summary())
            .partition(|r| {
                strategy_products.contains(r.row.product_attribution().trim())
                    && r.figures().this_week_installs >= config.strategy_min_installs
            });

        let installs: Vec<f64> = others.iter().map(|r| r.figures().this_week_installs).collect();
        let threshold = median(&installs);
        debug!(
            "Targets: {} strategy, {} other candidates, install median {:?}",
            strategy.len(),
            others.len(),
            threshold
        );

        let non_strategy = others.into_iter().filter(|r| {
            let enough_installs = threshold
                .map(|m| r.figures().this_week_installs >= m)
                .unwrap_or(false);
            let growing = r
                .install_change_pct()
                .map(|pct| pct > config.non_strategy_min_change_pct)
                .unwrap_or(false);
            enough_installs && growing
        });

        let labeled = strategy
            .into_iter()
            .map(|r| (TargetClass::Strategy, r))
            .chain(non_strategy.map(|r| (TargetClass::NonStrategy, r)));

        for (class, row) in labeled {
            let (age, warning) = Self::age(row, config.cutoff);
            if let Some(w) = warning {
                warn!("{}", w);
                warnings.push(w);
            }
            sets.set_mut(class, age).push(TargetRecord {
                report: row.clone(),
                class,
                age,
            });
        }

        (sets, warnings)
    }

    /// Old when released before `cutoff` or when the date is missing or
    /// unparseable; unparseable dates also yield a warning.
    pub fn age(row: &ReportRow, cutoff: NaiveDate) -> (TargetAge, Option<DataQualityWarning>) {
        let Some(raw) = row.row.release_date() else {
            return (TargetAge::Old, None);
        };
        match parse_release_date(raw) {
            Some(date) if date >= cutoff => (TargetAge::New, None),
            Some(_) => (TargetAge::Old, None),
            None if is_blank_date(raw) => (TargetAge::Old, None),
            None => (
                TargetAge::Old,
                Some(DataQualityWarning::UnparseableReleaseDate {
                    product: row.row.product_attribution().to_string(),
                    value: raw.to_string(),
                }),
            ),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
