//! Applies delete / strike / highlight rules to the pivot.

use monitor_core::models::{PivotRow, ReportRow};
use monitor_core::rules::{Category, RowMetrics, RuleBook};
use tracing::debug;

/// Counts of what the rules did to one week's pivot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportStats {
    pub deleted: usize,
    pub struck: usize,
    pub highlighted: usize,
}

/// Turns pivot rows into report rows.
pub struct Reporter;

impl Reporter {
    /// Evaluate the rule book over `pivot`.
    ///
    /// Per product row the delete rules run first; deleted rows are removed
    /// outright. Survivors are then checked against the strike and highlight
    /// rules independently. Summary rows are never evaluated. Row order is
    /// preserved.
    pub fn build(pivot: Vec<PivotRow>, rules: &RuleBook) -> (Vec<ReportRow>, ReportStats) {
        let mut stats = ReportStats::default();
        let mut rows = Vec::with_capacity(pivot.len());

        for row in pivot {
            let figures = *row.figures();
            let metrics = RowMetrics::from_figures(figures);

            let (struck, highlighted) = if row.is_summary() {
                (false, false)
            } else {
                let product = row.product_attribution();
                let id = row.unified_id();
                if rules.decide(Category::Delete, product, id, &metrics) {
                    stats.deleted += 1;
                    continue;
                }
                (
                    rules.decide(Category::Strike, product, id, &metrics),
                    rules.decide(Category::Yellow, product, id, &metrics),
                )
            };

            stats.struck += usize::from(struck);
            stats.highlighted += usize::from(highlighted);
            rows.push(ReportRow {
                row,
                install_change: figures.install_change(),
                revenue_change: figures.revenue_change(),
                struck,
                highlighted,
            });
        }

        debug!(
            "Report: {} rows kept, {} deleted, {} struck, {} highlighted",
            rows.len(),
            stats.deleted,
            stats.struck,
            stats.highlighted
        );
        (rows, stats)
    }
}
