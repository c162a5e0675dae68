//! Weekly figures derived from extract columns.

use monitor_core::error::{MonitorError, Result};
use monitor_core::models::{ExtractColumns, MappedRecord, MetricsRecord, Stage, WeeklyFigures};
use tracing::debug;

/// Coefficient applied when a product has none in the reference table.
pub const DEFAULT_REVENUE_COEFFICIENT: f64 = 0.63;

/// Converts absolute/period-change extract figures into this-week and
/// last-week installs and net revenue.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Derive figures for every record.
    ///
    /// All four numeric extract columns must have been present; otherwise the
    /// stage fails naming the first missing one.
    pub fn compute(
        records: Vec<MappedRecord>,
        columns: &ExtractColumns,
    ) -> Result<Vec<MetricsRecord>> {
        Self::check_columns(columns)?;
        let out: Vec<MetricsRecord> = records
            .into_iter()
            .map(|mapped| {
                let figures = Self::figures(&mapped);
                MetricsRecord { mapped, figures }
            })
            .collect();
        debug!("Computed weekly figures for {} records", out.len());
        Ok(out)
    }

    fn check_columns(columns: &ExtractColumns) -> Result<()> {
        let required = [
            (columns.downloads_absolute, "Downloads (Absolute)"),
            (columns.downloads_pop_change, "Downloads (PoP Growth)"),
            (columns.revenue_absolute, "Revenue (Absolute)"),
            (columns.revenue_pop_change, "Revenue (PoP Growth)"),
        ];
        match required.iter().find(|(present, _)| !present) {
            Some((_, column)) => Err(MonitorError::Schema {
                stage: Stage::Metrics,
                column: column.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Figures for one record.
    pub fn figures(mapped: &MappedRecord) -> WeeklyFigures {
        let r = &mapped.record;
        let coefficient = mapped
            .revenue_coefficient
            .unwrap_or(DEFAULT_REVENUE_COEFFICIENT);
        WeeklyFigures {
            this_week_installs: r.downloads_absolute,
            last_week_installs: r.downloads_absolute - r.downloads_pop_change,
            this_week_revenue: r.revenue_absolute / coefficient,
            last_week_revenue: (r.revenue_absolute - r.revenue_pop_change) / coefficient,
        }
    }
}
