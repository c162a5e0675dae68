//! Stage artifacts: CSV tables persisted between pipeline stages.
//!
//! Intermediates are write-only. The report and target artifacts can be read
//! back so classification and the tier join can run from disk.

use std::path::Path;

use monitor_core::error::{MonitorError, Result};
use monitor_core::formatting::{format_change, parse_change_pct};
use monitor_core::models::{
    Annotation, CompanySummary, MappedRecord, MetricsRecord, PivotRow, ProductRow, RawRecord,
    ReportRow, Stage, TargetAge, TargetClass, TargetRecord, Tier, TierJoinedRow, WeeklyFigures,
    SUMMARY_SUFFIX,
};
use tracing::debug;

use crate::table::{cell, format_cell_number, number_or_zero, Table};

// ── Column sets ───────────────────────────────────────────────────────────────

pub const MERGED_COLUMNS: &[&str] = &[
    "Unified ID",
    "Unified Name",
    "Unified Publisher Name",
    "Downloads (Absolute)",
    "Downloads (PoP Growth)",
    "Revenue (Absolute)",
    "Revenue (PoP Growth)",
    "Earliest Release Date",
];

pub const FIGURE_COLUMNS: &[&str] = &[
    "this_week_installs",
    "last_week_installs",
    "this_week_revenue",
    "last_week_revenue",
];

pub const REPORT_COLUMNS: &[&str] = &[
    "company_attribution",
    "product_attribution",
    "unified_id",
    "release_date",
    "this_week_installs",
    "last_week_installs",
    "install_change_pct",
    "this_week_revenue",
    "last_week_revenue",
    "revenue_change_pct",
    "annotation",
];

pub const TARGET_LABEL_COLUMNS: &[&str] = &["target_class", "target_age"];

/// Tier install columns of the final join, in [`Tier::ALL`] order.
pub const TIER_INSTALL_COLUMNS: &[&str] = &[
    "asia_t1_installs",
    "western_t1_installs",
    "t2_installs",
    "t3_installs",
];

fn headers(groups: &[&[&str]]) -> Vec<String> {
    groups
        .iter()
        .flat_map(|g| g.iter().map(|h| h.to_string()))
        .collect()
}

fn opt(value: Option<&str>) -> String {
    value.unwrap_or("").to_string()
}

fn non_blank(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

// ── Intermediates ─────────────────────────────────────────────────────────────

fn raw_cells(r: &RawRecord) -> Vec<String> {
    vec![
        opt(r.unified_id.as_deref()),
        r.unified_name.clone(),
        r.publisher_name.clone(),
        format_cell_number(r.downloads_absolute),
        format_cell_number(r.downloads_pop_change),
        format_cell_number(r.revenue_absolute),
        format_cell_number(r.revenue_pop_change),
        opt(r.earliest_release_date.as_deref()),
    ]
}

fn mapped_cells(m: &MappedRecord) -> Vec<String> {
    let mut row = raw_cells(&m.record);
    row.push(opt(m.product_attribution.as_deref()));
    row.push(opt(m.company_attribution.as_deref()));
    row.push(m.revenue_coefficient.map(format_cell_number).unwrap_or_default());
    row
}

fn figure_cells(f: &WeeklyFigures) -> [String; 4] {
    [
        format_cell_number(f.this_week_installs),
        format_cell_number(f.last_week_installs),
        format_cell_number(f.this_week_revenue),
        format_cell_number(f.last_week_revenue),
    ]
}

const MAPPED_EXTRA_COLUMNS: &[&str] = &["product_attribution", "company_attribution", "revenue_coefficient"];

pub fn merged_table(records: &[RawRecord]) -> Table {
    Table {
        headers: headers(&[MERGED_COLUMNS]),
        rows: records.iter().map(raw_cells).collect(),
    }
}

pub fn mapped_table(records: &[MappedRecord]) -> Table {
    Table {
        headers: headers(&[MERGED_COLUMNS, MAPPED_EXTRA_COLUMNS]),
        rows: records.iter().map(mapped_cells).collect(),
    }
}

pub fn metrics_table(records: &[MetricsRecord]) -> Table {
    Table {
        headers: headers(&[MERGED_COLUMNS, MAPPED_EXTRA_COLUMNS, FIGURE_COLUMNS]),
        rows: records
            .iter()
            .map(|r| {
                let mut row = mapped_cells(&r.mapped);
                row.extend(figure_cells(&r.figures));
                row
            })
            .collect(),
    }
}

pub fn pivot_table(rows: &[PivotRow]) -> Table {
    Table {
        headers: headers(&[
            &["company_attribution", "product_attribution", "release_date", "unified_id"],
            FIGURE_COLUMNS,
        ]),
        rows: rows
            .iter()
            .map(|r| {
                let mut row = vec![
                    r.company_label(),
                    r.product_attribution().to_string(),
                    opt(r.release_date()),
                    opt(r.unified_id()),
                ];
                row.extend(figure_cells(r.figures()));
                row
            })
            .collect(),
    }
}

// ── Report ────────────────────────────────────────────────────────────────────

fn report_cells(r: &ReportRow) -> Vec<String> {
    let [tw_i, lw_i, tw_r, lw_r] = figure_cells(r.figures());
    vec![
        r.row.company_label(),
        r.row.product_attribution().to_string(),
        opt(r.row.unified_id()),
        opt(r.row.release_date()),
        tw_i,
        lw_i,
        format_change(r.install_change),
        tw_r,
        lw_r,
        format_change(r.revenue_change),
        r.annotation().to_string(),
    ]
}

pub fn report_table(rows: &[ReportRow]) -> Table {
    Table {
        headers: headers(&[REPORT_COLUMNS]),
        rows: rows.iter().map(report_cells).collect(),
    }
}

/// Column indices of the report columns inside an artifact.
struct ReportColumns([usize; 11]);

impl ReportColumns {
    fn locate(table: &Table, stage: Stage) -> Result<Self> {
        let mut idx = [0usize; 11];
        for (slot, name) in idx.iter_mut().zip(REPORT_COLUMNS) {
            *slot = table.require_column(&[*name], stage)?;
        }
        Ok(Self(idx))
    }

    fn parse(&self, row: &[String]) -> ReportRow {
        let get = |i: usize| cell(row, Some(self.0[i]));
        let figures = WeeklyFigures {
            this_week_installs: number_or_zero(get(4)),
            last_week_installs: number_or_zero(get(5)),
            this_week_revenue: number_or_zero(get(7)),
            last_week_revenue: number_or_zero(get(8)),
        };
        let annotation = get(10);

        let pivot = if annotation == Annotation::Summary.as_str() {
            let label = get(0);
            PivotRow::CompanySummary(CompanySummary {
                company_attribution: label
                    .strip_suffix(SUMMARY_SUFFIX)
                    .unwrap_or(label)
                    .to_string(),
                figures,
            })
        } else {
            PivotRow::Product(ProductRow {
                company_attribution: get(0).to_string(),
                product_attribution: get(1).to_string(),
                unified_id: non_blank(get(2)),
                release_date: non_blank(get(3)),
                figures,
            })
        };

        let struck = matches!(annotation, "struck" | "struck+highlighted");
        let highlighted = matches!(annotation, "highlighted" | "struck+highlighted");
        ReportRow {
            row: pivot,
            install_change: parse_change_pct(get(6)).map(|p| p / 100.0),
            revenue_change: parse_change_pct(get(9)).map(|p| p / 100.0),
            struck,
            highlighted,
        }
    }
}

/// Read a report artifact back.
pub fn read_report(path: &Path) -> Result<Vec<ReportRow>> {
    if !path.exists() {
        return Err(MonitorError::ArtifactMissing(path.to_path_buf()));
    }
    let table = Table::read(path)?;
    let columns = ReportColumns::locate(&table, Stage::Report)?;
    let rows: Vec<ReportRow> = table.rows.iter().map(|r| columns.parse(r)).collect();
    debug!("Loaded {} report rows from {}", rows.len(), path.display());
    Ok(rows)
}

// ── Targets ───────────────────────────────────────────────────────────────────

fn target_cells(t: &TargetRecord) -> Vec<String> {
    let mut row = report_cells(&t.report);
    row.push(t.class.as_str().to_string());
    row.push(t.age.as_str().to_string());
    row
}

pub fn target_table(records: &[TargetRecord]) -> Table {
    Table {
        headers: headers(&[REPORT_COLUMNS, TARGET_LABEL_COLUMNS]),
        rows: records.iter().map(target_cells).collect(),
    }
}

/// Read one target set back. A missing artifact is an empty set.
pub fn read_targets(path: &Path, class: TargetClass, age: TargetAge) -> Result<Vec<TargetRecord>> {
    if !path.exists() {
        debug!("No target artifact at {}", path.display());
        return Ok(Vec::new());
    }
    let table = Table::read(path)?;
    let columns = ReportColumns::locate(&table, Stage::TierJoin)?;
    Ok(table
        .rows
        .iter()
        .map(|r| TargetRecord {
            report: columns.parse(r),
            class,
            age,
        })
        .collect())
}

// ── Final join ────────────────────────────────────────────────────────────────

pub fn tier_join_table(rows: &[TierJoinedRow]) -> Table {
    Table {
        headers: headers(&[REPORT_COLUMNS, TARGET_LABEL_COLUMNS, TIER_INSTALL_COLUMNS]),
        rows: rows
            .iter()
            .map(|r| {
                let mut row = target_cells(&r.target);
                row.extend(Tier::ALL.iter().map(|t| r.tiers.installs_for(*t).to_string()));
                row
            })
            .collect(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::models::TierAggregate;
    use tempfile::TempDir;

    fn product_row(struck: bool, highlighted: bool) -> ReportRow {
        let figures = WeeklyFigures {
            this_week_installs: 1500.0,
            last_week_installs: 1200.0,
            this_week_revenue: 10_000.0 / 0.63,
            last_week_revenue: 20_000.0,
        };
        ReportRow {
            row: PivotRow::Product(ProductRow {
                company_attribution: "Acme".into(),
                product_attribution: "Rocket".into(),
                release_date: Some("2025-03-01".into()),
                unified_id: Some("5f1a2b3c4d5e6f7a8b9c0d1e".into()),
                figures,
            }),
            install_change: figures.install_change(),
            revenue_change: figures.revenue_change(),
            struck,
            highlighted,
        }
    }

    fn summary_row() -> ReportRow {
        ReportRow {
            row: PivotRow::CompanySummary(CompanySummary {
                company_attribution: "Acme".into(),
                figures: WeeklyFigures {
                    this_week_installs: 1500.0,
                    ..Default::default()
                },
            }),
            install_change: None,
            revenue_change: None,
            struck: false,
            highlighted: false,
        }
    }

    #[test]
    fn test_report_cells_render_changes_and_annotation() {
        let table = report_table(&[product_row(true, false), summary_row()]);
        assert_eq!(table.headers, REPORT_COLUMNS);
        let product = &table.rows[0];
        assert_eq!(product[6], "25.00%▲");
        assert_eq!(product[10], "struck");
        let summary = &table.rows[1];
        assert_eq!(summary[0], "Acme 汇总");
        assert_eq!(summary[1], "");
        assert_eq!(summary[6], "");
        assert_eq!(summary[10], "summary");
    }

    #[test]
    fn test_report_reads_back_from_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("0119-0125_market_monitor.csv");
        let rows = vec![product_row(true, true), summary_row()];
        report_table(&rows).write(&path).unwrap();

        let back = read_report(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].row, rows[0].row);
        assert!(back[0].struck && back[0].highlighted);
        assert!((back[0].install_change.unwrap() - 0.25).abs() < 1e-12);
        assert!((back[0].revenue_change.unwrap() + 0.2063).abs() < 1e-4);
        assert_eq!(back[1].row, rows[1].row);
        assert_eq!(back[1].annotation(), Annotation::Summary);
    }

    #[test]
    fn test_read_report_missing_is_artifact_error() {
        let tmp = TempDir::new().unwrap();
        let err = read_report(&tmp.path().join("none.csv")).unwrap_err();
        assert!(matches!(err, MonitorError::ArtifactMissing(_)));
    }

    #[test]
    fn test_targets_missing_artifact_is_empty() {
        let tmp = TempDir::new().unwrap();
        let got = read_targets(&tmp.path().join("t.csv"), TargetClass::Strategy, TargetAge::Old).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn test_targets_round_trip_with_labels() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("target_strategy_new.csv");
        let record = TargetRecord {
            report: product_row(false, false),
            class: TargetClass::Strategy,
            age: TargetAge::New,
        };
        let table = target_table(std::slice::from_ref(&record));
        assert_eq!(table.rows[0][11], "strategy");
        assert_eq!(table.rows[0][12], "new");
        table.write(&path).unwrap();

        let back = read_targets(&path, TargetClass::Strategy, TargetAge::New).unwrap();
        assert_eq!(back[0].report.row, record.report.row);
    }

    #[test]
    fn test_tier_join_exposes_only_installs() {
        let mut tiers = TierAggregate::default();
        tiers.add(Tier::WesternT1, 70, 9_999);
        let table = tier_join_table(&[TierJoinedRow {
            target: TargetRecord {
                report: product_row(false, false),
                class: TargetClass::NonStrategy,
                age: TargetAge::Old,
            },
            tiers,
        }]);
        assert_eq!(table.headers.len(), REPORT_COLUMNS.len() + 2 + 4);
        assert_eq!(table.rows[0][13..].to_vec(), vec!["0", "70", "0", "0"]);
        assert!(!table.headers.iter().any(|h| h.contains("revenue") && h.contains("t1")));
    }

    #[test]
    fn test_intermediate_headers() {
        assert_eq!(merged_table(&[]).headers.len(), 8);
        assert_eq!(mapped_table(&[]).headers.len(), 11);
        assert_eq!(metrics_table(&[]).headers.len(), 15);
        assert_eq!(pivot_table(&[]).headers[0], "company_attribution");
    }
}
