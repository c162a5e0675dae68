//! Extract discovery and loading.
//!
//! A week's raw extracts live in `raw_csv/{year}/{week}/` and are named
//! `{week}-<market>.csv`. Each is converted into [`RawRecord`]s; which
//! optional columns were present is tracked in [`ExtractColumns`].

use std::path::{Path, PathBuf};

use monitor_core::error::{MonitorError, Result};
use monitor_core::ids::is_null_like;
use monitor_core::models::{ExtractColumns, RawRecord, Stage};
use tracing::{debug, warn};

use crate::table::{cell, number_or_zero, Table};

// ── Column synonyms ───────────────────────────────────────────────────────────

pub const UNIFIED_ID_COLUMNS: &[&str] = &["Unified ID", "Unified_ID", "unified_id"];
pub const UNIFIED_NAME_COLUMNS: &[&str] = &["Unified Name", "unified_name"];
pub const PUBLISHER_COLUMNS: &[&str] = &["Unified Publisher Name", "publisher_name"];
pub const RELEASE_DATE_COLUMNS: &[&str] =
    &["Earliest Release Date", "第三方记录最早上线时间", "earliest_release_date"];
pub const DOWNLOADS_ABSOLUTE_COLUMNS: &[&str] = &["Downloads (Absolute)", "downloads_absolute"];
pub const DOWNLOADS_POP_COLUMNS: &[&str] = &["Downloads (PoP Growth)", "downloads_pop_change"];
pub const REVENUE_ABSOLUTE_COLUMNS: &[&str] = &["Revenue (Absolute)", "revenue_absolute"];
pub const REVENUE_POP_COLUMNS: &[&str] = &["Revenue (PoP Growth)", "revenue_pop_change"];

/// Records from every extract of one week, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractBatch {
    pub records: Vec<RawRecord>,
    /// Optional columns present in every file.
    pub columns: ExtractColumns,
    pub files: usize,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Find `{week_tag}-*.csv` files directly inside `week_dir`, sorted by name.
pub fn find_extract_files(week_dir: &Path, week_tag: &str) -> Vec<PathBuf> {
    if !week_dir.exists() {
        warn!("Extract directory does not exist: {}", week_dir.display());
        return Vec::new();
    }

    let prefix = format!("{}-", week_tag);
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(week_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            entry.file_type().is_file()
                && name.starts_with(&prefix)
                && name.to_ascii_lowercase().ends_with(".csv")
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Load every extract of a week.
///
/// Fails when the directory holds no extract or when a file has no
/// recognizable unified-id column.
pub fn load_week_extracts(week_dir: &Path, week_tag: &str) -> Result<ExtractBatch> {
    let files = find_extract_files(week_dir, week_tag);
    if files.is_empty() {
        return Err(MonitorError::NoExtractFiles(week_dir.to_path_buf()));
    }

    let mut batch = ExtractBatch {
        records: Vec::new(),
        columns: ExtractColumns::all(),
        files: files.len(),
    };
    for path in &files {
        let (records, columns) = read_extract(path)?;
        debug!("{}: {} rows", path.display(), records.len());
        batch.records.extend(records);
        batch.columns = batch.columns.intersect(&columns);
    }

    debug!(
        "Loaded {} extract rows from {} files",
        batch.records.len(),
        batch.files
    );
    Ok(batch)
}

/// Read one extract file.
pub fn read_extract(path: &Path) -> Result<(Vec<RawRecord>, ExtractColumns)> {
    let table = Table::read(path)?;
    records_from_table(&table)
}

/// Convert a decoded extract table into records.
pub fn records_from_table(table: &Table) -> Result<(Vec<RawRecord>, ExtractColumns)> {
    let id_col = table.require_column(UNIFIED_ID_COLUMNS, Stage::Ingest)?;
    let name_col = table.find_column(UNIFIED_NAME_COLUMNS);
    let publisher_col = table.find_column(PUBLISHER_COLUMNS);
    let date_col = table.find_column(RELEASE_DATE_COLUMNS);
    let dl_abs_col = table.find_column(DOWNLOADS_ABSOLUTE_COLUMNS);
    let dl_pop_col = table.find_column(DOWNLOADS_POP_COLUMNS);
    let rev_abs_col = table.find_column(REVENUE_ABSOLUTE_COLUMNS);
    let rev_pop_col = table.find_column(REVENUE_POP_COLUMNS);

    let columns = ExtractColumns {
        unified_name: name_col.is_some(),
        publisher_name: publisher_col.is_some(),
        earliest_release_date: date_col.is_some(),
        downloads_absolute: dl_abs_col.is_some(),
        downloads_pop_change: dl_pop_col.is_some(),
        revenue_absolute: rev_abs_col.is_some(),
        revenue_pop_change: rev_pop_col.is_some(),
    };

    let records = table
        .rows
        .iter()
        .map(|row| {
            let id = cell(row, Some(id_col));
            let date = cell(row, date_col);
            RawRecord {
                unified_id: (!is_null_like(id)).then(|| id.to_string()),
                unified_name: cell(row, name_col).to_string(),
                publisher_name: cell(row, publisher_col).to_string(),
                downloads_absolute: number_or_zero(cell(row, dl_abs_col)),
                downloads_pop_change: number_or_zero(cell(row, dl_pop_col)),
                revenue_absolute: number_or_zero(cell(row, rev_abs_col)),
                revenue_pop_change: number_or_zero(cell(row, rev_pop_col)),
                earliest_release_date: (!date.is_empty()).then(|| date.to_string()),
            }
        })
        .collect();

    Ok((records, columns))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "Unified ID\tUnified Name\tUnified Publisher Name\tEarliest Release Date\tDownloads (Absolute)\tDownloads (PoP Growth)\tRevenue (Absolute)\tRevenue (PoP Growth)";

    /// Write `lines` as a UTF-16LE tab-separated extract.
    fn write_extract(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let text = lines.join("\n");
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    // ── find_extract_files ───────────────────────────────────────────────────

    #[test]
    fn test_find_extract_files_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        write_extract(tmp.path(), "0119-0125-us.csv", &[HEADER]);
        write_extract(tmp.path(), "0119-0125-jp.csv", &[HEADER]);
        write_extract(tmp.path(), "0112-0118-us.csv", &[HEADER]);
        write_extract(tmp.path(), "notes.txt", &["x"]);

        let files = find_extract_files(tmp.path(), "0119-0125");
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0119-0125-jp.csv", "0119-0125-us.csv"]);
    }

    #[test]
    fn test_find_extract_files_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(find_extract_files(&tmp.path().join("nope"), "0119-0125").is_empty());
    }

    // ── load_week_extracts ───────────────────────────────────────────────────

    #[test]
    fn test_load_week_extracts_concatenates_in_file_order() {
        let tmp = TempDir::new().unwrap();
        write_extract(
            tmp.path(),
            "0119-0125-a.csv",
            &[HEADER, "id1\tGame A\tPub\t2024-06-01\t1,500\t300\t1000\t100"],
        );
        write_extract(
            tmp.path(),
            "0119-0125-b.csv",
            &[HEADER, "nan\tGame B\tPub\t\t10\t\t\t"],
        );

        let batch = load_week_extracts(tmp.path(), "0119-0125").unwrap();
        assert_eq!(batch.files, 2);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.columns, ExtractColumns::all());

        let a = &batch.records[0];
        assert_eq!(a.unified_id.as_deref(), Some("id1"));
        assert_eq!(a.downloads_absolute, 1500.0);
        assert_eq!(a.earliest_release_date.as_deref(), Some("2024-06-01"));

        let b = &batch.records[1];
        assert!(b.unified_id.is_none());
        assert_eq!(b.revenue_absolute, 0.0);
        assert!(b.earliest_release_date.is_none());
    }

    #[test]
    fn test_load_week_extracts_no_files() {
        let tmp = TempDir::new().unwrap();
        let err = load_week_extracts(tmp.path(), "0119-0125").unwrap_err();
        assert!(matches!(err, MonitorError::NoExtractFiles(_)));
    }

    #[test]
    fn test_missing_id_column_is_schema_error() {
        let tmp = TempDir::new().unwrap();
        write_extract(tmp.path(), "0119-0125-a.csv", &["Name\tRevenue (Absolute)", "x\t1"]);
        let err = load_week_extracts(tmp.path(), "0119-0125").unwrap_err();
        assert!(matches!(err, MonitorError::Schema { stage: Stage::Ingest, .. }));
    }

    #[test]
    fn test_column_presence_is_intersected() {
        let tmp = TempDir::new().unwrap();
        write_extract(tmp.path(), "0119-0125-a.csv", &[HEADER]);
        write_extract(tmp.path(), "0119-0125-b.csv", &["unified_id\tunified_name", "x\tGame"]);
        let batch = load_week_extracts(tmp.path(), "0119-0125").unwrap();
        assert!(batch.columns.unified_name);
        assert!(!batch.columns.revenue_absolute);
        assert!(!batch.columns.downloads_pop_change);
    }

    #[test]
    fn test_utf8_comma_extract() {
        let table = Table::parse("unified_id,unified_name,revenue_absolute\nabc,Game,\"12,000\"\n").unwrap();
        let (records, columns) = records_from_table(&table).unwrap();
        assert_eq!(records[0].revenue_absolute, 12000.0);
        assert!(!columns.publisher_name);
    }
}
