//! Delimited text tables as read from and written to disk.
//!
//! Extracts arrive as UTF-16 tab-separated files; reference tables and
//! stage artifacts are UTF-8 comma-separated. [`Table::read`] accepts
//! either and exposes rows as trimmed strings addressed by header.

use std::path::Path;

use monitor_core::error::{MonitorError, Result};
use tracing::debug;

/// Map a `csv` failure into the monitor error type.
pub(crate) fn csv_error(path: &Path, e: csv::Error) -> MonitorError {
    MonitorError::Csv(format!("{}: {}", path.display(), e))
}

/// A header row plus string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Read and decode a delimited file.
    pub fn read(path: &Path) -> Result<Table> {
        let bytes = std::fs::read(path).map_err(|e| MonitorError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let text = decode_text(&bytes)
            .ok_or_else(|| MonitorError::Csv(format!("{}: not UTF-8 or UTF-16 text", path.display())))?;
        let table = Self::parse(&text).map_err(|e| csv_error(path, e))?;
        debug!(
            "Read {} rows x {} columns from {}",
            table.rows.len(),
            table.headers.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse decoded text. Tab-delimited when the header line has a tab.
    pub fn parse(text: &str) -> std::result::Result<Table, csv::Error> {
        let header_line = text.lines().next().unwrap_or("");
        let delimiter = if header_line.contains('\t') { b'\t' } else { b',' };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .has_headers(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            let mut row: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Table { headers, rows })
    }

    /// Index of the first header matching any synonym.
    ///
    /// Exact (trimmed) matches win over case-insensitive ones.
    pub fn find_column(&self, synonyms: &[&str]) -> Option<usize> {
        synonyms
            .iter()
            .find_map(|s| self.headers.iter().position(|h| h == s))
            .or_else(|| {
                synonyms.iter().find_map(|s| {
                    self.headers
                        .iter()
                        .position(|h| h.eq_ignore_ascii_case(s))
                })
            })
    }

    /// Like [`find_column`](Self::find_column), failing with a schema error.
    pub fn require_column(
        &self,
        synonyms: &[&str],
        stage: monitor_core::models::Stage,
    ) -> Result<usize> {
        self.find_column(synonyms).ok_or_else(|| MonitorError::Schema {
            stage,
            column: synonyms.first().copied().unwrap_or_default().to_string(),
        })
    }

    /// Write as UTF-8 CSV, replacing `path` atomically.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp).map_err(|e| csv_error(&tmp, e))?;
            writer.write_record(&self.headers).map_err(|e| csv_error(&tmp, e))?;
            for row in &self.rows {
                writer.write_record(row).map_err(|e| csv_error(&tmp, e))?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        debug!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }
}

/// The cell at `col` (blank when `col` is absent).
pub fn cell(row: &[String], col: Option<usize>) -> &str {
    col.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("")
}

/// Parse a numeric cell: thousands separators stripped, blank or `nan` → `None`.
pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("nan") {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a numeric cell, reading blanks and garbage as zero.
pub fn number_or_zero(value: &str) -> f64 {
    parse_number(value).unwrap_or(0.0)
}

/// Format a float for an artifact cell without trailing noise.
pub fn format_cell_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decode UTF-16 (by BOM, or by NUL pattern without one) or UTF-8 text.
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8(rest.to_vec()).ok(),
        _ if looks_like_utf16le(bytes) => decode_utf16(bytes, u16::from_le_bytes),
        _ => String::from_utf8(bytes.to_vec()).ok(),
    }
}

fn decode_utf16(bytes: &[u8], to_u16: fn([u8; 2]) -> u16) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_u16([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

fn looks_like_utf16le(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(64)];
    sample.len() >= 4
        && sample.len() % 2 == 0
        && sample.iter().skip(1).step_by(2).all(|b| *b == 0)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
