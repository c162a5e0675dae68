//! Reference tables and the attribute mapper.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use monitor_core::error::{MonitorError, Result};
use monitor_core::layout::{
    DataLayout, COMPANY_ATTRIBUTION_FILE, PRODUCT_ATTRIBUTION_FILE, REVENUE_COEFFICIENT_FILE,
};
use monitor_core::models::{DataQualityWarning, DedupedRecord, MappedRecord, Stage};
use tracing::{debug, warn};

use crate::table::{cell, parse_number, Table};

const PRODUCT_NAME_COLUMNS: &[&str] = &["产品名（实时更新中）", "Unified Name", "产品名", "Unified name", "name"];
const PRODUCT_ATTRIBUTION_COLUMNS: &[&str] = &["产品归属", "product_attribution"];
const PRODUCT_ID_COLUMNS: &[&str] = &["Unified ID", "Unified id", "unified id", "unified_id", "id"];
const PUBLISHER_COLUMNS: &[&str] = &["Unified Publisher Name", "publisher_name"];
const COMPANY_ATTRIBUTION_COLUMNS: &[&str] = &["公司归属", "company_attribution"];
const COEFFICIENT_NAME_COLUMNS: &[&str] = &["Unified Name", "name"];
const COEFFICIENT_COLUMNS: &[&str] = &["流水系数", "coefficient"];

// ── ReferenceTables ───────────────────────────────────────────────────────────

/// Lookup maps built from the three attribution tables.
///
/// Duplicate keys keep their first occurrence, so a join never multiplies
/// rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceTables {
    product_by_name: HashMap<String, String>,
    /// `None` when the product table has no id column.
    product_by_id: Option<HashMap<String, String>>,
    company_by_publisher: HashMap<String, String>,
    coefficient_by_name: HashMap<String, f64>,
}

impl ReferenceTables {
    /// Load the three tables from `{root}/mapping/`.
    pub fn load(layout: &DataLayout) -> Result<Self> {
        let read = |name: &str| -> Result<Table> {
            let path = layout.mapping_file(name);
            if !path.exists() {
                return Err(MonitorError::ReferenceTableMissing(path));
            }
            Table::read(&path)
        };
        Self::from_tables(
            &read(PRODUCT_ATTRIBUTION_FILE)?,
            &read(COMPANY_ATTRIBUTION_FILE)?,
            &read(REVENUE_COEFFICIENT_FILE)?,
        )
    }

    pub fn from_tables(product: &Table, company: &Table, coefficient: &Table) -> Result<Self> {
        let name_col = product.require_column(PRODUCT_NAME_COLUMNS, Stage::Mapping)?;
        let attr_col = product.require_column(PRODUCT_ATTRIBUTION_COLUMNS, Stage::Mapping)?;
        let id_col = product.find_column(PRODUCT_ID_COLUMNS);

        let mut product_by_name = HashMap::new();
        let mut product_by_id = id_col.map(|_| HashMap::new());
        for row in &product.rows {
            let attribution = cell(row, Some(attr_col));
            if attribution.is_empty() {
                continue;
            }
            first_wins(&mut product_by_name, cell(row, Some(name_col)), attribution.to_string());
            if let Some(by_id) = product_by_id.as_mut() {
                first_wins(by_id, cell(row, id_col), attribution.to_string());
            }
        }

        let publisher_col = company.require_column(PUBLISHER_COLUMNS, Stage::Mapping)?;
        let company_col = company.require_column(COMPANY_ATTRIBUTION_COLUMNS, Stage::Mapping)?;
        let mut company_by_publisher = HashMap::new();
        for row in &company.rows {
            let attribution = cell(row, Some(company_col));
            if !attribution.is_empty() {
                first_wins(
                    &mut company_by_publisher,
                    cell(row, Some(publisher_col)),
                    attribution.to_string(),
                );
            }
        }

        let coef_name_col = coefficient.require_column(COEFFICIENT_NAME_COLUMNS, Stage::Mapping)?;
        let coef_col = coefficient.require_column(COEFFICIENT_COLUMNS, Stage::Mapping)?;
        let mut coefficient_by_name = HashMap::new();
        for row in &coefficient.rows {
            if let Some(value) = parse_number(cell(row, Some(coef_col))) {
                first_wins(&mut coefficient_by_name, cell(row, Some(coef_name_col)), value);
            }
        }

        debug!(
            "Reference tables: {} products, {} publishers, {} coefficients",
            product_by_name.len(),
            company_by_publisher.len(),
            coefficient_by_name.len()
        );

        Ok(Self {
            product_by_name,
            product_by_id,
            company_by_publisher,
            coefficient_by_name,
        })
    }

    /// Product attribution by name, falling back to id.
    pub fn product_attribution(&self, name: &str, id: Option<&str>) -> Option<&str> {
        self.product_by_name
            .get(name.trim())
            .or_else(|| {
                let by_id = self.product_by_id.as_ref()?;
                by_id.get(id?.trim())
            })
            .map(String::as_str)
    }

    pub fn company_attribution(&self, publisher: &str) -> Option<&str> {
        self.company_by_publisher
            .get(publisher.trim())
            .map(String::as_str)
    }

    pub fn revenue_coefficient(&self, name: &str) -> Option<f64> {
        self.coefficient_by_name.get(name.trim()).copied()
    }
}

fn first_wins<V>(map: &mut HashMap<String, V>, key: &str, value: V) {
    let key = key.trim();
    if !key.is_empty() {
        map.entry(key.to_string()).or_insert(value);
    }
}

/// Non-empty product attributions listed in the product table.
///
/// This is the set of "strategy" products used by target classification.
pub fn load_strategy_products(path: &Path) -> Result<BTreeSet<String>> {
    if !path.exists() {
        return Err(MonitorError::ReferenceTableMissing(path.to_path_buf()));
    }
    let table = Table::read(path)?;
    strategy_products_from_table(&table)
}

pub fn strategy_products_from_table(table: &Table) -> Result<BTreeSet<String>> {
    let attr_col = table.require_column(PRODUCT_ATTRIBUTION_COLUMNS, Stage::Targets)?;
    Ok(table
        .rows
        .iter()
        .map(|row| cell(row, Some(attr_col)).to_string())
        .filter(|a| !a.is_empty())
        .collect())
}

// ── AttributeMapper ───────────────────────────────────────────────────────────

/// Left-joins deduplicated records against the reference tables.
pub struct AttributeMapper;

impl AttributeMapper {
    /// Attach attributions to every record. Misses stay `None`.
    pub fn map(
        records: Vec<DedupedRecord>,
        refs: &ReferenceTables,
    ) -> (Vec<MappedRecord>, Vec<DataQualityWarning>) {
        let mut product_misses = 0usize;
        let mut company_misses = 0usize;

        let mapped: Vec<MappedRecord> = records
            .into_iter()
            .map(|mut record| {
                record.unified_name = record.unified_name.trim().to_string();
                let product_attribution = refs
                    .product_attribution(&record.unified_name, record.unified_id.as_deref())
                    .map(str::to_string);
                let company_attribution =
                    refs.company_attribution(&record.publisher_name).map(str::to_string);
                let revenue_coefficient = refs.revenue_coefficient(&record.unified_name);

                product_misses += usize::from(product_attribution.is_none());
                company_misses += usize::from(company_attribution.is_none());

                MappedRecord {
                    record,
                    product_attribution,
                    company_attribution,
                    revenue_coefficient,
                }
            })
            .collect();

        let mut warnings = Vec::new();
        for (table, misses) in [
            ("product attribution", product_misses),
            ("company attribution", company_misses),
        ] {
            if misses > 0 {
                let w = DataQualityWarning::ReferenceMiss {
                    table: table.to_string(),
                    misses,
                };
                warn!("{}", w);
                warnings.push(w);
            }
        }

        (mapped, warnings)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::models::RawRecord;
    use tempfile::TempDir;

    fn rec(id: Option<&str>, name: &str, publisher: &str) -> RawRecord {
        RawRecord {
            unified_id: id.map(str::to_string),
            unified_name: name.to_string(),
            publisher_name: publisher.to_string(),
            downloads_absolute: 0.0,
            downloads_pop_change: 0.0,
            revenue_absolute: 0.0,
            revenue_pop_change: 0.0,
            earliest_release_date: None,
        }
    }

    fn refs() -> ReferenceTables {
        let product = Table::parse(
            "产品名（实时更新中）,产品归属,Unified ID\nGame A,Alpha,id-a\nGame A,Other,id-x\n,Beta,id-b\n",
        )
        .unwrap();
        let company = Table::parse("Unified Publisher Name,公司归属\nPub Inc,Acme\nPub Inc,Dup\n").unwrap();
        let coef = Table::parse("Unified Name,流水系数\nGame A,0.7\nGame B,bad\n").unwrap();
        ReferenceTables::from_tables(&product, &company, &coef).unwrap()
    }

    #[test]
    fn test_lookup_first_occurrence_wins() {
        let r = refs();
        assert_eq!(r.product_attribution("Game A", None), Some("Alpha"));
        assert_eq!(r.company_attribution("Pub Inc"), Some("Acme"));
    }

    #[test]
    fn test_product_id_fallback() {
        let r = refs();
        assert_eq!(r.product_attribution("Renamed", Some("id-b")), Some("Beta"));
        assert_eq!(r.product_attribution("Renamed", None), None);
    }

    #[test]
    fn test_unparseable_coefficient_is_absent() {
        let r = refs();
        assert_eq!(r.revenue_coefficient("Game A"), Some(0.7));
        assert_eq!(r.revenue_coefficient("Game B"), None);
    }

    #[test]
    fn test_no_id_column_disables_fallback() {
        let product = Table::parse("Unified Name,产品归属\nGame A,Alpha\n").unwrap();
        let company = Table::parse("publisher_name,company_attribution\n").unwrap();
        let coef = Table::parse("name,coefficient\n").unwrap();
        let r = ReferenceTables::from_tables(&product, &company, &coef).unwrap();
        assert_eq!(r.product_attribution("x", Some("Game A")), None);
    }

    #[test]
    fn test_missing_attribution_column_is_schema_error() {
        let product = Table::parse("Unified Name\nGame A\n").unwrap();
        let company = Table::parse("publisher_name,company_attribution\n").unwrap();
        let coef = Table::parse("name,coefficient\n").unwrap();
        let err = ReferenceTables::from_tables(&product, &company, &coef).unwrap_err();
        assert!(matches!(err, MonitorError::Schema { stage: Stage::Mapping, .. }));
    }

    #[test]
    fn test_mapper_preserves_nulls_and_counts_misses() {
        let (mapped, warnings) = AttributeMapper::map(
            vec![
                rec(Some("id-a"), " Game A ", "Pub Inc"),
                rec(None, "Unknown", "Nobody"),
            ],
            &refs(),
        );
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].record.unified_name, "Game A");
        assert_eq!(mapped[0].product_attribution.as_deref(), Some("Alpha"));
        assert_eq!(mapped[0].company_attribution.as_deref(), Some("Acme"));
        assert_eq!(mapped[0].revenue_coefficient, Some(0.7));
        assert!(mapped[1].product_attribution.is_none());
        assert!(mapped[1].revenue_coefficient.is_none());
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_load_missing_table() {
        let tmp = TempDir::new().unwrap();
        let err = ReferenceTables::load(&DataLayout::new(tmp.path())).unwrap_err();
        assert!(matches!(err, MonitorError::ReferenceTableMissing(_)));
    }

    #[test]
    fn test_strategy_products() {
        let table = Table::parse("Unified Name,产品归属\nA,Alpha\nB,\nC,Alpha\nD,Delta\n").unwrap();
        let set = strategy_products_from_table(&table).unwrap();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec!["Alpha", "Delta"]);
    }
}
