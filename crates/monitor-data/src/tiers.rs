//! Country → market tier table and the tier joiner.

use std::collections::HashMap;
use std::path::Path;

use monitor_core::error::Result;
use monitor_core::ids::{normalize_app_id, NormalizedId};
use monitor_core::models::{
    CountryRecord, DataQualityWarning, Stage, TargetRecord, Tier, TierAggregate, TierJoinedRow,
};
use tracing::{debug, warn};

use crate::table::{cell, Table};

const COUNTRY_COLUMNS: &[&str] = &["country", "country_code"];
const TIER_COLUMNS: &[&str] = &["T度", "tier", "tier_name"];

/// Mainland China is never bucketed into Asia T1.
const ASIA_T1_EXCLUDED: &[&str] = &["CN"];

// ── TierTable ─────────────────────────────────────────────────────────────────

/// Country code → tier; unlisted countries fall into [`Tier::T3`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierTable {
    by_country: HashMap<String, Tier>,
}

impl TierTable {
    /// Load the tier reference table. A missing file yields an empty table
    /// so every country falls back to T3.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(
                "Tier table {} not found; every country will count as T3",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::from_table(&Table::read(path)?)
    }

    pub fn from_table(table: &Table) -> Result<Self> {
        let country_col = table.require_column(COUNTRY_COLUMNS, Stage::TierJoin)?;
        let tier_col = table.require_column(TIER_COLUMNS, Stage::TierJoin)?;

        let mut by_country = HashMap::new();
        for row in &table.rows {
            let country = cell(row, Some(country_col)).to_uppercase();
            let label = cell(row, Some(tier_col));
            if country.is_empty() || label.is_empty() {
                continue;
            }
            match Tier::parse(label) {
                Some(tier) => {
                    by_country.insert(country, tier);
                }
                None => debug!("Unknown tier label {:?} for {}; treating as T3", label, country),
            }
        }
        for code in ASIA_T1_EXCLUDED {
            if by_country.get(*code) == Some(&Tier::AsiaT1) {
                by_country.remove(*code);
            }
        }

        debug!("Tier table: {} countries", by_country.len());
        Ok(Self { by_country })
    }

    pub fn tier_of(&self, country: &str) -> Tier {
        self.by_country
            .get(&country.trim().to_uppercase())
            .copied()
            .unwrap_or(Tier::T3)
    }

    /// Sum installs and revenue per tier. Fractional figures truncate.
    pub fn aggregate(&self, records: &[CountryRecord]) -> TierAggregate {
        let mut agg = TierAggregate::default();
        for r in records {
            agg.add(
                self.tier_of(&r.country),
                r.unified_units as i64,
                r.unified_revenue as i64,
            );
        }
        agg
    }
}

// ── TierJoiner ────────────────────────────────────────────────────────────────

/// Left-joins target rows with per-tier sums of their country records.
pub struct TierJoiner;

impl TierJoiner {
    /// Attach tier figures to every target.
    ///
    /// `records` is keyed by normalized app id. Rows whose id is missing,
    /// unusable or unmatched get all-zero figures and a warning; no row is
    /// ever dropped.
    pub fn join(
        targets: &[TargetRecord],
        records: &HashMap<String, Vec<CountryRecord>>,
        tiers: &TierTable,
    ) -> (Vec<TierJoinedRow>, Vec<DataQualityWarning>) {
        let mut warnings = Vec::new();
        let mut note = |w: DataQualityWarning| {
            warn!("{}", w);
            warnings.push(w);
        };

        let joined: Vec<TierJoinedRow> = targets
            .iter()
            .map(|target| {
                let figures = match normalize_app_id(target.report.row.unified_id().unwrap_or("")) {
                    NormalizedId::Id(id) => match records.get(&id).filter(|r| !r.is_empty()) {
                        Some(rows) => tiers.aggregate(rows),
                        None => {
                            note(DataQualityWarning::UnmatchedTierJoin { app_id: id });
                            TierAggregate::default()
                        }
                    },
                    NormalizedId::Scientific(value) => {
                        note(DataQualityWarning::ScientificNotationId { value });
                        TierAggregate::default()
                    }
                    NormalizedId::Empty => {
                        note(DataQualityWarning::MissingTargetId {
                            product: target.report.row.product_attribution().to_string(),
                        });
                        TierAggregate::default()
                    }
                };
                TierJoinedRow {
                    target: target.clone(),
                    tiers: figures,
                }
            })
            .collect();

        debug!(
            "Tier join: {} rows, {} coverage warnings",
            joined.len(),
            warnings.len()
        );
        (joined, warnings)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
