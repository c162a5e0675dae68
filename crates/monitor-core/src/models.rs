//! Domain records flowing through the weekly pipeline.
//!
//! Every record is an immutable, stage-local value recomputed per
//! (year, week) batch. Each stage wraps the previous stage's record and adds
//! the fields it derives.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix appended to a company name to label its synthetic summary row.
pub const SUMMARY_SUFFIX: &str = " 汇总";

// ── Stage ─────────────────────────────────────────────────────────────────────

/// A named pipeline stage, used to tag structural failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Mapping,
    Metrics,
    Aggregate,
    Report,
    Targets,
    Fetch,
    TierJoin,
}

impl Stage {
    /// Canonical lowercase name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Mapping => "mapping",
            Stage::Metrics => "metrics",
            Stage::Aggregate => "aggregate",
            Stage::Report => "report",
            Stage::Targets => "targets",
            Stage::Fetch => "fetch",
            Stage::TierJoin => "tier_join",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Ingested records ──────────────────────────────────────────────────────────

/// Which optional columns were present in the week's extracts.
///
/// Absent columns read as zero/blank on every record, so downstream stages
/// that need them consult this set to raise a schema error instead of
/// silently computing with zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractColumns {
    pub unified_name: bool,
    pub publisher_name: bool,
    pub earliest_release_date: bool,
    pub downloads_absolute: bool,
    pub downloads_pop_change: bool,
    pub revenue_absolute: bool,
    pub revenue_pop_change: bool,
}

impl ExtractColumns {
    /// Every column present.
    pub fn all() -> Self {
        Self {
            unified_name: true,
            publisher_name: true,
            earliest_release_date: true,
            downloads_absolute: true,
            downloads_pop_change: true,
            revenue_absolute: true,
            revenue_pop_change: true,
        }
    }

    /// Columns present in both `self` and `other`.
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            unified_name: self.unified_name && other.unified_name,
            publisher_name: self.publisher_name && other.publisher_name,
            earliest_release_date: self.earliest_release_date && other.earliest_release_date,
            downloads_absolute: self.downloads_absolute && other.downloads_absolute,
            downloads_pop_change: self.downloads_pop_change && other.downloads_pop_change,
            revenue_absolute: self.revenue_absolute && other.revenue_absolute,
            revenue_pop_change: self.revenue_pop_change && other.revenue_pop_change,
        }
    }
}

/// One row of a raw per-market extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Opaque app identifier; `None` when blank or null-like.
    #[serde(rename = "Unified ID")]
    pub unified_id: Option<String>,
    #[serde(rename = "Unified Name")]
    pub unified_name: String,
    #[serde(rename = "Unified Publisher Name")]
    pub publisher_name: String,
    #[serde(rename = "Downloads (Absolute)")]
    pub downloads_absolute: f64,
    #[serde(rename = "Downloads (PoP Growth)")]
    pub downloads_pop_change: f64,
    #[serde(rename = "Revenue (Absolute)")]
    pub revenue_absolute: f64,
    #[serde(rename = "Revenue (PoP Growth)")]
    pub revenue_pop_change: f64,
    #[serde(rename = "Earliest Release Date")]
    pub earliest_release_date: Option<String>,
}

/// A record that survived both deduplication phases.
pub type DedupedRecord = RawRecord;

/// A deduplicated record joined against the reference tables.
///
/// Unmatched lookups stay `None`; the revenue-coefficient default is applied
/// by the metrics stage, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    pub record: DedupedRecord,
    pub product_attribution: Option<String>,
    pub company_attribution: Option<String>,
    pub revenue_coefficient: Option<f64>,
}

// ── Weekly figures ────────────────────────────────────────────────────────────

/// This-week / last-week install and revenue figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyFigures {
    pub this_week_installs: f64,
    pub last_week_installs: f64,
    pub this_week_revenue: f64,
    pub last_week_revenue: f64,
}

impl WeeklyFigures {
    /// Accumulate `other` into `self`.
    pub fn add(&mut self, other: &WeeklyFigures) {
        self.this_week_installs += other.this_week_installs;
        self.last_week_installs += other.last_week_installs;
        self.this_week_revenue += other.this_week_revenue;
        self.last_week_revenue += other.last_week_revenue;
    }

    /// Week-over-week install change as a fraction; `None` when last week is zero.
    pub fn install_change(&self) -> Option<f64> {
        relative_change(self.this_week_installs, self.last_week_installs)
    }

    /// Week-over-week revenue change as a fraction; `None` when last week is zero.
    pub fn revenue_change(&self) -> Option<f64> {
        relative_change(self.this_week_revenue, self.last_week_revenue)
    }
}

fn relative_change(this_week: f64, last_week: f64) -> Option<f64> {
    if last_week == 0.0 {
        return None;
    }
    let pct = (this_week - last_week) / last_week;
    pct.is_finite().then_some(pct)
}

/// A mapped record with derived weekly figures.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRecord {
    pub mapped: MappedRecord,
    pub figures: WeeklyFigures,
}

// ── Pivot rows ────────────────────────────────────────────────────────────────

/// One (company, product, release date) group.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub company_attribution: String,
    pub product_attribution: String,
    /// Release date as it appeared in the extract; `None` when blank.
    pub release_date: Option<String>,
    /// First unified id seen in the group.
    pub unified_id: Option<String>,
    pub figures: WeeklyFigures,
}

/// Synthetic per-company totals row.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanySummary {
    /// The company name without the summary suffix.
    pub company_attribution: String,
    pub figures: WeeklyFigures,
}

impl CompanySummary {
    /// Display label, e.g. `"Acme 汇总"`.
    pub fn label(&self) -> String {
        format!("{}{}", self.company_attribution, SUMMARY_SUFFIX)
    }
}

/// A row of the aggregated company/product hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub enum PivotRow {
    Product(ProductRow),
    CompanySummary(CompanySummary),
}

impl PivotRow {
    pub fn figures(&self) -> &WeeklyFigures {
        match self {
            PivotRow::Product(row) => &row.figures,
            PivotRow::CompanySummary(row) => &row.figures,
        }
    }

    pub fn is_summary(&self) -> bool {
        matches!(self, PivotRow::CompanySummary(_))
    }

    /// Company column value; summary rows carry the suffixed label.
    pub fn company_label(&self) -> String {
        match self {
            PivotRow::Product(row) => row.company_attribution.clone(),
            PivotRow::CompanySummary(row) => row.label(),
        }
    }

    /// Product column value; blank for summary rows.
    pub fn product_attribution(&self) -> &str {
        match self {
            PivotRow::Product(row) => &row.product_attribution,
            PivotRow::CompanySummary(_) => "",
        }
    }

    pub fn unified_id(&self) -> Option<&str> {
        match self {
            PivotRow::Product(row) => row.unified_id.as_deref(),
            PivotRow::CompanySummary(_) => None,
        }
    }

    pub fn release_date(&self) -> Option<&str> {
        match self {
            PivotRow::Product(row) => row.release_date.as_deref(),
            PivotRow::CompanySummary(_) => None,
        }
    }
}

// ── Report rows ───────────────────────────────────────────────────────────────

/// Visual annotation side channel of the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Annotation {
    #[serde(rename = "summary")]
    Summary,
    #[serde(rename = "struck")]
    Struck,
    #[serde(rename = "highlighted")]
    Highlighted,
    #[serde(rename = "struck+highlighted")]
    StruckHighlighted,
    #[serde(rename = "neutral")]
    Neutral,
}

impl Annotation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Annotation::Summary => "summary",
            Annotation::Struck => "struck",
            Annotation::Highlighted => "highlighted",
            Annotation::StruckHighlighted => "struck+highlighted",
            Annotation::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pivot row that survived the delete rules, with change figures and flags.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub row: PivotRow,
    /// Install change as a fraction (`0.25` is +25%).
    pub install_change: Option<f64>,
    /// Revenue change as a fraction.
    pub revenue_change: Option<f64>,
    pub struck: bool,
    pub highlighted: bool,
}

impl ReportRow {
    pub fn figures(&self) -> &WeeklyFigures {
        self.row.figures()
    }

    pub fn is_summary(&self) -> bool {
        self.row.is_summary()
    }

    /// Install change in percent points, as rules compare it.
    pub fn install_change_pct(&self) -> Option<f64> {
        self.install_change.map(|c| c * 100.0)
    }

    pub fn revenue_change_pct(&self) -> Option<f64> {
        self.revenue_change.map(|c| c * 100.0)
    }

    pub fn annotation(&self) -> Annotation {
        if self.is_summary() {
            return Annotation::Summary;
        }
        match (self.struck, self.highlighted) {
            (true, true) => Annotation::StruckHighlighted,
            (true, false) => Annotation::Struck,
            (false, true) => Annotation::Highlighted,
            (false, false) => Annotation::Neutral,
        }
    }
}

// ── Targets ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetClass {
    Strategy,
    NonStrategy,
}

impl TargetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetClass::Strategy => "strategy",
            TargetClass::NonStrategy => "non_strategy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetAge {
    Old,
    New,
}

impl TargetAge {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetAge::Old => "old",
            TargetAge::New => "new",
        }
    }
}

/// A report row labeled by the target classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    pub report: ReportRow,
    pub class: TargetClass,
    pub age: TargetAge,
}

/// The four disjoint target sets of one week.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetSets {
    pub strategy_old: Vec<TargetRecord>,
    pub strategy_new: Vec<TargetRecord>,
    pub non_strategy_old: Vec<TargetRecord>,
    pub non_strategy_new: Vec<TargetRecord>,
}

impl TargetSets {
    /// Mutable access to the set holding `(class, age)`.
    pub fn set_mut(&mut self, class: TargetClass, age: TargetAge) -> &mut Vec<TargetRecord> {
        match (class, age) {
            (TargetClass::Strategy, TargetAge::Old) => &mut self.strategy_old,
            (TargetClass::Strategy, TargetAge::New) => &mut self.strategy_new,
            (TargetClass::NonStrategy, TargetAge::Old) => &mut self.non_strategy_old,
            (TargetClass::NonStrategy, TargetAge::New) => &mut self.non_strategy_new,
        }
    }

    pub fn set(&self, class: TargetClass, age: TargetAge) -> &[TargetRecord] {
        match (class, age) {
            (TargetClass::Strategy, TargetAge::Old) => &self.strategy_old,
            (TargetClass::Strategy, TargetAge::New) => &self.strategy_new,
            (TargetClass::NonStrategy, TargetAge::Old) => &self.non_strategy_old,
            (TargetClass::NonStrategy, TargetAge::New) => &self.non_strategy_new,
        }
    }

    /// All four sets in canonical order.
    pub fn labeled(&self) -> [(TargetClass, TargetAge, &[TargetRecord]); 4] {
        [
            (TargetClass::Strategy, TargetAge::Old, self.strategy_old.as_slice()),
            (TargetClass::Strategy, TargetAge::New, self.strategy_new.as_slice()),
            (TargetClass::NonStrategy, TargetAge::Old, self.non_strategy_old.as_slice()),
            (TargetClass::NonStrategy, TargetAge::New, self.non_strategy_new.as_slice()),
        ]
    }

    pub fn total(&self) -> usize {
        self.strategy_old.len()
            + self.strategy_new.len()
            + self.non_strategy_old.len()
            + self.non_strategy_new.len()
    }
}

// ── Per-country figures ───────────────────────────────────────────────────────

/// Per (app, country, date) figures supplied by the external fetch collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub unified_units: f64,
    #[serde(default)]
    pub unified_revenue: f64,
}

/// One of the four market buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    AsiaT1,
    WesternT1,
    T2,
    T3,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::AsiaT1, Tier::WesternT1, Tier::T2, Tier::T3];

    /// Position of the tier in [`Tier::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Tier::AsiaT1 => 0,
            Tier::WesternT1 => 1,
            Tier::T2 => 2,
            Tier::T3 => 3,
        }
    }

    /// Parse a tier label from a reference table.
    ///
    /// Accepts the legacy labels (`亚洲T1`, `欧美T1`) and English forms.
    pub fn parse(label: &str) -> Option<Tier> {
        let normalized: String = label
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "亚洲t1" | "asiat1" => Some(Tier::AsiaT1),
            "欧美t1" | "westernt1" | "westt1" => Some(Tier::WesternT1),
            "t2" => Some(Tier::T2),
            "t3" => Some(Tier::T3),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::AsiaT1 => "Asia T1",
            Tier::WesternT1 => "Western T1",
            Tier::T2 => "T2",
            Tier::T3 => "T3",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-target sums of installs and revenue, one slot per [`Tier`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierAggregate {
    pub installs: [i64; 4],
    pub revenue: [i64; 4],
}

impl TierAggregate {
    pub fn add(&mut self, tier: Tier, installs: i64, revenue: i64) {
        self.installs[tier.index()] += installs;
        self.revenue[tier.index()] += revenue;
    }

    pub fn installs_for(&self, tier: Tier) -> i64 {
        self.installs[tier.index()]
    }

    pub fn revenue_for(&self, tier: Tier) -> i64 {
        self.revenue[tier.index()]
    }

    pub fn is_zero(&self) -> bool {
        self.installs.iter().all(|v| *v == 0) && self.revenue.iter().all(|v| *v == 0)
    }
}

/// A target row with its tier figures attached.
#[derive(Debug, Clone, PartialEq)]
pub struct TierJoinedRow {
    pub target: TargetRecord,
    pub tiers: TierAggregate,
}

// ── Data quality ──────────────────────────────────────────────────────────────

/// A record-level problem that was logged and degraded gracefully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataQualityWarning {
    /// A release date could not be parsed; the row classified as old.
    UnparseableReleaseDate { product: String, value: String },
    /// An id was mangled into scientific notation; precision is lost.
    ScientificNotationId { value: String },
    /// A target id had no per-country records; tier figures are zero.
    UnmatchedTierJoin { app_id: String },
    /// A row without an id could not join to tier figures.
    MissingTargetId { product: String },
    /// Rows whose key had no entry in a reference table.
    ReferenceMiss { table: String, misses: usize },
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::UnparseableReleaseDate { product, value } => {
                write!(f, "unparseable release date {:?} for {}", value, product)
            }
            DataQualityWarning::ScientificNotationId { value } => {
                write!(f, "id {} is in scientific notation; store ids as text upstream", value)
            }
            DataQualityWarning::UnmatchedTierJoin { app_id } => {
                write!(f, "no per-country records for {}", app_id)
            }
            DataQualityWarning::MissingTargetId { product } => {
                write!(f, "target {} has no unified id", product)
            }
            DataQualityWarning::ReferenceMiss { table, misses } => {
                write!(f, "{} rows had no match in {}", misses, table)
            }
        }
    }
}
