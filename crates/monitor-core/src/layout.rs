//! On-disk layout of a data root.
//!
//! ```text
//! {root}/raw_csv/{year}/{week}/{week}-*.csv
//! {root}/mapping/*.csv
//! {root}/config/monitor_rules.json
//! {root}/intermediate/{year}/{week}/*.csv
//! {root}/output/{year}/{week}_market_monitor.csv
//! {root}/target/{year}/{week}/{class}_target/target_{class}_{age}.csv
//! {root}/country_data/{year}/{week}/{app_id}.json
//! {root}/final_join/{year}/{week}/target_{class}_{age}_with_tiers.csv
//! ```

use std::path::{Path, PathBuf};

use crate::models::{TargetAge, TargetClass};
use crate::time_utils::WeekRef;

pub const PRODUCT_ATTRIBUTION_FILE: &str = "product_attribution.csv";
pub const COMPANY_ATTRIBUTION_FILE: &str = "company_attribution.csv";
pub const REVENUE_COEFFICIENT_FILE: &str = "revenue_coefficient.csv";
pub const MARKET_TIERS_FILE: &str = "market_tiers.csv";
pub const RULES_FILE: &str = "monitor_rules.json";

/// Intermediate artifacts of one week, in stage order.
pub const MERGED_FILE: &str = "merged_deduplicated.csv";
pub const MAPPED_FILE: &str = "mapped_total.csv";
pub const METRICS_FILE: &str = "metrics_total.csv";
pub const PIVOT_FILE: &str = "pivot_table.csv";

/// Paths under one data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Top-level directories created on startup.
    pub fn top_level_dirs(&self) -> Vec<PathBuf> {
        ["raw_csv", "mapping", "config", "intermediate", "output", "target", "country_data", "final_join"]
            .iter()
            .map(|d| self.root.join(d))
            .collect()
    }

    fn week_dir(&self, top: &str, week: &WeekRef) -> PathBuf {
        self.root
            .join(top)
            .join(week.year.to_string())
            .join(week.tag.to_string())
    }

    pub fn raw_week_dir(&self, week: &WeekRef) -> PathBuf {
        self.week_dir("raw_csv", week)
    }

    pub fn mapping_dir(&self) -> PathBuf {
        self.root.join("mapping")
    }

    pub fn mapping_file(&self, name: &str) -> PathBuf {
        self.mapping_dir().join(name)
    }

    pub fn rules_file(&self) -> PathBuf {
        self.root.join("config").join(RULES_FILE)
    }

    pub fn intermediate_dir(&self, week: &WeekRef) -> PathBuf {
        self.week_dir("intermediate", week)
    }

    pub fn report_file(&self, week: &WeekRef) -> PathBuf {
        self.root
            .join("output")
            .join(week.year.to_string())
            .join(format!("{}_market_monitor.csv", week.tag))
    }

    pub fn target_file(&self, week: &WeekRef, class: TargetClass, age: TargetAge) -> PathBuf {
        self.week_dir("target", week)
            .join(format!("{}_target", class.as_str()))
            .join(format!("target_{}_{}.csv", class.as_str(), age.as_str()))
    }

    pub fn country_data_dir(&self, week: &WeekRef) -> PathBuf {
        self.week_dir("country_data", week)
    }

    pub fn final_join_file(&self, week: &WeekRef, class: TargetClass, age: TargetAge) -> PathBuf {
        self.week_dir("final_join", week)
            .join(format!("target_{}_{}_with_tiers.csv", class.as_str(), age.as_str()))
    }
}
