//! Rule configuration file (`config/monitor_rules.json`).
//!
//! The on-disk shape is loose: every key is optional and any entry that
//! cannot be understood compiles to a rule that never matches. Keys absent
//! from the file keep their built-in defaults; a key present with a
//! non-list value disables that category.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{MonitorError, Result};
use crate::rules::{
    Condition, Join, JoinedRule, MatchBy, Metric, Operator, OverrideSet, ProductOverride, Rule,
    RuleBook, RuleSet,
};

/// Raw, lenient view of the rule configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_rules: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike_rules: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yellow_rules: Option<Value>,
    /// Per-product overrides, `{"delete": [...], "strike": [...], "yellow": [...]}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_overrides: Option<Value>,
    /// Older name for `product_overrides`; entries under both keys are merged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_rules: Option<Value>,
}

impl RuleConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Read a config file. Missing file is `Ok(None)`.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| MonitorError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&content).map(Some)
    }

    /// Compile into an evaluable [`RuleBook`].
    pub fn compile(&self) -> RuleBook {
        let defaults = RuleBook::default();
        let overrides = [self.product_overrides.as_ref(), self.product_rules.as_ref()];
        RuleBook {
            delete_rules: compile_category(self.delete_rules.as_ref(), defaults.delete_rules),
            strike_rules: compile_category(self.strike_rules.as_ref(), defaults.strike_rules),
            yellow_rules: compile_category(self.yellow_rules.as_ref(), defaults.yellow_rules),
            delete_overrides: compile_overrides(&overrides, "delete"),
            strike_overrides: compile_overrides(&overrides, "strike"),
            yellow_overrides: compile_overrides(&overrides, "yellow"),
        }
    }
}

impl RuleBook {
    /// Load rules from `path`, falling back to the built-in defaults when the
    /// file is missing or unreadable.
    pub fn load_or_default(path: &Path) -> RuleBook {
        match RuleConfig::load_from(path) {
            Ok(Some(config)) => {
                debug!("Loaded rule config from {}", path.display());
                config.compile()
            }
            Ok(None) => {
                debug!("No rule config at {}, using defaults", path.display());
                RuleBook::default()
            }
            Err(e) => {
                warn!("Ignoring rule config {}: {}", path.display(), e);
                RuleBook::default()
            }
        }
    }
}

// ── Compilation ───────────────────────────────────────────────────────────────

fn compile_category(raw: Option<&Value>, default: RuleSet) -> RuleSet {
    match raw {
        None => default,
        Some(Value::Array(entries)) => RuleSet::new(
            entries
                .iter()
                .map(|entry| JoinedRule {
                    join: entry
                        .get("join")
                        .and_then(Value::as_str)
                        .map(Join::parse)
                        .unwrap_or_default(),
                    rule: compile_rule(entry),
                })
                .collect(),
        ),
        Some(other) => {
            warn!("Rule category is not a list ({}), disabling it", other);
            RuleSet::default()
        }
    }
}

fn compile_rule(entry: &Value) -> Rule {
    let Some(conditions) = entry.get("conditions").and_then(Value::as_array) else {
        return Rule::Never;
    };
    let compiled: Option<Vec<Condition>> = conditions.iter().map(compile_condition).collect();
    match compiled {
        Some(conditions) => Rule::all(conditions),
        None => {
            warn!("Malformed rule {}, it will never match", entry);
            Rule::Never
        }
    }
}

fn compile_condition(raw: &Value) -> Option<Condition> {
    let metric = raw.get("metric").and_then(Value::as_str).and_then(Metric::parse)?;
    let op = raw.get("op").and_then(Value::as_str).and_then(Operator::parse)?;
    let threshold = match raw.get("value")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some(Condition::new(metric, op, threshold))
}

fn compile_overrides(sources: &[Option<&Value>], key: &str) -> OverrideSet {
    let overrides: Vec<ProductOverride> = sources
        .iter()
        .flatten()
        .filter_map(|rules| rules.get(key).and_then(Value::as_array))
        .flat_map(|list| list.iter().filter_map(compile_override))
        .collect();
    OverrideSet::new(&overrides)
}

fn compile_override(raw: &Value) -> Option<ProductOverride> {
    let by = match raw.get("by").and_then(Value::as_str)?.trim() {
        "product_name" | "name" | "产品归属" => MatchBy::ProductName,
        "unified_id" | "id" | "Unified ID" => MatchBy::UnifiedId,
        _ => return None,
    };
    let value = match raw.get("value")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(ProductOverride { by, value })
}
