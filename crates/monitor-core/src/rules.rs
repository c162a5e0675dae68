//! Delete / strike / highlight rule evaluation.
//!
//! A [`Condition`] compares one row metric against a threshold. A [`Rule`]
//! matches when all of its conditions match; a rule that was empty or
//! malformed in configuration compiles to [`Rule::Never`]. A [`RuleSet`]
//! folds its rules left to right, combining each rule's result with the
//! running result through that rule's [`Join`].

use std::collections::HashSet;

use crate::models::WeeklyFigures;

// ── Metric ────────────────────────────────────────────────────────────────────

/// A row value a condition can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    ThisWeekInstalls,
    LastWeekInstalls,
    ThisWeekRevenue,
    LastWeekRevenue,
    /// Install change in percent points.
    InstallChangePct,
    /// Revenue change in percent points.
    RevenueChangePct,
}

impl Metric {
    /// Parse a metric name; accepts snake_case names and the legacy column labels.
    pub fn parse(name: &str) -> Option<Metric> {
        match name.trim() {
            "this_week_installs" | "当周周安装" => Some(Metric::ThisWeekInstalls),
            "last_week_installs" | "上周周安装" => Some(Metric::LastWeekInstalls),
            "this_week_revenue" | "当周周流水" => Some(Metric::ThisWeekRevenue),
            "last_week_revenue" | "上周周流水" => Some(Metric::LastWeekRevenue),
            "install_change_pct" | "周安装变动" => Some(Metric::InstallChangePct),
            "revenue_change_pct" | "周流水变动" => Some(Metric::RevenueChangePct),
            _ => None,
        }
    }
}

// ── Operator ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Operator {
    pub fn parse(symbol: &str) -> Option<Operator> {
        match symbol.trim() {
            ">" => Some(Operator::Gt),
            ">=" | "≥" => Some(Operator::Ge),
            "<" => Some(Operator::Lt),
            "<=" | "≤" => Some(Operator::Le),
            "=" | "==" => Some(Operator::Eq),
            "!=" | "≠" => Some(Operator::Ne),
            _ => None,
        }
    }

    pub fn apply(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Ge => value >= threshold,
            Operator::Lt => value < threshold,
            Operator::Le => value <= threshold,
            Operator::Eq => value == threshold,
            Operator::Ne => value != threshold,
        }
    }
}

// ── Metric source ─────────────────────────────────────────────────────────────

/// Anything that can supply metric values to a condition.
///
/// `None` means the value is undefined for this row (e.g. a change figure
/// with a zero denominator); conditions on an undefined value never match.
pub trait MetricSource {
    fn metric(&self, metric: Metric) -> Option<f64>;
}

/// Metric values of one pivot row, as rules see them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowMetrics {
    pub figures: WeeklyFigures,
    pub install_change_pct: Option<f64>,
    pub revenue_change_pct: Option<f64>,
}

impl RowMetrics {
    /// Derive change percentages from `figures`.
    pub fn from_figures(figures: WeeklyFigures) -> Self {
        Self {
            figures,
            install_change_pct: figures.install_change().map(|c| c * 100.0),
            revenue_change_pct: figures.revenue_change().map(|c| c * 100.0),
        }
    }
}

impl MetricSource for RowMetrics {
    fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::ThisWeekInstalls => Some(self.figures.this_week_installs),
            Metric::LastWeekInstalls => Some(self.figures.last_week_installs),
            Metric::ThisWeekRevenue => Some(self.figures.this_week_revenue),
            Metric::LastWeekRevenue => Some(self.figures.last_week_revenue),
            Metric::InstallChangePct => self.install_change_pct,
            Metric::RevenueChangePct => self.revenue_change_pct,
        }
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Condition {
    pub metric: Metric,
    pub op: Operator,
    pub threshold: f64,
}

impl Condition {
    pub fn new(metric: Metric, op: Operator, threshold: f64) -> Self {
        Self {
            metric,
            op,
            threshold,
        }
    }

    pub fn matches(&self, source: &impl MetricSource) -> bool {
        source
            .metric(self.metric)
            .map(|value| self.op.apply(value, self.threshold))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// AND of its conditions. Never empty.
    All(Vec<Condition>),
    /// An empty or malformed rule.
    Never,
}

impl Rule {
    /// Build a rule; an empty condition list yields [`Rule::Never`].
    pub fn all(conditions: Vec<Condition>) -> Self {
        if conditions.is_empty() {
            Rule::Never
        } else {
            Rule::All(conditions)
        }
    }

    pub fn matches(&self, source: &impl MetricSource) -> bool {
        match self {
            Rule::All(conditions) => conditions.iter().all(|c| c.matches(source)),
            Rule::Never => false,
        }
    }
}

/// How a rule combines with the running result of the rules before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Join {
    And,
    #[default]
    Or,
}

impl Join {
    /// Parse a join keyword; anything but `and` is `or`.
    pub fn parse(keyword: &str) -> Join {
        if keyword.trim().eq_ignore_ascii_case("and") {
            Join::And
        } else {
            Join::Or
        }
    }

    fn combine(&self, acc: bool, next: bool) -> bool {
        match self {
            Join::And => acc && next,
            Join::Or => acc || next,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRule {
    pub join: Join,
    pub rule: Rule,
}

/// Ordered rules with per-rule joins. The first rule's join is ignored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleSet {
    pub rules: Vec<JoinedRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<JoinedRule>) -> Self {
        Self { rules }
    }

    /// Rules all joined with `join`.
    pub fn uniform(join: Join, rules: Vec<Rule>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|rule| JoinedRule { join, rule })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Fold the rules over `source`. An empty set never matches.
    pub fn evaluate(&self, source: &impl MetricSource) -> bool {
        match self.rules.split_first() {
            None => false,
            Some((first, rest)) => fold(first.rule.matches(source), rest, source),
        }
    }
}

fn fold(acc: bool, rest: &[JoinedRule], source: &impl MetricSource) -> bool {
    match rest.split_first() {
        None => acc,
        Some((next, tail)) => {
            let combined = next.join.combine(acc, next.rule.matches(source));
            fold(combined, tail, source)
        }
    }
}

// ── Product overrides ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBy {
    ProductName,
    UnifiedId,
}

/// Forces a category onto a product regardless of its metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductOverride {
    pub by: MatchBy,
    pub value: String,
}

/// Case-insensitive lookup sets built from a list of overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideSet {
    names: HashSet<String>,
    ids: HashSet<String>,
}

impl OverrideSet {
    pub fn new(overrides: &[ProductOverride]) -> Self {
        let mut set = Self::default();
        for o in overrides {
            let key = normalize_key(&o.value);
            if key.is_empty() {
                continue;
            }
            match o.by {
                MatchBy::ProductName => set.names.insert(key),
                MatchBy::UnifiedId => set.ids.insert(key),
            };
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.ids.is_empty()
    }

    pub fn matches(&self, product: &str, unified_id: Option<&str>) -> bool {
        let name = normalize_key(product);
        if !name.is_empty() && self.names.contains(&name) {
            return true;
        }
        unified_id
            .map(normalize_key)
            .map(|id| !id.is_empty() && self.ids.contains(&id))
            .unwrap_or(false)
    }
}

fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

// ── RuleBook ──────────────────────────────────────────────────────────────────

/// The three independently configured rule categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Delete,
    Strike,
    Yellow,
}

/// Rule sets and product overrides for all three categories.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleBook {
    pub delete_rules: RuleSet,
    pub strike_rules: RuleSet,
    pub yellow_rules: RuleSet,
    pub delete_overrides: OverrideSet,
    pub strike_overrides: OverrideSet,
    pub yellow_overrides: OverrideSet,
}

impl Default for RuleBook {
    fn default() -> Self {
        Self {
            delete_rules: default_delete_rules(),
            strike_rules: default_strike_rules(),
            yellow_rules: default_yellow_rules(),
            delete_overrides: OverrideSet::default(),
            strike_overrides: OverrideSet::default(),
            yellow_overrides: OverrideSet::default(),
        }
    }
}

impl RuleBook {
    pub fn rules(&self, category: Category) -> &RuleSet {
        match category {
            Category::Delete => &self.delete_rules,
            Category::Strike => &self.strike_rules,
            Category::Yellow => &self.yellow_rules,
        }
    }

    pub fn overrides(&self, category: Category) -> &OverrideSet {
        match category {
            Category::Delete => &self.delete_overrides,
            Category::Strike => &self.strike_overrides,
            Category::Yellow => &self.yellow_overrides,
        }
    }

    /// Whether a row falls in `category`: any override hit OR the rule set.
    pub fn decide(
        &self,
        category: Category,
        product: &str,
        unified_id: Option<&str>,
        metrics: &impl MetricSource,
    ) -> bool {
        self.overrides(category).matches(product, unified_id)
            || self.rules(category).evaluate(metrics)
    }
}

// ── Built-in defaults ─────────────────────────────────────────────────────────

const LOW_INSTALLS: f64 = 400.0;
const LOW_REVENUE: f64 = 20_000.0;

fn low_installs_both_weeks() -> Vec<Condition> {
    vec![
        Condition::new(Metric::ThisWeekInstalls, Operator::Lt, LOW_INSTALLS),
        Condition::new(Metric::LastWeekInstalls, Operator::Lt, LOW_INSTALLS),
    ]
}

/// Low installs and low revenue in both weeks.
pub fn default_delete_rules() -> RuleSet {
    let mut conditions = low_installs_both_weeks();
    conditions.push(Condition::new(Metric::ThisWeekRevenue, Operator::Lt, LOW_REVENUE));
    conditions.push(Condition::new(Metric::LastWeekRevenue, Operator::Lt, LOW_REVENUE));
    RuleSet::uniform(Join::Or, vec![Rule::all(conditions)])
}

/// Low installs in both weeks but meaningful revenue in either week.
pub fn default_strike_rules() -> RuleSet {
    let mut this_week = low_installs_both_weeks();
    this_week.push(Condition::new(Metric::ThisWeekRevenue, Operator::Ge, LOW_REVENUE));
    let mut last_week = low_installs_both_weeks();
    last_week.push(Condition::new(Metric::LastWeekRevenue, Operator::Ge, LOW_REVENUE));
    RuleSet::uniform(Join::Or, vec![Rule::all(this_week), Rule::all(last_week)])
}

/// At least +20% installs on more than 1000 installs this week.
pub fn default_yellow_rules() -> RuleSet {
    RuleSet::uniform(
        Join::Or,
        vec![Rule::all(vec![
            Condition::new(Metric::InstallChangePct, Operator::Ge, 20.0),
            Condition::new(Metric::ThisWeekInstalls, Operator::Gt, 1000.0),
        ])],
    )
}

// ── Tests ──────────────────────────────────────────────────────────────────────
