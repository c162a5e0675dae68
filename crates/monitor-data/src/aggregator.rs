//! Company/product pivot with per-company summary rows.

use std::collections::HashMap;

use monitor_core::models::{CompanySummary, MetricsRecord, PivotRow, ProductRow, WeeklyFigures};
use tracing::debug;

// ── Grouping ──────────────────────────────────────────────────────────────────

/// Group key: (company, product, release date). A missing date is its own key.
type GroupKey = (String, String, Option<String>);

/// Products of one company plus the running company total.
#[derive(Debug, Default)]
struct CompanyGroup {
    name: String,
    totals: WeeklyFigures,
    products: Vec<ProductRow>,
}

// ── PivotAggregator ───────────────────────────────────────────────────────────

/// Stateless helper that builds the ordered company/product hierarchy.
pub struct PivotAggregator;

impl PivotAggregator {
    /// Aggregate `records` into an interleaved, fully ordered pivot.
    ///
    /// Rows lacking a company or product attribution are dropped. Companies
    /// are ordered by total this-week revenue, products within a company by
    /// their own this-week revenue, both descending with ties in order of
    /// first appearance. Each company's summary row follows its products.
    pub fn aggregate(records: &[MetricsRecord]) -> Vec<PivotRow> {
        let products = Self::group_products(records);

        let mut company_index: HashMap<String, usize> = HashMap::new();
        let mut companies: Vec<CompanyGroup> = Vec::new();
        for product in products {
            let idx = *company_index
                .entry(product.company_attribution.clone())
                .or_insert_with(|| {
                    companies.push(CompanyGroup {
                        name: product.company_attribution.clone(),
                        ..Default::default()
                    });
                    companies.len() - 1
                });
            let group = &mut companies[idx];
            group.totals.add(&product.figures);
            group.products.push(product);
        }

        companies.sort_by(|a, b| {
            b.totals
                .this_week_revenue
                .total_cmp(&a.totals.this_week_revenue)
        });

        let mut rows = Vec::new();
        for mut company in companies {
            company.products.sort_by(|a, b| {
                b.figures
                    .this_week_revenue
                    .total_cmp(&a.figures.this_week_revenue)
            });
            rows.extend(company.products.into_iter().map(PivotRow::Product));
            rows.push(PivotRow::CompanySummary(CompanySummary {
                company_attribution: company.name,
                figures: company.totals,
            }));
        }

        debug!("Pivot: {} rows", rows.len());
        rows
    }

    /// Sum figures per (company, product, release date) in first-seen order.
    fn group_products(records: &[MetricsRecord]) -> Vec<ProductRow> {
        let mut index: HashMap<GroupKey, usize> = HashMap::new();
        let mut products: Vec<ProductRow> = Vec::new();

        for r in records {
            let (Some(company), Some(product)) = (
                non_blank(r.mapped.company_attribution.as_deref()),
                non_blank(r.mapped.product_attribution.as_deref()),
            ) else {
                continue;
            };
            let release_date = non_blank(r.mapped.record.earliest_release_date.as_deref());
            let key: GroupKey = (company.to_string(), product.to_string(), release_date.map(str::to_string));

            let idx = *index.entry(key).or_insert_with(|| {
                products.push(ProductRow {
                    company_attribution: company.to_string(),
                    product_attribution: product.to_string(),
                    release_date: release_date.map(str::to_string),
                    unified_id: None,
                    figures: WeeklyFigures::default(),
                });
                products.len() - 1
            });
            let row = &mut products[idx];
            row.figures.add(&r.figures);
            if row.unified_id.is_none() {
                row.unified_id = r.mapped.record.unified_id.clone();
            }
        }

        products
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
