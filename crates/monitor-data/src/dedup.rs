//! Two-phase deduplication of merged extracts.
//!
//! Phase A keeps the first row per non-empty unified id. Phase B targets
//! rows duplicated across market extracts under different ids: among rows
//! sharing an exact revenue figure, only the highest-revenue row per
//! case-insensitive name survives. Survivors keep their input order.

use std::collections::{HashMap, HashSet};

use monitor_core::error::{MonitorError, Result};
use monitor_core::models::{DedupedRecord, RawRecord, Stage};
use tracing::debug;

use crate::reader::ExtractBatch;

/// Row counts after each phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub input: usize,
    pub after_id_phase: usize,
    pub output: usize,
}

/// Phase A: first occurrence per unified id; rows without an id all pass.
pub fn dedup_by_id(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    records
        .into_iter()
        .filter(|r| match &r.unified_id {
            Some(id) => seen.insert(id.trim().to_string()),
            None => true,
        })
        .collect()
}

/// Phase B: revenue/name deduplication.
pub fn dedup_by_revenue_and_name(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let mut revenue_counts: HashMap<u64, usize> = HashMap::new();
    for r in &records {
        *revenue_counts.entry(revenue_key(r.revenue_absolute)).or_default() += 1;
    }
    let is_shared = |r: &RawRecord| revenue_counts[&revenue_key(r.revenue_absolute)] > 1;

    // Shared-revenue rows, highest revenue first; ties keep input order.
    let mut shared: Vec<usize> = (0..records.len()).filter(|&i| is_shared(&records[i])).collect();
    shared.sort_by(|&a, &b| {
        records[b]
            .revenue_absolute
            .total_cmp(&records[a].revenue_absolute)
    });

    let mut names: HashSet<String> = HashSet::new();
    let keep_shared: HashSet<usize> = shared
        .into_iter()
        .filter(|&i| names.insert(records[i].unified_name.to_lowercase()))
        .collect();

    records
        .into_iter()
        .enumerate()
        .filter(|(i, r)| !is_shared(r) || keep_shared.contains(i))
        .map(|(_, r)| r)
        .collect()
}

/// Bit pattern used to compare revenue figures for exact equality.
fn revenue_key(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

/// The ingest stage: deduplicate a week's merged extracts.
pub struct Ingestor;

impl Ingestor {
    /// Run both phases over `batch`.
    ///
    /// Phase B needs the name and revenue columns; their absence is a schema
    /// error rather than a silent pass over blank values.
    pub fn deduplicate(batch: ExtractBatch) -> Result<(Vec<DedupedRecord>, DedupStats)> {
        if !batch.columns.unified_name {
            return Err(MonitorError::Schema {
                stage: Stage::Ingest,
                column: "Unified Name".to_string(),
            });
        }
        if !batch.columns.revenue_absolute {
            return Err(MonitorError::Schema {
                stage: Stage::Ingest,
                column: "Revenue (Absolute)".to_string(),
            });
        }

        let input = batch.records.len();
        let after_a = dedup_by_id(batch.records);
        let after_id_phase = after_a.len();
        let output = dedup_by_revenue_and_name(after_a);

        let stats = DedupStats {
            input,
            after_id_phase,
            output: output.len(),
        };
        debug!(
            "Dedup: {} rows -> {} after id phase -> {} after revenue/name phase",
            stats.input, stats.after_id_phase, stats.output
        );
        Ok((output, stats))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::models::ExtractColumns;
    use proptest::prelude::*;

    fn rec(id: Option<&str>, name: &str, revenue: f64) -> RawRecord {
        RawRecord {
            unified_id: id.map(str::to_string),
            unified_name: name.to_string(),
            publisher_name: String::new(),
            downloads_absolute: 0.0,
            downloads_pop_change: 0.0,
            revenue_absolute: revenue,
            revenue_pop_change: 0.0,
            earliest_release_date: None,
        }
    }

    fn batch(records: Vec<RawRecord>) -> ExtractBatch {
        ExtractBatch {
            records,
            columns: ExtractColumns::all(),
            files: 1,
        }
    }

    // ── Phase A ──────────────────────────────────────────────────────────────

    #[test]
    fn test_id_phase_keeps_first_and_all_idless() {
        let out = dedup_by_id(vec![
            rec(Some("a"), "first", 1.0),
            rec(None, "x", 2.0),
            rec(Some("a"), "second", 3.0),
            rec(None, "y", 4.0),
            rec(Some("b"), "third", 5.0),
        ]);
        let names: Vec<&str> = out.iter().map(|r| r.unified_name.as_str()).collect();
        assert_eq!(names, vec!["first", "x", "y", "third"]);
    }

    // ── Phase B ──────────────────────────────────────────────────────────────

    #[test]
    fn test_shared_revenue_same_name_collapses() {
        // Two rows share revenue 50000 and name (case-insensitive).
        let out = dedup_by_revenue_and_name(vec![
            rec(Some("x1"), "Alpha", 50_000.0),
            rec(Some("x2"), "alpha", 50_000.0),
            rec(Some("y"), "Beta", 10.0),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].unified_id.as_deref(), Some("x1"));
        assert_eq!(out[1].unified_name, "Beta");
    }

    #[test]
    fn test_shared_revenue_different_names_survive() {
        let out = dedup_by_revenue_and_name(vec![
            rec(Some("x1"), "Alpha", 7.0),
            rec(Some("x2"), "Gamma", 7.0),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_unique_revenue_rows_pass_even_with_same_name() {
        let out = dedup_by_revenue_and_name(vec![
            rec(Some("x1"), "Alpha", 1.0),
            rec(Some("x2"), "Alpha", 2.0),
        ]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_name_dedup_spans_the_shared_partition() {
        // "alpha" at 9 (shared with Z) outranks "Alpha" at 5 (shared with Y).
        let out = dedup_by_revenue_and_name(vec![
            rec(Some("1"), "Alpha", 5.0),
            rec(Some("2"), "Y", 5.0),
            rec(Some("3"), "alpha", 9.0),
            rec(Some("4"), "Z", 9.0),
        ]);
        let ids: Vec<&str> = out.iter().filter_map(|r| r.unified_id.as_deref()).collect();
        assert_eq!(ids, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_zero_revenue_signs_compare_equal() {
        let out = dedup_by_revenue_and_name(vec![
            rec(Some("1"), "A", 0.0),
            rec(Some("2"), "a", -0.0),
        ]);
        assert_eq!(out.len(), 1);
    }

    // ── Ingestor ─────────────────────────────────────────────────────────────

    #[test]
    fn test_survivors_keep_input_order_across_phases() {
        // Id-less rows are not moved behind id rows, and shared-revenue
        // survivors are not moved behind unique-revenue rows, so the
        // aggregator sees "a" as the first id of product P.
        let (out, _) = Ingestor::deduplicate(batch(vec![
            rec(None, "P", 3.0),
            rec(Some("a"), "P", 5.0),
            rec(Some("q"), "Q", 5.0),
            rec(Some("b"), "P", 7.0),
            rec(Some("a"), "P dup", 9.0),
        ]))
        .unwrap();
        let ids: Vec<Option<&str>> = out.iter().map(|r| r.unified_id.as_deref()).collect();
        assert_eq!(ids, vec![None, Some("a"), Some("q"), Some("b")]);
    }

    #[test]
    fn test_ingestor_stats() {
        let (out, stats) = Ingestor::deduplicate(batch(vec![
            rec(Some("x1"), "Alpha", 50_000.0),
            rec(Some("x1"), "Alpha", 50_000.0),
            rec(Some("x2"), "ALPHA", 50_000.0),
        ]))
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            stats,
            DedupStats {
                input: 3,
                after_id_phase: 2,
                output: 1
            }
        );
    }

    #[test]
    fn test_ingestor_requires_revenue_column() {
        let mut b = batch(vec![]);
        b.columns.revenue_absolute = false;
        let err = Ingestor::deduplicate(b).unwrap_err();
        assert!(matches!(err, MonitorError::Schema { stage: Stage::Ingest, ref column } if column == "Revenue (Absolute)"));
    }

    #[test]
    fn test_ingestor_requires_name_column() {
        let mut b = batch(vec![]);
        b.columns.unified_name = false;
        assert!(Ingestor::deduplicate(b).is_err());
    }

    // ── Properties ───────────────────────────────────────────────────────────

    fn arb_record() -> impl Strategy<Value = RawRecord> {
        (
            proptest::option::of(prop::sample::select(vec!["a", "b", "c", "d"])),
            prop::sample::select(vec!["Alpha", "alpha", "Beta", "GAMMA", "gamma"]),
            prop::sample::select(vec![0.0, 10.0, 20.0, 30.0, 40.0]),
        )
            .prop_map(|(id, name, revenue)| rec(id, name, revenue))
    }

    proptest! {
        #[test]
        fn prop_dedup_is_idempotent(records in proptest::collection::vec(arb_record(), 0..30)) {
            let once = dedup_by_revenue_and_name(dedup_by_id(records));
            let twice = dedup_by_revenue_and_name(dedup_by_id(once.clone()));
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_ids_unique_after_dedup(records in proptest::collection::vec(arb_record(), 0..30)) {
            let out = dedup_by_revenue_and_name(dedup_by_id(records));
            let ids: Vec<&String> = out.iter().filter_map(|r| r.unified_id.as_ref()).collect();
            let unique: HashSet<&String> = ids.iter().copied().collect();
            prop_assert_eq!(ids.len(), unique.len());
        }

        #[test]
        fn prop_no_shared_revenue_name_pair_survives(records in proptest::collection::vec(arb_record(), 0..30)) {
            let out = dedup_by_revenue_and_name(dedup_by_id(records));
            for (i, a) in out.iter().enumerate() {
                for b in out.iter().skip(i + 1) {
                    prop_assert!(
                        !(revenue_key(a.revenue_absolute) == revenue_key(b.revenue_absolute)
                            && a.unified_name.to_lowercase() == b.unified_name.to_lowercase())
                    );
                }
            }
        }

        #[test]
        fn prop_output_is_subsequence_of_input(records in proptest::collection::vec(arb_record(), 0..30)) {
            let out = dedup_by_revenue_and_name(dedup_by_id(records.clone()));
            let mut it = records.iter();
            for r in &out {
                prop_assert!(it.any(|x| x == r));
            }
        }
    }
}
