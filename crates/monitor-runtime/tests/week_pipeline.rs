//! End-to-end run of one week from files on disk.

use std::path::Path;
use std::time::Duration;

use monitor_core::layout::{
    DataLayout, COMPANY_ATTRIBUTION_FILE, MARKET_TIERS_FILE, PRODUCT_ATTRIBUTION_FILE,
    REVENUE_COEFFICIENT_FILE,
};
use monitor_core::models::{Annotation, Stage, TargetAge, TargetClass};
use monitor_core::rules::RuleBook;
use monitor_core::settings::{IdLimit, TargetSelection};
use monitor_core::time_utils::WeekRef;
use monitor_data::artifacts::{read_report, TIER_INSTALL_COLUMNS};
use monitor_data::table::Table;
use monitor_runtime::fetch_pool::FetchOptions;
use monitor_runtime::orchestrator::{JoinPlan, WeekPipeline};
use tempfile::TempDir;

const EXTRACT: &str = "\
Unified ID,Unified Name,Unified Publisher Name,Earliest Release Date,Downloads (Absolute),Downloads (PoP Growth),Revenue (Absolute),Revenue (PoP Growth)
aaa111,Alpha Quest,Acme Games,2024-05-01,5000,1000,63000,6300
aaa111,Alpha Quest,Acme Games,2024-05-01,1,1,1,1
bbb222,Beta Rush,Acme Games,2025-06-01,3000,1000,12600,0
ccc333,Gamma,Other Co,2025-03-03,100,0,630,0
ddd444,Delta,Other Co,,2000,500,6300,0
eee555,Epsilon,Other Co,2025-02-02,900,300,63000,0
fff666,epsilon,Other Co,2025-02-02,10,0,63000,0
";

fn write(path: &Path, text: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

fn week() -> WeekRef {
    WeekRef::parse("2026-0119-0125", None).unwrap()
}

fn seed(layout: &DataLayout) {
    let week = week();
    write(&layout.raw_week_dir(&week).join("0119-0125-global.csv"), EXTRACT);
    write(&layout.raw_week_dir(&week).join("notes.txt"), "ignored");
    write(
        &layout.mapping_file(PRODUCT_ATTRIBUTION_FILE),
        "产品名（实时更新中）,产品归属,Unified ID\n\
         Alpha Quest,Alpha,aaa111\nBeta Rush,Beta,bbb222\nGamma,Gamma,ccc333\n\
         Delta,Delta,ddd444\nEpsilon,Epsilon,eee555\n",
    );
    write(
        &layout.mapping_file(COMPANY_ATTRIBUTION_FILE),
        "Unified Publisher Name,公司归属\nAcme Games,Acme\nOther Co,Other\n",
    );
    write(
        &layout.mapping_file(REVENUE_COEFFICIENT_FILE),
        "Unified Name,流水系数\nAlpha Quest,0.63\n",
    );
    write(
        &layout.mapping_file(MARKET_TIERS_FILE),
        "country,T度\nUS,欧美T1\nJP,亚洲T1\nCN,亚洲T1\nBR,T2\n",
    );

    let country_dir = layout.country_data_dir(&week);
    write(
        &country_dir.join("aaa111.json"),
        r#"[{"country":"US","unified_units":100,"unified_revenue":50},
            {"country":"CN","unified_units":7,"unified_revenue":1}]"#,
    );
    write(
        &country_dir.join("ddd444.json"),
        r#"{"data":[{"country":"jp","unified_units":3,"unified_revenue":0}]}"#,
    );
}

fn pipeline(layout: &DataLayout) -> WeekPipeline {
    WeekPipeline::new(layout.clone(), RuleBook::default()).with_join_plan(JoinPlan {
        selection: TargetSelection::Both,
        limit: IdLimit::All,
        options: FetchOptions {
            concurrency: 2,
            retry_delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(5),
            strict: false,
        },
        country_dir: None,
    })
}

fn tier_installs(table: &Table, row: usize) -> Vec<String> {
    TIER_INSTALL_COLUMNS
        .iter()
        .map(|c| {
            let idx = table.find_column(&[*c]).unwrap();
            table.rows[row][idx].clone()
        })
        .collect()
}

#[tokio::test]
async fn test_full_week_run() {
    let tmp = TempDir::new().unwrap();
    let layout = DataLayout::new(tmp.path());
    seed(&layout);

    let summary = pipeline(&layout).run_weeks(&[week()], false).await;
    assert_eq!(summary.succeeded(), 1);
    let outcome = summary.weeks[0].outcome.as_ref().unwrap();

    // Ingest: duplicate id dropped, then the case-variant name sharing a revenue.
    let dedup = outcome.dedup.unwrap();
    assert_eq!((dedup.input, dedup.after_id_phase, dedup.output), (7, 6, 5));

    // Report: Gamma deleted, companies ordered by revenue, summaries last.
    let labels: Vec<(String, Annotation)> = outcome
        .report
        .iter()
        .map(|r| (r.row.company_label() + "/" + r.row.product_attribution(), r.annotation()))
        .collect();
    assert_eq!(
        labels,
        vec![
            ("Acme/Alpha".to_string(), Annotation::Highlighted),
            ("Acme/Beta".to_string(), Annotation::Highlighted),
            ("Acme 汇总/".to_string(), Annotation::Summary),
            ("Other/Epsilon".to_string(), Annotation::Neutral),
            ("Other/Delta".to_string(), Annotation::Highlighted),
            ("Other 汇总/".to_string(), Annotation::Summary),
        ]
    );
    assert_eq!(outcome.report_stats.unwrap().deleted, 1);

    // Report artifact reads back with the same rows.
    let saved = read_report(&layout.report_file(&week())).unwrap();
    assert_eq!(saved.len(), 6);
    assert_eq!(saved[0].row, outcome.report[0].row);

    // Targets.
    let names = |class, age| -> Vec<String> {
        outcome
            .targets
            .set(class, age)
            .iter()
            .map(|t| t.report.row.product_attribution().to_string())
            .collect()
    };
    assert_eq!(names(TargetClass::Strategy, TargetAge::Old), vec!["Alpha", "Delta"]);
    assert_eq!(names(TargetClass::Strategy, TargetAge::New), vec!["Beta"]);
    assert_eq!(names(TargetClass::NonStrategy, TargetAge::New), vec!["Epsilon"]);
    assert!(names(TargetClass::NonStrategy, TargetAge::Old).is_empty());
    for class in [TargetClass::Strategy, TargetClass::NonStrategy] {
        for age in [TargetAge::Old, TargetAge::New] {
            assert!(layout.target_file(&week(), class, age).exists());
        }
    }

    // Tier join: CN counts as T3, unmatched ids keep their row with zeros.
    let join = outcome.join.as_ref().unwrap();
    assert_eq!(join.ids_requested, 4);
    assert!(join.ids_failed.is_empty());
    assert_eq!(join.rows_joined, 4);

    let strategy_old =
        Table::read(&layout.final_join_file(&week(), TargetClass::Strategy, TargetAge::Old)).unwrap();
    assert_eq!(tier_installs(&strategy_old, 0), vec!["0", "100", "0", "7"]);
    assert_eq!(tier_installs(&strategy_old, 1), vec!["3", "0", "0", "0"]);
    assert!(!strategy_old.headers.iter().any(|h| h.contains("revenue") && h.contains("t1")));

    let strategy_new =
        Table::read(&layout.final_join_file(&week(), TargetClass::Strategy, TargetAge::New)).unwrap();
    assert_eq!(tier_installs(&strategy_new, 0), vec!["0", "0", "0", "0"]);
}

#[tokio::test]
async fn test_one_failed_week_does_not_fail_the_run() {
    let tmp = TempDir::new().unwrap();
    let layout = DataLayout::new(tmp.path());
    seed(&layout);

    let missing = WeekRef::parse("2026-0126-0201", None).unwrap();
    let summary = pipeline(&layout).run_weeks(&[week(), missing], true).await;
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.failed(), 1);
    assert!(!summary.all_failed());
    assert_eq!(summary.weeks[1].failed_stage(), Some(Stage::Ingest));
    assert!(summary.weeks[0].outcome.as_ref().unwrap().join.is_none());
}

#[tokio::test]
async fn test_join_reruns_from_saved_targets() {
    let tmp = TempDir::new().unwrap();
    let layout = DataLayout::new(tmp.path());
    seed(&layout);

    let pipeline = pipeline(&layout);
    pipeline.run_weeks(&[week()], true).await;
    assert!(!layout
        .final_join_file(&week(), TargetClass::Strategy, TargetAge::Old)
        .exists());

    let summary = pipeline.join_weeks(&[week()]).await;
    let outcome = summary.weeks[0].outcome.as_ref().unwrap();
    assert_eq!(outcome.targets.total(), 4);
    assert_eq!(outcome.join.as_ref().unwrap().rows_joined, 4);

    let strategy_old =
        Table::read(&layout.final_join_file(&week(), TargetClass::Strategy, TargetAge::Old)).unwrap();
    assert_eq!(tier_installs(&strategy_old, 0), vec!["0", "100", "0", "7"]);
}

#[tokio::test]
async fn test_missing_reference_table_fails_in_mapping() {
    let tmp = TempDir::new().unwrap();
    let layout = DataLayout::new(tmp.path());
    seed(&layout);
    std::fs::remove_file(layout.mapping_file(COMPANY_ATTRIBUTION_FILE)).unwrap();

    let summary = pipeline(&layout).run_weeks(&[week()], true).await;
    assert!(summary.all_failed());
    assert_eq!(summary.weeks[0].failed_stage(), Some(Stage::Mapping));
}

#[tokio::test]
async fn test_classify_reruns_from_saved_report() {
    let tmp = TempDir::new().unwrap();
    let layout = DataLayout::new(tmp.path());
    seed(&layout);

    let pipeline = pipeline(&layout);
    let first = pipeline.run_weeks(&[week()], true).await;
    let expected = first.weeks[0].outcome.as_ref().unwrap().targets.clone();
    let strategy_old = layout.target_file(&week(), TargetClass::Strategy, TargetAge::Old);
    std::fs::remove_file(&strategy_old).unwrap();

    let summary = pipeline.classify_weeks(&[week()]);
    let outcome = summary.weeks[0].outcome.as_ref().unwrap();
    assert_eq!(outcome.report.len(), 6);
    assert!(outcome.join.is_none());
    for class in [TargetClass::Strategy, TargetClass::NonStrategy] {
        for age in [TargetAge::Old, TargetAge::New] {
            let got: Vec<&str> = outcome
                .targets
                .set(class, age)
                .iter()
                .map(|t| t.report.row.product_attribution())
                .collect();
            let want: Vec<&str> = expected
                .set(class, age)
                .iter()
                .map(|t| t.report.row.product_attribution())
                .collect();
            assert_eq!(got, want, "{}_{}", class.as_str(), age.as_str());
        }
    }
    assert!(strategy_old.exists());
}
