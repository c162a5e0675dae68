mod bootstrap;

use anyhow::{bail, Result};
use chrono::Datelike;
use clap::Parser;
use monitor_core::formatting::{format_change, format_number, render_table};
use monitor_core::layout::DataLayout;
use monitor_core::models::ReportRow;
use monitor_core::rules::RuleBook;
use monitor_core::settings::{Command, Settings};
use monitor_runtime::orchestrator::{JoinPlan, RunSummary, WeekOutcome, WeekPipeline};

/// Report rows shown per week on the console.
const CONSOLE_ROWS: usize = 15;
const MAX_CELL_WIDTH: usize = 28;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();

    bootstrap::setup_logging(settings.effective_log_level(), settings.log_file.as_deref())?;
    tracing::info!("Market Monitor v{} starting", env!("CARGO_PKG_VERSION"));

    let layout = DataLayout::new(settings.resolve_data_root()?);
    bootstrap::ensure_directories(&layout)?;
    tracing::info!("Data root: {}", layout.root().display());

    let rules_path = settings
        .rules
        .clone()
        .unwrap_or_else(|| layout.rules_file());
    let rules = RuleBook::load_or_default(&rules_path);

    let weeks = settings
        .week_args()
        .resolve(chrono::Local::now().year())?;

    let mut pipeline = WeekPipeline::new(layout, rules);
    if let Some(fetch) = settings.fetch_args() {
        pipeline = pipeline.with_join_plan(JoinPlan::from(fetch));
    }

    let summary = match &settings.command {
        Command::Run(args) => {
            tracing::info!(
                "Running {} week(s), old/new cutoff {}",
                weeks.len(),
                args.old_new_cutoff
            );
            pipeline
                .with_cutoff(args.old_new_cutoff)
                .run_weeks(&weeks, args.skip_join)
                .await
        }
        Command::Join(_) => {
            tracing::info!("Re-running tier join for {} week(s)", weeks.len());
            pipeline.join_weeks(&weeks).await
        }
        Command::Classify(args) => {
            tracing::info!(
                "Re-classifying {} week(s) from saved reports, old/new cutoff {}",
                weeks.len(),
                args.old_new_cutoff
            );
            pipeline.with_cutoff(args.old_new_cutoff).classify_weeks(&weeks)
        }
    };

    print_summary(&summary);

    if summary.all_failed() {
        bail!("all {} week(s) failed", summary.weeks.len());
    }
    Ok(())
}

// ── Console output ─────────────────────────────────────────────────────────────

fn print_summary(summary: &RunSummary) {
    for result in &summary.weeks {
        match &result.outcome {
            Ok(outcome) => print_week(&result.week.to_string(), outcome),
            Err(e) => println!("\n{}: FAILED ({})", result.week, e),
        }
    }
    println!(
        "\n{} week(s) succeeded, {} failed",
        summary.succeeded(),
        summary.failed()
    );
}

fn print_week(label: &str, outcome: &WeekOutcome) {
    println!("\n== {} ==", label);

    if let Some(stats) = &outcome.dedup {
        println!(
            "Ingest: {} rows, {} after id dedup, {} after name dedup",
            stats.input, stats.after_id_phase, stats.output
        );
    }
    if let Some(stats) = &outcome.report_stats {
        println!(
            "Report: {} rows kept, {} deleted, {} struck, {} highlighted",
            outcome.report.len(),
            stats.deleted,
            stats.struck,
            stats.highlighted
        );
    }

    if !outcome.report.is_empty() {
        let rows: Vec<Vec<String>> = outcome
            .report
            .iter()
            .take(CONSOLE_ROWS)
            .map(report_cells)
            .collect();
        print!(
            "{}",
            render_table(
                &["company", "product", "installs", "Δ installs", "revenue", "Δ revenue", "mark"],
                &rows,
                MAX_CELL_WIDTH,
            )
        );
        if outcome.report.len() > CONSOLE_ROWS {
            println!("… {} more rows", outcome.report.len() - CONSOLE_ROWS);
        }
    }

    let sets: Vec<String> = outcome
        .targets
        .labeled()
        .iter()
        .map(|(class, age, rows)| format!("{}_{}={}", class.as_str(), age.as_str(), rows.len()))
        .collect();
    println!("Targets: {}", sets.join(", "));

    if let Some(join) = &outcome.join {
        println!(
            "Join: {} ids requested, {} fetched, {} failed, {} rows written",
            join.ids_requested,
            join.ids_fetched,
            join.ids_failed.len(),
            join.rows_joined
        );
    }
    if !outcome.warnings.is_empty() {
        println!("{} data-quality warning(s), see log", outcome.warnings.len());
    }
}

fn report_cells(row: &ReportRow) -> Vec<String> {
    let figures = row.figures();
    vec![
        row.row.company_label(),
        row.row.product_attribution().to_string(),
        format_number(figures.this_week_installs, 0),
        format_change(row.install_change),
        format_number(figures.this_week_revenue, 0),
        format_change(row.revenue_change),
        row.annotation().as_str().to_string(),
    ]
}
