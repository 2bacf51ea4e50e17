//! ts-runner: headless time-series and statistics runner.
//!
//! Usage:
//!   ts-runner --synthetic --seed 42 --cases 2000 --db results.db
//!   ts-runner --codebook cb.json --data-dir ./data --db results.db

use anyhow::{Context, Result};
use octraffic_core::{
    dataset,
    describe::summarize_by,
    engine::TsEngine,
    hypothesis::{chi2_gof, chi2_independence, kruskal_wallis},
    record::{Entity, RecordTable, Value},
    store::TsStore,
    summary::{grouped_summary, test_table, SummaryCell, SummaryTable},
    synthetic::{demo_codebook, synthetic_tables},
    Codebook,
};
use std::env;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let synthetic = args.iter().any(|a| a == "--synthetic");
    let seed = parse_arg(&args, "--seed", 42u64);
    let cases = parse_arg(&args, "--cases", 1000usize);
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let run_id = str_arg(&args, "--run-id")
        .map_or_else(|| format!("run-{seed}"), ToString::to_string);

    let (codebook, tables) = if synthetic {
        log::info!("generating synthetic dataset: seed={seed} cases={cases}");
        (demo_codebook(), synthetic_tables(seed, cases))
    } else {
        let cb_path = str_arg(&args, "--codebook").context("--codebook is required")?;
        let data_dir = str_arg(&args, "--data-dir").context("--data-dir is required")?;
        let codebook = dataset::load_codebook(Path::new(cb_path))?;
        let mut tables = Vec::new();
        for entity in Entity::all() {
            let path = Path::new(data_dir).join(format!("{entity}.json"));
            if path.exists() {
                tables.push(dataset::load_table(&path, *entity, &codebook)?);
            } else {
                log::warn!("{entity}: no input file at {}", path.display());
            }
        }
        (codebook, tables)
    };

    println!("ts-runner");
    println!("  run_id: {run_id}");
    println!("  tables: {}", tables.len());
    println!("  db:     {db}");
    println!();

    // Aggregation: all entities × all five granularities.
    let engine = TsEngine::new(codebook);
    let bundle = engine.run(&tables)?;

    let store = TsStore::open(db)?;
    store.migrate()?;
    for outcome in bundle.iter() {
        store.save_outcome(&run_id, outcome)?;
        println!(
            "  {:>10} by {:<7} {:>6} buckets  ({} excluded)",
            outcome.entity.to_string(),
            outcome.granularity.to_string(),
            outcome.rows.len(),
            outcome.excluded,
        );
    }
    println!();
    println!("records excluded for malformed timestamps: {}", bundle.total_excluded());
    println!();

    // Report statistics over the crashes table, severity-grouped.
    if let Some(crashes) = tables.iter().find(|t| t.entity == Entity::Crashes) {
        run_reports(&run_id, crashes, engine.codebook(), &store)?;
    }

    Ok(())
}

/// The report block the original builds for its severity tables: grouped
/// descriptive statistics plus the three hypothesis tests.
fn run_reports(
    run_id: &str,
    crashes: &RecordTable,
    codebook: &Codebook,
    store: &TsStore,
) -> Result<()> {
    let Ok(severity) = codebook.classify("coll_severity") else {
        log::warn!("codebook has no coll_severity entry, skipping report tables");
        return Ok(());
    };

    // Paired (victim_count, severity label) series.
    let mut values = Vec::new();
    let mut labels: Vec<String> = Vec::new();
    for record in &crashes.records {
        let count = record.get("victim_count").and_then(Value::as_f64);
        let code = record.get("coll_severity").and_then(Value::as_f64);
        if let (Some(count), Some(code)) = (count, code) {
            let label = severity
                .category_label(code as usize)
                .unwrap_or("Unknown")
                .to_string();
            values.push(count);
            labels.push(label);
        }
    }
    let groups: Vec<&str> = labels.iter().map(String::as_str).collect();

    let summaries = summarize_by(&values, &groups)?;
    store.save_stat_summaries(run_id, "victim_count", &summaries)?;
    print_table(&grouped_summary(
        "Victim count by collision severity",
        "coll_severity",
        &summaries,
        codebook,
    )?);

    // Hypothesis tests.
    let coll_types: Vec<String> = crashes
        .records
        .iter()
        .filter_map(|r| match r.get("type_of_coll") {
            Some(Value::Text(t)) => Some(t.clone()),
            _ => None,
        })
        .collect();
    let coll_type_refs: Vec<&str> = coll_types.iter().map(String::as_str).collect();

    // The independence crosstab pairs severity with the hit-and-run
    // split; records missing either column drop from both series.
    let mut severity_for_split: Vec<&str> = Vec::new();
    let mut hit_and_run: Vec<&str> = Vec::new();
    for record in &crashes.records {
        let code = record.get("coll_severity").and_then(Value::as_f64);
        let flag = record.get("hit_and_run").and_then(Value::as_f64);
        if let (Some(code), Some(flag)) = (code, flag) {
            severity_for_split
                .push(severity.category_label(code as usize).unwrap_or("Unknown"));
            hit_and_run.push(if flag > 0.0 { "yes" } else { "no" });
        }
    }

    let gof = chi2_gof(&coll_type_refs)?;
    let indep = chi2_independence(&severity_for_split, &hit_and_run)?;
    let kw = kruskal_wallis(&values, &groups)?;

    store.save_test_result(run_id, "type_of_coll", &gof)?;
    store.save_test_result(run_id, "coll_severity", &indep)?;
    store.save_test_result(run_id, "victim_count", &kw)?;

    print_table(&test_table(
        "Hypothesis tests",
        &[
            ("type_of_coll".to_string(), gof),
            ("coll_severity".to_string(), indep),
            ("victim_count".to_string(), kw),
        ],
        codebook,
    )?);

    Ok(())
}

/// Plain-text rendering of a logical table. Presentation only — the
/// engine never formats values.
fn print_table(table: &SummaryTable) {
    println!("== {} ==", table.title);
    println!("{}", table.columns.join(" | "));
    for row in &table.rows {
        let cells: Vec<String> = row
            .cells
            .iter()
            .map(|cell| match cell {
                SummaryCell::Text(t) => t.clone(),
                SummaryCell::Count(n) => n.to_string(),
                SummaryCell::Number(v) => format!("{v:.3}"),
                SummaryCell::Missing => "—".to_string(),
            })
            .collect();
        println!("{}", cells.join(" | "));
    }
    println!();
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], name: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == name)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}
