//! Summary-table assembly: codebook-driven labels, ordering, and the
//! handling of undefined statistics.

use chrono::NaiveDate;
use octraffic_core::codebook::{Codebook, CodebookEntry, EntityFlags, FieldKind, StatsFlags};
use octraffic_core::hypothesis::{chi2_gof_counts, kruskal_wallis};
use octraffic_core::record::{Entity, Record, RecordTable, Value, TIMESTAMP_FIELD};
use octraffic_core::summary::{aggregate_table, grouped_summary, test_table, SummaryCell};
use octraffic_core::{aggregate, summarize_by, Granularity};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn entry(name: &str, label: &str, kind: FieldKind, order: Option<u32>) -> CodebookEntry {
    CodebookEntry {
        name: name.into(),
        label: label.into(),
        description: String::new(),
        kind,
        order,
        time_series: EntityFlags::default(),
        stats: StatsFlags::default(),
        summary: true,
        categories: None,
    }
}

fn codebook() -> Codebook {
    let crashes = EntityFlags {
        crashes: true,
        ..EntityFlags::default()
    };

    let mut ts = entry(TIMESTAMP_FIELD, "Crash Date and Time", FieldKind::Timestamp, None);
    ts.summary = false;

    // Declared out of alphabetical order on purpose; display order must
    // follow `order`, not field names.
    let mut victims = entry("victim_count", "Victim Count", FieldKind::Count, Some(2));
    victims.time_series = crashes;
    victims.stats = StatsFlags {
        sum: true,
        mean: true,
        median: false,
    };

    let mut parties = entry("party_count", "Party Count", FieldKind::Count, Some(1));
    parties.time_series = crashes;
    parties.stats = StatsFlags {
        sum: true,
        mean: false,
        median: false,
    };

    // Aggregated but flagged out of summary display.
    let mut hidden = entry("internal_score", "Internal Score", FieldKind::Continuous, Some(3));
    hidden.time_series = crashes;
    hidden.stats = StatsFlags {
        sum: false,
        mean: true,
        median: false,
    };
    hidden.summary = false;

    let mut severity = entry("coll_severity", "Collision Severity", FieldKind::Ordinal, Some(4));
    severity.categories = Some(vec![
        "Fatal".into(),
        "Severe Injury".into(),
        "Minor Injury".into(),
    ]);

    Codebook::from_entries(vec![ts, victims, parties, hidden, severity])
}

fn sample_outcome(cb: &Codebook) -> octraffic_core::AggregationOutcome {
    let mut t = RecordTable::new(
        Entity::Crashes,
        vec![
            TIMESTAMP_FIELD.into(),
            "victim_count".into(),
            "party_count".into(),
            "internal_score".into(),
        ],
    );
    for (case, (y, m, d), victims, parties) in [
        ("a", (2021, 1, 10), 2, 2),
        ("b", (2021, 1, 20), 4, 1),
        ("c", (2021, 2, 5), 1, 3),
    ] {
        let ts = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let mut rec = Record::new(case.to_string());
        rec.set(TIMESTAMP_FIELD, Value::Timestamp(ts));
        rec.set("victim_count", Value::Int(victims));
        rec.set("party_count", Value::Int(parties));
        rec.set("internal_score", Value::Real(0.5));
        t.push(rec);
    }
    aggregate(&t, cb, Granularity::Month).unwrap()
}

// ── Grouped summary tables ───────────────────────────────────────────────────

/// Group levels follow the codebook's declared category order; undeclared
/// levels trail alphabetically; Overall is always the last row.
#[test]
fn grouped_summary_orders_levels_by_codebook() {
    let cb = codebook();
    let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
    let groups = [
        "Minor Injury",
        "Fatal",
        "Unlisted Level",
        "Severe Injury",
        "Fatal",
        "Minor Injury",
        "Another Stray",
    ];
    let summaries = summarize_by(&values, &groups).unwrap();
    let table = grouped_summary("By severity", "coll_severity", &summaries, &cb).unwrap();

    let labels: Vec<&str> = table.rows.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "Fatal",
            "Severe Injury",
            "Minor Injury",
            "Another Stray",
            "Unlisted Level",
            "Overall",
        ]
    );
    // First column is the factor label, then the 14 statistics.
    assert_eq!(table.columns.len(), 15);
    assert_eq!(table.columns[0], "Collision Severity");
}

/// Undefined statistics render as Missing cells, never zero.
#[test]
fn undefined_statistics_are_missing_cells() {
    let cb = codebook();
    // Single observation per level: no dispersion statistics exist.
    let summaries = summarize_by(&[3.0], &["Fatal"]).unwrap();
    let table = grouped_summary("By severity", "coll_severity", &summaries, &cb).unwrap();

    let fatal = &table.rows[0];
    // Cells: label, count, sum, min, max, range, mean, var, ...
    assert_eq!(fatal.cells[1], SummaryCell::Count(1));
    assert_eq!(fatal.cells[7], SummaryCell::Missing, "variance must be Missing");
}

// ── Aggregate tables ─────────────────────────────────────────────────────────

/// Column order follows codebook display rank, one column per enabled
/// statistic; summary-excluded fields never appear.
#[test]
fn aggregate_table_follows_codebook_order_and_flags() {
    let cb = codebook();
    let table = aggregate_table(&sample_outcome(&cb), &cb).unwrap();

    assert_eq!(
        table.columns,
        vec![
            "Date",
            "Records",
            "Party Count (Sum)",
            "Victim Count (Sum)",
            "Victim Count (Mean)",
        ]
    );
    assert_eq!(table.rows.len(), 2);

    // January: 2 records, parties 3, victims 6 mean 3.
    let jan = &table.rows[0];
    assert_eq!(jan.cells[0], SummaryCell::Text("2021-01-01".into()));
    assert_eq!(jan.cells[1], SummaryCell::Count(2));
    assert_eq!(jan.cells[2], SummaryCell::Number(3.0));
    assert_eq!(jan.cells[3], SummaryCell::Number(6.0));
    assert_eq!(jan.cells[4], SummaryCell::Number(3.0));
}

// ── Test tables ──────────────────────────────────────────────────────────────

/// Test rows carry the codebook label, the test's display name, and the
/// canonical p string.
#[test]
fn test_table_labels_and_orders_results() {
    let cb = codebook();
    let gof = chi2_gof_counts(&[30, 10, 5, 5], None).unwrap();
    let kw = kruskal_wallis(
        &[1.0, 2.0, 3.0, 10.0, 11.0, 12.0],
        &["a", "a", "a", "b", "b", "b"],
    )
    .unwrap();

    let table = test_table(
        "Tests",
        &[
            ("coll_severity".to_string(), gof.clone()),
            ("victim_count".to_string(), kw),
        ],
        &cb,
    )
    .unwrap();

    // victim_count has order 2, coll_severity order 4.
    assert_eq!(table.rows[0].label, "Victim Count");
    assert_eq!(table.rows[1].label, "Collision Severity");
    assert_eq!(
        table.rows[1].cells[1],
        SummaryCell::Text("Chi-squared Goodness-of-Fit test".into())
    );
    assert_eq!(
        table.rows[1].cells[4],
        SummaryCell::Text(gof.p_display.clone())
    );
}
