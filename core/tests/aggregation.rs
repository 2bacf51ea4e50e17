//! Aggregation invariants: order independence, additivity across
//! granularities, and exclusion accounting.

use chrono::NaiveDate;
use octraffic_core::codebook::{Codebook, CodebookEntry, EntityFlags, FieldKind, StatsFlags};
use octraffic_core::record::{Entity, Record, RecordTable, Value, TIMESTAMP_FIELD};
use octraffic_core::{aggregate, Granularity};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn codebook() -> Codebook {
    Codebook::from_entries(vec![
        CodebookEntry {
            name: TIMESTAMP_FIELD.into(),
            label: "Crash Date and Time".into(),
            description: String::new(),
            kind: FieldKind::Timestamp,
            order: None,
            time_series: EntityFlags::default(),
            stats: StatsFlags::default(),
            summary: false,
            categories: None,
        },
        CodebookEntry {
            name: "victim_count".into(),
            label: "Victim Count".into(),
            description: String::new(),
            kind: FieldKind::Count,
            order: Some(1),
            time_series: EntityFlags {
                crashes: true,
                ..EntityFlags::default()
            },
            stats: StatsFlags {
                sum: true,
                mean: true,
                median: true,
            },
            summary: true,
            categories: None,
        },
    ])
}

fn crash(case: &str, date: (i32, u32, u32), hour: u32, victims: i64) -> Record {
    let ts = NaiveDate::from_ymd_opt(date.0, date.1, date.2)
        .unwrap()
        .and_hms_opt(hour, 15, 0)
        .unwrap();
    let mut rec = Record::new(case.to_string());
    rec.set(TIMESTAMP_FIELD, Value::Timestamp(ts));
    rec.set("victim_count", Value::Int(victims));
    rec
}

fn table(records: Vec<Record>) -> RecordTable {
    let mut t = RecordTable::new(
        Entity::Crashes,
        vec![TIMESTAMP_FIELD.into(), "victim_count".into()],
    );
    for rec in records {
        t.push(rec);
    }
    t
}

fn sample() -> RecordTable {
    table(vec![
        crash("a", (2021, 1, 4), 8, 2),
        crash("b", (2021, 1, 4), 17, 0),
        crash("c", (2021, 2, 10), 9, 3),
        crash("d", (2021, 6, 30), 22, 1),
        crash("e", (2022, 1, 1), 3, 4),
        crash("f", (2022, 11, 15), 12, 2),
    ])
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Reordering input records must not change a single output row.
#[test]
fn aggregation_is_input_order_invariant() {
    let cb = codebook();
    let forward = sample();
    let mut reversed = sample();
    reversed.records.reverse();

    for granularity in Granularity::all() {
        let a = aggregate(&forward, &cb, *granularity).unwrap();
        let b = aggregate(&reversed, &cb, *granularity).unwrap();
        assert_eq!(a, b, "order changed the {granularity} aggregation");
    }
}

/// Day buckets must roll up to the year totals: record counts and field
/// sums are additive over disjoint partitions of the same records.
#[test]
fn day_buckets_roll_up_to_year_totals() {
    let cb = codebook();
    let t = sample();

    let days = aggregate(&t, &cb, Granularity::Day).unwrap();
    let years = aggregate(&t, &cb, Granularity::Year).unwrap();

    let day_records: u64 = days.rows.iter().map(|r| r.records).sum();
    let year_records: u64 = years.rows.iter().map(|r| r.records).sum();
    assert_eq!(day_records, year_records);
    assert_eq!(year_records, 6);

    let day_sum: f64 = days
        .rows
        .iter()
        .filter_map(|r| r.fields.get("victim_count").and_then(|f| f.sum))
        .sum();
    let year_sum: f64 = years
        .rows
        .iter()
        .filter_map(|r| r.fields.get("victim_count").and_then(|f| f.sum))
        .sum();
    assert!((day_sum - year_sum).abs() < 1e-9);
    assert!((year_sum - 12.0).abs() < 1e-9);
}

/// Buckets come back in ascending start order at every granularity.
#[test]
fn rows_are_sorted_by_bucket_start() {
    let cb = codebook();
    let t = sample();
    for granularity in Granularity::all() {
        let out = aggregate(&t, &cb, *granularity).unwrap();
        let starts: Vec<_> = out.rows.iter().map(|r| r.bucket.start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted, "{granularity} rows out of order");
    }
}

/// Records in the same ISO week but different hours land in one bucket.
#[test]
fn week_bucket_groups_across_days() {
    let cb = codebook();
    // Mon 2021-01-04 and Sun 2021-01-10 share ISO week starting 2021-01-04.
    let t = table(vec![
        crash("a", (2021, 1, 4), 1, 1),
        crash("b", (2021, 1, 10), 23, 1),
        crash("c", (2021, 1, 11), 0, 1),
    ]);
    let out = aggregate(&t, &cb, Granularity::Week).unwrap();
    assert_eq!(out.rows.len(), 2);
    assert_eq!(
        out.rows[0].bucket.start,
        NaiveDate::from_ymd_opt(2021, 1, 4).unwrap()
    );
    assert_eq!(out.rows[0].records, 2);
}

/// A record with a null timestamp is tallied, never silently dropped or
/// assigned a fallback bucket.
#[test]
fn null_timestamps_are_tallied_at_every_granularity() {
    let cb = codebook();
    let mut t = sample();
    let mut rec = Record::new("bad".to_string());
    rec.set(TIMESTAMP_FIELD, Value::Null);
    rec.set("victim_count", Value::Int(9));
    t.push(rec);

    for granularity in Granularity::all() {
        let out = aggregate(&t, &cb, *granularity).unwrap();
        assert_eq!(out.excluded, 1);
        let counted: u64 = out.rows.iter().map(|r| r.records).sum();
        assert_eq!(counted, 6);
        // The excluded record's value must not leak into any sum.
        let total: f64 = out
            .rows
            .iter()
            .filter_map(|r| r.fields.get("victim_count").and_then(|f| f.sum))
            .sum();
        assert!((total - 12.0).abs() < 1e-9);
    }
}
