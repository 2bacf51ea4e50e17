//! Aggregation engine — codebook-driven time-series aggregation.
//!
//! RULES:
//!   - One pass, no cross-call state: same inputs always produce the same
//!     rows, regardless of input record order.
//!   - Missing / non-numeric values are excluded from a field's aggregate,
//!     not treated as zero; the record still counts toward the bucket's
//!     row count.
//!   - A field with zero contributing values in a bucket is absent from
//!     that bucket's output, never reported as 0.
//!   - Records without a parseable timestamp are dropped and tallied; no
//!     per-record fallback date is ever substituted.

use crate::{
    bucket::{bucket, Granularity, TimeBucket},
    codebook::Codebook,
    describe::{median_sorted, sample_variance},
    error::{EngineError, EngineResult},
    record::{Entity, Record, RecordTable},
    types::FieldName,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-bucket aggregate of one field. Which of sum/mean/median are present
/// follows the field's codebook stats flags; min/max/sd/se accompany every
/// aggregated field regardless of flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAggregate {
    /// Contributing (non-missing) values in this bucket.
    pub n: u64,
    pub sum: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; undefined below two values.
    pub sd: Option<f64>,
    /// Standard error of the mean.
    pub se: Option<f64>,
}

/// One aggregated output row: (entity, granularity, bucket) key plus one
/// aggregate per participating field. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub entity: Entity,
    pub bucket: TimeBucket,
    /// Records assigned to this bucket, including ones with missing
    /// values in individual fields.
    pub records: u64,
    pub fields: BTreeMap<FieldName, FieldAggregate>,
}

/// The result of one (entity, granularity) aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationOutcome {
    pub entity: Entity,
    pub granularity: Granularity,
    /// Rows in ascending bucket-start order.
    pub rows: Vec<AggregatedRow>,
    /// Records dropped for a missing/unparseable timestamp.
    pub excluded: u64,
}

/// Aggregate one entity table at one granularity.
///
/// Every column of the table must have a codebook entry; an unknown column
/// aborts the pass. Zero resulting buckets is an error — it signals an
/// upstream data problem, not a valid empty series.
pub fn aggregate(
    table: &RecordTable,
    codebook: &Codebook,
    granularity: Granularity,
) -> EngineResult<AggregationOutcome> {
    // Fail fast on any column the codebook does not know.
    for column in &table.columns {
        codebook.classify(column)?;
    }

    let fields = codebook.time_series_fields(table.entity);

    let mut buckets: BTreeMap<TimeBucket, Vec<&Record>> = BTreeMap::new();
    let mut excluded: u64 = 0;
    for record in &table.records {
        match record.timestamp() {
            Some(ts) => buckets
                .entry(bucket(ts, granularity))
                .or_default()
                .push(record),
            None => excluded += 1,
        }
    }

    if buckets.is_empty() {
        return Err(EngineError::EmptyAggregation {
            entity: table.entity.to_string(),
            granularity: granularity.to_string(),
        });
    }

    let mut rows = Vec::with_capacity(buckets.len());
    for (key, members) in buckets {
        let mut aggregates: BTreeMap<FieldName, FieldAggregate> = BTreeMap::new();
        for field in &fields {
            if !table.columns.contains(&field.name) {
                continue;
            }
            let mut values: Vec<f64> = members
                .iter()
                .filter_map(|r| r.get(&field.name).and_then(crate::record::Value::as_f64))
                .collect();
            if values.is_empty() {
                // Zero contributing values: the field stays absent.
                continue;
            }
            // Sorting makes the floating-point accumulation independent of
            // input record order, and the median needs it anyway.
            values.sort_by(f64::total_cmp);

            let n = values.len();
            let total: f64 = values.iter().sum();
            let mean = total / n as f64;
            let sd = sample_variance(&values, mean).map(f64::sqrt);
            aggregates.insert(
                field.name.clone(),
                FieldAggregate {
                    n: n as u64,
                    sum: field.stats.sum.then_some(total),
                    mean: field.stats.mean.then_some(mean),
                    median: field.stats.median.then(|| median_sorted(&values)),
                    min: values[0],
                    max: values[n - 1],
                    sd,
                    se: sd.map(|s| s / (n as f64).sqrt()),
                },
            );
        }
        rows.push(AggregatedRow {
            entity: table.entity,
            bucket: key,
            records: members.len() as u64,
            fields: aggregates,
        });
    }

    log::debug!(
        "aggregated {} by {}: {} buckets, {} records, {} excluded",
        table.entity,
        granularity,
        rows.len(),
        table.len(),
        excluded,
    );

    Ok(AggregationOutcome {
        entity: table.entity,
        granularity,
        rows,
        excluded,
    })
}

/// Aggregate one entity table at all five granularities.
pub fn aggregate_all(
    table: &RecordTable,
    codebook: &Codebook,
) -> EngineResult<BTreeMap<Granularity, AggregationOutcome>> {
    let mut out = BTreeMap::new();
    for granularity in Granularity::all() {
        out.insert(*granularity, aggregate(table, codebook, *granularity)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebook::{CodebookEntry, EntityFlags, FieldKind, StatsFlags};
    use crate::record::{Value, TIMESTAMP_FIELD};
    use chrono::NaiveDate;

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

    fn table(rows: &[(&str, Option<(i32, u32, u32)>, Option<i64>)]) -> RecordTable {
        let mut t = RecordTable::new(
            Entity::Crashes,
            vec![TIMESTAMP_FIELD.into(), "victim_count".into()],
        );
        for (case, date, victims) in rows {
            let mut rec = crate::record::Record::new((*case).to_string());
            let ts = match date {
                Some((y, m, d)) => Value::Timestamp(
                    NaiveDate::from_ymd_opt(*y, *m, *d)
                        .unwrap()
                        .and_hms_opt(12, 0, 0)
                        .unwrap(),
                ),
                None => Value::Null,
            };
            rec.set(TIMESTAMP_FIELD, ts);
            rec.set(
                "victim_count",
                victims.map_or(Value::Null, Value::Int),
            );
            t.push(rec);
        }
        t
    }

    #[test]
    fn missing_values_excluded_but_counted_in_rows() {
        let t = table(&[
            ("a", Some((2022, 3, 1)), Some(2)),
            ("b", Some((2022, 3, 9)), None),
            ("c", Some((2022, 3, 20)), Some(4)),
        ]);
        let out = aggregate(&t, &codebook(), Granularity::Month).unwrap();
        assert_eq!(out.rows.len(), 1);
        let row = &out.rows[0];
        assert_eq!(row.records, 3);
        let agg = &row.fields["victim_count"];
        assert_eq!(agg.n, 2);
        assert_eq!(agg.sum, Some(6.0));
        assert_eq!(agg.mean, Some(3.0));
    }

    #[test]
    fn malformed_timestamps_are_dropped_and_tallied() {
        let t = table(&[
            ("a", Some((2022, 3, 1)), Some(2)),
            ("b", None, Some(5)),
        ]);
        let out = aggregate(&t, &codebook(), Granularity::Year).unwrap();
        assert_eq!(out.excluded, 1);
        assert_eq!(out.rows[0].records, 1);
    }

    #[test]
    fn all_excluded_is_empty_aggregation() {
        let t = table(&[("a", None, Some(2))]);
        let err = aggregate(&t, &codebook(), Granularity::Day).unwrap_err();
        assert!(matches!(err, EngineError::EmptyAggregation { .. }));
    }

    #[test]
    fn unknown_column_aborts() {
        let mut t = table(&[("a", Some((2022, 3, 1)), Some(2))]);
        t.columns.push("mystery_field".into());
        let err = aggregate(&t, &codebook(), Granularity::Year).unwrap_err();
        assert!(matches!(err, EngineError::UnknownField { .. }));
    }

    #[test]
    fn field_absent_when_no_values_in_bucket() {
        let t = table(&[
            ("a", Some((2021, 1, 5)), Some(3)),
            ("b", Some((2022, 1, 5)), None),
        ]);
        let out = aggregate(&t, &codebook(), Granularity::Year).unwrap();
        assert_eq!(out.rows.len(), 2);
        assert!(out.rows[0].fields.contains_key("victim_count"));
        assert!(!out.rows[1].fields.contains_key("victim_count"));
    }
}
