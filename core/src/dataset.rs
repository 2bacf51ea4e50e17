//! Dataset loading — the boundary with external collaborators.
//!
//! The engine itself never performs I/O; this module parses the codebook
//! JSON and per-entity record files into typed tables before the engine
//! runs. Column typing follows the codebook: numeric columns become
//! numbers, categorical columns keep their codes or labels, and the
//! `date_datetime` column is parsed into a timestamp or left null.
//!
//! Two distinct timestamp policies live at this boundary:
//!   - per-record: an unparseable timestamp becomes null; the aggregation
//!     engine later excludes and tallies that record (never a fallback
//!     date per record);
//!   - per-file: a table whose records carry no valid timestamp at all
//!     can fall back to the project-level reporting range, once, via
//!     [`date_range_or`].

use crate::{
    codebook::{Codebook, FieldKind},
    error::{EngineError, EngineResult},
    record::{Entity, Record, RecordTable, Value, TIMESTAMP_FIELD},
    types::FieldName,
};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use std::path::Path;

/// Load the codebook from its on-disk JSON representation.
pub fn load_codebook(path: &Path) -> EngineResult<Codebook> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading codebook {}: {e}", path.display()))?;
    Codebook::from_json_str(&json)
}

/// Load one entity table from a JSON array of records, typing columns
/// via the codebook.
pub fn load_table(path: &Path, entity: Entity, codebook: &Codebook) -> EngineResult<RecordTable> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {} table {}: {e}", entity, path.display()))?;
    parse_table(&json, entity, codebook)
}

/// Parse one entity table from JSON text.
pub fn parse_table(json: &str, entity: Entity, codebook: &Codebook) -> EngineResult<RecordTable> {
    let raw: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(json)?;

    let mut columns: BTreeSet<FieldName> = BTreeSet::new();
    for row in &raw {
        for key in row.keys() {
            if key != "case_id" {
                columns.insert(key.clone());
            }
        }
    }

    let mut table = RecordTable::new(entity, columns.into_iter().collect());
    let mut malformed: u64 = 0;
    for (index, row) in raw.into_iter().enumerate() {
        let case_id = row
            .get("case_id")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| format!("row-{index}"), ToString::to_string);
        let mut record = Record::new(case_id.clone());
        for (key, value) in row {
            if key == "case_id" {
                continue;
            }
            let typed = type_value(&key, &value, codebook);
            if key == TIMESTAMP_FIELD && typed.is_null() && !value.is_null() {
                // Surfaced per record, never fatal to the load.
                malformed += 1;
                let err = EngineError::MalformedTimestamp {
                    case_id: case_id.clone(),
                    raw: value.to_string(),
                };
                log::warn!("{entity}: {err}");
            }
            record.set(key, typed);
        }
        table.push(record);
    }

    if malformed > 0 {
        log::info!(
            "{entity}: loaded {} records, {malformed} with malformed timestamps",
            table.len(),
        );
    }
    Ok(table)
}

/// Type one raw JSON cell according to its codebook entry. Unknown fields
/// are typed leniently here and rejected later by the aggregation pass.
fn type_value(field: &str, value: &serde_json::Value, codebook: &Codebook) -> Value {
    use serde_json::Value as Json;

    if value.is_null() {
        return Value::Null;
    }

    let kind = codebook.classify(field).map(|e| e.kind).ok();
    match (kind, value) {
        (Some(FieldKind::Timestamp), Json::String(raw)) => {
            parse_timestamp(raw).map_or(Value::Null, Value::Timestamp)
        }
        (Some(FieldKind::Continuous), Json::Number(n)) => {
            n.as_f64().map_or(Value::Null, Value::Real)
        }
        (_, Json::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                n.as_f64().map_or(Value::Null, Value::Real)
            }
        }
        (_, Json::String(s)) => Value::Text(s.clone()),
        (_, Json::Bool(b)) => Value::Int(i64::from(*b)),
        _ => Value::Null,
    }
}

/// Parse the raw timestamp formats the source files carry.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Observed timestamp range of a table, if any record has one.
pub fn date_range(table: &RecordTable) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let mut range: Option<(NaiveDateTime, NaiveDateTime)> = None;
    for record in &table.records {
        if let Some(ts) = record.timestamp() {
            range = Some(match range {
                Some((lo, hi)) => (lo.min(ts), hi.max(ts)),
                None => (ts, ts),
            });
        }
    }
    range
}

/// Whole-file date-range fallback: when a table has no valid timestamps
/// at all, substitute the project-level reporting range. This is a
/// once-per-file policy, distinct from per-record exclusion.
pub fn date_range_or(
    table: &RecordTable,
    fallback_start: NaiveDateTime,
    fallback_end: NaiveDateTime,
) -> (NaiveDateTime, NaiveDateTime) {
    match date_range(table) {
        Some(range) => range,
        None => {
            log::warn!(
                "{}: no valid record dates, using project range {fallback_start} .. {fallback_end}",
                table.entity,
            );
            (fallback_start, fallback_end)
        }
    }
}
