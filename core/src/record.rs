//! Raw record model — in-memory rows for the four entity tables.
//!
//! Tables arrive already typed from the external loader (`dataset`):
//! numeric columns hold numbers, categorical columns hold codes, and the
//! `date_datetime` column holds a parsed timestamp or null. The engine
//! never sees raw strings for typed columns.

use crate::types::{CaseId, FieldName};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column name carrying the record timestamp used for bucketing.
pub const TIMESTAMP_FIELD: &str = "date_datetime";

/// The four entity tables of the collision dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Crashes,
    Parties,
    Victims,
    Collisions,
}

impl Entity {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Crashes => "crashes",
            Self::Parties => "parties",
            Self::Victims => "victims",
            Self::Collisions => "collisions",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "crashes" => Some(Self::Crashes),
            "parties" => Some(Self::Parties),
            "victims" => Some(Self::Victims),
            "collisions" => Some(Self::Collisions),
            _ => None,
        }
    }

    pub const fn all() -> &'static [Self] {
        &[Self::Crashes, Self::Parties, Self::Victims, Self::Collisions]
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Numeric view used by the aggregators. Null and text are excluded
    /// from numeric statistics, never coerced to zero.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            Self::Null | Self::Text(_) | Self::Timestamp(_) => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// One row of an entity table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub case_id: CaseId,
    values: BTreeMap<FieldName, Value>,
}

impl Record {
    pub fn new(case_id: CaseId) -> Self {
        Self {
            case_id,
            values: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, field: impl Into<FieldName>, value: Value) {
        self.values.insert(field.into(), value);
    }

    pub fn with(mut self, field: impl Into<FieldName>, value: Value) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// The bucketing timestamp, if present and parsed.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.get(TIMESTAMP_FIELD).and_then(Value::as_timestamp)
    }
}

/// An in-memory entity table: named columns × typed rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTable {
    pub entity: Entity,
    pub columns: Vec<FieldName>,
    pub records: Vec<Record>,
}

impl RecordTable {
    pub fn new(entity: Entity, columns: Vec<FieldName>) -> Self {
        Self {
            entity,
            columns,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The numeric series of one column, missing values excluded.
    pub fn numeric_column(&self, field: &str) -> Vec<f64> {
        self.records
            .iter()
            .filter_map(|r| r.get(field).and_then(Value::as_f64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn null_is_excluded_from_numeric_view() {
        assert_eq!(Value::Null.as_f64(), None);
        assert_eq!(Value::Int(4).as_f64(), Some(4.0));
        assert_eq!(Value::Real(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::Text("N".into()).as_f64(), None);
    }

    #[test]
    fn record_timestamp_reads_date_datetime() {
        let ts = NaiveDate::from_ymd_opt(2021, 6, 15)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let rec = Record::new("case-1".into()).with(TIMESTAMP_FIELD, Value::Timestamp(ts));
        assert_eq!(rec.timestamp(), Some(ts));

        let rec = Record::new("case-2".into()).with(TIMESTAMP_FIELD, Value::Null);
        assert_eq!(rec.timestamp(), None);
    }
}
