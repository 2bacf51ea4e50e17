//! Summary-table assembler — joins engine outputs with codebook labels
//! and ordering into logical tables for external renderers.
//!
//! This module performs no numeric computation: it labels, orders, and
//! shapes values produced by the aggregation, descriptive, and hypothesis
//! modules. Field order always follows the codebook, never input
//! iteration order, and the "Overall" roll-up row is always last.

use crate::{
    aggregate::AggregationOutcome,
    codebook::Codebook,
    describe::{StatSummary, OVERALL_LEVEL},
    error::EngineResult,
    hypothesis::TestResult,
    types::FieldName,
};
use serde::{Deserialize, Serialize};

/// One rendered-agnostic cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryCell {
    Text(String),
    Count(u64),
    Number(f64),
    /// Undefined statistic — renderers decide how to show absence.
    Missing,
}

impl SummaryCell {
    fn opt(value: Option<f64>) -> Self {
        value.map_or(Self::Missing, Self::Number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub label: String,
    pub cells: Vec<SummaryCell>,
}

/// An ordered, labeled logical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

// ── Grouped descriptive summaries ────────────────────────────────────────────

const STAT_COLUMNS: [&str; 14] = [
    "Count", "Sum", "Min", "Max", "Range", "Mean", "Variance", "Std", "Median", "IQR", "SEM",
    "CI Lower", "CI Upper", "Skew",
];

/// Build the descriptive-summary table for one variable grouped by a
/// codebook factor. Group levels follow the factor's declared category
/// order; levels the codebook does not declare sort after the declared
/// ones, alphabetically; "Overall" is always the trailing row.
pub fn grouped_summary(
    title: &str,
    grouping_field: &str,
    summaries: &[(String, StatSummary)],
    codebook: &Codebook,
) -> EngineResult<SummaryTable> {
    let grouping = codebook.classify(grouping_field)?;

    let level_rank = |level: &str| -> (u8, usize, String) {
        if level == OVERALL_LEVEL {
            return (2, 0, String::new());
        }
        if let Some(categories) = &grouping.categories {
            if let Some(pos) = categories.iter().position(|c| c == level) {
                return (0, pos, String::new());
            }
        }
        (1, 0, level.to_string())
    };

    let mut ordered: Vec<&(String, StatSummary)> = summaries.iter().collect();
    ordered.sort_by_key(|(level, _)| level_rank(level));

    let mut columns = vec![grouping.label.clone()];
    columns.extend(STAT_COLUMNS.iter().map(|c| (*c).to_string()));

    let rows = ordered
        .into_iter()
        .map(|(level, s)| SummaryRow {
            label: level.clone(),
            cells: vec![
                SummaryCell::Text(level.clone()),
                SummaryCell::Count(s.count),
                SummaryCell::opt(s.sum),
                SummaryCell::opt(s.min),
                SummaryCell::opt(s.max),
                SummaryCell::opt(s.range),
                SummaryCell::opt(s.mean),
                SummaryCell::opt(s.var),
                SummaryCell::opt(s.std),
                SummaryCell::opt(s.median),
                SummaryCell::opt(s.iqr),
                SummaryCell::opt(s.sem),
                SummaryCell::opt(s.ci_lower),
                SummaryCell::opt(s.ci_upper),
                SummaryCell::opt(s.skew),
            ],
        })
        .collect();

    Ok(SummaryTable {
        title: title.to_string(),
        columns,
        rows,
    })
}

// ── Time-series aggregate tables ─────────────────────────────────────────────

/// Build the labeled time-series table for one (entity, granularity)
/// aggregation outcome. Fields appear in codebook display order; fields
/// flagged out of summary display are dropped.
pub fn aggregate_table(
    outcome: &AggregationOutcome,
    codebook: &Codebook,
) -> EngineResult<SummaryTable> {
    // Codebook-ordered field selection for this entity.
    let mut fields: Vec<&FieldName> = Vec::new();
    for entry in codebook.time_series_fields(outcome.entity) {
        if entry.summary {
            fields.push(&entry.name);
        }
    }
    let mut ranked: Vec<((u8, u64), &FieldName)> = fields
        .into_iter()
        .map(|name| codebook.display_rank(name).map(|rank| (rank, name)))
        .collect::<EngineResult<_>>()?;
    ranked.sort();

    let mut columns = vec!["Date".to_string(), "Records".to_string()];
    for (_, name) in &ranked {
        let entry = codebook.classify(name)?;
        if entry.stats.sum {
            columns.push(format!("{} (Sum)", entry.label));
        }
        if entry.stats.mean {
            columns.push(format!("{} (Mean)", entry.label));
        }
        if entry.stats.median {
            columns.push(format!("{} (Median)", entry.label));
        }
    }

    let mut rows = Vec::with_capacity(outcome.rows.len());
    for agg_row in &outcome.rows {
        let mut cells = vec![
            SummaryCell::Text(agg_row.bucket.start.to_string()),
            SummaryCell::Count(agg_row.records),
        ];
        for (_, name) in &ranked {
            let entry = codebook.classify(name)?;
            let field = agg_row.fields.get(*name);
            if entry.stats.sum {
                cells.push(SummaryCell::opt(field.and_then(|f| f.sum)));
            }
            if entry.stats.mean {
                cells.push(SummaryCell::opt(field.and_then(|f| f.mean)));
            }
            if entry.stats.median {
                cells.push(SummaryCell::opt(field.and_then(|f| f.median)));
            }
        }
        rows.push(SummaryRow {
            label: agg_row.bucket.start.to_string(),
            cells,
        });
    }

    Ok(SummaryTable {
        title: format!("{} by {}", outcome.entity, outcome.granularity),
        columns,
        rows,
    })
}

// ── Hypothesis-test tables ───────────────────────────────────────────────────

/// Build the test-results table: one row per (variable, test) pair,
/// ordered by codebook display rank then test kind.
pub fn test_table(
    title: &str,
    results: &[(FieldName, TestResult)],
    codebook: &Codebook,
) -> EngineResult<SummaryTable> {
    let mut ranked: Vec<((u8, u64), &FieldName, &TestResult)> = Vec::with_capacity(results.len());
    for (name, result) in results {
        ranked.push((codebook.display_rank(name)?, name, result));
    }
    ranked.sort_by(|a, b| (a.0, a.2.kind).cmp(&(b.0, b.2.kind)));

    let rows = ranked
        .into_iter()
        .map(|(_, name, r)| {
            let label = codebook.classify(name)?.label.clone();
            Ok(SummaryRow {
                label: label.clone(),
                cells: vec![
                    SummaryCell::Text(label),
                    SummaryCell::Text(r.kind.label().to_string()),
                    SummaryCell::Count(r.observations),
                    SummaryCell::Number(r.statistic),
                    SummaryCell::Text(r.p_display.clone()),
                ],
            })
        })
        .collect::<EngineResult<_>>()?;

    Ok(SummaryTable {
        title: title.to_string(),
        columns: vec![
            "Variable".to_string(),
            "Test".to_string(),
            "Observations".to_string(),
            "Statistic".to_string(),
            "p-value".to_string(),
        ],
        rows,
    })
}
