//! Hypothesis tests — chi-square goodness-of-fit, chi-square independence,
//! and the Kruskal-Wallis rank-sum test, with one shared p-value display
//! policy.
//!
//! Degenerate inputs (fewer than two non-empty groups, a single-level
//! factor, all observations identical) fail with `TestNotApplicable`;
//! the module never returns a placeholder statistic.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::collections::BTreeMap;

/// The closed set of supported tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    ChiSquareGof,
    ChiSquareIndependence,
    KruskalWallis,
}

impl TestKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ChiSquareGof => "Chi-squared Goodness-of-Fit test",
            Self::ChiSquareIndependence => "Chi-squared test of independence",
            Self::KruskalWallis => "Kruskal-Wallis H-test",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ChiSquareGof => "chi2_gof",
            Self::ChiSquareIndependence => "chi2_independence",
            Self::KruskalWallis => "kruskal_wallis",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "chi2_gof" => Some(Self::ChiSquareGof),
            "chi2_independence" => Some(Self::ChiSquareIndependence),
            "kruskal_wallis" => Some(Self::KruskalWallis),
            _ => None,
        }
    }
}

/// Outcome of one test run. Carries both the raw p-value and its display
/// string; consumers must never re-derive the string with different
/// rounding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub kind: TestKind,
    pub observations: u64,
    pub statistic: f64,
    pub p_value: f64,
    pub p_display: String,
}

/// Canonical p-value rendering: below 0.001 collapses to "<0.001",
/// everything else is printed with three decimal places.
pub fn p_value_display(p_value: f64) -> String {
    if p_value < 0.001 {
        "<0.001".to_string()
    } else {
        format!("{p_value:.3}")
    }
}

fn not_applicable(kind: TestKind, reason: impl Into<String>) -> EngineError {
    EngineError::TestNotApplicable {
        test: kind.label().to_string(),
        reason: reason.into(),
    }
}

/// Upper-tail p-value of the chi-square distribution.
fn chi_square_p(statistic: f64, df: f64, kind: TestKind) -> EngineResult<f64> {
    let dist = ChiSquared::new(df)
        .map_err(|e| not_applicable(kind, format!("invalid degrees of freedom {df}: {e}")))?;
    Ok(1.0 - dist.cdf(statistic))
}

fn result(kind: TestKind, observations: u64, statistic: f64, df: f64) -> EngineResult<TestResult> {
    let p_value = chi_square_p(statistic, df, kind)?;
    log::debug!(
        "{}: statistic={statistic:.4} df={df} p={p_value:.6} n={observations}",
        kind.name(),
    );
    Ok(TestResult {
        kind,
        observations,
        statistic,
        p_value,
        p_display: p_value_display(p_value),
    })
}

// ── Chi-square goodness-of-fit ───────────────────────────────────────────────

/// Goodness-of-fit over a categorical series against a uniform null.
/// Levels are the distinct values observed; df = levels - 1.
pub fn chi2_gof(series: &[&str]) -> EngineResult<TestResult> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for level in series {
        *counts.entry(level).or_insert(0) += 1;
    }
    let observed: Vec<u64> = counts.into_values().collect();
    chi2_gof_counts(&observed, None)
}

/// Goodness-of-fit over pre-tabulated category counts. With no expected
/// frequencies the null is uniform (each cell expects the observed mean).
pub fn chi2_gof_counts(observed: &[u64], expected: Option<&[f64]>) -> EngineResult<TestResult> {
    const KIND: TestKind = TestKind::ChiSquareGof;

    if observed.len() < 2 {
        return Err(not_applicable(
            KIND,
            format!("needs at least 2 category levels, got {}", observed.len()),
        ));
    }
    let n: u64 = observed.iter().sum();
    if n == 0 {
        return Err(not_applicable(KIND, "no observations"));
    }

    let uniform = n as f64 / observed.len() as f64;
    let expected: Vec<f64> = match expected {
        Some(e) => {
            if e.len() != observed.len() {
                return Err(not_applicable(
                    KIND,
                    format!(
                        "expected frequencies ({}) do not match levels ({})",
                        e.len(),
                        observed.len()
                    ),
                ));
            }
            e.to_vec()
        }
        None => vec![uniform; observed.len()],
    };
    if expected.iter().any(|e| *e <= 0.0) {
        return Err(not_applicable(KIND, "expected frequency of zero"));
    }

    let statistic: f64 = observed
        .iter()
        .zip(&expected)
        .map(|(o, e)| (*o as f64 - e).powi(2) / e)
        .sum();
    let df = (observed.len() - 1) as f64;
    result(KIND, n, statistic, df)
}

// ── Chi-square independence ──────────────────────────────────────────────────

/// Pearson chi-square over the contingency table of two categorical
/// series (factor levels × split levels); df = (rows-1)(cols-1).
pub fn chi2_independence(factor: &[&str], split: &[&str]) -> EngineResult<TestResult> {
    const KIND: TestKind = TestKind::ChiSquareIndependence;

    if factor.len() != split.len() {
        return Err(not_applicable(
            KIND,
            format!(
                "series lengths differ: {} vs {}",
                factor.len(),
                split.len()
            ),
        ));
    }
    if factor.is_empty() {
        return Err(not_applicable(KIND, "no observations"));
    }

    // Contingency table with deterministic level ordering.
    let mut cells: BTreeMap<(&str, &str), u64> = BTreeMap::new();
    let mut row_levels: BTreeMap<&str, u64> = BTreeMap::new();
    let mut col_levels: BTreeMap<&str, u64> = BTreeMap::new();
    for (r, c) in factor.iter().zip(split) {
        *cells.entry((r, c)).or_insert(0) += 1;
        *row_levels.entry(r).or_insert(0) += 1;
        *col_levels.entry(c).or_insert(0) += 1;
    }
    if row_levels.len() < 2 {
        return Err(not_applicable(KIND, "factor has a single level"));
    }
    if col_levels.len() < 2 {
        return Err(not_applicable(KIND, "split has a single level"));
    }

    let n = factor.len() as f64;
    let mut statistic = 0.0;
    for (row, row_total) in &row_levels {
        for (col, col_total) in &col_levels {
            let observed = *cells.get(&(*row, *col)).unwrap_or(&0) as f64;
            let expected = (*row_total as f64) * (*col_total as f64) / n;
            statistic += (observed - expected).powi(2) / expected;
        }
    }
    let df = ((row_levels.len() - 1) * (col_levels.len() - 1)) as f64;
    result(KIND, factor.len() as u64, statistic, df)
}

// ── Kruskal-Wallis ───────────────────────────────────────────────────────────

/// Kruskal-Wallis rank-sum test of a numeric series grouped by a factor
/// with at least two non-empty groups. Ties receive the average rank and
/// the standard tie correction is applied; the p-value uses the
/// chi-square approximation with df = groups - 1.
pub fn kruskal_wallis(values: &[f64], groups: &[&str]) -> EngineResult<TestResult> {
    const KIND: TestKind = TestKind::KruskalWallis;

    if values.len() != groups.len() {
        return Err(not_applicable(
            KIND,
            format!(
                "series lengths differ: {} vs {}",
                values.len(),
                groups.len()
            ),
        ));
    }
    let n = values.len();
    if n == 0 {
        return Err(not_applicable(KIND, "no observations"));
    }

    let mut by_group: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, g) in groups.iter().enumerate() {
        by_group.entry(g).or_default().push(i);
    }
    if by_group.len() < 2 {
        return Err(not_applicable(KIND, "needs at least 2 non-empty groups"));
    }

    let ranks = average_ranks(values);

    // Tie correction: 1 - sum(t^3 - t) / (n^3 - n) over tie runs.
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut tie_term = 0.0;
    let mut run = 1usize;
    for i in 1..=n {
        if i < n && sorted[i] == sorted[i - 1] {
            run += 1;
        } else {
            if run > 1 {
                let t = run as f64;
                tie_term += t.powi(3) - t;
            }
            run = 1;
        }
    }
    let nf = n as f64;
    let correction = 1.0 - tie_term / (nf.powi(3) - nf);
    if correction <= 0.0 {
        return Err(not_applicable(KIND, "all observations are identical"));
    }

    let mut h = 0.0;
    for indices in by_group.values() {
        let rank_sum: f64 = indices.iter().map(|&i| ranks[i]).sum();
        h += rank_sum.powi(2) / indices.len() as f64;
    }
    h = 12.0 / (nf * (nf + 1.0)) * h - 3.0 * (nf + 1.0);
    h /= correction;

    let df = (by_group.len() - 1) as f64;
    result(KIND, n as u64, h, df)
}

/// Joint ranks of a series, ties averaged.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // ranks are 1-based; tied run [i, j] shares the average rank.
        let avg = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}
