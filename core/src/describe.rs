//! Descriptive statistics — distributional summaries for numeric series,
//! optionally grouped by a categorical factor, with an "Overall" roll-up.
//!
//! Undefined statistics are `None`, never zero and never a silently
//! propagated NaN: n = 0 leaves everything undefined, n = 1 leaves the
//! dispersion block (variance, std, SEM, CI) undefined, and skewness
//! needs n >= 3 with nonzero variance.

use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pseudo-level aggregating across all groups.
pub const OVERALL_LEVEL: &str = "Overall";

/// Distributional summary of one numeric series (or one group level).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    pub count: u64,
    pub sum: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub range: Option<f64>,
    pub mean: Option<f64>,
    /// Sample variance (n - 1 denominator).
    pub var: Option<f64>,
    pub std: Option<f64>,
    pub median: Option<f64>,
    /// Q3 - Q1 under linear interpolation.
    pub iqr: Option<f64>,
    /// std / sqrt(n).
    pub sem: Option<f64>,
    /// mean - 1.96 * SEM.
    pub ci_lower: Option<f64>,
    /// mean + 1.96 * SEM.
    pub ci_upper: Option<f64>,
    /// Adjusted Fisher-Pearson skewness.
    pub skew: Option<f64>,
}

/// Summarize one numeric series.
pub fn summarize(series: &[f64]) -> StatSummary {
    let mut sorted: Vec<f64> = series.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    if n == 0 {
        return StatSummary {
            count: 0,
            sum: None,
            min: None,
            max: None,
            range: None,
            mean: None,
            var: None,
            std: None,
            median: None,
            iqr: None,
            sem: None,
            ci_lower: None,
            ci_upper: None,
            skew: None,
        };
    }

    let sum: f64 = sorted.iter().sum();
    let mean = sum / n as f64;
    let min = sorted[0];
    let max = sorted[n - 1];
    let median = quantile(&sorted, 0.5);
    let iqr = quantile(&sorted, 0.75) - quantile(&sorted, 0.25);

    let var = sample_variance(&sorted, mean);
    let std = var.map(f64::sqrt);
    let sem = std.map(|s| s / (n as f64).sqrt());
    let ci_lower = sem.map(|s| mean - 1.96 * s);
    let ci_upper = sem.map(|s| mean + 1.96 * s);

    StatSummary {
        count: n as u64,
        sum: Some(sum),
        min: Some(min),
        max: Some(max),
        range: Some(max - min),
        mean: Some(mean),
        var,
        std,
        median: Some(median),
        iqr: Some(iqr),
        sem,
        ci_lower,
        ci_upper,
        skew: skewness(&sorted, mean),
    }
}

/// Summarize a series grouped by a categorical factor, plus the trailing
/// Overall roll-up. Levels come back sorted; Overall is always last.
///
/// `values` and `groups` must be the same length; pairs where either side
/// is missing are the caller's concern (filter before calling). A length
/// mismatch is an error, never a truncated table.
pub fn summarize_by(values: &[f64], groups: &[&str]) -> EngineResult<Vec<(String, StatSummary)>> {
    if values.len() != groups.len() {
        return Err(anyhow::anyhow!(
            "grouped summary series lengths differ: {} values vs {} groups",
            values.len(),
            groups.len()
        )
        .into());
    }

    let mut by_level: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (value, level) in values.iter().zip(groups) {
        by_level.entry(level).or_default().push(*value);
    }

    let mut out: Vec<(String, StatSummary)> = by_level
        .into_iter()
        .map(|(level, series)| (level.to_string(), summarize(&series)))
        .collect();
    out.push((OVERALL_LEVEL.to_string(), summarize(values)));
    Ok(out)
}

// ── Numeric helpers (shared with the aggregation engine) ─────────────────────

/// Linear-interpolation quantile over a sorted, non-empty slice.
/// h = (n - 1) * q; value = x[floor(h)] + frac(h) * (x[floor(h)+1] - x[floor(h)]).
pub(crate) fn quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * q;
    let lo = h.floor() as usize;
    let frac = h - lo as f64;
    if lo + 1 < n {
        sorted[lo] + frac * (sorted[lo + 1] - sorted[lo])
    } else {
        sorted[lo]
    }
}

/// Interpolated median of a sorted, non-empty slice.
pub(crate) fn median_sorted(sorted: &[f64]) -> f64 {
    quantile(sorted, 0.5)
}

/// Sample variance with n - 1 denominator; undefined for n < 2.
pub(crate) fn sample_variance(values: &[f64], mean: f64) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some(ss / (n - 1) as f64)
}

/// Adjusted Fisher-Pearson skewness: G1 = g1 * sqrt(n(n-1)) / (n-2),
/// g1 = m3 / m2^(3/2). Undefined for n < 3 or zero variance.
fn skewness(values: &[f64], mean: f64) -> Option<f64> {
    let n = values.len();
    if n < 3 {
        return None;
    }
    let nf = n as f64;
    let m2: f64 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nf;
    let m3: f64 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / nf;
    if m2 <= 0.0 {
        return None;
    }
    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (nf * (nf - 1.0)).sqrt() / (nf - 2.0))
}
