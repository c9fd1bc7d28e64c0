// Pairwise comparison of two checked series
use super::series::DataPoint;
use super::view::SeriesView;
use serde::Serialize;

/// Replaces zero with `replace` (itself never zero) so it can be a divisor.
pub fn not_zero(num: f64, replace: f64) -> f64 {
    let replace = if replace == 0.0 { 1.0 } else { replace };
    if num == 0.0 { replace } else { num }
}

/// Rounds to `n` decimals, `n` capped to 0..=14.
pub fn keep_decimals(num: f64, n: i32) -> f64 {
    let factor = 10f64.powi(n.clamp(0, 14));
    (num * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub step: usize,
    pub normal: Option<f64>,
    pub absolute: Option<f64>,
    /// Percent of the reference value, two decimals.
    pub relative: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub reference: String,
    pub candidate: String,
    pub rows: Vec<ComparisonRow>,
}

impl Comparison {
    /// Compares the view's second column against its first. `None` unless
    /// exactly two series are checked.
    pub fn from_view(view: &SeriesView) -> Option<Self> {
        if !view.is_comparable() || view.columns.len() != 2 {
            return None;
        }
        let reference = view.columns[0].clone();
        let candidate = view.columns[1].clone();
        let rows = compare(view.series(&candidate)?, view.series(&reference)?);
        Some(Self {
            reference,
            candidate,
            rows,
        })
    }
}

/// `base - reference` over the overlapping prefix of both series.
pub fn compare(base: &[DataPoint], reference: &[DataPoint]) -> Vec<ComparisonRow> {
    base.iter()
        .zip(reference.iter())
        .enumerate()
        .map(|(step, (b, c))| match (b.value, c.value) {
            (Some(b), Some(c)) => {
                let dif = b - c;
                ComparisonRow {
                    step,
                    normal: Some(dif),
                    absolute: Some(dif.abs()),
                    relative: Some(keep_decimals(dif.abs() / not_zero(c, 1.0) * 100.0, 2)),
                }
            }
            _ => ComparisonRow {
                step,
                normal: None,
                absolute: None,
                relative: None,
            },
        })
        .collect()
}
