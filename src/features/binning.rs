//! Frequency Binner
//!
//! Turns windowed series into per-position occurrence counts over a
//! discretized value range of the variable.
//!
//! Range discovery is global: one min/max over every position of every
//! region, so all rows share the same column set.
//!
//! Policies:
//! - `Range`: bucket at interior breakpoint i counts values in
//!   `[bp[i-1], bp[i+1])` (n-2 columns)
//! - `Threshold`: bucket at breakpoint v counts values `>= v` for `v >= 0`
//!   and `<= v` for `v < 0` (n columns)
//!
//! Missing readings are never counted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SelectivityError};
use crate::series::RegionSeries;

/// Label precision; keeps `0.1 * 3` from becoming `0.30000000000000004`
const LABEL_SCALE: f64 = 1e9;

/// Most breakpoints a range may be split into
pub const MAX_BREAKPOINTS: usize = 100_000;

/// How observations are assigned to buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinningPolicy {
    #[default]
    Range,
    Threshold,
}

impl fmt::Display for BinningPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinningPolicy::Range => f.write_str("range"),
            BinningPolicy::Threshold => f.write_str("threshold"),
        }
    }
}

/// Occurrence counts: one row per position, one column per bucket
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyTable {
    /// Numeric bucket labels (breakpoints), ascending
    pub labels: Vec<f64>,
    /// Position names, row order
    pub positions: Vec<String>,
    /// `counts[row][column]`
    pub counts: Vec<Vec<u32>>,
}

impl FrequencyTable {
    pub fn n_rows(&self) -> usize {
        self.positions.len()
    }

    pub fn n_columns(&self) -> usize {
        self.labels.len()
    }

    /// Number of distinct position names
    pub fn n_distinct_positions(&self) -> usize {
        let mut names: Vec<&str> = self.positions.iter().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }
}

fn round_label(value: f64) -> f64 {
    (value * LABEL_SCALE).round() / LABEL_SCALE
}

/// Ascending breakpoints covering `[min, max]` with spacing `step`
///
/// The ends are snapped outward to multiples of `step`, so labels are
/// stable across runs with slightly different extremes.
pub fn breakpoints(min: f64, max: f64, step: f64) -> Result<Vec<f64>> {
    if !(step.is_finite() && step > 0.0) {
        return Err(SelectivityError::invalid_parameter("step", step, "must be a positive number"));
    }
    if !(min.is_finite() && max.is_finite()) || min > max {
        return Err(SelectivityError::invalid_parameter(
            "value range",
            format!("[{min}, {max}]"),
            "must be a finite, ordered interval",
        ));
    }

    let lo = round_label((min / step).floor() * step);
    let hi = round_label((max / step).ceil() * step);
    let n_steps = ((hi - lo) / step).round();
    if n_steps >= MAX_BREAKPOINTS as f64 {
        return Err(SelectivityError::invalid_parameter(
            "step",
            step,
            &format!("splits [{lo}, {hi}] into {n_steps} steps, at most {MAX_BREAKPOINTS} breakpoints allowed"),
        ));
    }
    let n_steps = n_steps as usize;

    Ok((0..=n_steps).map(|i| round_label(lo + i as f64 * step)).collect())
}

/// Global (min, max) over every non-missing reading
fn value_range(series: &[RegionSeries]) -> Option<(f64, f64)> {
    series
        .iter()
        .flat_map(|s| s.columns.iter())
        .flat_map(|c| c.observed())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Range-count buckets for one position
fn range_counts(values: &[f64], bps: &[f64]) -> Vec<u32> {
    (1..bps.len().saturating_sub(1))
        .map(|i| {
            let (lower, upper) = (bps[i - 1], bps[i + 1]);
            values.iter().filter(|&&v| v >= lower && v < upper).count() as u32
        })
        .collect()
}

/// Threshold-count buckets for one position
fn threshold_counts(values: &[f64], bps: &[f64]) -> Vec<u32> {
    bps.iter()
        .map(|&t| {
            if t >= 0.0 {
                values.iter().filter(|&&v| v >= t).count() as u32
            } else {
                values.iter().filter(|&&v| v <= t).count() as u32
            }
        })
        .collect()
}

/// Bin windowed series from all regions into one frequency table
pub fn bin(series: &[RegionSeries], step: f64, policy: BinningPolicy) -> Result<FrequencyTable> {
    let n_positions: usize = series.iter().map(|s| s.columns.len()).sum();
    if n_positions == 0 {
        return Err(SelectivityError::EmptyFilterResult {
            context: "no positions survived windowing and season filtering".to_string(),
        });
    }

    let (min, max) = value_range(series).ok_or_else(|| SelectivityError::EmptyFilterResult {
        context: format!("{n_positions} positions but no non-missing readings inside the window"),
    })?;
    let bps = breakpoints(min, max, step)?;

    let labels: Vec<f64> = match policy {
        BinningPolicy::Range => bps
            .get(1..bps.len().saturating_sub(1))
            .map(<[f64]>::to_vec)
            .unwrap_or_default(),
        BinningPolicy::Threshold => bps.clone(),
    };

    let mut positions = Vec::with_capacity(n_positions);
    let mut counts = Vec::with_capacity(n_positions);
    for region in series {
        for column in &region.columns {
            let observed: Vec<f64> = column.observed().collect();
            let row = match policy {
                BinningPolicy::Range => range_counts(&observed, &bps),
                BinningPolicy::Threshold => threshold_counts(&observed, &bps),
            };
            positions.push(column.name.clone());
            counts.push(row);
        }
    }

    tracing::info!(
        "Binned {} positions into {} {} buckets over [{}, {}] (step {})",
        positions.len(),
        labels.len(),
        policy,
        min,
        max,
        step
    );

    Ok(FrequencyTable { labels, positions, counts })
}
