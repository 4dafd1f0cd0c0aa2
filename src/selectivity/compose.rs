//! Result Composer
//!
//! Joins signed ratios, p-values and bucket labels into rows ordered by
//! label, adding LOWESS-smoothed curves of the ratio and of the bounded
//! transform `r / (|r| + 1)`.

use serde::{Deserialize, Serialize};

use super::smoothing::lowess;
use crate::error::{Result, SelectivityError};
use crate::features::BinningPolicy;
use crate::series::{EnvVariable, Season};

/// Smoothing parameters
#[derive(Debug, Clone, Copy)]
pub struct SmoothingConfig {
    pub span: f64,
    pub iterations: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            span: 0.3,
            iterations: 3,
        }
    }
}

/// One bucket of the result table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectivityRow {
    pub x: f64,
    pub sel_ratio: f64,
    pub p_val: f64,
    pub significance: bool,
    pub sel_ratio_smooth: f64,
    pub explained_var: f64,
    pub explained_var_smooth: f64,
}

/// Full result for one taxon / variable / season
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectivityResult {
    pub taxon: String,
    pub variable: EnvVariable,
    pub season: Season,
    pub binning: BinningPolicy,
    /// Positions that entered the regression
    pub n_positions: usize,
    pub nlv: usize,
    pub permutations_completed: usize,
    pub rows: Vec<SelectivityRow>,
}

impl SelectivityResult {
    /// Labels flagged significant, ascending
    pub fn significant_ranges(&self) -> Vec<f64> {
        self.rows.iter().filter(|r| r.significance).map(|r| r.x).collect()
    }

    /// Signed ratio of the row with the largest magnitude
    pub fn strongest(&self) -> Option<&SelectivityRow> {
        self.rows
            .iter()
            .filter(|r| r.sel_ratio.is_finite())
            .max_by(|a, b| a.sel_ratio.abs().total_cmp(&b.sel_ratio.abs()))
    }
}

fn bounded(ratio: f64) -> f64 {
    ratio / (ratio.abs() + 1.0)
}

/// Compose result rows ordered by `x_grid`
///
/// A row is significant when its p-value is below `threshold`; NaN p-values
/// are never significant.
pub fn compose(
    signed_ratio: &[f64],
    p_values: &[f64],
    x_grid: &[f64],
    smoothing: SmoothingConfig,
    threshold: f64,
) -> Result<Vec<SelectivityRow>> {
    for (context, len) in [("p-values vs ratios", p_values.len()), ("x grid vs ratios", x_grid.len())] {
        if len != signed_ratio.len() {
            return Err(SelectivityError::ShapeMismatch {
                context: context.to_string(),
                expected: signed_ratio.len(),
                found: len,
            });
        }
    }

    let mut order: Vec<usize> = (0..x_grid.len()).collect();
    order.sort_by(|&a, &b| x_grid[a].total_cmp(&x_grid[b]));

    let x: Vec<f64> = order.iter().map(|&i| x_grid[i]).collect();
    let ratio: Vec<f64> = order.iter().map(|&i| signed_ratio[i]).collect();
    let explained: Vec<f64> = ratio.iter().map(|&r| bounded(r)).collect();

    let ratio_smooth = lowess(&x, &ratio, smoothing.span, smoothing.iterations)?;
    let explained_smooth = lowess(&x, &explained, smoothing.span, smoothing.iterations)?;

    Ok(order
        .iter()
        .enumerate()
        .map(|(k, &i)| SelectivityRow {
            x: x[k],
            sel_ratio: ratio[k],
            p_val: p_values[i],
            significance: p_values[i] < threshold,
            sel_ratio_smooth: ratio_smooth[k],
            explained_var: explained[k],
            explained_var_smooth: explained_smooth[k],
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rows_sorted_by_x() {
        let rows = compose(
            &[3.0, -1.0, 0.5],
            &[0.01, 0.5, f64::NAN],
            &[2.0, 0.0, 1.0],
            SmoothingConfig::default(),
            0.1,
        )
        .unwrap();

        let xs: Vec<f64> = rows.iter().map(|r| r.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
        assert_eq!(rows[2].sel_ratio, 3.0);
        assert!(rows[2].significance);
        assert!(!rows[0].significance);
        // NaN p-value is never significant
        assert!(!rows[1].significance);
    }

    #[test]
    fn test_explained_var_is_bounded() {
        let ratios = [-50.0, -1.0, 0.0, 1.0, 50.0];
        let rows = compose(&ratios, &[1.0; 5], &[0.0, 1.0, 2.0, 3.0, 4.0], SmoothingConfig::default(), 0.1)
            .unwrap();
        for row in &rows {
            assert!(row.explained_var > -1.0 && row.explained_var < 1.0);
        }
        assert_relative_eq!(rows[3].explained_var, 0.5);
        assert_relative_eq!(rows[1].explained_var, -0.5);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            compose(&[1.0, 2.0], &[0.1], &[0.0, 1.0], SmoothingConfig::default(), 0.1),
            Err(SelectivityError::ShapeMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_significant_ranges() {
        let rows = compose(
            &[1.0, 2.0, 3.0, 4.0],
            &[0.05, 0.5, 0.01, 0.2],
            &[1.0, 2.0, 3.0, 4.0],
            SmoothingConfig::default(),
            0.1,
        )
        .unwrap();
        let result = SelectivityResult {
            taxon: "OTU_1".into(),
            variable: EnvVariable::AirTemperature,
            season: Season::All,
            binning: BinningPolicy::Range,
            n_positions: 6,
            nlv: 3,
            permutations_completed: 100,
            rows,
        };
        assert_eq!(result.significant_ranges(), vec![1.0, 3.0]);
        assert_eq!(result.strongest().map(|r| r.x), Some(4.0));
    }
}
