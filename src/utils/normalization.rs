//! Standardization Utilities
//!
//! Z-score transforms used in two places:
//! - abundance tables, column-wise over taxa (sample std, ddof = 1) before
//!   a taxon row is selected
//! - the joined feature matrix and response, column-wise over positions
//!   (population std, ddof = 0) once before the fold loop
//!
//! A zero standard deviation is treated as 1, so constant columns map to all
//! zeros. Non-finite results are replaced by 0.

use nalgebra::{DMatrix, DVector};

/// Mean and standard deviation of the finite entries, `None` when empty
///
/// `ddof` is the delta degrees of freedom (0 = population, 1 = sample).
pub fn mean_std(values: impl Iterator<Item = f64> + Clone, ddof: usize) -> Option<(f64, f64)> {
    let finite = values.filter(|v| v.is_finite());
    let n = finite.clone().count();
    if n == 0 {
        return None;
    }
    let mean = finite.clone().sum::<f64>() / n as f64;
    if n <= ddof {
        return Some((mean, 0.0));
    }
    let ss: f64 = finite.map(|v| (v - mean).powi(2)).sum();
    Some((mean, (ss / (n - ddof) as f64).sqrt()))
}

fn scale(value: f64, mean: f64, std: f64) -> f64 {
    let std = if std > 0.0 { std } else { 1.0 };
    let z = (value - mean) / std;
    if z.is_finite() { z } else { 0.0 }
}

/// Z-score a column with missing entries; missing stays missing
pub fn zscore_optional(values: &[Option<f64>], ddof: usize) -> Vec<Option<f64>> {
    let Some((mean, std)) = mean_std(values.iter().filter_map(|v| *v), ddof) else {
        return values.to_vec();
    };
    values.iter().map(|v| v.map(|x| scale(x, mean, std))).collect()
}

/// Column-wise z-score of a dense matrix (population std)
pub fn standardize_columns(x: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = x.clone();
    for j in 0..x.ncols() {
        let column: Vec<f64> = x.column(j).iter().copied().collect();
        let (mean, std) = mean_std(column.iter().copied(), 0).unwrap_or((0.0, 1.0));
        for v in out.column_mut(j).iter_mut() {
            *v = scale(*v, mean, std);
        }
    }
    out
}

/// Z-score of a dense vector (population std)
pub fn standardize_vector(y: &DVector<f64>) -> DVector<f64> {
    let (mean, std) = mean_std(y.as_slice().iter().copied(), 0).unwrap_or((0.0, 1.0));
    y.map(|v| scale(v, mean, std))
}

/// Population variance of one column restricted to `rows`
pub fn column_variance(x: &DMatrix<f64>, col: usize, rows: &[usize]) -> f64 {
    match mean_std(rows.iter().map(|&r| x[(r, col)]), 0) {
        Some((_, std)) => std * std,
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_standardized_columns_have_unit_moments() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 10.0, 2.0, 20.0, 3.0, 35.0, 4.0, 41.0]);
        let z = standardize_columns(&x);
        for j in 0..2 {
            let column: Vec<f64> = z.column(j).iter().copied().collect();
            let (mean, std) = mean_std(column.iter().copied(), 0).unwrap();
            assert_relative_eq!(mean, 0.0, epsilon = 1e-12);
            assert_relative_eq!(std, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let x = DMatrix::from_row_slice(3, 2, &[5.0, 1.0, 5.0, 2.0, 5.0, 3.0]);
        let z = standardize_columns(&x);
        assert!(z.column(0).iter().all(|v| *v == 0.0));

        let y = standardize_vector(&DVector::from_vec(vec![2.0, 2.0]));
        assert_eq!(y.as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_zscore_optional_keeps_missing() {
        let z = zscore_optional(&[Some(1.0), None, Some(3.0)], 1);
        assert_eq!(z[1], None);
        // mean 2, sample std sqrt(2)
        assert_relative_eq!(z[0].unwrap(), -1.0 / 2f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(z[2].unwrap(), 1.0 / 2f64.sqrt(), epsilon = 1e-12);

        assert_eq!(zscore_optional(&[None, None], 1), vec![None, None]);
    }

    #[test]
    fn test_column_variance_on_subset() {
        let x = DMatrix::from_row_slice(4, 1, &[0.0, 2.0, 100.0, 4.0]);
        assert_relative_eq!(column_variance(&x, 0, &[0, 1, 3]), 8.0 / 3.0, epsilon = 1e-12);
        assert_eq!(column_variance(&x, 0, &[]), 0.0);
    }
}
