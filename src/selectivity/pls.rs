//! Partial least squares regression (single response)
//!
//! NIPALS PLS1 with per-fit centering. Components are extracted until the
//! requested count is reached or the deflated X/y carry no more covariance.
//!
//! Regression coefficients: `B = W (PᵀW)⁻¹ q` (centered scale).

use nalgebra::{DMatrix, DVector};

/// Below this norm a weight vector or score is treated as zero
const NIPALS_EPS: f64 = 1e-12;

/// Fitted PLS1 model
#[derive(Debug, Clone)]
pub struct PlsModel {
    /// X weights, features × components
    pub weights: DMatrix<f64>,
    /// X loadings, features × components
    pub loadings: DMatrix<f64>,
    /// y loadings, one per component
    pub y_loadings: DVector<f64>,
    /// Coefficients on centered X
    pub coefficients: DVector<f64>,
    /// Column means used for centering
    pub x_mean: DVector<f64>,
    pub y_mean: f64,
}

impl PlsModel {
    /// Components actually extracted (may be fewer than requested)
    pub fn n_components(&self) -> usize {
        self.y_loadings.len()
    }

    /// Center `x` with the training means
    pub fn center(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let mut centered = x.clone();
        for (j, mut column) in centered.column_iter_mut().enumerate() {
            column.add_scalar_mut(-self.x_mean[j]);
        }
        centered
    }

    /// Predict responses for rows of `x`
    pub fn predict(&self, x: &DMatrix<f64>) -> DVector<f64> {
        let centered = self.center(x);
        (&centered * &self.coefficients).add_scalar(self.y_mean)
    }
}

fn column_means(x: &DMatrix<f64>) -> DVector<f64> {
    let n = x.nrows().max(1) as f64;
    DVector::from_iterator(x.ncols(), x.column_iter().map(|c| c.sum() / n))
}

/// Fit PLS1 with at most `nlv` latent variables
///
/// Callers validate `nlv` against the row count; this routine only stops
/// early when no covariance is left to extract.
pub fn fit_pls1(x: &DMatrix<f64>, y: &DVector<f64>, nlv: usize) -> PlsModel {
    let p = x.ncols();
    let x_mean = column_means(x);
    let y_mean = if y.is_empty() { 0.0 } else { y.mean() };

    let mut e = x.clone();
    for (j, mut column) in e.column_iter_mut().enumerate() {
        column.add_scalar_mut(-x_mean[j]);
    }
    let mut f = y.add_scalar(-y_mean);

    let mut ws: Vec<DVector<f64>> = Vec::with_capacity(nlv);
    let mut ps: Vec<DVector<f64>> = Vec::with_capacity(nlv);
    let mut qs: Vec<f64> = Vec::with_capacity(nlv);

    for _ in 0..nlv {
        let w = e.tr_mul(&f);
        let norm = w.norm();
        if norm < NIPALS_EPS {
            break;
        }
        let w = w / norm;

        let t = &e * &w;
        let tt = t.dot(&t);
        if tt < NIPALS_EPS {
            break;
        }

        let loading = e.tr_mul(&t) / tt;
        let q = f.dot(&t) / tt;

        e -= &t * loading.transpose();
        f -= &t * q;

        ws.push(w);
        ps.push(loading);
        qs.push(q);
    }

    let y_loadings = DVector::from_vec(qs);
    if ws.is_empty() {
        return PlsModel {
            weights: DMatrix::zeros(p, 0),
            loadings: DMatrix::zeros(p, 0),
            y_loadings,
            coefficients: DVector::zeros(p),
            x_mean,
            y_mean,
        };
    }

    let weights = DMatrix::from_columns(&ws);
    let loadings = DMatrix::from_columns(&ps);

    // PᵀW is unit upper triangular in exact arithmetic
    let ptw = loadings.tr_mul(&weights);
    let coefficients = match ptw.lu().solve(&y_loadings) {
        Some(c) => &weights * c,
        None => {
            tracing::debug!("Singular PᵀW with {} components; zero coefficients", ws.len());
            DVector::zeros(p)
        }
    };

    PlsModel {
        weights,
        loadings,
        y_loadings,
        coefficients,
        x_mean,
        y_mean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_linear_fit_recovered() {
        // y = 2*x0 - x1 + 3 with non-collinear predictors
        let x = DMatrix::from_row_slice(
            6,
            2,
            &[1.0, 0.0, 2.0, 1.0, 3.0, 0.5, 4.0, 2.0, 5.0, 1.0, 6.0, 3.5],
        );
        let y = DVector::from_iterator(6, x.row_iter().map(|r| 2.0 * r[0] - r[1] + 3.0));

        let model = fit_pls1(&x, &y, 2);
        assert_eq!(model.n_components(), 2);
        assert_relative_eq!(model.coefficients[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(model.coefficients[1], -1.0, epsilon = 1e-9);

        let fitted = model.predict(&x);
        for (a, b) in fitted.iter().zip(y.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_weights_are_orthonormal() {
        let x = DMatrix::from_row_slice(
            5,
            3,
            &[1.0, 2.0, 0.5, 2.0, 0.0, 1.5, 3.0, 1.0, 0.0, 4.0, 3.0, 2.0, 5.0, 1.0, 1.0],
        );
        let y = DVector::from_vec(vec![1.0, 3.0, 2.0, 5.0, 4.0]);
        let model = fit_pls1(&x, &y, 3);

        let wtw = model.weights.tr_mul(&model.weights);
        for i in 0..model.n_components() {
            for j in 0..model.n_components() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(wtw[(i, j)], expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_stops_when_no_covariance_left() {
        // Single predictor: one component exhausts the covariance
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let y = DVector::from_vec(vec![2.0, 4.0, 6.0, 8.0]);
        let model = fit_pls1(&x, &y, 3);
        assert_eq!(model.n_components(), 1);
        assert_relative_eq!(model.coefficients[0], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_constant_response_gives_zero_model() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 2.0, 1.0, 3.0, 0.0]);
        let y = DVector::from_vec(vec![5.0, 5.0, 5.0]);
        let model = fit_pls1(&x, &y, 2);
        assert_eq!(model.n_components(), 0);
        assert!(model.coefficients.iter().all(|c| *c == 0.0));
        assert_relative_eq!(model.predict(&x)[0], 5.0, epsilon = 1e-12);
    }
}
