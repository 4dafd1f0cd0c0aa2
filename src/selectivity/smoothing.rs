//! LOWESS smoothing
//!
//! Locally weighted linear regression (Cleveland 1979):
//! - neighbourhood: the `ceil(span × n)` nearest points in x
//! - kernel: tricube on distance scaled by the farthest neighbour
//! - robustness: `iterations` bisquare reweighting passes on the residuals
//!
//! Non-finite y values are excluded from every local fit but still receive a
//! smoothed value at their x.

use crate::error::{Result, SelectivityError};

fn tricube(u: f64) -> f64 {
    if u >= 1.0 {
        0.0
    } else {
        let c = 1.0 - u * u * u;
        c * c * c
    }
}

fn bisquare(u: f64) -> f64 {
    if u >= 1.0 {
        0.0
    } else {
        let c = 1.0 - u * u;
        c * c
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// Weighted local linear fit at `x0`
fn local_fit(x0: f64, xs: &[f64], ys: &[f64], robustness: &[f64], window: usize) -> f64 {
    let mut distances: Vec<f64> = xs.iter().map(|x| (x - x0).abs()).collect();
    distances.sort_by(|a, b| a.total_cmp(b));
    let h = distances[window - 1];

    let weights: Vec<f64> = xs
        .iter()
        .zip(robustness)
        .map(|(x, r)| {
            let d = (x - x0).abs();
            let k = if h > 0.0 {
                tricube(d / h)
            } else if d == 0.0 {
                1.0
            } else {
                0.0
            };
            k * r
        })
        .collect();

    let sw: f64 = weights.iter().sum();
    if !(sw > 0.0) {
        // Every neighbour downweighted to zero: fall back to the plain mean
        return ys.iter().sum::<f64>() / ys.len() as f64;
    }

    let mx = weights.iter().zip(xs).map(|(w, x)| w * x).sum::<f64>() / sw;
    let my = weights.iter().zip(ys).map(|(w, y)| w * y).sum::<f64>() / sw;
    let sxx: f64 = weights.iter().zip(xs).map(|(w, x)| w * (x - mx).powi(2)).sum();
    let sxy: f64 = weights
        .iter()
        .zip(xs.iter().zip(ys))
        .map(|(w, (x, y))| w * (x - mx) * (y - my))
        .sum();

    if sxx > 1e-12 * sw {
        my + sxy / sxx * (x0 - mx)
    } else {
        my
    }
}

/// Smooth `y` against `x`
///
/// `span` is the fraction of points in each neighbourhood, in (0, 1].
pub fn lowess(x: &[f64], y: &[f64], span: f64, iterations: usize) -> Result<Vec<f64>> {
    if x.len() != y.len() {
        return Err(SelectivityError::ShapeMismatch {
            context: "smoothing x vs y".to_string(),
            expected: x.len(),
            found: y.len(),
        });
    }
    if !(span > 0.0 && span <= 1.0) {
        return Err(SelectivityError::invalid_parameter("smoothing_span", span, "must lie in (0, 1]"));
    }
    if let Some(bad) = x.iter().find(|v| !v.is_finite()) {
        return Err(SelectivityError::invalid_parameter("x_grid", bad, "must be finite"));
    }

    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(_, v)| v.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip();

    let n = xs.len();
    if n < 2 {
        return Ok(y.to_vec());
    }
    let window = ((span * n as f64).ceil() as usize).clamp(2, n);

    let scale = ys.iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    let mut robustness = vec![1.0; n];
    for _ in 0..iterations {
        let fitted: Vec<f64> = xs
            .iter()
            .map(|&x0| local_fit(x0, &xs, &ys, &robustness, window))
            .collect();
        let residuals: Vec<f64> = ys.iter().zip(&fitted).map(|(y, f)| y - f).collect();
        let mut abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        let s = median(&mut abs);
        // Residuals at rounding level: the fit is already exact
        if !(s > 1e-7 * scale) {
            break;
        }
        robustness = residuals.iter().map(|r| bisquare(r.abs() / (6.0 * s))).collect();
    }

    Ok(x.iter()
        .map(|&x0| local_fit(x0, &xs, &ys, &robustness, window))
        .collect())
}
