// THEORY:
// The `signal` module holds the numeric building blocks the detectors share.
// Gaze recordings are full of holes (blinks, tracker loss), so every statistic
// here is NaN-aware: missing samples are skipped rather than poisoning a whole
// window. Functions that produce per-sample series (`diff`, `temporal_derivative`)
// keep the input length and mark the first sample, which has no predecessor, as NaN.

use crate::error::{GazeError, GazeResult};
use nalgebra::{DMatrix, DVector};

pub const MILLISECONDS_PER_SECOND: f64 = 1000.0;

fn finite_sorted(values: &[f64]) -> Vec<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    finite.sort_by(|a, b| a.total_cmp(b));
    finite
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Median of the non-NaN values; NaN when there are none.
pub fn nan_median(values: &[f64]) -> f64 {
    median_of_sorted(&finite_sorted(values))
}

/// Mean of the non-NaN values; NaN when there are none.
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

/// Population standard deviation of the non-NaN values; NaN when there are none.
pub fn nan_std(values: &[f64]) -> f64 {
    nan_mean_and_std(values).1
}

pub fn nan_mean_and_std(values: &[f64]) -> (f64, f64) {
    let mean = nan_mean(values);
    if mean.is_nan() {
        return (f64::NAN, f64::NAN);
    }
    let (sq_sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + (v - mean).powi(2), c + 1));
    (mean, (sq_sum / count as f64).sqrt())
}

/// Largest non-NaN value; NaN when there are none.
pub fn nan_max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}

/// First difference padded with a leading NaN, so `out.len() == values.len()`.
pub fn diff(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(f64::NAN);
    out.extend(values.windows(2).map(|w| w[1] - w[0]));
    out
}

/// Rate of change per second of `values` sampled at `timestamps` (milliseconds).
/// The first element, and any element whose time step is not positive, is NaN.
pub fn temporal_derivative(values: &[f64], timestamps: &[f64]) -> GazeResult<Vec<f64>> {
    if values.len() != timestamps.len() {
        return Err(GazeError::invalid_input(format!(
            "values ({}) and timestamps ({}) must have the same length",
            values.len(),
            timestamps.len()
        )));
    }
    let dv = diff(values);
    let dt = diff(timestamps);
    Ok(dv
        .iter()
        .zip(&dt)
        .map(|(dv, dt)| {
            if *dt > 0.0 {
                dv / dt * MILLISECONDS_PER_SECOND
            } else {
                f64::NAN
            }
        })
        .collect())
}

/// Savitzky–Golay smoothing: each sample is replaced by the value of a
/// least-squares polynomial of degree `poly_order` fitted to the surrounding
/// `window_length` samples. The first and last half-windows are evaluated on the
/// polynomial fitted to the first and last full window respectively.
pub fn savgol_filter(values: &[f64], window_length: usize, poly_order: usize) -> GazeResult<Vec<f64>> {
    if window_length % 2 == 0 {
        return Err(GazeError::invalid_input(format!(
            "savgol window length must be odd, got {window_length}"
        )));
    }
    if poly_order >= window_length {
        return Err(GazeError::invalid_input(format!(
            "savgol polynomial order ({poly_order}) must be less than the window length ({window_length})"
        )));
    }
    let n = values.len();
    if n < window_length {
        return Err(GazeError::invalid_input(format!(
            "savgol window ({window_length}) is longer than the input ({n})"
        )));
    }

    let projection = savgol_projection(window_length, poly_order)?;
    let half = window_length / 2;
    let mut smoothed = Vec::with_capacity(n);
    for i in 0..n {
        let (start, offset) = if i < half {
            (0, i as f64 - half as f64)
        } else if i + half >= n {
            let start = n - window_length;
            (start, (i - start) as f64 - half as f64)
        } else {
            (i - half, 0.0)
        };
        let window = &values[start..start + window_length];
        smoothed.push(evaluate_fit(&projection, window, offset));
    }
    Ok(smoothed)
}

/// Evaluates the polynomial fitted to `window` at position `offset` (relative to its center).
fn evaluate_fit(projection: &DMatrix<f64>, window: &[f64], offset: f64) -> f64 {
    let coefficients = projection * DVector::from_column_slice(window);
    coefficients.iter().rev().fold(0.0, |value, c| value * offset + c)
}

/// Returns `(AᵀA)⁻¹Aᵀ` for the Vandermonde matrix `A[i][j] = (i - half)^j`.
/// Row `j` maps a window of samples to the `j`-th polynomial coefficient.
fn savgol_projection(window_length: usize, poly_order: usize) -> GazeResult<DMatrix<f64>> {
    let half = (window_length / 2) as f64;
    let vandermonde =
        DMatrix::from_fn(window_length, poly_order + 1, |i, j| (i as f64 - half).powi(j as i32));
    let transposed = vandermonde.transpose();
    (&transposed * &vandermonde)
        .lu()
        .solve(&transposed)
        .ok_or_else(|| GazeError::computation("savgol normal equations are singular"))
}
