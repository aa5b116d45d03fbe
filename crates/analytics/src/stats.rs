//! Statistical helpers shared by the recognizer, models and detector
//!
//! All series are time-ordered with x = 0..n-1, so the least-squares slope
//! is a per-step rate of change.

/// Arithmetic mean of a series; `None` for an empty series
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Least-squares slope of a time-ordered series with x = 0..n-1
///
/// Returns 0.0 for series shorter than two points or with a degenerate
/// denominator.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let n_f = n as f64;
    let sum_x: f64 = (0..n).map(|x| x as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(x, y)| x as f64 * y).sum();
    let sum_x2: f64 = (0..n).map(|x| (x * x) as f64).sum();

    let denominator = n_f * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }

    (n_f * sum_xy - sum_x * sum_y) / denominator
}

/// Slope normalized by the series mean: a scale-free rate of change
///
/// Returns 0.0 when the series has fewer than two points or a zero mean.
pub fn normalized_trend(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    match mean(values) {
        Some(m) if m != 0.0 => linear_slope(values) / m,
        _ => 0.0,
    }
}
