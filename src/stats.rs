//! Descriptive statistics shared by the engines
//!
//! Mean and Bessel-corrected standard deviation come from statrs so every
//! engine uses the same estimator; the rolling helpers mirror trailing
//! window semantics (window includes the current point, results are `None`
//! until `min_periods` observations are available).

use statrs::statistics::Statistics;

/// Drop missing and non-finite values.
pub fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().mean())
}

/// Sample standard deviation (n - 1 denominator), `None` below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    Some(values.iter().std_dev())
}

/// Coefficient of variation in percent: `std / mean * 100`.
///
/// `None` when the std is undefined or the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let s = sample_std(values)?;
    if m == 0.0 {
        return None;
    }
    Some(s / m * 100.0)
}

/// Trailing rolling mean and sample std over `window` points.
///
/// Entry `i` covers `values[i + 1 - window ..= i]` (clipped at the start).
/// Entries with fewer than `min_periods` observations are `None`; the std
/// additionally needs two observations.
pub fn rolling_mean_std(
    values: &[f64],
    window: usize,
    min_periods: usize,
) -> Vec<(Option<f64>, Option<f64>)> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            if slice.len() < min_periods {
                return (None, None);
            }
            (mean(slice), sample_std(slice))
        })
        .collect()
}

/// Mean absolute error between paired slices (truncated to the shorter).
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return None;
    }
    let total: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum();
    Some(total / n as f64)
}
