//! Rolling z-score outlier detection
//!
//! For a series of `n` usable points:
//!
//! ```text
//! window    = max(5, round(0.2 · n))          (trailing, min 2 periods)
//! z_i       = (x_i - rolling_mean_i) / rolling_std_i
//! threshold = base_threshold · (2 - sensitivity)
//! flag      = |z_i| > threshold
//! ```
//!
//! The rolling std is the sample (n - 1) estimator, the same one the
//! control-limit engine uses. A window with zero spread has its std replaced
//! by 1, so z equals the raw deviation from the rolling mean; since the
//! window includes the current point, that deviation is itself zero.
//!
//! Sensitivity is inverse to the threshold: 1.0 keeps the base threshold,
//! values toward 0 approach twice the base threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stats;
use crate::types::MeasurementSeries;

/// Minimum usable points before detection runs.
pub const MIN_DETECTION_SAMPLES: usize = 5;

/// Smallest rolling window.
pub const MIN_WINDOW: usize = 5;

/// Rolling window as a fraction of the series length.
pub const WINDOW_FRACTION: f64 = 0.2;

/// Observations required before a rolling statistic is defined.
pub const MIN_PERIODS: usize = 2;

/// A flagged point, before it is persisted as an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyCandidate {
    pub timestamp: DateTime<Utc>,
    pub observed_value: f64,
    /// Rolling mean at this point.
    pub expected_value: f64,
    /// Signed z-score.
    pub z_score: f64,
    /// `|z|`
    pub deviation_score: f64,
}

/// Sensitivity-adjusted z-score threshold.
pub fn effective_threshold(base_threshold: f64, sensitivity: f64) -> f64 {
    base_threshold * (2.0 - sensitivity)
}

/// Rolling window length for a series of `n` usable points.
pub fn rolling_window_size(n: usize) -> usize {
    let scaled = (WINDOW_FRACTION * n as f64).round() as usize;
    scaled.max(MIN_WINDOW)
}

/// Flag points of `series` whose rolling z-score exceeds the adjusted threshold.
///
/// Missing values are dropped first. Fewer than `MIN_DETECTION_SAMPLES`
/// usable points returns an empty list.
pub fn detect_statistical_anomalies(
    series: &MeasurementSeries,
    sensitivity: f64,
    threshold: f64,
) -> Vec<AnomalyCandidate> {
    let points = series.present();
    if points.len() < MIN_DETECTION_SAMPLES {
        debug!(
            parameter = %series.name,
            samples = points.len(),
            required = MIN_DETECTION_SAMPLES,
            "Insufficient data for anomaly detection"
        );
        return Vec::new();
    }

    let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    let window = rolling_window_size(values.len());
    let limit = effective_threshold(threshold, sensitivity);
    let rolling = stats::rolling_mean_std(&values, window, MIN_PERIODS);

    let candidates: Vec<AnomalyCandidate> = points
        .iter()
        .zip(rolling)
        .filter_map(|(&(timestamp, value), (mean, std))| {
            let (mean, std) = (mean?, std?);
            let std = if std == 0.0 { 1.0 } else { std };
            let z = (value - mean) / std;
            (z.abs() > limit).then_some(AnomalyCandidate {
                timestamp,
                observed_value: value,
                expected_value: mean,
                z_score: z,
                deviation_score: z.abs(),
            })
        })
        .collect();

    debug!(
        parameter = %series.name,
        samples = values.len(),
        window,
        threshold = limit,
        flagged = candidates.len(),
        "Statistical anomaly scan complete"
    );

    candidates
}
