//! Individual-value and moving-range control limits
//!
//! ```text
//! Individuals:   CL = x̄        UCL/LCL = x̄ ± k·s        (s: sample std)
//! Moving range:  CL = MR̄       UCL = MR̄ + 3·MR̄/d2       LCL = 0
//! ```
//!
//! with d2 = 1.128 (subgroup size 2). Fewer than two usable values yields
//! `ControlLimits::insufficient()` rather than an error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stats;

/// Default sigma multiplier for individual-value limits.
pub const DEFAULT_N_SIGMA: f64 = 3.0;

/// Unbiasing constant d2 for moving ranges of span 2.
pub const D2_SPAN_2: f64 = 1.128;

/// Minimum usable values for any control limit computation.
pub const MIN_CONTROL_SAMPLES: usize = 2;

/// Center line and control limits for one chart.
///
/// All fields are `None` when there was not enough data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlLimits {
    pub center_line: Option<f64>,
    pub upper_limit: Option<f64>,
    pub lower_limit: Option<f64>,
    pub sigma: Option<f64>,
}

impl ControlLimits {
    /// The "not enough data" sentinel.
    pub fn insufficient() -> Self {
        Self::default()
    }

    pub fn is_insufficient(&self) -> bool {
        self.center_line.is_none()
    }

    /// True when `value` lies strictly outside `[lower_limit, upper_limit]`.
    ///
    /// Always false for the insufficient sentinel.
    pub fn is_out_of_control(&self, value: f64) -> bool {
        match (self.lower_limit, self.upper_limit) {
            (Some(lcl), Some(ucl)) => value < lcl || value > ucl,
            _ => false,
        }
    }
}

/// Individual-value limits: `mean ± n_sigma · sample_std`.
///
/// The lower limit is clamped to 0 when it would be negative and every
/// observed value is non-negative (fill volumes, torque, counts).
pub fn compute_control_limits(values: &[f64], n_sigma: f64) -> ControlLimits {
    let data = stats::finite(values);
    if data.len() < MIN_CONTROL_SAMPLES {
        debug!(
            samples = data.len(),
            required = MIN_CONTROL_SAMPLES,
            "Insufficient data for control limits"
        );
        return ControlLimits::insufficient();
    }

    let (Some(center), Some(sigma)) = (stats::mean(&data), stats::sample_std(&data)) else {
        return ControlLimits::insufficient();
    };

    let upper = center + n_sigma * sigma;
    let mut lower = center - n_sigma * sigma;
    if lower < 0.0 && data.iter().all(|&v| v >= 0.0) {
        lower = 0.0;
    }

    ControlLimits {
        center_line: Some(center),
        upper_limit: Some(upper),
        lower_limit: Some(lower),
        sigma: Some(sigma),
    }
}

/// Absolute differences between consecutive usable values.
pub fn moving_ranges(values: &[f64]) -> Vec<f64> {
    let data = stats::finite(values);
    data.windows(2).map(|w| (w[1] - w[0]).abs()).collect()
}

/// Moving-range chart limits.
///
/// `sigma` reports the short-term estimate `MR̄ / d2`.
pub fn compute_moving_range_limits(values: &[f64]) -> ControlLimits {
    let ranges = moving_ranges(values);
    let Some(mr_mean) = stats::mean(&ranges) else {
        debug!(
            required = MIN_CONTROL_SAMPLES,
            "Insufficient data for moving-range limits"
        );
        return ControlLimits::insufficient();
    };

    ControlLimits {
        center_line: Some(mr_mean),
        upper_limit: Some(mr_mean + 3.0 * mr_mean / D2_SPAN_2),
        lower_limit: Some(0.0),
        sigma: Some(mr_mean / D2_SPAN_2),
    }
}

/// Indices of `values` that fall strictly outside the limits.
///
/// Indices refer to positions in `values` as given; missing values are
/// never flagged.
pub fn out_of_control_points(values: &[f64], limits: &ControlLimits) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite() && limits.is_out_of_control(**v))
        .map(|(i, _)| i)
        .collect()
}

/// Individuals + moving-range (I-MR) chart for one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlChart {
    pub individuals: ControlLimits,
    pub moving_range: ControlLimits,
    /// Usable values, in order.
    pub values: Vec<f64>,
    pub ranges: Vec<f64>,
    /// Indices into `values` outside the individuals limits.
    pub individual_violations: Vec<usize>,
    /// Indices into `ranges` outside the moving-range limits.
    pub range_violations: Vec<usize>,
}

impl ControlChart {
    pub fn build(values: &[f64], n_sigma: f64) -> Self {
        let data = stats::finite(values);
        let individuals = compute_control_limits(&data, n_sigma);
        let moving_range = compute_moving_range_limits(&data);
        let ranges = moving_ranges(&data);
        Self {
            individual_violations: out_of_control_points(&data, &individuals),
            range_violations: out_of_control_points(&ranges, &moving_range),
            individuals,
            moving_range,
            values: data,
            ranges,
        }
    }

    pub fn in_control(&self) -> bool {
        self.individual_violations.is_empty() && self.range_violations.is_empty()
    }
}
