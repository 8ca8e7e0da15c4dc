//! Process capability indices (Cp, Cpk, Pp, Ppk) and out-of-spec share
//!
//! ```text
//! Cp  = (USL - LSL) / 6σ
//! Cpu = (USL - x̄) / 3σ      Cpl = (x̄ - LSL) / 3σ
//! Cpk = min(Cpu, Cpl)
//! ```
//!
//! σ is the overall sample standard deviation. Line data carries no
//! rational subgrouping, so there is no separate within-subgroup estimate:
//! Pp and Ppk are reported equal to Cp and Cpk. This is a known
//! simplification, not a modelled short-term/long-term distinction.
//!
//! With a single specification limit only the matching one-sided index is
//! computed and it is reported for all four fields.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stats;
use crate::types::SpecLimits;

/// Minimum sample size for capability statistics.
pub const MIN_CAPABILITY_SAMPLES: usize = 10;

/// Descriptive statistics plus capability indices for one parameter.
///
/// Every field is `None` below `MIN_CAPABILITY_SAMPLES`. The indices are
/// also `None` when no specification limit is supplied or when σ is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResult {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub cp: Option<f64>,
    pub cpk: Option<f64>,
    pub pp: Option<f64>,
    pub ppk: Option<f64>,
    pub out_of_spec_percent: Option<f64>,
}

impl CapabilityResult {
    pub fn insufficient() -> Self {
        Self::default()
    }

    pub fn is_insufficient(&self) -> bool {
        self.mean.is_none()
    }

    /// Rating band for the computed Cpk, if any.
    pub fn rating(&self) -> Option<CapabilityRating> {
        self.cpk.map(classify_cpk)
    }
}

/// Capability bands used by reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityRating {
    /// Cpk < 1.0
    NotCapable,
    /// 1.0 <= Cpk < 1.33
    MarginallyCapable,
    /// 1.33 <= Cpk < 1.67
    Capable,
    /// Cpk >= 1.67
    HighlyCapable,
}

impl std::fmt::Display for CapabilityRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityRating::NotCapable => write!(f, "not capable"),
            CapabilityRating::MarginallyCapable => write!(f, "marginally capable"),
            CapabilityRating::Capable => write!(f, "capable"),
            CapabilityRating::HighlyCapable => write!(f, "highly capable"),
        }
    }
}

/// Classify a Cpk value into its rating band.
///
/// NaN falls into `NotCapable`.
pub fn classify_cpk(cpk: f64) -> CapabilityRating {
    if cpk >= 1.67 {
        CapabilityRating::HighlyCapable
    } else if cpk >= 1.33 {
        CapabilityRating::Capable
    } else if cpk >= 1.0 {
        CapabilityRating::MarginallyCapable
    } else {
        CapabilityRating::NotCapable
    }
}

/// Compute capability statistics for `values` against `limits`.
pub fn compute_capability(values: &[f64], limits: SpecLimits) -> CapabilityResult {
    let data = stats::finite(values);
    let n = data.len();
    if n < MIN_CAPABILITY_SAMPLES {
        debug!(
            samples = n,
            required = MIN_CAPABILITY_SAMPLES,
            "Insufficient data for capability analysis"
        );
        return CapabilityResult::insufficient();
    }

    let (Some(mean), Some(std)) = (stats::mean(&data), stats::sample_std(&data)) else {
        return CapabilityResult::insufficient();
    };
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut result = CapabilityResult {
        mean: Some(mean),
        std: Some(std),
        min: Some(min),
        max: Some(max),
        ..CapabilityResult::default()
    };

    if limits.is_empty() {
        return result;
    }

    result.out_of_spec_percent = Some(out_of_spec_percent(&data, limits));

    if std <= 0.0 || !std.is_finite() {
        debug!(mean, "Zero spread; capability indices undefined");
        return result;
    }

    let cpu = limits.usl.map(|usl| (usl - mean) / (3.0 * std));
    let cpl = limits.lsl.map(|lsl| (mean - lsl) / (3.0 * std));

    let (cp, cpk) = match (limits.lsl, limits.usl, cpu, cpl) {
        (Some(lsl), Some(usl), Some(cpu), Some(cpl)) => ((usl - lsl) / (6.0 * std), cpu.min(cpl)),
        (_, _, Some(one_sided), None) | (_, _, None, Some(one_sided)) => (one_sided, one_sided),
        _ => return result,
    };

    result.cp = Some(cp);
    result.cpk = Some(cpk);
    result.pp = Some(cp);
    result.ppk = Some(cpk);
    result
}

/// Percentage of values below LSL plus percentage above USL.
///
/// The two bounds are counted as independent masks and summed.
fn out_of_spec_percent(data: &[f64], limits: SpecLimits) -> f64 {
    let below = data.iter().filter(|&&v| limits.below_lower(v)).count();
    let above = data.iter().filter(|&&v| limits.above_upper(v)).count();
    100.0 * (below + above) as f64 / data.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centered(n: usize, mean: f64, half_spread: f64) -> Vec<f64> {
        (0..n)
            .map(|i| if i % 2 == 0 { mean - half_spread } else { mean + half_spread })
            .collect()
    }

    #[test]
    fn test_below_threshold_is_all_null() {
        let data = centered(9, 10.0, 0.5);
        let result = compute_capability(&data, SpecLimits::two_sided(8.0, 12.0));
        assert_eq!(result, CapabilityResult::insufficient());
    }

    #[test]
    fn test_exactly_threshold_is_computed() {
        let data = centered(10, 10.0, 0.5);
        let result = compute_capability(&data, SpecLimits::two_sided(8.0, 12.0));
        assert!(result.cp.is_some());
    }

    #[test]
    fn test_no_limits_descriptive_only() {
        let data = centered(12, 10.0, 0.5);
        let result = compute_capability(&data, SpecLimits::default());
        assert!(result.mean.is_some());
        assert_eq!(result.min, Some(9.5));
        assert_eq!(result.max, Some(10.5));
        assert!(result.cp.is_none());
        assert!(result.cpk.is_none());
        assert!(result.out_of_spec_percent.is_none());
    }

    #[test]
    fn test_upper_only_uses_cpu_everywhere() {
        let data = centered(10, 10.0, 0.5);
        let result = compute_capability(&data, SpecLimits::new(None, Some(12.0)));
        let std = result.std.unwrap();
        let cpu = (12.0 - 10.0) / (3.0 * std);
        for v in [result.cp, result.cpk, result.pp, result.ppk] {
            assert!((v.unwrap() - cpu).abs() < 1e-12);
        }
    }

    #[test]
    fn test_lower_only_uses_cpl_everywhere() {
        let data = centered(10, 10.0, 0.5);
        let result = compute_capability(&data, SpecLimits::new(Some(9.0), None));
        let std = result.std.unwrap();
        let cpl = (10.0 - 9.0) / (3.0 * std);
        assert!((result.cp.unwrap() - cpl).abs() < 1e-12);
        assert_eq!(result.cpk, result.ppk);
    }

    #[test]
    fn test_out_of_spec_counts_each_bound() {
        let mut data = vec![10.0; 8];
        data.push(7.0);
        data.push(13.0);
        let result = compute_capability(&data, SpecLimits::two_sided(8.0, 12.0));
        assert!((result.out_of_spec_percent.unwrap() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_spread_has_no_indices() {
        let data = vec![10.0; 15];
        let result = compute_capability(&data, SpecLimits::two_sided(8.0, 12.0));
        assert_eq!(result.std, Some(0.0));
        assert!(result.cpk.is_none());
        assert_eq!(result.out_of_spec_percent, Some(0.0));
    }

    #[test]
    fn test_rating_bands() {
        assert_eq!(classify_cpk(0.99), CapabilityRating::NotCapable);
        assert_eq!(classify_cpk(1.0), CapabilityRating::MarginallyCapable);
        assert_eq!(classify_cpk(1.33), CapabilityRating::Capable);
        assert_eq!(classify_cpk(1.66), CapabilityRating::Capable);
        assert_eq!(classify_cpk(1.67), CapabilityRating::HighlyCapable);
        assert_eq!(CapabilityRating::MarginallyCapable.to_string(), "marginally capable");
    }
}
