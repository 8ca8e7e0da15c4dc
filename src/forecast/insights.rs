//! Forecast interpretation: trend, stability and out-of-spec risk
//!
//! ```text
//! percent_change = (forecast_mean - historical_mean) / historical_mean · 100
//! cv_change      = cv_forecast - cv_historical            (percentage points)
//! ```
//!
//! | Signal | Rule |
//! |---|---|
//! | trend | `> 5%` increasing, `< -5%` decreasing, else stable |
//! | stability | `> 10` more variable, `< -10` more stable, else stable |
//! | out of spec | any forecast day below LSL or above USL |

use serde::{Deserialize, Serialize};

use super::engine::ForecastResult;
use super::models::ModelKind;
use crate::stats;
use crate::types::SpecLimits;

/// Percent change beyond which the level is trending.
pub const TREND_THRESHOLD_PERCENT: f64 = 5.0;

/// CV change (percentage points) beyond which variability has shifted.
pub const STABILITY_THRESHOLD_POINTS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityChange {
    MoreVariable,
    MoreStable,
    Stable,
}

impl std::fmt::Display for StabilityChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StabilityChange::MoreVariable => "more variable",
            StabilityChange::MoreStable => "more stable",
            StabilityChange::Stable => "stable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastInsights {
    pub model: ModelKind,
    pub historical_mean: f64,
    pub forecast_mean: f64,
    /// `None` when the historical mean is zero.
    pub percent_change: Option<f64>,
    pub trend_direction: TrendDirection,
    pub cv_historical: Option<f64>,
    pub cv_forecast: Option<f64>,
    pub cv_change: Option<f64>,
    pub stability: StabilityChange,
    pub lsl_violations: usize,
    pub usl_violations: usize,
    pub out_of_spec: bool,
}

pub fn classify_trend(percent_change: Option<f64>) -> TrendDirection {
    match percent_change {
        Some(p) if p > TREND_THRESHOLD_PERCENT => TrendDirection::Increasing,
        Some(p) if p < -TREND_THRESHOLD_PERCENT => TrendDirection::Decreasing,
        _ => TrendDirection::Stable,
    }
}

pub fn classify_stability(cv_change: Option<f64>) -> StabilityChange {
    match cv_change {
        Some(d) if d > STABILITY_THRESHOLD_POINTS => StabilityChange::MoreVariable,
        Some(d) if d < -STABILITY_THRESHOLD_POINTS => StabilityChange::MoreStable,
        _ => StabilityChange::Stable,
    }
}

/// Interpret the chosen model's forecast against the history.
///
/// Returns `None` when the result has no chosen model.
pub fn analyze_forecast_trends(
    result: &ForecastResult,
    limits: SpecLimits,
) -> Option<ForecastInsights> {
    let forecast = result.best_forecast()?;
    let history = result.original.values();

    let historical_mean = stats::mean(history)?;
    let forecast_mean = stats::mean(&forecast.values)?;
    let percent_change = (historical_mean != 0.0)
        .then(|| (forecast_mean - historical_mean) / historical_mean * 100.0);

    let cv_historical = stats::coefficient_of_variation(history);
    let cv_forecast = stats::coefficient_of_variation(&forecast.values);
    let cv_change = cv_historical.zip(cv_forecast).map(|(h, f)| f - h);

    let lsl_violations = forecast
        .values
        .iter()
        .filter(|v| limits.below_lower(**v))
        .count();
    let usl_violations = forecast
        .values
        .iter()
        .filter(|v| limits.above_upper(**v))
        .count();

    Some(ForecastInsights {
        model: forecast.model,
        historical_mean,
        forecast_mean,
        percent_change,
        trend_direction: classify_trend(percent_change),
        cv_historical,
        cv_forecast,
        cv_change,
        stability: classify_stability(cv_change),
        lsl_violations,
        usl_violations,
        out_of_spec: lsl_violations > 0 || usl_violations > 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{DailySeries, ModelForecast};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn result_with(history: Vec<f64>, forecast: Vec<f64>) -> ForecastResult {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let original = DailySeries::new("net_content", start, history);
        let dates = original.future_dates(forecast.len());
        let mut forecasts = BTreeMap::new();
        forecasts.insert(
            ModelKind::HoltLinear,
            ModelForecast {
                model: ModelKind::HoltLinear,
                dates,
                values: forecast.clone(),
                metadata: BTreeMap::new(),
            },
        );
        ForecastResult {
            original,
            horizon: forecast.len(),
            forecasts,
            best_model: Some(ModelKind::HoltLinear),
            holdout_mae: BTreeMap::new(),
            failures: BTreeMap::new(),
            validated: false,
        }
    }

    #[test]
    fn test_trend_bands() {
        assert_eq!(classify_trend(Some(5.1)), TrendDirection::Increasing);
        assert_eq!(classify_trend(Some(5.0)), TrendDirection::Stable);
        assert_eq!(classify_trend(Some(-5.1)), TrendDirection::Decreasing);
        assert_eq!(classify_trend(None), TrendDirection::Stable);
    }

    #[test]
    fn test_stability_bands() {
        assert_eq!(classify_stability(Some(10.5)), StabilityChange::MoreVariable);
        assert_eq!(classify_stability(Some(-10.5)), StabilityChange::MoreStable);
        assert_eq!(classify_stability(Some(9.0)), StabilityChange::Stable);
        assert_eq!(StabilityChange::MoreVariable.to_string(), "more variable");
    }

    #[test]
    fn test_increasing_forecast_out_of_spec() {
        let result = result_with(vec![500.0, 501.0, 499.0, 500.0], vec![520.0, 530.0, 540.0]);
        let insights =
            analyze_forecast_trends(&result, SpecLimits::two_sided(495.0, 525.0)).unwrap();
        assert_eq!(insights.trend_direction, TrendDirection::Increasing);
        assert_eq!(insights.usl_violations, 2);
        assert_eq!(insights.lsl_violations, 0);
        assert!(insights.out_of_spec);
    }

    #[test]
    fn test_zero_mean_history_is_stable() {
        let result = result_with(vec![-1.0, 1.0, -1.0, 1.0], vec![3.0, 3.0]);
        let insights = analyze_forecast_trends(&result, SpecLimits::default()).unwrap();
        assert_eq!(insights.percent_change, None);
        assert_eq!(insights.trend_direction, TrendDirection::Stable);
        assert!(!insights.out_of_spec);
    }

    #[test]
    fn test_no_best_model() {
        let mut result = result_with(vec![1.0, 2.0], vec![3.0]);
        result.best_model = None;
        assert!(analyze_forecast_trends(&result, SpecLimits::default()).is_none());
    }
}
