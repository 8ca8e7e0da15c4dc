//! Model evaluation and selection
//!
//! With `n` daily points, the first `floor(0.8 · n)` train and the rest are
//! held out. If fewer than `MIN_TEST_POINTS` would be held out, every model
//! trains on the full series and validation is skipped.
//!
//! Selection:
//! - validated: lowest holdout MAE, ties to the earlier model in the portfolio
//! - not validated: Holt linear, else moving average; ARIMA is never the
//!   unvalidated default
//!
//! Final forecasts are always refit on the full series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::models::{default_models, FitBudget, ForecastModel, ModelKind};
use super::prepare::DailySeries;
use super::{ForecastError, ModelError};
use crate::stats;

/// Share of the series used for training when validating.
pub const TRAIN_FRACTION: f64 = 0.8;

/// Smallest holdout that still counts as validation.
pub const MIN_TEST_POINTS: usize = 5;

pub const DEFAULT_HORIZON_DAYS: usize = 14;

/// Wall-clock allowance per model fit.
pub const DEFAULT_FIT_BUDGET: Duration = Duration::from_secs(2);

/// No-holdout preference order.
const UNVALIDATED_PREFERENCE: [ModelKind; 2] = [ModelKind::HoltLinear, ModelKind::MovingAverage];

/// One model's forecast over the calendar days after the last observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelForecast {
    pub model: ModelKind,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
    pub metadata: BTreeMap<String, f64>,
}

/// Everything a forecast run produced. Built per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub original: DailySeries,
    pub horizon: usize,
    /// Successful models only.
    pub forecasts: BTreeMap<ModelKind, ModelForecast>,
    pub best_model: Option<ModelKind>,
    /// Holdout MAE per model; empty when not validated.
    pub holdout_mae: BTreeMap<ModelKind, f64>,
    /// Failure reason per model that produced no forecast.
    pub failures: BTreeMap<ModelKind, String>,
    pub validated: bool,
}

impl ForecastResult {
    pub fn best_forecast(&self) -> Option<&ModelForecast> {
        self.best_model.and_then(|m| self.forecasts.get(&m))
    }
}

/// Runs the model portfolio over a prepared daily series.
pub struct ForecastEngine {
    models: Vec<Box<dyn ForecastModel>>,
    fit_budget: Duration,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastEngine {
    /// Moving average, Holt linear and ARIMA(1,1,0), in that order.
    pub fn new() -> Self {
        Self::with_models(default_models())
    }

    /// Custom portfolio; the vector order is the tie-break order.
    pub fn with_models(models: Vec<Box<dyn ForecastModel>>) -> Self {
        Self {
            models,
            fit_budget: DEFAULT_FIT_BUDGET,
        }
    }

    pub fn with_fit_budget(mut self, budget: Duration) -> Self {
        self.fit_budget = budget;
        self
    }

    pub fn forecast(
        &self,
        series: &DailySeries,
        horizon: usize,
    ) -> Result<ForecastResult, ForecastError> {
        if series.is_empty() || horizon == 0 {
            return Err(ForecastError::InsufficientData {
                required: 1,
                available: series.len(),
            });
        }

        let values = series.values();
        let n = values.len();
        let train_size = (TRAIN_FRACTION * n as f64).floor() as usize;
        let validated = n - train_size >= MIN_TEST_POINTS && train_size > 0;
        let dates = series.future_dates(horizon);

        let mut forecasts = BTreeMap::new();
        let mut holdout_mae = BTreeMap::new();
        let mut failures = BTreeMap::new();
        // successful models, portfolio order
        let mut ranked: Vec<(ModelKind, Option<f64>)> = Vec::new();

        for model in &self.models {
            let kind = model.kind();
            match self.evaluate(model.as_ref(), values, train_size, validated, horizon) {
                Ok((mae, fit)) => {
                    if let Some(mae) = mae {
                        holdout_mae.insert(kind, mae);
                    }
                    forecasts.insert(
                        kind,
                        ModelForecast {
                            model: kind,
                            dates: dates.clone(),
                            values: fit.forecast,
                            metadata: fit.metadata,
                        },
                    );
                    ranked.push((kind, mae));
                }
                Err(e) => {
                    warn!(
                        parameter = %series.name,
                        model = %kind,
                        error = %e,
                        "Forecast model failed; excluding from comparison"
                    );
                    failures.insert(kind, e.to_string());
                }
            }
        }

        if forecasts.is_empty() {
            return Err(ForecastError::AllModelsFailed(failures));
        }

        let best_model = if validated {
            select_by_mae(&ranked)
        } else {
            UNVALIDATED_PREFERENCE
                .iter()
                .copied()
                .find(|k| forecasts.contains_key(k))
        };
        if best_model.is_none() {
            warn!(
                parameter = %series.name,
                "No model eligible as the unvalidated default"
            );
        }

        info!(
            parameter = %series.name,
            days = n,
            horizon,
            validated,
            best = ?best_model,
            failed = failures.len(),
            "Forecast complete"
        );

        Ok(ForecastResult {
            original: series.clone(),
            horizon,
            forecasts,
            best_model,
            holdout_mae,
            failures,
            validated,
        })
    }

    /// Holdout MAE (when validating) and the full-series refit.
    fn evaluate(
        &self,
        model: &dyn ForecastModel,
        values: &[f64],
        train_size: usize,
        validated: bool,
        horizon: usize,
    ) -> Result<(Option<f64>, super::ModelFit), ModelError> {
        let mae = if validated {
            let (train, test) = values.split_at(train_size);
            let fit = model.fit_forecast(train, test.len(), &FitBudget::new(self.fit_budget))?;
            let mae = stats::mean_absolute_error(test, &fit.forecast)
                .ok_or(ModelError::NonFinite("holdout MAE"))?;
            debug!(model = %model.kind(), mae, "Holdout evaluated");
            Some(mae)
        } else {
            None
        };
        let fit = model.fit_forecast(values, horizon, &FitBudget::new(self.fit_budget))?;
        Ok((mae, fit))
    }
}

fn select_by_mae(ranked: &[(ModelKind, Option<f64>)]) -> Option<ModelKind> {
    let mut best: Option<(ModelKind, f64)> = None;
    for &(kind, mae) in ranked {
        let Some(mae) = mae else { continue };
        if best.map_or(true, |(_, b)| mae < b) {
            best = Some((kind, mae));
        }
    }
    best.map(|(kind, _)| kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::ModelFit;

    fn daily(values: Vec<f64>) -> DailySeries {
        DailySeries::new(
            "brix",
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            values,
        )
    }

    /// Always fails.
    struct Broken(ModelKind);

    impl ForecastModel for Broken {
        fn kind(&self) -> ModelKind {
            self.0
        }

        fn fit_forecast(&self, _: &[f64], _: usize, _: &FitBudget) -> Result<ModelFit, ModelError> {
            Err(ModelError::Degenerate("forced".to_string()))
        }
    }

    /// Flat forecast at a fixed level.
    struct Flat(ModelKind, f64);

    impl ForecastModel for Flat {
        fn kind(&self) -> ModelKind {
            self.0
        }

        fn fit_forecast(&self, _: &[f64], h: usize, _: &FitBudget) -> Result<ModelFit, ModelError> {
            Ok(ModelFit {
                forecast: vec![self.1; h],
                metadata: BTreeMap::new(),
            })
        }
    }

    #[test]
    fn test_split_and_validation_flag() {
        let engine = ForecastEngine::new();
        // 30 days -> 24 train / 6 test
        let result = engine.forecast(&daily((0..30).map(|i| 10.0 + 0.1 * i as f64).collect()), 7).unwrap();
        assert!(result.validated);
        assert!(!result.holdout_mae.is_empty());
        // 20 days -> 16 / 4, below the holdout minimum
        let result = engine.forecast(&daily((0..20).map(|i| 10.0 + 0.1 * i as f64).collect()), 7).unwrap();
        assert!(!result.validated);
        assert!(result.holdout_mae.is_empty());
    }

    #[test]
    fn test_forecast_dates_follow_series() {
        let result = ForecastEngine::new().forecast(&daily(vec![1.0, 2.0, 3.0, 4.0]), 3).unwrap();
        let fc = result.best_forecast().unwrap();
        assert_eq!(fc.dates[0], NaiveDate::from_ymd_opt(2026, 2, 5).unwrap());
        assert_eq!(fc.values.len(), 3);
    }

    #[test]
    fn test_tie_goes_to_first_model() {
        let engine = ForecastEngine::with_models(vec![
            Box::new(Flat(ModelKind::MovingAverage, 10.0)),
            Box::new(Flat(ModelKind::HoltLinear, 10.0)),
        ]);
        let result = engine.forecast(&daily(vec![10.0; 30]), 5).unwrap();
        assert_eq!(result.best_model, Some(ModelKind::MovingAverage));
    }

    #[test]
    fn test_lowest_mae_wins() {
        let engine = ForecastEngine::with_models(vec![
            Box::new(Flat(ModelKind::MovingAverage, 12.0)),
            Box::new(Flat(ModelKind::HoltLinear, 9.0)),
            Box::new(Flat(ModelKind::Arima, 10.1)),
        ]);
        let result = engine.forecast(&daily(vec![10.0; 30]), 5).unwrap();
        assert_eq!(result.best_model, Some(ModelKind::Arima));
        assert!((result.holdout_mae[&ModelKind::Arima] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_unvalidated_never_defaults_to_arima() {
        let engine = ForecastEngine::with_models(vec![
            Box::new(Broken(ModelKind::MovingAverage)),
            Box::new(Broken(ModelKind::HoltLinear)),
            Box::new(Flat(ModelKind::Arima, 1.0)),
        ]);
        let result = engine.forecast(&daily(vec![1.0; 8]), 3).unwrap();
        assert!(!result.validated);
        assert_eq!(result.best_model, None);
        assert!(result.forecasts.contains_key(&ModelKind::Arima));
    }

    #[test]
    fn test_unvalidated_falls_back_to_moving_average() {
        let engine = ForecastEngine::with_models(vec![
            Box::new(Flat(ModelKind::MovingAverage, 1.0)),
            Box::new(Broken(ModelKind::HoltLinear)),
        ]);
        let result = engine.forecast(&daily(vec![1.0; 8]), 3).unwrap();
        assert_eq!(result.best_model, Some(ModelKind::MovingAverage));
        assert!(result.failures.contains_key(&ModelKind::HoltLinear));
    }

    #[test]
    fn test_all_models_failed() {
        let engine = ForecastEngine::with_models(vec![Box::new(Broken(ModelKind::HoltLinear))]);
        let err = engine.forecast(&daily(vec![1.0; 8]), 3).unwrap_err();
        assert!(matches!(err, ForecastError::AllModelsFailed(ref f) if f.len() == 1));
    }

    #[test]
    fn test_empty_series() {
        let err = ForecastEngine::new().forecast(&daily(Vec::new()), 3).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData { available: 0, .. }));
    }
}
