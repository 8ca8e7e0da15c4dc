//! Forecast Engine
//!
//! Daily-resampled forecasting with a small model portfolio and holdout
//! model selection.
//!
//! ## Pipeline
//!
//! 1. `prepare`: drop missing values, enforce a minimum sample count,
//!    average within each calendar day, forward-fill empty days
//! 2. `models`: moving average, Holt linear trend, ARIMA(1,1,0); each fit
//!    runs under its own wall-clock budget and may fail independently
//! 3. `engine`: 80/20 chronological split, per-model holdout MAE, best-model
//!    selection, refit on the full series
//! 4. `insights`: trend, stability and out-of-spec risk of the chosen forecast

pub mod engine;
pub mod insights;
pub mod models;
pub mod prepare;

pub use engine::{
    ForecastEngine, ForecastResult, ModelForecast, DEFAULT_FIT_BUDGET, DEFAULT_HORIZON_DAYS,
    MIN_TEST_POINTS, TRAIN_FRACTION,
};
pub use insights::{analyze_forecast_trends, ForecastInsights, StabilityChange, TrendDirection};
pub use models::{
    ArimaOneOneZero, FitBudget, ForecastModel, HoltLinear, ModelFit, ModelKind, MovingAverage,
    MAX_ABS_PHI,
};
pub use prepare::{
    prepare_series, prepare_time_series, DailySeries, MIN_SAMPLES_EXPLORATORY, MIN_SAMPLES_STRICT,
};

use std::collections::BTreeMap;

/// Why a single model could not produce a forecast.
///
/// Never fatal to a forecast run on its own; the engine records the
/// message and continues with the remaining models.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("needs at least {required} points, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("degenerate input: {0}")]
    Degenerate(String),

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("fit budget of {budget_ms} ms exhausted")]
    BudgetExhausted { budget_ms: u64 },
}

/// Errors from a whole forecast run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastError {
    #[error("insufficient data for forecasting: {available} points, need {required}")]
    InsufficientData { required: usize, available: usize },

    #[error("all forecast models failed: {}", describe_failures(.0))]
    AllModelsFailed(BTreeMap<ModelKind, String>),
}

fn describe_failures(failures: &BTreeMap<ModelKind, String>) -> String {
    failures
        .iter()
        .map(|(kind, reason)| format!("{kind}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}
