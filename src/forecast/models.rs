//! Forecast models
//!
//! Every model implements [`ForecastModel`]: fit on a history slice and
//! return `horizon` point forecasts. Models are stateless between calls.
//!
//! | Model | Fit | Forecast |
//! |---|---|---|
//! | `MovingAverage` | mean of the last `min(7, n)` points | flat |
//! | `HoltLinear` | grid search α, β ∈ [0.05, 0.95] minimising one-step SSE | `level + h · trend` |
//! | `ArimaOneOneZero` | AR(1) on first differences, least squares, no constant | integrated AR(1) decay |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

use super::ModelError;

// ============================================================================
// Model identity
// ============================================================================

/// Models in their fixed evaluation order (ties go to the earlier one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    MovingAverage,
    HoltLinear,
    Arima,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::MovingAverage, ModelKind::HoltLinear, ModelKind::Arima];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::MovingAverage => "moving_average",
            ModelKind::HoltLinear => "holt_linear",
            ModelKind::Arima => "arima",
        }
    }

    /// Human-readable label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::MovingAverage => "Moving Average (7)",
            ModelKind::HoltLinear => "Exponential Smoothing (additive trend)",
            ModelKind::Arima => "ARIMA(1,1,0)",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Fit budget
// ============================================================================

/// Wall-clock allowance for one model fit.
#[derive(Debug, Clone, Copy)]
pub struct FitBudget {
    started: Instant,
    limit: Option<Duration>,
}

impl FitBudget {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(limit),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.limit.is_some_and(|l| self.started.elapsed() >= l)
    }

    /// `Err(BudgetExhausted)` once the allowance has elapsed.
    pub fn check(&self) -> Result<(), ModelError> {
        match self.limit {
            Some(limit) if self.started.elapsed() >= limit => Err(ModelError::BudgetExhausted {
                budget_ms: limit.as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Model trait
// ============================================================================

/// Point forecasts plus fitted parameters for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFit {
    pub forecast: Vec<f64>,
    pub metadata: BTreeMap<String, f64>,
}

pub trait ForecastModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Fit on `history` and forecast the next `horizon` steps.
    fn fit_forecast(
        &self,
        history: &[f64],
        horizon: usize,
        budget: &FitBudget,
    ) -> Result<ModelFit, ModelError>;
}

fn require(history: &[f64], required: usize) -> Result<(), ModelError> {
    if history.len() < required {
        return Err(ModelError::InsufficientData {
            required,
            available: history.len(),
        });
    }
    if history.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite("history"));
    }
    Ok(())
}

fn finite_forecast(forecast: Vec<f64>) -> Result<Vec<f64>, ModelError> {
    if forecast.iter().all(|v| v.is_finite()) {
        Ok(forecast)
    } else {
        Err(ModelError::NonFinite("forecast"))
    }
}

// ============================================================================
// Moving average
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct MovingAverage {
    pub window: usize,
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self { window: 7 }
    }
}

impl ForecastModel for MovingAverage {
    fn kind(&self) -> ModelKind {
        ModelKind::MovingAverage
    }

    fn fit_forecast(
        &self,
        history: &[f64],
        horizon: usize,
        _budget: &FitBudget,
    ) -> Result<ModelFit, ModelError> {
        require(history, 1)?;
        let window = self.window.max(1).min(history.len());
        let tail = &history[history.len() - window..];
        let level = tail.iter().sum::<f64>() / window as f64;

        let mut metadata = BTreeMap::new();
        metadata.insert("window".to_string(), window as f64);
        metadata.insert("level".to_string(), level);
        Ok(ModelFit {
            forecast: finite_forecast(vec![level; horizon])?,
            metadata,
        })
    }
}

// ============================================================================
// Holt linear trend
// ============================================================================

/// Additive-trend exponential smoothing, no seasonality.
///
/// Initial state: `level = x0`, `trend = x1 - x0`.
#[derive(Debug, Clone, Copy)]
pub struct HoltLinear {
    pub grid_step: f64,
}

impl Default for HoltLinear {
    fn default() -> Self {
        Self { grid_step: 0.05 }
    }
}

impl HoltLinear {
    /// Final (level, trend) and one-step SSE for fixed smoothing weights.
    fn run(history: &[f64], alpha: f64, beta: f64) -> (f64, f64, f64) {
        let mut level = history[0];
        let mut trend = history[1] - history[0];
        let mut sse = 0.0;
        for &x in &history[1..] {
            let predicted = level + trend;
            sse += (x - predicted).powi(2);
            let prev_level = level;
            level = alpha * x + (1.0 - alpha) * (level + trend);
            trend = beta * (level - prev_level) + (1.0 - beta) * trend;
        }
        (level, trend, sse)
    }

    fn grid(&self) -> Vec<f64> {
        let step = if self.grid_step > 0.0 && self.grid_step < 1.0 {
            self.grid_step
        } else {
            0.05
        };
        let steps = (0.95 / step + 1e-9).floor() as usize;
        (1..=steps)
            .map(|i| i as f64 * step)
            .filter(|w| *w <= 0.95 + 1e-9)
            .collect()
    }
}

impl ForecastModel for HoltLinear {
    fn kind(&self) -> ModelKind {
        ModelKind::HoltLinear
    }

    fn fit_forecast(
        &self,
        history: &[f64],
        horizon: usize,
        budget: &FitBudget,
    ) -> Result<ModelFit, ModelError> {
        require(history, 3)?;
        let grid = self.grid();

        // (sse, alpha, beta, level, trend)
        let mut best: Option<(f64, f64, f64, f64, f64)> = None;
        for &alpha in &grid {
            budget.check()?;
            for &beta in &grid {
                let (level, trend, sse) = Self::run(history, alpha, beta);
                if !sse.is_finite() {
                    continue;
                }
                if best.map_or(true, |(b, ..)| sse < b) {
                    best = Some((sse, alpha, beta, level, trend));
                }
            }
        }

        let (sse, alpha, beta, level, trend) = best.ok_or(ModelError::NonFinite("smoothing SSE"))?;
        let forecast = (1..=horizon).map(|h| level + h as f64 * trend).collect();

        let mut metadata = BTreeMap::new();
        metadata.insert("alpha".to_string(), alpha);
        metadata.insert("beta".to_string(), beta);
        metadata.insert("level".to_string(), level);
        metadata.insert("trend".to_string(), trend);
        metadata.insert("sse".to_string(), sse);
        Ok(ModelFit {
            forecast: finite_forecast(forecast)?,
            metadata,
        })
    }
}

// ============================================================================
// ARIMA(1,1,0)
// ============================================================================

/// ARIMA(1,1,0) without constant.
///
/// On the differenced series `d_t = y_t - y_{t-1}`:
///
/// ```text
/// φ = Σ d_t · d_{t-1} / Σ d_{t-1}²
/// d̂_{n+h} = φ^h · d_n
/// ŷ_{n+h} = ŷ_{n+h-1} + d̂_{n+h}
/// ```
///
/// Fails when the differenced series has no variation (φ undefined). A
/// fitted |φ| ≥ 1 is clamped to [`MAX_ABS_PHI`] and the raw estimate is
/// kept in the `fitted_phi` metadata entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArimaOneOneZero;

/// Largest |φ| an ARIMA fit may use.
pub const MAX_ABS_PHI: f64 = 0.999;

impl ForecastModel for ArimaOneOneZero {
    fn kind(&self) -> ModelKind {
        ModelKind::Arima
    }

    fn fit_forecast(
        &self,
        history: &[f64],
        horizon: usize,
        budget: &FitBudget,
    ) -> Result<ModelFit, ModelError> {
        require(history, 3)?;
        let diffs: Vec<f64> = history.windows(2).map(|w| w[1] - w[0]).collect();

        let numerator: f64 = diffs.windows(2).map(|w| w[1] * w[0]).sum();
        let denominator: f64 = diffs[..diffs.len() - 1].iter().map(|d| d * d).sum();
        if denominator <= f64::EPSILON {
            return Err(ModelError::Degenerate(
                "differenced series has no variation".to_string(),
            ));
        }
        budget.check()?;

        let phi = numerator / denominator;
        if !phi.is_finite() {
            return Err(ModelError::NonFinite("phi"));
        }
        // Pull unit-root and explosive fits just inside the stationary region.
        let fitted_phi = phi;
        let phi = phi.clamp(-MAX_ABS_PHI, MAX_ABS_PHI);
        let clamped = phi != fitted_phi;
        if clamped {
            debug!(fitted_phi, phi, "ARIMA phi clamped to stationary region");
        }

        let residuals: Vec<f64> = diffs.windows(2).map(|w| w[1] - phi * w[0]).collect();
        let sigma2 = residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64;

        let mut level = history[history.len() - 1];
        let mut diff = diffs[diffs.len() - 1];
        let mut forecast = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            diff *= phi;
            level += diff;
            forecast.push(level);
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("phi".to_string(), phi);
        metadata.insert("sigma2".to_string(), sigma2);
        if clamped {
            metadata.insert("fitted_phi".to_string(), fitted_phi);
        }
        Ok(ModelFit {
            forecast: finite_forecast(forecast)?,
            metadata,
        })
    }
}

/// The default portfolio, in evaluation order.
pub fn default_models() -> Vec<Box<dyn ForecastModel>> {
    vec![
        Box::new(MovingAverage::default()),
        Box::new(HoltLinear::default()),
        Box::new(ArimaOneOneZero),
    ]
}
