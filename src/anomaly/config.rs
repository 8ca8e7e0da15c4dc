//! Per-parameter anomaly configuration management
//!
//! Configuration rows are only ever created or replaced through
//! `save_config`; the engine never deletes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AnomalyError;
use crate::storage::AnomalyStore;
use crate::types::{AnomalyConfig, DetectionMethod};

/// Default base z-score threshold for new configurations.
pub const DEFAULT_ALERT_THRESHOLD: f64 = 3.0;

/// Default sensitivity for new configurations.
pub const DEFAULT_SENSITIVITY: f64 = 0.8;

/// Operator-supplied settings for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSettings {
    pub parameter_name: String,
    pub enabled: bool,
    pub sensitivity: f64,
    /// Method name as entered; must parse to a [`DetectionMethod`].
    pub method: String,
    pub alert_threshold: f64,
}

impl ConfigSettings {
    pub fn new(parameter_name: &str) -> Self {
        Self {
            parameter_name: parameter_name.to_string(),
            enabled: true,
            sensitivity: DEFAULT_SENSITIVITY,
            method: DetectionMethod::Statistical.to_string(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }

    /// Check ranges and the method name.
    pub fn validate(&self) -> Result<DetectionMethod, AnomalyError> {
        let invalid = |reason: String| AnomalyError::InvalidConfig {
            parameter: self.parameter_name.clone(),
            reason,
        };
        if self.parameter_name.trim().is_empty() {
            return Err(invalid("parameter name must not be empty".to_string()));
        }
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 || self.sensitivity > 1.0 {
            return Err(invalid(format!(
                "sensitivity must be in (0, 1], got {}",
                self.sensitivity
            )));
        }
        if !self.alert_threshold.is_finite() || self.alert_threshold <= 0.0 {
            return Err(invalid(format!(
                "alert_threshold must be > 0, got {}",
                self.alert_threshold
            )));
        }
        Ok(self.method.parse::<DetectionMethod>()?)
    }
}

/// Validate and upsert a configuration row, stamping the editor and time.
///
/// The method is stored in its canonical spelling.
pub fn save_config(
    store: &dyn AnomalyStore,
    settings: &ConfigSettings,
    actor: &str,
    at: DateTime<Utc>,
) -> Result<AnomalyConfig, AnomalyError> {
    let method = settings.validate()?;
    let config = AnomalyConfig {
        parameter_name: settings.parameter_name.trim().to_string(),
        enabled: settings.enabled,
        sensitivity: settings.sensitivity,
        method: method.to_string(),
        alert_threshold: settings.alert_threshold,
        last_updated: at,
        updated_by: actor.to_string(),
    };
    store.upsert_config(&config)?;
    info!(
        parameter = %config.parameter_name,
        enabled = config.enabled,
        sensitivity = config.sensitivity,
        threshold = config.alert_threshold,
        updated_by = %actor,
        "Anomaly config saved"
    );
    Ok(config)
}

/// Configuration rows with `enabled = true`.
pub fn enabled_configs(store: &dyn AnomalyStore) -> Result<Vec<AnomalyConfig>, AnomalyError> {
    Ok(store
        .list_configs()?
        .into_iter()
        .filter(|c| c.enabled)
        .collect())
}
