//! Persisted anomaly-monitoring rows: per-parameter configuration and alerts
//!
//! Field names and value encodings match the stored table layouts so rows
//! written by earlier deployments deserialize unchanged (status and method
//! are plain lowercase strings on disk).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Configuration
// ============================================================================

/// Supported detection methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Rolling z-score against a trailing window.
    Statistical,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Statistical => "statistical",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored method string that names no supported detection method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported detection method '{0}'")]
pub struct UnsupportedMethod(pub String);

impl FromStr for DetectionMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "statistical" => Ok(DetectionMethod::Statistical),
            _ => Err(UnsupportedMethod(s.to_string())),
        }
    }
}

/// Monitoring configuration for one parameter (keyed by `parameter_name`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    pub parameter_name: String,
    pub enabled: bool,
    /// In (0, 1]; higher sensitivity lowers the effective threshold.
    pub sensitivity: f64,
    /// Raw method string as stored; see [`AnomalyConfig::detection_method`].
    pub method: String,
    /// Base z-score threshold before the sensitivity adjustment.
    pub alert_threshold: f64,
    pub last_updated: DateTime<Utc>,
    pub updated_by: String,
}

impl AnomalyConfig {
    /// Parse the stored method string.
    pub fn detection_method(&self) -> Result<DetectionMethod, UnsupportedMethod> {
        self.method.parse()
    }
}

// ============================================================================
// Alerts
// ============================================================================

/// Alert lifecycle: `new → acknowledged → resolved`, or `new → resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    New,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, AlertStatus::Resolved)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(AlertStatus::New),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("unknown alert status '{other}'")),
        }
    }
}

/// A persisted anomaly alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub alert_id: String,
    pub parameter_name: String,
    /// Timestamp of the anomalous measurement.
    pub timestamp: DateTime<Utc>,
    pub observed_value: f64,
    pub expected_value: f64,
    pub deviation_score: f64,
    pub status: AlertStatus,
    #[serde(default)]
    pub acknowledged_by: Option<String>,
    #[serde(default)]
    pub acknowledged_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A status transition requested by an operator.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertUpdate {
    Acknowledge {
        actor: String,
        at: DateTime<Utc>,
        notes: Option<String>,
    },
    Resolve {
        actor: String,
        at: DateTime<Utc>,
        resolution: String,
    },
}

impl AlertUpdate {
    /// Statuses from which this transition is permitted.
    pub fn allowed_from(&self) -> &'static [AlertStatus] {
        match self {
            AlertUpdate::Acknowledge { .. } => &[AlertStatus::New],
            AlertUpdate::Resolve { .. } => &[AlertStatus::New, AlertStatus::Acknowledged],
        }
    }

    pub fn target(&self) -> AlertStatus {
        match self {
            AlertUpdate::Acknowledge { .. } => AlertStatus::Acknowledged,
            AlertUpdate::Resolve { .. } => AlertStatus::Resolved,
        }
    }

    /// Produce the updated row. Does not check the guard.
    ///
    /// Resolution keeps prior notes and appends a `Resolution: ...` line.
    /// A direct `new → resolved` records the resolver as the acknowledger.
    pub fn apply(&self, alert: &AnomalyAlert) -> AnomalyAlert {
        let mut updated = alert.clone();
        updated.status = self.target();
        match self {
            AlertUpdate::Acknowledge { actor, at, notes } => {
                updated.acknowledged_by = Some(actor.clone());
                updated.acknowledged_time = Some(*at);
                if let Some(n) = notes {
                    updated.notes = Some(n.clone());
                }
            }
            AlertUpdate::Resolve {
                actor,
                at,
                resolution,
            } => {
                if updated.acknowledged_by.is_none() {
                    updated.acknowledged_by = Some(actor.clone());
                    updated.acknowledged_time = Some(*at);
                }
                let line = format!("Resolution: {resolution}");
                updated.notes = Some(match alert.notes.as_deref() {
                    Some(prior) if !prior.is_empty() => format!("{prior}\n{line}"),
                    _ => line,
                });
            }
        }
        updated
    }
}
