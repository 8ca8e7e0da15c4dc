//! Anomaly Engine
//!
//! Configurable per-parameter outlier detection over recent measurements,
//! with deduplicated alert persistence and an explicit alert lifecycle.
//!
//! ## Modules
//!
//! - `detection`: rolling z-score detector (pure)
//! - `config`: per-parameter configuration upserts
//! - `monitor`: one monitoring pass, dedup, alert insertion
//! - `alerts`: acknowledge / resolve transitions, summaries

pub mod alerts;
pub mod config;
pub mod detection;
pub mod monitor;

pub use alerts::{
    acknowledge_alert, alert_summary, open_alerts, resolve_alert, AlertSummary, TransitionOutcome,
};
pub use config::{
    enabled_configs, save_config, ConfigSettings, DEFAULT_ALERT_THRESHOLD, DEFAULT_SENSITIVITY,
};
pub use detection::{
    detect_statistical_anomalies, effective_threshold, rolling_window_size, AnomalyCandidate,
    MIN_DETECTION_SAMPLES,
};
pub use monitor::{
    AnomalyMonitor, FailedInsert, MonitorReport, SkipReason, SkippedParameter,
    DEDUP_WINDOW_MINUTES, DEFAULT_WINDOW_HOURS,
};

use crate::source::SourceError;
use crate::storage::StoreError;
use crate::types::UnsupportedMethod;

/// Errors raised by anomaly configuration, monitoring and alert operations.
#[derive(Debug, thiserror::Error)]
pub enum AnomalyError {
    #[error(transparent)]
    UnsupportedMethod(#[from] UnsupportedMethod),

    #[error("invalid anomaly config for '{parameter}': {reason}")]
    InvalidConfig { parameter: String, reason: String },

    #[error("anomaly store error: {0}")]
    Store(#[from] StoreError),

    #[error("measurement source error: {0}")]
    Source(#[from] SourceError),
}
