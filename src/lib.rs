//! Linewatch: Quality Monitoring for Beverage Production Lines
//!
//! Statistical engines that turn raw line measurements (torque, BRIX, net
//! content, pass/fail checks) into actionable signals.
//!
//! ## Architecture
//!
//! - **Control limits** (`spc::control_limits`): individual and moving-range limits
//! - **Capability** (`spc::capability`): Cp/Cpk/Pp/Ppk against spec limits
//! - **Anomaly engine** (`anomaly`): rolling z-score detection, deduplicated
//!   alerts, alert lifecycle
//! - **Forecast engine** (`forecast`): daily resampling, model portfolio,
//!   holdout selection, trend interpretation
//!
//! Engines borrow their input read-only. The only mutable state is the
//! anomaly configuration and alert rows behind [`storage::AnomalyStore`];
//! measurements come from a [`source::MeasurementSource`].

pub mod anomaly;
pub mod config;
pub mod forecast;
pub mod source;
pub mod spc;
pub mod stats;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::LinewatchConfig;

// Re-export commonly used types
pub use types::{
    AlertStatus, AnomalyAlert, AnomalyConfig, DetectionMethod, FieldValue, Filters,
    MeasurementSeries, Record, RecordTable, SpecLimits,
};

// Re-export engines
pub use anomaly::{AnomalyError, AnomalyMonitor, MonitorReport};
pub use forecast::{ForecastEngine, ForecastError, ForecastResult};
pub use spc::{compute_capability, compute_control_limits, CapabilityResult, ControlLimits};

// Re-export collaborators
pub use source::{CsvSource, InMemorySource, MeasurementSource, SourceError};
pub use storage::{AnomalyStore, InMemoryStore, SledStore, StoreError};
