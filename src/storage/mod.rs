//! Anomaly configuration and alert persistence
//!
//! `AnomalyStore` abstracts the two tables the anomaly engine touches so
//! backends can be swapped without touching detection code:
//! - `InMemoryStore`: `RwLock`-guarded maps for tests and dry runs
//! - `SledStore`: named sled trees, JSON rows, compare-and-swap updates
//!
//! Every mutation is a single-row upsert, insert or conditional update.
//! No multi-row transaction is assumed from any backend.

mod memory;
mod sled_store;

pub use memory::InMemoryStore;
pub use sled_store::SledStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AlertStatus, AlertUpdate, AnomalyAlert, AnomalyConfig};

/// Persistence failures, split by how a caller should react.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The backend could not be reached or failed an I/O operation.
    #[error("storage unavailable: {0}")]
    Connection(String),
    /// The write would violate a key or uniqueness constraint.
    #[error("constraint violation: {0}")]
    Constraint(String),
    /// A stored row could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Filter for alert range queries. Bounds are inclusive; empty `statuses`
/// matches every status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertQuery {
    pub parameter: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub statuses: Vec<AlertStatus>,
}

impl AlertQuery {
    pub fn for_parameter(parameter: &str) -> Self {
        Self {
            parameter: Some(parameter.to_string()),
            ..Self::default()
        }
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn with_status(mut self, status: AlertStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn matches(&self, alert: &AnomalyAlert) -> bool {
        if let Some(ref p) = self.parameter {
            if &alert.parameter_name != p {
                return false;
            }
        }
        if self.start.is_some_and(|s| alert.timestamp < s) {
            return false;
        }
        if self.end.is_some_and(|e| alert.timestamp > e) {
            return false;
        }
        self.statuses.is_empty() || self.statuses.contains(&alert.status)
    }
}

/// Store for anomaly configuration rows and alert rows.
///
/// Implementations must be thread-safe (Send + Sync).
pub trait AnomalyStore: Send + Sync {
    /// Create or replace the configuration row for `config.parameter_name`.
    fn upsert_config(&self, config: &AnomalyConfig) -> Result<(), StoreError>;

    fn get_config(&self, parameter: &str) -> Result<Option<AnomalyConfig>, StoreError>;

    /// All configuration rows, ordered by parameter name.
    fn list_configs(&self) -> Result<Vec<AnomalyConfig>, StoreError>;

    /// Insert a new alert. An existing `alert_id` is a `Constraint` error.
    fn insert_alert(&self, alert: &AnomalyAlert) -> Result<(), StoreError>;

    fn get_alert(&self, alert_id: &str) -> Result<Option<AnomalyAlert>, StoreError>;

    /// Alerts matching `query`, oldest first.
    fn query_alerts(&self, query: &AlertQuery) -> Result<Vec<AnomalyAlert>, StoreError>;

    /// Apply `update` only if the alert's current status is in `allowed`.
    ///
    /// Returns `Ok(None)` when the guard fails (row untouched) and
    /// `Err(NotFound)` when no such alert exists.
    fn update_alert_if_status(
        &self,
        alert_id: &str,
        allowed: &[AlertStatus],
        update: &AlertUpdate,
    ) -> Result<Option<AnomalyAlert>, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn alert_at(minutes: i64, status: AlertStatus) -> AnomalyAlert {
        AnomalyAlert {
            alert_id: format!("a-{minutes}"),
            parameter_name: "brix".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
                + Duration::minutes(minutes),
            observed_value: 11.2,
            expected_value: 10.5,
            deviation_score: 3.4,
            status,
            acknowledged_by: None,
            acknowledged_time: None,
            notes: None,
        }
    }

    #[test]
    fn test_query_bounds_are_inclusive() {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let q = AlertQuery::for_parameter("brix").between(base, base + Duration::minutes(60));
        assert!(q.matches(&alert_at(0, AlertStatus::New)));
        assert!(q.matches(&alert_at(60, AlertStatus::New)));
        assert!(!q.matches(&alert_at(61, AlertStatus::New)));
    }

    #[test]
    fn test_query_status_filter() {
        let q = AlertQuery::default().with_status(AlertStatus::New);
        assert!(q.matches(&alert_at(0, AlertStatus::New)));
        assert!(!q.matches(&alert_at(0, AlertStatus::Resolved)));
        assert!(!AlertQuery::for_parameter("torque").matches(&alert_at(0, AlertStatus::New)));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(StoreError::Connection("io".into()).is_retryable());
        assert!(!StoreError::NotFound("x".into()).is_retryable());
        assert!(!StoreError::Constraint("dup".into()).is_retryable());
    }
}
