//! Continuous anomaly monitoring with deduplicated alerting
//!
//! One run of [`AnomalyMonitor::detect_anomalies`]:
//! 1. load every enabled configuration row
//! 2. query the last `window_hours` of measurements once
//! 3. per parameter, run the configured detector
//! 4. per candidate, look for an alert on the same parameter within the
//!    preceding hour of the candidate's timestamp; persist only if none
//!
//! The dedup window is a fixed hour, independent of the lookback window.
//! If the dedup lookup itself fails the candidate is treated as a duplicate
//! (fail closed): a missed alert is re-raised on the next run, spam is not
//! recalled.
//!
//! Within a run, the dedup check for a candidate happens before its insert.
//! Two runs executing concurrently can still race between check and insert;
//! schedulers that may overlap runs must hold an external lock keyed by
//! parameter name.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::detection::{detect_statistical_anomalies, AnomalyCandidate, MIN_DETECTION_SAMPLES};
use super::config::enabled_configs;
use super::AnomalyError;
use crate::source::MeasurementSource;
use crate::storage::{AlertQuery, AnomalyStore, StoreError};
use crate::types::{AlertStatus, AnomalyAlert, DetectionMethod, Filters};

/// Default lookback for a monitoring run.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Span within which a repeated signal on the same parameter is suppressed.
pub const DEDUP_WINDOW_MINUTES: i64 = 60;

pub fn dedup_window() -> Duration {
    Duration::minutes(DEDUP_WINDOW_MINUTES)
}

/// Why a configured parameter produced no candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    UnsupportedMethod { method: String },
    InsufficientData { samples: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedParameter {
    pub parameter: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedInsert {
    pub parameter: String,
    pub timestamp: DateTime<Utc>,
    pub error: StoreError,
}

/// Outcome of one monitoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub run_at: DateTime<Utc>,
    pub window_hours: i64,
    pub parameters_checked: usize,
    /// Newly persisted alerts, in detection order.
    pub alerts: Vec<AnomalyAlert>,
    /// Candidates dropped as duplicates (including fail-closed lookups).
    pub suppressed: usize,
    pub skipped: Vec<SkippedParameter>,
    /// Alerts that could not be written; the caller decides whether to retry.
    pub failed_inserts: Vec<FailedInsert>,
}

impl MonitorReport {
    fn new(run_at: DateTime<Utc>, window_hours: i64) -> Self {
        Self {
            run_at,
            window_hours,
            parameters_checked: 0,
            alerts: Vec::new(),
            suppressed: 0,
            skipped: Vec::new(),
            failed_inserts: Vec::new(),
        }
    }
}

/// Runs configured detectors against a measurement source and records alerts.
#[derive(Clone)]
pub struct AnomalyMonitor {
    source: Arc<dyn MeasurementSource>,
    store: Arc<dyn AnomalyStore>,
    filters: Filters,
}

impl AnomalyMonitor {
    pub fn new(source: Arc<dyn MeasurementSource>, store: Arc<dyn AnomalyStore>) -> Self {
        Self {
            source,
            store,
            filters: Filters::default(),
        }
    }

    /// Restrict the measurement query (e.g. to one product).
    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn store(&self) -> &dyn AnomalyStore {
        self.store.as_ref()
    }

    /// Run one monitoring pass over the last `window_hours`, ending now.
    pub fn detect_anomalies(&self, window_hours: i64) -> Result<MonitorReport, AnomalyError> {
        self.detect_anomalies_at(Utc::now(), window_hours)
    }

    /// Run one monitoring pass over `[now - window_hours, now)`.
    ///
    /// Fails only when the configuration rows or the measurement window
    /// cannot be read; per-candidate persistence failures are reported in
    /// the returned [`MonitorReport`].
    pub fn detect_anomalies_at(
        &self,
        now: DateTime<Utc>,
        window_hours: i64,
    ) -> Result<MonitorReport, AnomalyError> {
        let mut report = MonitorReport::new(now, window_hours);

        let configs = enabled_configs(self.store.as_ref())?;
        if configs.is_empty() {
            debug!("No enabled anomaly configs; nothing to monitor");
            return Ok(report);
        }

        let start = now - Duration::hours(window_hours);
        let table = self
            .source
            .query_measurements(start, now, &self.filters)?;
        debug!(
            source = self.source.source_name(),
            records = table.len(),
            parameters = configs.len(),
            "Monitoring window loaded"
        );

        for config in &configs {
            report.parameters_checked += 1;

            let method = match config.detection_method() {
                Ok(m) => m,
                Err(e) => {
                    error!(
                        parameter = %config.parameter_name,
                        error = %e,
                        "Skipping parameter with unsupported detection method"
                    );
                    report.skipped.push(SkippedParameter {
                        parameter: config.parameter_name.clone(),
                        reason: SkipReason::UnsupportedMethod {
                            method: config.method.clone(),
                        },
                    });
                    continue;
                }
            };

            let series = table.series(&config.parameter_name);
            let samples = series.present().len();
            if samples < MIN_DETECTION_SAMPLES {
                report.skipped.push(SkippedParameter {
                    parameter: config.parameter_name.clone(),
                    reason: SkipReason::InsufficientData { samples },
                });
                continue;
            }

            let candidates = match method {
                DetectionMethod::Statistical => detect_statistical_anomalies(
                    &series,
                    config.sensitivity,
                    config.alert_threshold,
                ),
            };

            for candidate in candidates {
                self.record_candidate(&config.parameter_name, &candidate, &mut report);
            }
        }

        info!(
            checked = report.parameters_checked,
            new_alerts = report.alerts.len(),
            suppressed = report.suppressed,
            skipped = report.skipped.len(),
            failed = report.failed_inserts.len(),
            "Anomaly monitoring run complete"
        );

        Ok(report)
    }

    fn record_candidate(
        &self,
        parameter: &str,
        candidate: &AnomalyCandidate,
        report: &mut MonitorReport,
    ) {
        if self.is_duplicate(parameter, candidate.timestamp) {
            debug!(
                parameter,
                timestamp = %candidate.timestamp,
                "Suppressing duplicate anomaly"
            );
            report.suppressed += 1;
            return;
        }

        let alert = AnomalyAlert {
            alert_id: Uuid::new_v4().to_string(),
            parameter_name: parameter.to_string(),
            timestamp: candidate.timestamp,
            observed_value: candidate.observed_value,
            expected_value: candidate.expected_value,
            deviation_score: candidate.deviation_score,
            status: AlertStatus::New,
            acknowledged_by: None,
            acknowledged_time: None,
            notes: None,
        };

        match self.store.insert_alert(&alert) {
            Ok(()) => {
                info!(
                    alert_id = %alert.alert_id,
                    parameter,
                    observed = alert.observed_value,
                    expected = alert.expected_value,
                    score = alert.deviation_score,
                    "Anomaly alert raised"
                );
                report.alerts.push(alert);
            }
            Err(e) => {
                warn!(parameter, error = %e, "Failed to persist anomaly alert");
                report.failed_inserts.push(FailedInsert {
                    parameter: parameter.to_string(),
                    timestamp: candidate.timestamp,
                    error: e,
                });
            }
        }
    }

    /// Whether an alert for `parameter` exists in `[timestamp - 1h, timestamp]`.
    ///
    /// Lookup failures count as a duplicate.
    fn is_duplicate(&self, parameter: &str, timestamp: DateTime<Utc>) -> bool {
        let query = AlertQuery::for_parameter(parameter).between(timestamp - dedup_window(), timestamp);
        match self.store.query_alerts(&query) {
            Ok(existing) => !existing.is_empty(),
            Err(e) => {
                warn!(
                    parameter,
                    error = %e,
                    "Dedup lookup failed; assuming duplicate"
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{save_config, ConfigSettings};
    use crate::source::InMemorySource;
    use crate::storage::InMemoryStore;
    use crate::types::{AnomalyConfig, Record};

    fn spiky_source(now: DateTime<Utc>) -> InMemorySource {
        // 30 points, 10 minutes apart, ending just before `now`.
        let records = (0..30)
            .map(|i| {
                let ts = now - Duration::minutes(10 * (30 - i));
                let torque = if i == 22 {
                    26.0
                } else if i % 2 == 0 {
                    18.0
                } else {
                    18.2
                };
                Record::new(ts).with("torque", torque).with("brix", 10.5)
            })
            .collect();
        InMemorySource::new(records)
    }

    fn monitor_with(store: Arc<InMemoryStore>, now: DateTime<Utc>) -> AnomalyMonitor {
        AnomalyMonitor::new(Arc::new(spiky_source(now)), store)
    }

    fn enable(store: &InMemoryStore, parameter: &str, threshold: f64) {
        let mut settings = ConfigSettings::new(parameter);
        settings.alert_threshold = threshold;
        settings.sensitivity = 1.0;
        save_config(store, &settings, "qa", Utc::now()).unwrap();
    }

    #[test]
    fn test_no_configs_no_work() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        let report = monitor_with(store, now).detect_anomalies_at(now, 24).unwrap();
        assert_eq!(report.parameters_checked, 0);
        assert!(report.alerts.is_empty());
    }

    #[test]
    fn test_disabled_parameter_is_skipped_silently() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        let mut settings = ConfigSettings::new("torque");
        settings.enabled = false;
        save_config(store.as_ref(), &settings, "qa", now).unwrap();
        let report = monitor_with(store, now).detect_anomalies_at(now, 24).unwrap();
        assert_eq!(report.parameters_checked, 0);
    }

    #[test]
    fn test_spike_raises_one_alert() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        enable(&store, "torque", 2.0);
        let report = monitor_with(store.clone(), now).detect_anomalies_at(now, 24).unwrap();
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].observed_value, 26.0);
        assert_eq!(report.alerts[0].status, AlertStatus::New);
        assert_eq!(store.alert_count(), 1);
    }

    #[test]
    fn test_rerun_is_deduplicated() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        enable(&store, "torque", 2.0);
        let monitor = monitor_with(store.clone(), now);
        monitor.detect_anomalies_at(now, 24).unwrap();
        let second = monitor
            .detect_anomalies_at(now + Duration::minutes(5), 24)
            .unwrap();
        assert!(second.alerts.is_empty());
        assert_eq!(second.suppressed, 1);
        assert_eq!(store.alert_count(), 1);
    }

    #[test]
    fn test_legacy_unknown_method_is_reported() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_config(&AnomalyConfig {
                parameter_name: "torque".to_string(),
                enabled: true,
                sensitivity: 1.0,
                method: "isolation_forest".to_string(),
                alert_threshold: 2.0,
                last_updated: now,
                updated_by: "legacy".to_string(),
            })
            .unwrap();
        let report = monitor_with(store.clone(), now).detect_anomalies_at(now, 24).unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(
            report.skipped[0].reason,
            SkipReason::UnsupportedMethod { .. }
        ));
        assert_eq!(store.alert_count(), 0);
    }

    #[test]
    fn test_missing_column_is_insufficient_data() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());
        enable(&store, "net_content", 3.0);
        let report = monitor_with(store, now).detect_anomalies_at(now, 24).unwrap();
        assert_eq!(
            report.skipped[0].reason,
            SkipReason::InsufficientData { samples: 0 }
        );
    }
}
