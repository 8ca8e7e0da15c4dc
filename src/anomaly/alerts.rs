//! Alert lifecycle operations
//!
//! Every transition names its actor explicitly. A failed guard is reported
//! as `TransitionOutcome::Rejected` with the status that blocked it; only
//! persistence failures surface as errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::AnomalyError;
use crate::storage::{AlertQuery, AnomalyStore, StoreError};
use crate::types::{AlertStatus, AlertUpdate, AnomalyAlert};

/// Result of a requested status transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The transition was applied; carries the updated row.
    Applied(AnomalyAlert),
    /// The alert's current status does not permit the transition.
    Rejected { current: AlertStatus },
    /// No alert with that id exists.
    NotFound,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Mark a `new` alert as acknowledged by `actor`.
pub fn acknowledge_alert(
    store: &dyn AnomalyStore,
    alert_id: &str,
    actor: &str,
    notes: Option<&str>,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome, AnomalyError> {
    let update = AlertUpdate::Acknowledge {
        actor: actor.to_string(),
        at,
        notes: notes.map(str::to_string),
    };
    transition(store, alert_id, &update)
}

/// Resolve a `new` or `acknowledged` alert, appending the resolution to its notes.
pub fn resolve_alert(
    store: &dyn AnomalyStore,
    alert_id: &str,
    actor: &str,
    resolution: &str,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome, AnomalyError> {
    let update = AlertUpdate::Resolve {
        actor: actor.to_string(),
        at,
        resolution: resolution.to_string(),
    };
    transition(store, alert_id, &update)
}

fn transition(
    store: &dyn AnomalyStore,
    alert_id: &str,
    update: &AlertUpdate,
) -> Result<TransitionOutcome, AnomalyError> {
    match store.update_alert_if_status(alert_id, update.allowed_from(), update) {
        Ok(Some(alert)) => {
            info!(
                alert_id,
                parameter = %alert.parameter_name,
                status = %alert.status,
                by = ?alert.acknowledged_by,
                "Alert transitioned"
            );
            Ok(TransitionOutcome::Applied(alert))
        }
        Ok(None) => {
            // The row may have been removed between the guard and the read.
            let Some(current) = store.get_alert(alert_id)?.map(|a| a.status) else {
                return Ok(TransitionOutcome::NotFound);
            };
            warn!(
                alert_id,
                current = %current,
                requested = %update.target(),
                "Alert transition rejected"
            );
            Ok(TransitionOutcome::Rejected { current })
        }
        Err(StoreError::NotFound(_)) => Ok(TransitionOutcome::NotFound),
        Err(e) => Err(e.into()),
    }
}

/// Alert counts over a time range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub total: usize,
    /// `new` + `acknowledged`
    pub open: usize,
    pub by_status: BTreeMap<AlertStatus, usize>,
    pub by_parameter: BTreeMap<String, usize>,
}

/// Count alerts with timestamps in `[start, end]`.
pub fn alert_summary(
    store: &dyn AnomalyStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<AlertSummary, AnomalyError> {
    let alerts = store.query_alerts(&AlertQuery::default().between(start, end))?;
    let mut summary = AlertSummary {
        total: alerts.len(),
        ..AlertSummary::default()
    };
    for alert in &alerts {
        *summary.by_status.entry(alert.status).or_insert(0) += 1;
        *summary
            .by_parameter
            .entry(alert.parameter_name.clone())
            .or_insert(0) += 1;
        if !alert.status.is_final() {
            summary.open += 1;
        }
    }
    Ok(summary)
}

/// Unresolved alerts, optionally for a single parameter, oldest first.
pub fn open_alerts(
    store: &dyn AnomalyStore,
    parameter: Option<&str>,
) -> Result<Vec<AnomalyAlert>, AnomalyError> {
    let query = AlertQuery {
        parameter: parameter.map(str::to_string),
        statuses: vec![AlertStatus::New, AlertStatus::Acknowledged],
        ..AlertQuery::default()
    };
    Ok(store.query_alerts(&query)?)
}
