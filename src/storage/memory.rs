//! In-memory anomaly store
//!
//! Thread-safe via `RwLock`. Not durable; rows are lost on restart.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{AlertQuery, AnomalyStore, StoreError};
use crate::types::{AlertStatus, AlertUpdate, AnomalyAlert, AnomalyConfig};

/// In-memory persistence for tests and dry runs
#[derive(Default)]
pub struct InMemoryStore {
    configs: RwLock<BTreeMap<String, AnomalyConfig>>,
    alerts: RwLock<BTreeMap<String, AnomalyAlert>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().map(|a| a.len()).unwrap_or(0)
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Connection(e.to_string())
}

impl AnomalyStore for InMemoryStore {
    fn upsert_config(&self, config: &AnomalyConfig) -> Result<(), StoreError> {
        let mut store = self.configs.write().map_err(poisoned)?;
        store.insert(config.parameter_name.clone(), config.clone());
        Ok(())
    }

    fn get_config(&self, parameter: &str) -> Result<Option<AnomalyConfig>, StoreError> {
        let store = self.configs.read().map_err(poisoned)?;
        Ok(store.get(parameter).cloned())
    }

    fn list_configs(&self) -> Result<Vec<AnomalyConfig>, StoreError> {
        let store = self.configs.read().map_err(poisoned)?;
        Ok(store.values().cloned().collect())
    }

    fn insert_alert(&self, alert: &AnomalyAlert) -> Result<(), StoreError> {
        let mut store = self.alerts.write().map_err(poisoned)?;
        if store.contains_key(&alert.alert_id) {
            return Err(StoreError::Constraint(format!(
                "alert_id {} already exists",
                alert.alert_id
            )));
        }
        store.insert(alert.alert_id.clone(), alert.clone());
        Ok(())
    }

    fn get_alert(&self, alert_id: &str) -> Result<Option<AnomalyAlert>, StoreError> {
        let store = self.alerts.read().map_err(poisoned)?;
        Ok(store.get(alert_id).cloned())
    }

    fn query_alerts(&self, query: &AlertQuery) -> Result<Vec<AnomalyAlert>, StoreError> {
        let store = self.alerts.read().map_err(poisoned)?;
        let mut alerts: Vec<AnomalyAlert> =
            store.values().filter(|a| query.matches(a)).cloned().collect();
        alerts.sort_by_key(|a| a.timestamp);
        Ok(alerts)
    }

    fn update_alert_if_status(
        &self,
        alert_id: &str,
        allowed: &[AlertStatus],
        update: &AlertUpdate,
    ) -> Result<Option<AnomalyAlert>, StoreError> {
        let mut store = self.alerts.write().map_err(poisoned)?;
        let current = store
            .get_mut(alert_id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {alert_id}")))?;
        if !allowed.contains(&current.status) {
            return Ok(None);
        }
        let updated = update.apply(current);
        *current = updated.clone();
        Ok(Some(updated))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
