//! Sled-backed anomaly store
//!
//! Two named trees inside one sled database:
//! - `anomaly_config`: key = parameter name, value = JSON `AnomalyConfig`
//! - `anomaly_alerts`: key = alert_id, value = JSON `AnomalyAlert`
//!
//! Conditional status updates use `compare_and_swap` on the alert row, so
//! the status guard and the write succeed or fail together even when two
//! processes share the database.

use std::path::Path;

use sled::{Db, Tree};
use tracing::{debug, info, warn};

use super::{AlertQuery, AnomalyStore, StoreError};
use crate::types::{AlertStatus, AlertUpdate, AnomalyAlert, AnomalyConfig};

const CONFIG_TREE: &str = "anomaly_config";
const ALERT_TREE: &str = "anomaly_alerts";

/// Durable anomaly store on sled
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    configs: Tree,
    alerts: Tree,
}

impl SledStore {
    /// Open or create the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        info!(path = %path_ref.display(), "Anomaly store opened");
        Self::from_db(db)
    }

    /// Open a temporary database that is removed on drop
    pub fn open_temp() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let configs = db.open_tree(CONFIG_TREE)?;
        let alerts = db.open_tree(ALERT_TREE)?;
        Ok(Self {
            db,
            configs,
            alerts,
        })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }
}

impl AnomalyStore for SledStore {
    fn upsert_config(&self, config: &AnomalyConfig) -> Result<(), StoreError> {
        let value = serde_json::to_vec(config)?;
        self.configs
            .insert(config.parameter_name.as_bytes(), value)?;
        // Operator edits are rare; make them durable immediately.
        self.configs.flush()?;
        debug!(parameter = %config.parameter_name, "Anomaly config saved");
        Ok(())
    }

    fn get_config(&self, parameter: &str) -> Result<Option<AnomalyConfig>, StoreError> {
        match self.configs.get(parameter.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn list_configs(&self) -> Result<Vec<AnomalyConfig>, StoreError> {
        let mut configs = Vec::new();
        for item in self.configs.iter() {
            let (key, value) = item?;
            match serde_json::from_slice::<AnomalyConfig>(&value) {
                Ok(config) => configs.push(config),
                Err(e) => {
                    warn!(
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "Skipping unreadable anomaly config row"
                    );
                }
            }
        }
        Ok(configs)
    }

    fn insert_alert(&self, alert: &AnomalyAlert) -> Result<(), StoreError> {
        let value = serde_json::to_vec(alert)?;
        let swapped =
            self.alerts
                .compare_and_swap(alert.alert_id.as_bytes(), None::<&[u8]>, Some(value))?;
        swapped.map_err(|_| {
            StoreError::Constraint(format!("alert_id {} already exists", alert.alert_id))
        })
    }

    fn get_alert(&self, alert_id: &str) -> Result<Option<AnomalyAlert>, StoreError> {
        match self.alerts.get(alert_id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn query_alerts(&self, query: &AlertQuery) -> Result<Vec<AnomalyAlert>, StoreError> {
        // Full scan: alert volumes are small and keys are ids, not times.
        // An unreadable row is skipped so it cannot fail every dedup lookup.
        let mut alerts = Vec::new();
        for item in self.alerts.iter() {
            let (key, value) = item?;
            let alert: AnomalyAlert = match serde_json::from_slice(&value) {
                Ok(alert) => alert,
                Err(e) => {
                    warn!(
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "Skipping unreadable anomaly alert row"
                    );
                    continue;
                }
            };
            if query.matches(&alert) {
                alerts.push(alert);
            }
        }
        alerts.sort_by_key(|a| a.timestamp);
        Ok(alerts)
    }

    fn update_alert_if_status(
        &self,
        alert_id: &str,
        allowed: &[AlertStatus],
        update: &AlertUpdate,
    ) -> Result<Option<AnomalyAlert>, StoreError> {
        loop {
            let Some(current_bytes) = self.alerts.get(alert_id.as_bytes())? else {
                return Err(StoreError::NotFound(format!("alert {alert_id}")));
            };
            let current: AnomalyAlert = serde_json::from_slice(&current_bytes)?;
            if !allowed.contains(&current.status) {
                return Ok(None);
            }

            let updated = update.apply(&current);
            let new_bytes = serde_json::to_vec(&updated)?;
            match self.alerts.compare_and_swap(
                alert_id.as_bytes(),
                Some(current_bytes),
                Some(new_bytes),
            )? {
                Ok(()) => return Ok(Some(updated)),
                Err(_) => {
                    // Row changed underneath us; re-read and re-check the guard.
                    debug!(alert_id, "Concurrent alert update, retrying");
                }
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(name: &str) -> AnomalyConfig {
        AnomalyConfig {
            parameter_name: name.to_string(),
            enabled: true,
            sensitivity: 0.8,
            method: "statistical".to_string(),
            alert_threshold: 3.0,
            last_updated: Utc::now(),
            updated_by: "qa".to_string(),
        }
    }

    fn alert(id: &str) -> AnomalyAlert {
        AnomalyAlert {
            alert_id: id.to_string(),
            parameter_name: "net_content".to_string(),
            timestamp: Utc::now(),
            observed_value: 487.0,
            expected_value: 500.2,
            deviation_score: 4.1,
            status: AlertStatus::New,
            acknowledged_by: None,
            acknowledged_time: None,
            notes: None,
        }
    }

    #[test]
    fn test_config_upsert_replaces_row() {
        let store = SledStore::open_temp().unwrap();
        store.upsert_config(&config("brix")).unwrap();
        let mut updated = config("brix");
        updated.enabled = false;
        store.upsert_config(&updated).unwrap();

        let configs = store.list_configs().unwrap();
        assert_eq!(configs.len(), 1);
        assert!(!configs[0].enabled);
    }

    #[test]
    fn test_duplicate_alert_id_is_constraint_error() {
        let store = SledStore::open_temp().unwrap();
        store.insert_alert(&alert("a1")).unwrap();
        let err = store.insert_alert(&alert("a1")).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
    }

    #[test]
    fn test_conditional_update() {
        let store = SledStore::open_temp().unwrap();
        store.insert_alert(&alert("a1")).unwrap();
        let ack = AlertUpdate::Acknowledge {
            actor: "op-3".to_string(),
            at: Utc::now(),
            notes: None,
        };

        let first = store
            .update_alert_if_status("a1", ack.allowed_from(), &ack)
            .unwrap();
        assert_eq!(first.unwrap().status, AlertStatus::Acknowledged);

        let second = store
            .update_alert_if_status("a1", ack.allowed_from(), &ack)
            .unwrap();
        assert!(second.is_none());

        let missing = store.update_alert_if_status("nope", ack.allowed_from(), &ack);
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_query_skips_unreadable_rows() {
        let store = SledStore::open_temp().unwrap();
        store.alerts.insert("legacy-1", b"{not json".to_vec()).unwrap();
        store.insert_alert(&alert("a1")).unwrap();

        let found = store
            .query_alerts(&AlertQuery::for_parameter("net_content"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].alert_id, "a1");
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.insert_alert(&alert("a1")).unwrap();
            store.upsert_config(&config("torque")).unwrap();
            store.flush().unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        assert_eq!(store.alert_count(), 1);
        assert!(store.get_config("torque").unwrap().is_some());
    }
}
