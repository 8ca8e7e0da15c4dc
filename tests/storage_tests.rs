//! Store contract tests
//!
//! The same checks run against every `AnomalyStore` backend.

#![allow(clippy::unwrap_used)]

use chrono::{DateTime, Duration, TimeZone, Utc};

use linewatch::storage::AlertQuery;
use linewatch::types::AlertUpdate;
use linewatch::{
    AlertStatus, AnomalyAlert, AnomalyConfig, AnomalyStore, InMemoryStore, SledStore, StoreError,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
}

fn alert(id: &str, parameter: &str, minutes: i64) -> AnomalyAlert {
    AnomalyAlert {
        alert_id: id.to_string(),
        parameter_name: parameter.to_string(),
        timestamp: t0() + Duration::minutes(minutes),
        observed_value: 505.8,
        expected_value: 500.1,
        deviation_score: 4.2,
        status: AlertStatus::New,
        acknowledged_by: None,
        acknowledged_time: None,
        notes: None,
    }
}

fn config(parameter: &str, enabled: bool) -> AnomalyConfig {
    AnomalyConfig {
        parameter_name: parameter.to_string(),
        enabled,
        sensitivity: 0.8,
        method: "statistical".to_string(),
        alert_threshold: 3.0,
        last_updated: t0(),
        updated_by: "qa-lead".to_string(),
    }
}

// ============================================================================
// Contract
// ============================================================================

fn config_rows_are_keyed_by_parameter(store: &dyn AnomalyStore) {
    store.upsert_config(&config("brix", true)).unwrap();
    store.upsert_config(&config("brix", false)).unwrap();
    store.upsert_config(&config("torque", true)).unwrap();

    let configs = store.list_configs().unwrap();
    assert_eq!(configs.len(), 2, "{}", store.backend_name());
    assert!(!store.get_config("brix").unwrap().unwrap().enabled);
    assert!(store.get_config("net_content").unwrap().is_none());
}

fn alert_ids_are_unique(store: &dyn AnomalyStore) {
    store.insert_alert(&alert("dup", "brix", 0)).unwrap();
    let err = store.insert_alert(&alert("dup", "brix", 5)).unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)), "{}", store.backend_name());
    assert!(!err.is_retryable());
}

fn queries_filter_and_sort(store: &dyn AnomalyStore) {
    store.insert_alert(&alert("q-3", "torque", 90)).unwrap();
    store.insert_alert(&alert("q-1", "torque", 0)).unwrap();
    store.insert_alert(&alert("q-2", "torque", 60)).unwrap();
    store.insert_alert(&alert("q-x", "brix", 30)).unwrap();

    let window = AlertQuery::for_parameter("torque").between(t0(), t0() + Duration::minutes(60));
    let ids: Vec<String> = store
        .query_alerts(&window)
        .unwrap()
        .into_iter()
        .map(|a| a.alert_id)
        .collect();
    assert_eq!(ids, ["q-1", "q-2"], "{}", store.backend_name());
}

fn updates_are_guarded_by_status(store: &dyn AnomalyStore) {
    store.insert_alert(&alert("g-1", "brix", 0)).unwrap();
    let ack = AlertUpdate::Acknowledge {
        actor: "op-7".to_string(),
        at: t0(),
        notes: None,
    };

    let first = store
        .update_alert_if_status("g-1", ack.allowed_from(), &ack)
        .unwrap();
    assert_eq!(first.map(|a| a.status), Some(AlertStatus::Acknowledged));
    let second = store
        .update_alert_if_status("g-1", ack.allowed_from(), &ack)
        .unwrap();
    assert!(second.is_none(), "{}", store.backend_name());

    let missing = store.update_alert_if_status("nope", ack.allowed_from(), &ack);
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

fn run_contract(make: impl Fn() -> Box<dyn AnomalyStore>) {
    config_rows_are_keyed_by_parameter(make().as_ref());
    alert_ids_are_unique(make().as_ref());
    queries_filter_and_sort(make().as_ref());
    updates_are_guarded_by_status(make().as_ref());
}

// ============================================================================
// Backends
// ============================================================================

#[test]
fn in_memory_store_meets_contract() {
    run_contract(|| Box::new(InMemoryStore::new()));
}

#[test]
fn sled_store_meets_contract() {
    run_contract(|| Box::new(SledStore::open_temp().unwrap()));
}

#[test]
fn sled_rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alerts.db");
    {
        let store = SledStore::open(&path).unwrap();
        store.upsert_config(&config("brix", true)).unwrap();
        store.insert_alert(&alert("keep", "brix", 0)).unwrap();
        store.flush().unwrap();
    }
    let store = SledStore::open(&path).unwrap();
    assert_eq!(store.alert_count(), 1);
    assert!(store.get_config("brix").unwrap().is_some());
    assert_eq!(store.get_alert("keep").unwrap().unwrap().deviation_score, 4.2);
}
