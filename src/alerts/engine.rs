//! Alert queries and lifecycle actions over the store

use std::sync::Arc;

use chrono::Utc;

use crate::store::{Alert, AlertFilter, FleetStore, StoreError};
use crate::ws::{BroadcastHub, WsEvent};

/// Query/action surface for alerts.
///
/// Creation happens inside the ingest transaction (see
/// `FleetStore::apply_heartbeat`); this component covers the read and
/// resolve paths and fans resolution out to subscribers.
pub struct AlertEngine {
    store: Arc<FleetStore>,
    hub: Arc<BroadcastHub>,
}

impl AlertEngine {
    pub fn new(store: Arc<FleetStore>, hub: Arc<BroadcastHub>) -> Self {
        Self { store, hub }
    }

    /// List alerts matching every given filter, most recent first
    pub fn list(&self, filter: &AlertFilter) -> Vec<Alert> {
        self.store.list_alerts(filter)
    }

    /// Unresolved alerts shorthand
    pub fn active(&self) -> Vec<Alert> {
        self.store.list_alerts(&AlertFilter {
            resolved: Some(false),
            ..AlertFilter::default()
        })
    }

    /// Resolve an open alert and broadcast the transition.
    ///
    /// Resolving an unknown or already-resolved id reports `AlertNotFound`;
    /// the transition itself happens at most once.
    pub fn resolve(&self, id: u64) -> Result<Alert, StoreError> {
        let alert = self.store.resolve_alert(id, Utc::now())?;
        tracing::info!(alert_id = id, device = %alert.device_id, "alert resolved");
        self.hub.broadcast(&WsEvent::AlertResolved(alert.clone()));
        Ok(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AlertDraft, AlertType, HeartbeatPayload, Severity};
    use tokio::sync::mpsc;

    fn seed_alert(store: &FleetStore) -> Alert {
        let now = Utc::now();
        let payload = HeartbeatPayload {
            device_id: "a1b2c3d4e5f6".to_string(),
            timestamp: now.timestamp_millis(),
            battery_level: 5,
            battery_charging: false,
            network_type: "wifi".to_string(),
            signal_strength: None,
            storage_available: 8 * 1024 * 1024 * 1024,
            app_version: "2.1.0".to_string(),
            os_version: "13".to_string(),
            model: "PAX A920".to_string(),
            transactions_count: 0,
            failed_login_attempts: 0,
            location: None,
        };
        let draft = AlertDraft {
            alert_type: AlertType::BatteryCritical,
            severity: Severity::Critical,
            message: "Battery critically low (5%)".to_string(),
        };
        let (_, created) = store.apply_heartbeat(&payload, now, &[draft], now);
        created.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn test_resolve_broadcasts_transition() {
        let store = Arc::new(FleetStore::new());
        let hub = Arc::new(BroadcastHub::new());
        let engine = AlertEngine::new(Arc::clone(&store), Arc::clone(&hub));

        let alert = seed_alert(&store);

        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register("dash", tx);
        rx.recv().await.unwrap();

        let resolved = engine.resolve(alert.id).unwrap();
        assert!(resolved.resolved);

        let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["type"], "alert_resolved");
        assert_eq!(msg["data"]["id"], alert.id);
    }

    #[tokio::test]
    async fn test_resolve_twice_reports_not_found() {
        let store = Arc::new(FleetStore::new());
        let hub = Arc::new(BroadcastHub::new());
        let engine = AlertEngine::new(Arc::clone(&store), hub);

        let alert = seed_alert(&store);
        engine.resolve(alert.id).unwrap();

        assert!(matches!(
            engine.resolve(alert.id),
            Err(StoreError::AlertNotFound(_))
        ));
        assert!(engine.active().is_empty());
    }

    #[tokio::test]
    async fn test_active_shorthand() {
        let store = Arc::new(FleetStore::new());
        let hub = Arc::new(BroadcastHub::new());
        let engine = AlertEngine::new(Arc::clone(&store), hub);

        let alert = seed_alert(&store);
        assert_eq!(engine.active().len(), 1);

        engine.resolve(alert.id).unwrap();
        assert!(engine.active().is_empty());
        // the resolved alert is still visible without the filter
        assert_eq!(engine.list(&AlertFilter::default()).len(), 1);
    }
}
