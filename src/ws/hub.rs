//! Fan-out of state-change events to live dashboard subscribers

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::store::{Alert, Terminal};

/// A state change worth pushing to dashboards
#[derive(Debug, Clone)]
pub enum WsEvent {
    TerminalUpdate(Terminal),
    NewAlert(Alert),
    AlertResolved(Alert),
}

impl WsEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WsEvent::TerminalUpdate(_) => "terminal_update",
            WsEvent::NewAlert(_) => "new_alert",
            WsEvent::AlertResolved(_) => "alert_resolved",
        }
    }

    fn data(&self) -> serde_json::Value {
        let result = match self {
            WsEvent::TerminalUpdate(t) => serde_json::to_value(t),
            WsEvent::NewAlert(a) | WsEvent::AlertResolved(a) => serde_json::to_value(a),
        };
        result.unwrap_or(serde_json::Value::Null)
    }

    /// Render the typed envelope sent over the wire
    pub fn envelope(&self) -> String {
        serde_json::json!({
            "type": self.kind(),
            "data": self.data(),
            "timestamp": Utc::now().timestamp_millis(),
        })
        .to_string()
    }
}

/// Registry of live subscriber channels and best-effort event fan-out.
///
/// Owned by whoever constructs it (the server wires one per process, tests
/// run as many as they like). Holds no durable state; a subscriber whose
/// channel is gone is dropped on the next delivery attempt.
pub struct BroadcastHub {
    subscribers: DashMap<String, mpsc::UnboundedSender<String>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Admit a subscriber and send it the initial acknowledgment
    pub fn register(&self, session_id: &str, tx: mpsc::UnboundedSender<String>) {
        let ack = serde_json::json!({
            "type": "connected",
            "data": {
                "message": "Connected to fleet telemetry stream",
                "sessionId": session_id,
            },
            "timestamp": Utc::now().timestamp_millis(),
        })
        .to_string();

        if tx.send(ack).is_err() {
            tracing::warn!(session = %session_id, "subscriber gone before acknowledgment");
            return;
        }
        self.subscribers.insert(session_id.to_string(), tx);
        tracing::info!(
            session = %session_id,
            total = self.subscribers.len(),
            "dashboard subscriber registered"
        );
    }

    pub fn unregister(&self, session_id: &str) {
        if self.subscribers.remove(session_id).is_some() {
            tracing::info!(
                session = %session_id,
                total = self.subscribers.len(),
                "dashboard subscriber unregistered"
            );
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver an event to every registered subscriber.
    ///
    /// Best-effort: a failed send drops that subscriber and delivery to the
    /// rest continues. Safe against concurrent register/unregister.
    pub fn broadcast(&self, event: &WsEvent) {
        if self.subscribers.is_empty() {
            return;
        }

        let payload = event.envelope();
        let before = self.subscribers.len();
        self.subscribers
            .retain(|_, tx| tx.send(payload.clone()).is_ok());

        let dropped = before - self.subscribers.len();
        if dropped > 0 {
            tracing::warn!(
                event = event.kind(),
                dropped,
                "dropped dead subscribers during broadcast"
            );
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AlertType, Severity, TerminalStatus};
    use chrono::Utc;

    fn terminal() -> Terminal {
        let now = Utc::now();
        Terminal {
            id: "POS-a1b2c3d4".to_string(),
            device_id: "a1b2c3d4e5f6".to_string(),
            location: None,
            status: TerminalStatus::Online,
            battery_level: 90,
            battery_charging: true,
            network_type: "wifi".to_string(),
            signal_strength: None,
            model: "PAX A920".to_string(),
            os_version: "13".to_string(),
            app_version: "2.1.0".to_string(),
            storage_available: 1024,
            last_seen: now,
            total_transactions: 0,
            uptime_percentage_24h: 100.0,
            created_at: now,
            updated_at: now,
        }
    }

    fn alert() -> Alert {
        Alert {
            id: 1,
            device_id: "a1b2c3d4e5f6".to_string(),
            alert_type: AlertType::BatteryCritical,
            severity: Severity::Critical,
            message: "Battery critically low (5%)".to_string(),
            location: None,
            resolved: false,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn test_register_sends_acknowledgment() {
        let hub = BroadcastHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        hub.register("session-1", tx);
        assert_eq!(hub.subscriber_count(), 1);

        let ack: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(ack["type"], "connected");
        assert_eq!(ack["data"]["sessionId"], "session-1");
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let hub = BroadcastHub::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register("session-1", tx1);
        hub.register("session-2", tx2);
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();

        hub.broadcast(&WsEvent::NewAlert(alert()));

        for rx in [&mut rx1, &mut rx2] {
            let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(msg["type"], "new_alert");
            assert_eq!(msg["data"]["alertType"], "BATTERY_CRITICAL");
            assert!(msg["timestamp"].is_i64());
        }
    }

    #[tokio::test]
    async fn test_dead_subscriber_dropped_without_disrupting_rest() {
        let hub = BroadcastHub::new();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register("dead", tx1);
        hub.register("alive", tx2);
        drop(rx1);
        rx2.recv().await.unwrap();

        hub.broadcast(&WsEvent::TerminalUpdate(terminal()));

        assert_eq!(hub.subscriber_count(), 1);
        let msg: serde_json::Value = serde_json::from_str(&rx2.recv().await.unwrap()).unwrap();
        assert_eq!(msg["type"], "terminal_update");
    }

    #[tokio::test]
    async fn test_unregister() {
        let hub = BroadcastHub::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.register("session-1", tx);

        hub.unregister("session-1");
        assert_eq!(hub.subscriber_count(), 0);

        // unknown sessions are a no-op
        hub.unregister("session-1");
    }

    #[test]
    fn test_envelope_kinds() {
        assert_eq!(WsEvent::TerminalUpdate(terminal()).kind(), "terminal_update");
        assert_eq!(WsEvent::NewAlert(alert()).kind(), "new_alert");
        assert_eq!(WsEvent::AlertResolved(alert()).kind(), "alert_resolved");
    }
}
