//! FleetPulse: fleet health telemetry for point-of-sale terminals
//!
//! Tracks a fleet of unattended payment terminals from periodic self-reported
//! heartbeats, infers liveness and availability, raises deduplicated
//! threshold alerts, and pushes live updates to dashboard subscribers.
//!
//! # Features
//!
//! - **Heartbeat Reconciliation**: each sample atomically upserts the
//!   terminal, appends the immutable heartbeat, and merges hourly
//!   transaction buckets
//! - **Uptime Estimation**: availability from sampling completeness
//!   (received vs expected samples at a 5-minute nominal interval)
//! - **Threshold Alerts**: battery, storage, signal, and failed-login rules
//!   with at most one open alert per (device, condition)
//! - **Background Sweeps**: offline detection after 10 minutes of silence
//!   and periodic persisted 24h uptime recompute
//! - **Live Fan-out**: best-effort WebSocket broadcast of terminal updates
//!   and alert transitions
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetpulse::store::{FleetStore, HeartbeatPayload};
//! use fleetpulse::telemetry::TelemetryReconciler;
//! use fleetpulse::ws::BroadcastHub;
//!
//! let store = Arc::new(FleetStore::new());
//! let hub = Arc::new(BroadcastHub::new());
//! let reconciler = TelemetryReconciler::new(store, hub);
//!
//! let payload = HeartbeatPayload {
//!     device_id: "a1b2c3d4e5f6".to_string(),
//!     timestamp: 1_700_000_000_000,
//!     battery_level: 85,
//!     battery_charging: false,
//!     network_type: "wifi".to_string(),
//!     signal_strength: Some(-60),
//!     storage_available: 8_000_000_000,
//!     app_version: "2.1.0".to_string(),
//!     os_version: "13".to_string(),
//!     model: "PAX A920".to_string(),
//!     transactions_count: 12,
//!     failed_login_attempts: 0,
//!     location: None,
//! };
//! let terminal = reconciler.ingest(&payload).unwrap();
//! println!("terminal {} is {:?}", terminal.id, terminal.status);
//! ```

pub mod alerts;
pub mod api;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod ws;

// Re-export commonly used types
pub use store::{Alert, AlertType, FleetStore, Severity, StoreError, Terminal, TerminalStatus};
pub use telemetry::{FleetStats, IngestError, TelemetryReconciler};
pub use ws::{BroadcastHub, WsEvent};
