//! Telemetry reconciliation: heartbeat ingestion and availability estimation

pub mod reconciler;
pub mod uptime;

pub use reconciler::{FleetStats, IngestError, TelemetryReconciler, TransactionPoint, VersionShare};
pub use uptime::{UptimeEstimator, UptimePoint};
