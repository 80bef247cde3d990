//! Heartbeat ingestion and the fleet query surface

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::rules;
use crate::store::{
    hour_floor, FleetStore, HeartbeatPayload, StoreError, Terminal, TerminalStatus,
};
use crate::telemetry::uptime::{UptimeEstimator, UptimePoint};
use crate::ws::{BroadcastHub, WsEvent};

/// Point-in-time fleet aggregate snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStats {
    pub total_terminals: usize,
    pub online: usize,
    pub offline: usize,
    pub active_alerts: usize,
    pub avg_uptime_percentage: f64,
    pub total_transactions: i64,
    pub uptime_last_hour: f64,
}

/// One hourly transaction bucket as served to dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPoint {
    pub hour: String,
    pub count: i64,
}

/// One software version's share of the fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionShare {
    pub version: String,
    pub count: usize,
    pub percentage: f64,
    pub deprecated: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid heartbeat: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Orchestrates heartbeat ingestion: validate, evaluate alert rules, apply
/// the store transaction, then fan the resulting state changes out. Also
/// serves the terminal/fleet read surface.
pub struct TelemetryReconciler {
    store: Arc<FleetStore>,
    hub: Arc<BroadcastHub>,
    estimator: UptimeEstimator,
}

impl TelemetryReconciler {
    pub fn new(store: Arc<FleetStore>, hub: Arc<BroadcastHub>) -> Self {
        let estimator = UptimeEstimator::new(Arc::clone(&store));
        Self {
            store,
            hub,
            estimator,
        }
    }

    /// Ingest one heartbeat and return the materialized terminal.
    ///
    /// Validation failures reject before any write. The terminal upsert,
    /// heartbeat append, bucket merge, and alert dedup-insert land as one
    /// store transaction; broadcasts follow the durable write.
    pub fn ingest(&self, payload: &HeartbeatPayload) -> Result<Terminal, IngestError> {
        validate(payload)?;
        let timestamp = Utc
            .timestamp_millis_opt(payload.timestamp)
            .single()
            .ok_or_else(|| IngestError::Validation("timestamp is out of range".to_string()))?;

        let drafts = rules::evaluate(payload);
        let now = Utc::now();
        let (terminal, created) = self.store.apply_heartbeat(payload, timestamp, &drafts, now);

        tracing::debug!(
            device = %terminal.device_id,
            terminal = %terminal.id,
            alerts = created.len(),
            "heartbeat ingested"
        );

        self.hub.broadcast(&WsEvent::TerminalUpdate(terminal.clone()));
        for alert in created {
            tracing::warn!(
                device = %alert.device_id,
                alert_type = ?alert.alert_type,
                severity = ?alert.severity,
                "alert raised: {}",
                alert.message
            );
            self.hub.broadcast(&WsEvent::NewAlert(alert));
        }

        Ok(terminal)
    }

    pub fn terminal(&self, id: &str) -> Option<Terminal> {
        self.store.get_terminal(id)
    }

    pub fn terminal_by_device(&self, device_id: &str) -> Option<Terminal> {
        self.store.get_terminal_by_device(device_id)
    }

    pub fn terminals(&self, status: Option<TerminalStatus>) -> Vec<Terminal> {
        self.store.list_terminals(status)
    }

    pub fn update_location(&self, id: &str, location: String) -> Result<Terminal, StoreError> {
        let terminal = self.store.update_location(id, location, Utc::now())?;
        self.hub.broadcast(&WsEvent::TerminalUpdate(terminal.clone()));
        Ok(terminal)
    }

    /// Fleet aggregates from current stored state; only the last-hour figure
    /// is recomputed from raw heartbeats (via the estimator).
    pub fn fleet_stats(&self, now: DateTime<Utc>) -> FleetStats {
        let terminals = self.store.list_terminals(None);
        let total = terminals.len();
        let online = terminals
            .iter()
            .filter(|t| t.status == TerminalStatus::Online)
            .count();
        let avg_uptime = if total == 0 {
            0.0
        } else {
            terminals.iter().map(|t| t.uptime_percentage_24h).sum::<f64>() / total as f64
        };

        FleetStats {
            total_terminals: total,
            online,
            offline: total - online,
            active_alerts: self.store.active_alert_count(),
            avg_uptime_percentage: avg_uptime,
            total_transactions: terminals.iter().map(|t| t.total_transactions).sum(),
            uptime_last_hour: self.estimator.last_hour(now),
        }
    }

    /// 24-point availability series ending now
    pub fn uptime_series(&self, now: DateTime<Utc>) -> Vec<UptimePoint> {
        self.estimator.series_24h(now)
    }

    /// The last 9 hourly transaction buckets, oldest first, zero-filled
    pub fn transactions_by_hour(&self, now: DateTime<Utc>) -> Vec<TransactionPoint> {
        let mut points = Vec::with_capacity(9);
        for i in (0..9).rev() {
            let hour = hour_floor(now - Duration::hours(i));
            points.push(TransactionPoint {
                hour: hour.format("%H:00").to_string(),
                count: self.store.bucket_total(hour),
            });
        }
        points
    }

    /// Terminals grouped by reported software version, with each version's
    /// share of the fleet and its deprecation flag from the registry
    pub fn version_distribution(&self) -> Vec<VersionShare> {
        let terminals = self.store.list_terminals(None);
        if terminals.is_empty() {
            return Vec::new();
        }

        let total = terminals.len() as f64;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for terminal in &terminals {
            let version = if terminal.app_version.is_empty() {
                "Unknown".to_string()
            } else {
                terminal.app_version.clone()
            };
            *counts.entry(version).or_insert(0) += 1;
        }

        let mut shares: Vec<VersionShare> = counts
            .into_iter()
            .map(|(version, count)| VersionShare {
                deprecated: self.store.version_deprecated(&version),
                percentage: count as f64 / total * 100.0,
                count,
                version,
            })
            .collect();
        shares.sort_by(|a, b| b.count.cmp(&a.count).then(a.version.cmp(&b.version)));
        shares
    }

    /// The scheduled 24h uptime recompute; returns terminals updated
    pub fn recompute_uptimes(&self, now: DateTime<Utc>) -> usize {
        self.estimator.recompute_all(now)
    }
}

fn validate(payload: &HeartbeatPayload) -> Result<(), IngestError> {
    let fail = |msg: &str| Err(IngestError::Validation(msg.to_string()));

    if payload.device_id.trim().is_empty() {
        return fail("deviceId must not be empty");
    }
    if payload.timestamp <= 0 {
        return fail("timestamp must be a positive unix epoch in milliseconds");
    }
    if !(0..=100).contains(&payload.battery_level) {
        return fail("batteryLevel must be between 0 and 100");
    }
    if payload.storage_available < 0 {
        return fail("storageAvailable must be non-negative");
    }
    if payload.transactions_count < 0 {
        return fail("transactionsCount must be non-negative");
    }
    if payload.failed_login_attempts < 0 {
        return fail("failedLoginAttempts must be non-negative");
    }
    Ok(())
}
