//! The store adapter: every durable record lives here, behind one lock.
//!
//! All tables sit behind a single `parking_lot::RwLock` so that multi-table
//! operations (`apply_heartbeat` in particular) are atomic with respect to
//! concurrent readers: nobody can observe a terminal without the heartbeat
//! and hourly-bucket merge that produced it. Alert deduplication runs inside
//! the same write section, which makes the check-and-insert atomic.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;

use super::models::{
    Alert, AlertDraft, Heartbeat, HeartbeatPayload, HourlyBucket, Terminal, TerminalStatus,
    VersionInfo,
};

/// Derive the assigned terminal code from a device identifier.
///
/// Stable across calls; the short slice keeps codes readable on dashboards.
pub fn terminal_code(device_id: &str) -> String {
    let prefix: String = device_id.chars().take(8).collect();
    format!("POS-{}", prefix)
}

/// Truncate a timestamp to the start of its calendar hour.
pub fn hour_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    let millis = ts.timestamp_millis();
    let floored = millis - millis.rem_euclid(3_600_000);
    Utc.timestamp_millis_opt(floored).single().unwrap_or(ts)
}

/// Conjunctive alert query filters
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub severity: Option<super::models::Severity>,
    pub resolved: Option<bool>,
    pub device_id: Option<String>,
}

#[derive(Default)]
struct Tables {
    /// Terminals keyed by device id
    terminals: HashMap<String, Terminal>,
    /// Append-only heartbeat log
    heartbeats: Vec<Heartbeat>,
    alerts: Vec<Alert>,
    next_alert_id: u64,
    /// Transaction buckets keyed by hour start
    buckets: BTreeMap<DateTime<Utc>, HourlyBucket>,
    versions: HashMap<String, VersionInfo>,
}

/// In-memory relational-style store for the fleet engine
pub struct FleetStore {
    tables: RwLock<Tables>,
}

impl FleetStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// The ingest transaction: upsert the terminal, append the heartbeat,
    /// merge the hourly transaction bucket, and insert every alert draft
    /// that has no unresolved duplicate. One write section; a failure before
    /// the lock is taken leaves no partial state.
    ///
    /// `timestamp` is the already-validated client sampling instant. Returns
    /// the materialized terminal and only the alerts created by this call.
    pub fn apply_heartbeat(
        &self,
        payload: &HeartbeatPayload,
        timestamp: DateTime<Utc>,
        drafts: &[AlertDraft],
        now: DateTime<Utc>,
    ) -> (Terminal, Vec<Alert>) {
        let mut tables = self.tables.write();

        let location = match tables.terminals.entry(payload.device_id.clone()) {
            Entry::Occupied(mut entry) => {
                let terminal = entry.get_mut();
                terminal.status = TerminalStatus::Online;
                terminal.location = payload.location.clone();
                terminal.battery_level = payload.battery_level;
                terminal.battery_charging = payload.battery_charging;
                terminal.network_type = payload.network_type.clone();
                terminal.signal_strength = payload.signal_strength;
                terminal.model = payload.model.clone();
                terminal.os_version = payload.os_version.clone();
                terminal.app_version = payload.app_version.clone();
                terminal.storage_available = payload.storage_available;
                // last_seen never moves backwards
                terminal.last_seen = now.max(terminal.last_seen);
                terminal.total_transactions = payload.transactions_count;
                terminal.updated_at = now;
                terminal.location.clone()
            }
            Entry::Vacant(entry) => {
                let terminal = Terminal {
                    id: terminal_code(&payload.device_id),
                    device_id: payload.device_id.clone(),
                    location: payload.location.clone(),
                    status: TerminalStatus::Online,
                    battery_level: payload.battery_level,
                    battery_charging: payload.battery_charging,
                    network_type: payload.network_type.clone(),
                    signal_strength: payload.signal_strength,
                    model: payload.model.clone(),
                    os_version: payload.os_version.clone(),
                    app_version: payload.app_version.clone(),
                    storage_available: payload.storage_available,
                    last_seen: now,
                    total_transactions: payload.transactions_count,
                    uptime_percentage_24h: 0.0,
                    created_at: now,
                    updated_at: now,
                };
                entry.insert(terminal).location.clone()
            }
        };

        tables.heartbeats.push(Heartbeat {
            device_id: payload.device_id.clone(),
            timestamp,
            battery_level: payload.battery_level,
            battery_charging: payload.battery_charging,
            network_type: payload.network_type.clone(),
            signal_strength: payload.signal_strength,
            storage_available: payload.storage_available,
            app_version: payload.app_version.clone(),
            os_version: payload.os_version.clone(),
            model: payload.model.clone(),
            transactions_count: payload.transactions_count,
            recorded_at: now,
        });

        merge_bucket(&mut tables, hour_floor(timestamp), payload.transactions_count, now);

        let mut created = Vec::new();
        for draft in drafts {
            if let Some(alert) =
                create_alert_if_absent(&mut tables, &payload.device_id, draft, location.clone(), now)
            {
                created.push(alert);
            }
        }

        let terminal = tables
            .terminals
            .get(&payload.device_id)
            .cloned()
            .expect("terminal upserted above");
        (terminal, created)
    }

    pub fn get_terminal(&self, id: &str) -> Option<Terminal> {
        let tables = self.tables.read();
        tables.terminals.values().find(|t| t.id == id).cloned()
    }

    pub fn get_terminal_by_device(&self, device_id: &str) -> Option<Terminal> {
        let tables = self.tables.read();
        tables.terminals.get(device_id).cloned()
    }

    /// List terminals, optionally filtered by status, ordered by terminal code
    pub fn list_terminals(&self, status: Option<TerminalStatus>) -> Vec<Terminal> {
        let tables = self.tables.read();
        let mut out: Vec<Terminal> = tables
            .terminals
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn update_location(
        &self,
        id: &str,
        location: String,
        now: DateTime<Utc>,
    ) -> Result<Terminal, StoreError> {
        let mut tables = self.tables.write();
        let terminal = tables
            .terminals
            .values_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::TerminalNotFound(id.to_string()))?;
        terminal.location = Some(location);
        terminal.updated_at = now;
        Ok(terminal.clone())
    }

    /// Count heartbeats for one device in the half-open window `[start, end)`
    pub fn heartbeat_count(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> usize {
        let tables = self.tables.read();
        tables
            .heartbeats
            .iter()
            .filter(|h| h.device_id == device_id && h.timestamp >= start && h.timestamp < end)
            .count()
    }

    /// Total heartbeat records (all devices)
    pub fn heartbeat_total(&self) -> usize {
        self.tables.read().heartbeats.len()
    }

    /// List alerts matching every given filter, most recent first
    pub fn list_alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        let tables = self.tables.read();
        let mut out: Vec<Alert> = tables
            .alerts
            .iter()
            .filter(|a| filter.severity.map_or(true, |s| a.severity == s))
            .filter(|a| filter.resolved.map_or(true, |r| a.resolved == r))
            .filter(|a| {
                filter
                    .device_id
                    .as_deref()
                    .map_or(true, |d| a.device_id == d)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    pub fn active_alert_count(&self) -> usize {
        let tables = self.tables.read();
        tables.alerts.iter().filter(|a| !a.resolved).count()
    }

    /// One-way resolution. Unknown ids and already-resolved alerts both
    /// report `AlertNotFound`, so a second resolve of the same id is a
    /// negative result rather than a double transition.
    pub fn resolve_alert(&self, id: u64, now: DateTime<Utc>) -> Result<Alert, StoreError> {
        let mut tables = self.tables.write();
        let alert = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == id && !a.resolved)
            .ok_or(StoreError::AlertNotFound(id))?;
        alert.resolved = true;
        alert.resolved_at = Some(now);
        Ok(alert.clone())
    }

    /// Flip every terminal silent since before `cutoff` to offline.
    ///
    /// Idempotent; returns only the terminals that actually transitioned so
    /// the caller can fan the changes out.
    pub fn mark_offline(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> Vec<Terminal> {
        let mut tables = self.tables.write();
        let mut flipped = Vec::new();
        for terminal in tables.terminals.values_mut() {
            if terminal.last_seen < cutoff {
                let was_online = terminal.status == TerminalStatus::Online;
                terminal.status = TerminalStatus::Offline;
                terminal.updated_at = now;
                if was_online {
                    flipped.push(terminal.clone());
                }
            }
        }
        flipped
    }

    /// Persist a recomputed 24h uptime percentage
    pub fn set_uptime_24h(
        &self,
        device_id: &str,
        percentage: f64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        let terminal = tables
            .terminals
            .get_mut(device_id)
            .ok_or_else(|| StoreError::TerminalNotFound(device_id.to_string()))?;
        terminal.uptime_percentage_24h = percentage;
        terminal.updated_at = now;
        Ok(())
    }

    /// Cumulative transaction count for the bucket at `hour` (0 if absent)
    pub fn bucket_total(&self, hour: DateTime<Utc>) -> i64 {
        let tables = self.tables.read();
        tables
            .buckets
            .get(&hour)
            .map(|b| b.total_transactions)
            .unwrap_or(0)
    }

    /// Administrative write: register or replace a version registry entry
    pub fn register_version(&self, info: VersionInfo) {
        let mut tables = self.tables.write();
        tables.versions.insert(info.version.clone(), info);
    }

    pub fn version_deprecated(&self, version: &str) -> bool {
        let tables = self.tables.read();
        tables
            .versions
            .get(version)
            .map(|v| v.deprecated)
            .unwrap_or(false)
    }
}

impl Default for FleetStore {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_bucket(tables: &mut Tables, hour: DateTime<Utc>, count: i64, now: DateTime<Utc>) {
    tables
        .buckets
        .entry(hour)
        .and_modify(|b| b.total_transactions += count)
        .or_insert(HourlyBucket {
            hour,
            total_transactions: count,
            created_at: now,
        });
}

/// Insert an alert unless an unresolved one with the same (device, type)
/// already exists. Runs under the table write lock held by the caller.
fn create_alert_if_absent(
    tables: &mut Tables,
    device_id: &str,
    draft: &AlertDraft,
    location: Option<String>,
    now: DateTime<Utc>,
) -> Option<Alert> {
    let duplicate = tables
        .alerts
        .iter()
        .any(|a| a.device_id == device_id && a.alert_type == draft.alert_type && !a.resolved);
    if duplicate {
        return None;
    }

    tables.next_alert_id += 1;
    let alert = Alert {
        id: tables.next_alert_id,
        device_id: device_id.to_string(),
        alert_type: draft.alert_type,
        severity: draft.severity,
        message: draft.message.clone(),
        location,
        resolved: false,
        created_at: now,
        resolved_at: None,
    };
    tables.alerts.push(alert.clone());
    Some(alert)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("terminal '{0}' not found")]
    TerminalNotFound(String),

    #[error("alert {0} not found")]
    AlertNotFound(u64),
}
