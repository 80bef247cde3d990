//! Durable record types and wire payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStatus {
    Online,
    Offline,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalStatus::Online => "online",
            TerminalStatus::Offline => "offline",
        }
    }
}

impl std::str::FromStr for TerminalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(TerminalStatus::Online),
            "offline" => Ok(TerminalStatus::Offline),
            other => Err(format!("unknown terminal status '{}'", other)),
        }
    }
}

/// Condition categories an alert can be raised for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    BatteryLow,
    BatteryCritical,
    TerminalOffline,
    StorageLow,
    NetworkIssues,
    UnauthorizedAccess,
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Server-side authoritative state for one physical device.
///
/// One row per device id; created on first heartbeat, updated on every
/// subsequent heartbeat and by the two scheduled sweeps. Never deleted by
/// the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terminal {
    /// Assigned terminal code, derived from the device id; stable across calls
    pub id: String,
    pub device_id: String,
    pub location: Option<String>,
    pub status: TerminalStatus,
    pub battery_level: i32,
    pub battery_charging: bool,
    pub network_type: String,
    pub signal_strength: Option<i32>,
    pub model: String,
    pub os_version: String,
    pub app_version: String,
    /// Bytes of storage the device last reported free
    pub storage_available: i64,
    pub last_seen: DateTime<Utc>,
    /// Running total as reported by the device; overwritten, not accumulated
    pub total_transactions: i64,
    /// Rolling 24h availability, persisted by the uptime sweep
    pub uptime_percentage_24h: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable status sample as received from a device.
///
/// Append-only; `timestamp` is the client-reported sampling instant and is
/// what uptime estimation trusts, `recorded_at` is server receipt time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub battery_level: i32,
    pub battery_charging: bool,
    pub network_type: String,
    pub signal_strength: Option<i32>,
    pub storage_available: i64,
    pub app_version: String,
    pub os_version: String,
    pub model: String,
    pub transactions_count: i64,
    pub recorded_at: DateTime<Utc>,
}

/// One detected condition episode.
///
/// At most one unresolved alert exists per (device id, alert type);
/// resolution is a one-way transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: u64,
    pub device_id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub location: Option<String>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Cumulative transaction count for one calendar hour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyBucket {
    pub hour: DateTime<Utc>,
    pub total_transactions: i64,
    pub created_at: DateTime<Utc>,
}

/// Registry metadata for a released software version.
///
/// Read-only from the engine's perspective; written administratively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    pub deprecated: bool,
    pub release_date: Option<DateTime<Utc>>,
}

/// A condition detected from a heartbeat, pending the deduplicating insert
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
}

/// Inbound heartbeat payload from a device.
///
/// `device_id` and `timestamp` (unix epoch millis) are mandatory; counters
/// default to zero when the client omits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub device_id: String,
    /// Client-reported sampling instant, unix epoch milliseconds
    pub timestamp: i64,
    pub battery_level: i32,
    pub battery_charging: bool,
    pub network_type: String,
    #[serde(default)]
    pub signal_strength: Option<i32>,
    pub storage_available: i64,
    pub app_version: String,
    pub os_version: String,
    pub model: String,
    #[serde(default)]
    pub transactions_count: i64,
    #[serde(default)]
    pub failed_login_attempts: i32,
    #[serde(default)]
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!("online".parse::<TerminalStatus>(), Ok(TerminalStatus::Online));
        assert_eq!("offline".parse::<TerminalStatus>(), Ok(TerminalStatus::Offline));
        assert!("rebooting".parse::<TerminalStatus>().is_err());
        assert_eq!(TerminalStatus::Online.as_str(), "online");
    }

    #[test]
    fn test_alert_type_serialization() {
        let json = serde_json::to_string(&AlertType::BatteryCritical).unwrap();
        assert_eq!(json, "\"BATTERY_CRITICAL\"");
        let json = serde_json::to_string(&AlertType::UnauthorizedAccess).unwrap();
        assert_eq!(json, "\"UNAUTHORIZED_ACCESS\"");
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("CRITICAL".parse::<Severity>(), Ok(Severity::Critical));
        assert!("critical".parse::<Severity>().is_err());
    }

    #[test]
    fn test_payload_defaults() {
        let payload: HeartbeatPayload = serde_json::from_str(
            r#"{
                "deviceId": "a1b2c3d4e5f6",
                "timestamp": 1700000000000,
                "batteryLevel": 80,
                "batteryCharging": false,
                "networkType": "wifi",
                "storageAvailable": 8000000000,
                "appVersion": "2.1.0",
                "osVersion": "13",
                "model": "PAX A920"
            }"#,
        )
        .unwrap();

        assert_eq!(payload.transactions_count, 0);
        assert_eq!(payload.failed_login_attempts, 0);
        assert_eq!(payload.signal_strength, None);
        assert_eq!(payload.location, None);
    }
}
