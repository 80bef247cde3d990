//! Threshold rules turning one heartbeat into alert drafts

use crate::store::{AlertDraft, AlertType, HeartbeatPayload, Severity};

const GIB: i64 = 1024 * 1024 * 1024;
const BATTERY_CRITICAL_BELOW: i32 = 10;
const BATTERY_LOW_BELOW: i32 = 20;
const WEAK_SIGNAL_BELOW_DBM: i32 = -90;
const FAILED_LOGINS_ABOVE: i32 = 3;

/// Evaluate every condition against a heartbeat.
///
/// Conditions are independent except the two battery tiers, where critical
/// takes precedence. Pure: deduplication against open alerts happens at the
/// store's insert.
pub fn evaluate(payload: &HeartbeatPayload) -> Vec<AlertDraft> {
    let mut drafts = Vec::new();

    if payload.battery_level < BATTERY_CRITICAL_BELOW && !payload.battery_charging {
        drafts.push(AlertDraft {
            alert_type: AlertType::BatteryCritical,
            severity: Severity::Critical,
            message: format!(
                "Battery critically low ({}%), shutdown imminent",
                payload.battery_level
            ),
        });
    } else if payload.battery_level < BATTERY_LOW_BELOW && !payload.battery_charging {
        drafts.push(AlertDraft {
            alert_type: AlertType::BatteryLow,
            severity: Severity::Warning,
            message: format!("Battery low ({}%)", payload.battery_level),
        });
    }

    let free_gib = payload.storage_available / GIB;
    if free_gib < 1 {
        drafts.push(AlertDraft {
            alert_type: AlertType::StorageLow,
            severity: Severity::Warning,
            message: format!("Low storage ({} GiB free)", free_gib),
        });
    }

    if let Some(signal) = payload.signal_strength {
        if signal < WEAK_SIGNAL_BELOW_DBM {
            drafts.push(AlertDraft {
                alert_type: AlertType::NetworkIssues,
                severity: Severity::Warning,
                message: format!("Weak signal detected ({} dBm)", signal),
            });
        }
    }

    if payload.failed_login_attempts > FAILED_LOGINS_ABOVE {
        drafts.push(AlertDraft {
            alert_type: AlertType::UnauthorizedAccess,
            severity: Severity::Critical,
            message: format!(
                "{} failed login attempts detected",
                payload.failed_login_attempts
            ),
        });
    }

    drafts
}
