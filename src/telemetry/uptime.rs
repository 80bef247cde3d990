//! Availability estimation from sampling completeness.
//!
//! Heartbeats are expected every 5 minutes; uptime for a window is the ratio
//! of received to expected samples, not wall-clock presence. Devices active
//! for under 5 minutes in a window are excluded rather than scored, so a
//! freshly provisioned terminal does not drag the fleet average down.
//!
//! All windows are half-open `[start, end)`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::FleetStore;

/// Expected spacing between heartbeats, in minutes
pub const NOMINAL_INTERVAL_MINUTES: i64 = 5;
/// Minimum minutes of activity inside a window before a device is scored
pub const MIN_ACTIVE_MINUTES: i64 = 5;

/// One point of the 24h availability series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimePoint {
    pub time: String,
    pub uptime: f64,
}

/// Window eligibility for one device: the effective window start and the
/// number of samples expected from it. `None` means the device was active
/// for under [`MIN_ACTIVE_MINUTES`] and is excluded from averages.
pub fn expected_samples(
    created_at: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<(DateTime<Utc>, i64)> {
    let effective_start = created_at.max(start);
    let minutes_active = (end - effective_start).num_minutes();
    if minutes_active < MIN_ACTIVE_MINUTES {
        return None;
    }
    Some((effective_start, minutes_active / NOMINAL_INTERVAL_MINUTES))
}

/// Received-over-expected as a percentage clamped to `[0, 100]`.
///
/// `no_expected_default` covers the zero-expected edge: rolling-window
/// queries pass 0, the persisted 24h recompute passes 100.
pub fn percentage(received: usize, expected: i64, no_expected_default: f64) -> f64 {
    if expected > 0 {
        (received as f64 / expected as f64 * 100.0).clamp(0.0, 100.0)
    } else {
        no_expected_default.clamp(0.0, 100.0)
    }
}

/// The three uptime call shapes over the store
pub struct UptimeEstimator {
    store: Arc<FleetStore>,
}

impl UptimeEstimator {
    pub fn new(store: Arc<FleetStore>) -> Self {
        Self { store }
    }

    /// 24 one-hour buckets ending now; each is the fleet average of
    /// per-device uptime, 0 when no terminal is eligible in the bucket.
    pub fn series_24h(&self, now: DateTime<Utc>) -> Vec<UptimePoint> {
        let terminals = self.store.list_terminals(None);
        let mut points = Vec::with_capacity(24);

        for i in 0..24 {
            let end = now - Duration::hours(23 - i);
            let start = end - Duration::hours(1);

            let mut samples = Vec::new();
            for terminal in &terminals {
                let Some((effective_start, expected)) =
                    expected_samples(terminal.created_at, start, end)
                else {
                    continue;
                };
                let received = self
                    .store
                    .heartbeat_count(&terminal.device_id, effective_start, end);
                samples.push(percentage(received, expected, 0.0));
            }

            points.push(UptimePoint {
                time: end.format("%H:00").to_string(),
                uptime: average(&samples),
            });
        }

        points
    }

    /// Fleet availability over `[now-1h, now)`, additionally excluding
    /// terminals created within the last 5 minutes. 0 when nothing is
    /// eligible.
    pub fn last_hour(&self, now: DateTime<Utc>) -> f64 {
        let start = now - Duration::hours(1);
        let fresh_cutoff = now - Duration::minutes(MIN_ACTIVE_MINUTES);

        let mut samples = Vec::new();
        for terminal in self.store.list_terminals(None) {
            if terminal.created_at > fresh_cutoff {
                continue;
            }
            let Some((effective_start, expected)) =
                expected_samples(terminal.created_at, start, now)
            else {
                continue;
            };
            let received = self
                .store
                .heartbeat_count(&terminal.device_id, effective_start, now);
            samples.push(percentage(received, expected, 0.0));
        }

        average(&samples)
    }

    /// The scheduled recompute: score every terminal over `[now-24h, now)`
    /// and persist the result. Terminals active for under 5 minutes keep
    /// their stored value. Returns how many terminals were updated.
    pub fn recompute_all(&self, now: DateTime<Utc>) -> usize {
        let start = now - Duration::hours(24);
        let mut updated = 0;

        for terminal in self.store.list_terminals(None) {
            let Some((effective_start, expected)) =
                expected_samples(terminal.created_at, start, now)
            else {
                continue;
            };
            let received = self
                .store
                .heartbeat_count(&terminal.device_id, effective_start, now);
            let pct = percentage(received, expected, 100.0);

            match self.store.set_uptime_24h(&terminal.device_id, pct, now) {
                Ok(()) => updated += 1,
                Err(e) => {
                    tracing::warn!(device = %terminal.device_id, error = %e, "uptime persist failed")
                }
            }
        }

        updated
    }
}

fn average(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}
