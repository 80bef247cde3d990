//! Persisted 24h uptime recompute sweep

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::store::FleetStore;
use crate::telemetry::UptimeEstimator;

/// Background worker that periodically recomputes and persists every
/// terminal's rolling 24h uptime percentage
pub struct UptimeSweepWorker {
    estimator: UptimeEstimator,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl UptimeSweepWorker {
    pub fn new(store: Arc<FleetStore>, interval: Duration) -> Self {
        Self {
            estimator: UptimeEstimator::new(store),
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("uptime sweep started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;

                let updated = self.estimator.recompute_all(Utc::now());
                if updated > 0 {
                    tracing::debug!("uptime sweep updated {} terminals", updated);
                }
            }

            tracing::info!("uptime sweep stopped");
        })
    }

    /// Stop the worker
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if worker is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Run one recompute pass (for manual/testing use)
pub fn run_uptime_sweep(store: &Arc<FleetStore>) -> usize {
    UptimeEstimator::new(Arc::clone(store)).recompute_all(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::HeartbeatPayload;
    use chrono::{DateTime, Duration as ChronoDuration};

    fn seed_beats(store: &FleetStore, device_id: &str, start: DateTime<Utc>, beats: i64) {
        for i in 0..beats {
            let ts = start + ChronoDuration::minutes(i * 5);
            let payload = HeartbeatPayload {
                device_id: device_id.to_string(),
                timestamp: ts.timestamp_millis(),
                battery_level: 85,
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
            store.apply_heartbeat(&payload, ts, &[], ts);
        }
    }

    #[tokio::test]
    async fn test_sweep_persists_uptime() {
        let store = Arc::new(FleetStore::new());
        let created = Utc::now() - ChronoDuration::hours(1);
        seed_beats(&store, "steady-device", created, 12);

        assert_eq!(run_uptime_sweep(&store), 1);

        let terminal = store.get_terminal_by_device("steady-device").unwrap();
        assert!(terminal.uptime_percentage_24h > 99.0);
        assert!(terminal.uptime_percentage_24h <= 100.0);
    }

    #[tokio::test]
    async fn test_worker_start_stop() {
        let store = Arc::new(FleetStore::new());
        let created = Utc::now() - ChronoDuration::hours(1);
        seed_beats(&store, "steady-device", created, 12);

        let worker = Arc::new(UptimeSweepWorker::new(
            Arc::clone(&store),
            Duration::from_millis(10),
        ));
        let handle = Arc::clone(&worker).start();
        assert!(worker.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let terminal = store.get_terminal_by_device("steady-device").unwrap();
        assert!(terminal.uptime_percentage_24h > 0.0);

        worker.stop();
        assert!(!worker.is_running());
        handle.abort();
    }
}
