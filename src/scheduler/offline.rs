//! Offline-detection sweep

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time;

use crate::store::FleetStore;
use crate::ws::{BroadcastHub, WsEvent};

/// Minutes of silence after which a terminal is considered offline
pub const LIVENESS_THRESHOLD_MINUTES: i64 = 10;

/// Background worker that periodically flips silent terminals to offline
pub struct OfflineSweepWorker {
    store: Arc<FleetStore>,
    hub: Arc<BroadcastHub>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl OfflineSweepWorker {
    pub fn new(store: Arc<FleetStore>, hub: Arc<BroadcastHub>, interval: Duration) -> Self {
        Self {
            store,
            hub,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("offline sweep started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;

                let flipped = run_offline_sweep(&self.store, &self.hub);
                if flipped > 0 {
                    tracing::info!("offline sweep marked {} terminals offline", flipped);
                }
            }

            tracing::info!("offline sweep stopped");
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

/// Run one offline-detection pass (for manual/testing use).
///
/// Idempotent; broadcasts an update for each terminal that transitioned.
pub fn run_offline_sweep(store: &FleetStore, hub: &BroadcastHub) -> usize {
    let now = Utc::now();
    let cutoff = now - ChronoDuration::minutes(LIVENESS_THRESHOLD_MINUTES);

    let flipped = store.mark_offline(cutoff, now);
    for terminal in &flipped {
        hub.broadcast(&WsEvent::TerminalUpdate(terminal.clone()));
    }
    flipped.len()
}
