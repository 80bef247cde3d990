//! Background reconciliation jobs.
//!
//! Two independent workers sharing no state: the offline-detection sweep and
//! the 24h uptime recompute. Each is started and stopped explicitly and
//! survives any single failed iteration.

pub mod offline;
pub mod uptime_sweep;

pub use offline::{run_offline_sweep, OfflineSweepWorker, LIVENESS_THRESHOLD_MINUTES};
pub use uptime_sweep::{run_uptime_sweep, UptimeSweepWorker};
