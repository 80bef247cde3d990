pub mod engine;
pub mod models;

pub use engine::{hour_floor, terminal_code, AlertFilter, FleetStore, StoreError};
pub use models::{
    Alert, AlertDraft, AlertType, Heartbeat, HeartbeatPayload, HourlyBucket, Severity, Terminal,
    TerminalStatus, VersionInfo,
};
