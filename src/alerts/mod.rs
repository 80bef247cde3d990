//! Threshold alerting: heartbeat evaluation, dedup, queries, resolution

pub mod engine;
pub mod rules;

pub use engine::AlertEngine;
pub use rules::evaluate;
