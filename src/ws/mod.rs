pub mod hub;

pub use hub::{BroadcastHub, WsEvent};
