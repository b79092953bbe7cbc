//! Viewer WebSocket handling: connection state, snapshot fan-out, heartbeat.

pub mod broadcast;
pub mod connection;
pub mod heartbeat;
pub mod session;
