//! # telebridge-server
//!
//! The viewer side of the bridge, on axum:
//!
//! - `GET /ws`: WebSocket; receives the current snapshot on connect and an
//!   `update_data` event on every change
//! - `POST /send_command`: `{rate, cycles}` forwarded to the device
//! - `GET /snapshot`: current telemetry as JSON
//! - `GET /health`: uptime, viewer count, device link state and session
//!
//! [`BroadcastHub`] implements the core `SnapshotPublisher` seam, so the device
//! task hands it every new snapshot without knowing about WebSockets.

#![deny(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use dispatcher::{CommandDispatcher, DeviceSink};
pub use server::{AppState, BridgeServer, CommandResponse, build_router};
pub use shutdown::{DEFAULT_DRAIN_GRACE, DrainReport, ShutdownCoordinator};
pub use websocket::broadcast::{BroadcastHub, encode_snapshot};
