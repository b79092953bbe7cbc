//! # telebridge-device
//!
//! The device side of the bridge. A single [`ConnectionManager`] task owns the
//! TCP listener and the at-most-one device session:
//!
//! ```text
//! bind ──► accept ──► Connected(addr) ──► read ─► decode ─► merge ─► publish
//!   │         ▲                              │
//!   │         └──── Disconnected ◄─── EOF / error / idle timeout
//!   └─ bind error ─► StartupFailed (published once, task ends)
//! ```
//!
//! Everything else reaches the socket through a cloneable [`DeviceHandle`],
//! which queues outbound bytes for the task to write.

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod handle;
pub mod manager;

pub use config::DeviceConfig;
pub use errors::BindFailure;
pub use handle::{DeviceHandle, SessionInfo};
pub use manager::{ConnectionManager, DeviceListener, SessionEnd};
