//! # telebridge-core
//!
//! Shared types for the device bridge:
//!
//! - [`Snapshot`] / [`DeviceStatus`]: the merged telemetry state viewers see
//! - [`TelemetryStore`]: the single owned copy of that state
//! - [`FrameDecoder`]: turns the device byte stream into telemetry frames
//! - [`Command`]: validated viewer commands and their device encoding
//! - [`SnapshotPublisher`]: the seam between the device loop and viewer fan-out

#![deny(unsafe_code)]

pub mod command;
pub mod errors;
pub mod frame;
pub mod snapshot;
pub mod store;

pub use command::{Ack, Command};
pub use errors::{DeviceError, DispatchError};
pub use frame::{FrameDecoder, FrameResult, MalformedFrame, TelemetryFrame};
pub use snapshot::{DeviceStatus, Fields, Snapshot};
pub use store::{SnapshotPublisher, TelemetryStore};
