//! Error taxonomy shared by the device loop and the command path.

/// Failure to hand bytes to the device.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// No device session is active.
    #[error("device not connected")]
    NotConnected,
    /// The session transport failed while writing.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure of a viewer command.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The request did not validate; the device was not contacted.
    #[error("rejected: {0}")]
    Rejected(String),
    /// No device session is active.
    #[error("device not connected")]
    NotConnected,
    /// Writing the command to the device failed.
    #[error("command send failed: {0}")]
    Transport(String),
}

impl DispatchError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected",
            Self::NotConnected => "not_connected",
            Self::Transport(_) => "transport_error",
        }
    }

    /// Whether the viewer caused the failure (as opposed to the bridge).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::NotConnected)
    }
}

impl From<DeviceError> for DispatchError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::NotConnected => Self::NotConnected,
            DeviceError::Transport(detail) => Self::Transport(detail),
        }
    }
}
