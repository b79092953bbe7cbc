//! Device listener errors.

/// The device listener could not be bound. Fatal to the connection manager.
#[derive(Debug, thiserror::Error)]
#[error("failed to bind device listener on {addr}: {source}")]
pub struct BindFailure {
    /// Address that was requested.
    pub addr: String,
    /// Underlying socket error.
    #[source]
    pub source: std::io::Error,
}

impl BindFailure {
    /// Reason text shown to viewers in the `StartupFailed` status.
    pub fn reason(&self) -> String {
        self.source.to_string()
    }
}
