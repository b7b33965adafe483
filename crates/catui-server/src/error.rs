//! Server helper error types.

use thiserror::Error;

/// Result type for server helper operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in a protocol server talking to the broker.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The broker descriptor variable is not set.
    #[error("{var} is not set; was this process started by the catui broker?")]
    NoBrokerFd { var: &'static str },

    /// The broker descriptor variable is not a usable descriptor.
    #[error("{var}={value} is not an open descriptor: {reason}")]
    BadBrokerFd {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// Protocol error (framing, encoding, descriptor passing).
    #[error("Protocol error: {0}")]
    Protocol(#[from] catui_protocol::ProtocolError),
}

impl ServerError {
    /// Creates a bad broker descriptor error.
    pub fn bad_broker_fd(
        var: &'static str,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::BadBrokerFd {
            var,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}
