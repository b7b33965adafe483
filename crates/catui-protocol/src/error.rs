//! Protocol error types.

use thiserror::Error;

use catui_core::SemVerError;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur during protocol operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Caller-supplied buffer cannot hold the encoded message.
    #[error("buffer too small: need {required} bytes, have {capacity}")]
    BufferTooSmall { required: usize, capacity: usize },

    /// Text encoding failed or the payload is not the expected JSON shape.
    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),

    /// Structured encoding failed or the payload is not the expected shape.
    #[error("invalid structured message: {0}")]
    Structured(#[from] serde_cbor::Error),

    /// A version field did not parse.
    #[error("invalid '{field}' version: {source}")]
    InvalidVersion {
        field: &'static str,
        #[source]
        source: SemVerError,
    },

    /// A protocol name was rejected.
    #[error("invalid protocol name '{name}': {reason}")]
    InvalidProtocolName { name: String, reason: &'static str },

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Incomplete message (connection closed before full message received).
    #[error("incomplete message: expected {expected} bytes, got {received}")]
    IncompleteMessage { expected: usize, received: usize },

    /// The peer closed the channel where a message was expected.
    #[error("connection closed before a message was received")]
    ConnectionClosed,

    /// A forwarded connection arrived without its descriptor.
    #[error("forwarded message carried no file descriptor")]
    MissingDescriptor,
}

impl ProtocolError {
    /// Creates an invalid protocol name error.
    pub fn invalid_protocol_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidProtocolName {
            name: name.into(),
            reason,
        }
    }
}
