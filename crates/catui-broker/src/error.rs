//! Broker error types.

use std::io;

use thiserror::Error;

use catui_core::{InstallError, SemVer};

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur in the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// IO error (socket, file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, encoding, etc.).
    #[error("Protocol error: {0}")]
    Protocol(#[from] catui_protocol::ProtocolError),

    /// Socket path already in use.
    #[error("Socket path already in use: {path}")]
    SocketInUse { path: String },

    /// Socket path parent directory cannot be used.
    #[error("Socket path parent directory is not usable: {path}")]
    SocketPathInvalid { path: String },

    /// Broker is already running.
    #[error("Broker is already running (PID file exists: {path})")]
    AlreadyRunning { path: String },

    /// The client needs a newer broker protocol.
    #[error("catui version {requested} is not supported by this broker ({implemented})")]
    IncompatibleCatui {
        requested: SemVer,
        implemented: SemVer,
    },

    /// The server table is full.
    #[error("Cannot start a server for {protocol}: server table is full ({max} servers)")]
    Capacity { protocol: String, max: usize },

    /// No install root has a compatible version.
    #[error("No installed {protocol} is compatible with version {version}")]
    NoCompatibleServer { protocol: String, version: SemVer },

    /// The installed configuration is unusable.
    #[error("Installed config error: {0}")]
    Install(#[from] InstallError),

    /// The server process could not be started.
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Operation timed out.
    #[error("Timeout during {operation}")]
    Timeout { operation: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl BrokerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a socket in use error.
    pub fn socket_in_use(path: impl Into<String>) -> Self {
        Self::SocketInUse { path: path.into() }
    }

    /// Creates a socket path invalid error.
    pub fn socket_path_invalid(path: impl Into<String>) -> Self {
        Self::SocketPathInvalid { path: path.into() }
    }

    /// Creates an already running error.
    pub fn already_running(path: impl Into<String>) -> Self {
        Self::AlreadyRunning { path: path.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }
}
