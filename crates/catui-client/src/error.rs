//! Client error types.

use std::fmt;
use std::io;
use std::path::PathBuf;

use catui_core::{InstallError, SemVer, SemVerError};
use catui_protocol::ProtocolError;

use crate::env::{ADDR_ENV, ADDR_TYPE_ENV, VERSION_ENV};

/// Result type for connect attempts.
pub type ConnectResult<T> = Result<T, ConnectError>;

/// Discriminates why a connect attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectErrorCode {
    /// The protocol name is not valid.
    BadProtocol,
    /// No broker version in the environment.
    NoVersion,
    /// A broker version string does not parse.
    VersionParse,
    /// This implementation cannot use the broker's version.
    VersionIncompatible,
    /// No address type in the environment.
    NoAddrType,
    /// The address type is not `unix`.
    UnknownAddrType,
    /// No address in the environment.
    NoAddr,
    /// A socket could not be created.
    NoSocket,
    /// The socket could not connect.
    NoConnect,
    /// The installed config could not be read.
    NoConfig,
    /// The installed config has no usable `version`.
    NoVersionField,
    /// The installed protocol version is not usable.
    ProtocolVersionIncompatible,
    /// The installed config has no usable `exec`.
    NoExec,
    /// Pipes to the child could not be set up.
    NoPipe,
    /// The child could not be started.
    NoFork,
    /// The handshake exchange failed.
    NoAck,
    /// The peer declined the connection.
    Rejected,
}

/// Errors from [`Connector::connect`](crate::Connector::connect).
#[derive(Debug)]
pub enum ConnectError {
    /// Protocol name validation failed.
    BadProtocol(ProtocolError),
    /// The broker version variable is unset.
    NoVersion,
    /// A broker version did not parse.
    VersionParse { origin: String, source: SemVerError },
    /// The installed config does not declare `catui_version`.
    NoCatuiVersion { path: PathBuf },
    /// The broker or installed catui version is incompatible.
    VersionIncompatible {
        implementation: SemVer,
        other: SemVer,
        origin: &'static str,
    },
    /// The address type variable is unset.
    NoAddrType,
    /// The address type is not recognized.
    UnknownAddrType(String),
    /// The address variable is unset.
    NoAddr,
    /// Socket creation failed.
    NoSocket(io::Error),
    /// Connecting the socket failed.
    NoConnect { addr: String, source: io::Error },
    /// Reading the installed config failed.
    NoConfig(InstallError),
    /// The installed config lacks a usable `version`.
    NoVersionField { path: PathBuf },
    /// The installed protocol version cannot serve the request.
    ProtocolVersionIncompatible {
        protocol: String,
        requested: SemVer,
        installed: SemVer,
    },
    /// The installed config lacks a usable `exec`.
    NoExec(InstallError),
    /// Child pipes were not available.
    NoPipe(io::Error),
    /// Spawning the child failed.
    NoFork(io::Error),
    /// Writing the request or reading the acknowledgement failed.
    NoAck {
        stage: &'static str,
        source: ProtocolError,
    },
    /// The peer rejected the connection.
    Rejected(String),
}

impl ConnectError {
    /// Returns the error's code.
    pub fn code(&self) -> ConnectErrorCode {
        match self {
            Self::BadProtocol(_) => ConnectErrorCode::BadProtocol,
            Self::NoVersion => ConnectErrorCode::NoVersion,
            Self::VersionParse { .. } | Self::NoCatuiVersion { .. } => {
                ConnectErrorCode::VersionParse
            }
            Self::VersionIncompatible { .. } => ConnectErrorCode::VersionIncompatible,
            Self::NoAddrType => ConnectErrorCode::NoAddrType,
            Self::UnknownAddrType(_) => ConnectErrorCode::UnknownAddrType,
            Self::NoAddr => ConnectErrorCode::NoAddr,
            Self::NoSocket(_) => ConnectErrorCode::NoSocket,
            Self::NoConnect { .. } => ConnectErrorCode::NoConnect,
            Self::NoConfig(_) => ConnectErrorCode::NoConfig,
            Self::NoVersionField { .. } => ConnectErrorCode::NoVersionField,
            Self::ProtocolVersionIncompatible { .. } => {
                ConnectErrorCode::ProtocolVersionIncompatible
            }
            Self::NoExec(_) => ConnectErrorCode::NoExec,
            Self::NoPipe(_) => ConnectErrorCode::NoPipe,
            Self::NoFork(_) => ConnectErrorCode::NoFork,
            Self::NoAck { .. } => ConnectErrorCode::NoAck,
            Self::Rejected(_) => ConnectErrorCode::Rejected,
        }
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadProtocol(err) => write!(f, "{}", err),
            Self::NoVersion => write!(f, "{} not found", VERSION_ENV),
            Self::VersionParse { origin, source } => {
                write!(f, "unable to parse semver {}: {}", origin, source)
            }
            Self::NoCatuiVersion { path } => {
                write!(f, "cannot read catui_version from config {}", path.display())
            }
            Self::VersionIncompatible {
                implementation,
                other,
                origin,
            } => write!(
                f,
                "catui implementation ({}) cannot use {} version ({})",
                implementation, origin, other
            ),
            Self::NoAddrType => write!(f, "{} not found", ADDR_TYPE_ENV),
            Self::UnknownAddrType(kind) => write!(f, "unknown {}: {}", ADDR_TYPE_ENV, kind),
            Self::NoAddr => write!(f, "{} not found", ADDR_ENV),
            Self::NoSocket(err) => write!(f, "failed to create socket: {}", err),
            Self::NoConnect { addr, source } => {
                write!(f, "failed to connect to {}: {}", addr, source)
            }
            Self::NoConfig(err) => write!(f, "error reading installed config: {}", err),
            Self::NoVersionField { path } => {
                write!(f, "cannot read version from config {}", path.display())
            }
            Self::ProtocolVersionIncompatible {
                protocol,
                requested,
                installed,
            } => write!(
                f,
                "{} implementation ({}) cannot use installed version ({})",
                protocol, requested, installed
            ),
            Self::NoExec(err) => write!(f, "cannot read 'exec': {}", err),
            Self::NoPipe(err) => write!(f, "pipe: {}", err),
            Self::NoFork(err) => write!(f, "failed to launch server: {}", err),
            Self::NoAck { stage, source } => write!(f, "failed to {}: {}", stage, source),
            Self::Rejected(msg) => write!(f, "server rejected connection: {}", msg),
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BadProtocol(err) => Some(err),
            Self::VersionParse { source, .. } => Some(source),
            Self::NoSocket(err) | Self::NoPipe(err) | Self::NoFork(err) => Some(err),
            Self::NoConnect { source, .. } => Some(source),
            Self::NoConfig(err) | Self::NoExec(err) => Some(err),
            Self::NoAck { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors from the `catui-connect` binary.
#[derive(Debug)]
pub enum ClientError {
    /// The handshake failed.
    Connect(ConnectError),
    /// Copying data between stdio and the connection failed.
    Io(io::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(err) => write!(f, "{}", err),
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<ConnectError> for ClientError {
    fn from(err: ConnectError) -> Self {
        Self::Connect(err)
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incompatible_message_names_both_versions() {
        let err = ConnectError::VersionIncompatible {
            implementation: SemVer::new(0, 1, 0),
            other: SemVer::new(0, 2, 0),
            origin: "server's",
        };
        assert_eq!(err.code(), ConnectErrorCode::VersionIncompatible);
        insta::assert_snapshot!(
            err,
            @"catui implementation (0.1.0) cannot use server's version (0.2.0)"
        );
    }

    #[test]
    fn env_messages() {
        insta::assert_snapshot!(ConnectError::NoVersion, @"GULACHEK_CATUI_VERSION not found");
        insta::assert_snapshot!(
            ConnectError::UnknownAddrType("tcp".into()),
            @"unknown GULACHEK_CATUI_ADDR_TYPE: tcp"
        );
    }

    #[test]
    fn rejected_carries_message() {
        let err = ConnectError::Rejected("Version 2 not supported".into());
        assert_eq!(err.code(), ConnectErrorCode::Rejected);
        assert_eq!(
            err.to_string(),
            "server rejected connection: Version 2 not supported"
        );
    }
}
