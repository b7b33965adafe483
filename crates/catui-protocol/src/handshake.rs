//! The connection request sent by a client before any application data.
//!
//! Two encodings carry the same request:
//!
//! - [`Encoding::Text`]: a flat JSON object
//!   `{"catui-version":"0.1.0","protocol":"<name>","version":"1.2.3"}`
//! - [`Encoding::Structured`]: a CBOR pair `(protocol, version)` where the
//!   version is a triple of unsigned integers. The broker protocol version is
//!   not on the wire in this form; the receiver assumes its own
//!   [`CATUI_VERSION`], since both ends already agreed on it before the
//!   channel was opened.

use std::fmt;

use serde::{Deserialize, Serialize};

use catui_core::{CATUI_VERSION, SemVer};

use crate::error::{ProtocolError, ProtocolResult};
use crate::PROTOCOL_NAME_MAX;

/// Wire encoding of handshake messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    /// JSON text.
    Text,
    /// CBOR tree.
    #[default]
    Structured,
}

impl Encoding {
    /// Guesses the encoding of a received handshake payload.
    ///
    /// A JSON object starts with `{` after optional whitespace; a structured
    /// request never does.
    pub fn detect(payload: &[u8]) -> Self {
        match payload.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Self::Text,
            _ => Self::Structured,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Structured => f.write_str("structured"),
        }
    }
}

/// A validated protocol name.
///
/// Names are at most [`PROTOCOL_NAME_MAX`] bytes and double as directory
/// names in install trees, so they may not be empty, contain `/` or NUL, or
/// be `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolName(String);

impl ProtocolName {
    /// Validates `name`.
    pub fn new(name: impl Into<String>) -> ProtocolResult<Self> {
        let name = name.into();

        let reason = if name.is_empty() {
            Some("empty")
        } else if name.len() > PROTOCOL_NAME_MAX {
            Some("longer than 127 bytes")
        } else if name.contains(['/', '\0']) {
            Some("contains '/' or NUL")
        } else if name == "." || name == ".." {
            Some("reserved path component")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ProtocolError::invalid_protocol_name(name, reason)),
            None => Ok(Self(name)),
        }
    }

    /// Returns the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProtocolName {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProtocolName> for String {
    fn from(name: ProtocolName) -> Self {
        name.0
    }
}

impl AsRef<str> for ProtocolName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request to connect to `protocol` at a compatible `version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Broker protocol version the client requires.
    pub catui_version: SemVer,
    /// Requested protocol.
    pub protocol: ProtocolName,
    /// Protocol version the client requires.
    pub version: SemVer,
}

#[derive(Serialize)]
struct TextRequestOut<'a> {
    #[serde(rename = "catui-version")]
    catui_version: String,
    protocol: &'a str,
    version: String,
}

#[derive(Deserialize)]
struct TextRequestIn {
    #[serde(rename = "catui-version")]
    catui_version: String,
    protocol: ProtocolName,
    version: String,
}

impl HandshakeRequest {
    /// Creates a request using this implementation's [`CATUI_VERSION`].
    pub fn new(protocol: ProtocolName, version: SemVer) -> Self {
        Self {
            catui_version: CATUI_VERSION,
            protocol,
            version,
        }
    }

    /// Overrides the broker protocol version.
    #[must_use]
    pub fn with_catui_version(mut self, catui_version: SemVer) -> Self {
        self.catui_version = catui_version;
        self
    }

    /// Encodes the request.
    pub fn encode(&self, encoding: Encoding) -> ProtocolResult<Vec<u8>> {
        match encoding {
            Encoding::Text => {
                let wire = TextRequestOut {
                    catui_version: self.catui_version.to_string(),
                    protocol: self.protocol.as_str(),
                    version: self.version.to_string(),
                };
                Ok(serde_json::to_vec(&wire)?)
            }
            Encoding::Structured => Ok(serde_cbor::to_vec(&(&self.protocol, self.version))?),
        }
    }

    /// Encodes the request into `buf`, returning the number of bytes written.
    ///
    /// If `buf` is too small nothing is written and the error reports the
    /// required size.
    pub fn encode_into(&self, encoding: Encoding, buf: &mut [u8]) -> ProtocolResult<usize> {
        let bytes = self.encode(encoding)?;
        copy_into(&bytes, buf)
    }

    /// Decodes a request in the given encoding.
    pub fn decode(encoding: Encoding, payload: &[u8]) -> ProtocolResult<Self> {
        match encoding {
            Encoding::Text => {
                let wire: TextRequestIn = serde_json::from_slice(payload)?;
                let parse = |field: &'static str, text: &str| {
                    SemVer::parse(text)
                        .map_err(|source| ProtocolError::InvalidVersion { field, source })
                };
                Ok(Self {
                    catui_version: parse("catui-version", &wire.catui_version)?,
                    protocol: wire.protocol,
                    version: parse("version", &wire.version)?,
                })
            }
            Encoding::Structured => {
                let (protocol, version): (ProtocolName, SemVer) =
                    serde_cbor::from_slice(payload)?;
                Ok(Self::new(protocol, version))
            }
        }
    }

    /// Decodes a request whose encoding is inferred with [`Encoding::detect`].
    pub fn decode_detected(payload: &[u8]) -> ProtocolResult<(Self, Encoding)> {
        let encoding = Encoding::detect(payload);
        Ok((Self::decode(encoding, payload)?, encoding))
    }
}

pub(crate) fn copy_into(bytes: &[u8], buf: &mut [u8]) -> ProtocolResult<usize> {
    if bytes.len() > buf.len() {
        return Err(ProtocolError::BufferTooSmall {
            required: bytes.len(),
            capacity: buf.len(),
        });
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len())
}
