//! Wire protocol for the catui broker.
//!
//! # Protocol Overview
//!
//! A client opens a channel (a unix socket to the broker, or pipes to a
//! spawned server), sends one length-prefixed [`HandshakeRequest`] and reads
//! one length-prefixed [`Ack`]. After an empty acknowledgement the channel
//! carries application data only.
//!
//! Frames are a 4-byte big-endian length followed by the payload. Requests
//! come in two [`Encoding`]s: JSON text and a CBOR tree.
//!
//! # Example
//!
//! ```rust
//! use catui_core::SemVer;
//! use catui_protocol::{Encoding, HandshakeRequest, ProtocolName};
//!
//! let request = HandshakeRequest::new(
//!     ProtocolName::new("com.example.echo").unwrap(),
//!     SemVer::new(1, 0, 0),
//! );
//! let bytes = request.encode(Encoding::Structured).unwrap();
//! let decoded = HandshakeRequest::decode(Encoding::Structured, &bytes).unwrap();
//! assert_eq!(decoded, request);
//! ```

mod ack;
mod connection;
mod error;
pub mod fdpass;
mod framing;
mod handshake;

pub use ack::Ack;
pub use connection::Connection;
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{
    FRAME_HEADER_SIZE, FrameReader, FrameWriter, decode_frame, encode_frame, frame_len,
};
pub use handshake::{Encoding, HandshakeRequest, ProtocolName};

/// Largest frame payload accepted anywhere in the protocol.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Largest handshake request payload.
pub const CONNECT_MESSAGE_SIZE: usize = 512;

/// Largest acknowledgement payload.
pub const ACK_MESSAGE_SIZE: usize = 1024;

/// Longest protocol name, in bytes.
pub const PROTOCOL_NAME_MAX: usize = 127;

/// Environment variable through which the broker tells a launched server
/// the descriptor number of its control socket.
pub const LOAD_BALANCER_FD_ENV: &str = "CATUI_LOAD_BALANCER_FD";
