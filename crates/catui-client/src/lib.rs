//! Client side of the catui broker.
//!
//! [`Connector`] resolves where a protocol implementation lives (a broker
//! named by the environment, or an installed server it launches itself),
//! performs the handshake, and returns an open [`Connection`].
//!
//! ```rust,no_run
//! use std::io::Write;
//!
//! use catui_client::Connector;
//! use catui_core::SemVer;
//!
//! let mut conn = Connector::from_env().connect("com.example.echo", SemVer::new(1, 0, 0))?;
//! conn.write_all(b"hello")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bridge;
pub mod connector;
pub mod env;
pub mod error;

pub use catui_protocol::{Connection, Encoding};
pub use connector::Connector;
pub use env::ConnectEnv;
pub use error::{ClientError, ConnectError, ConnectErrorCode, ConnectResult};
