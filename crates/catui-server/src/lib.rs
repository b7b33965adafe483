//! Helpers for protocol servers launched by the catui broker.
//!
//! The broker starts a server with one end of a control socket inherited at
//! the descriptor number named by [`LOAD_BALANCER_FD_ENV`]. Each client the
//! broker routes to the server arrives on that socket as a passed
//! descriptor, together with the client's handshake request. The server
//! answers with [`ack`] or [`nack`] and then talks to the client directly.
//!
//! ```rust,no_run
//! use catui_server::{accept, server_fd};
//!
//! let control = server_fd()?;
//! loop {
//!     let client = accept(&control)?;
//!     if client.request.version.major() == 1 {
//!         client.ack()?;
//!         // serve client.stream ...
//!     } else {
//!         client.nack("only version 1 is served here")?;
//!     }
//! }
//! # Ok::<(), catui_server::ServerError>(())
//! ```

mod error;

use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::fcntl::{FcntlArg, fcntl};
use tracing::debug;

use catui_protocol::{
    Ack, Connection, Encoding, FrameWriter, HandshakeRequest, ProtocolError, fdpass,
};

pub use error::{ServerError, ServerResult};

pub use catui_protocol::LOAD_BALANCER_FD_ENV;

/// Opens the control socket inherited from the broker.
pub fn server_fd() -> ServerResult<UnixStream> {
    server_fd_from(std::env::var(LOAD_BALANCER_FD_ENV).ok().as_deref())
}

/// Opens the control socket named by `value`, the contents of
/// [`LOAD_BALANCER_FD_ENV`].
///
/// The descriptor is owned by the returned stream from then on; call this
/// once per process.
pub fn server_fd_from(value: Option<&str>) -> ServerResult<UnixStream> {
    let value = value.ok_or(ServerError::NoBrokerFd {
        var: LOAD_BALANCER_FD_ENV,
    })?;

    let fd: RawFd = value
        .trim()
        .parse()
        .map_err(|e| ServerError::bad_broker_fd(LOAD_BALANCER_FD_ENV, value, e))?;
    if fd < 0 {
        return Err(ServerError::bad_broker_fd(
            LOAD_BALANCER_FD_ENV,
            value,
            "negative descriptor",
        ));
    }

    fcntl(fd, FcntlArg::F_GETFD)
        .map_err(|e| ServerError::bad_broker_fd(LOAD_BALANCER_FD_ENV, value, e))?;

    debug!(fd, "Using broker control socket");

    // SAFETY: the broker leaves this descriptor open across exec for us and
    // nothing else in the process refers to it; F_GETFD confirmed it is open.
    let owned = unsafe { OwnedFd::from_raw_fd(fd) };
    Ok(UnixStream::from(owned))
}

/// A client forwarded by the broker, not yet acknowledged.
#[derive(Debug)]
pub struct Accepted {
    /// Socket connected to the client.
    pub stream: UnixStream,
    /// The handshake the client sent to the broker.
    pub request: HandshakeRequest,
}

impl Accepted {
    /// Accepts the client.
    pub fn ack(&self) -> ServerResult<()> {
        ack(&self.stream)
    }

    /// Rejects the client with `message`.
    pub fn nack(&self, message: &str) -> ServerResult<()> {
        nack(&self.stream, message)
    }

    /// Wraps the client socket as a [`Connection`].
    pub fn into_connection(self) -> Connection {
        Connection::from_stream(self.stream)
    }
}

/// Blocks until the broker forwards a client over `control`.
///
/// The returned stream is in blocking mode whatever mode the sender left
/// the shared file description in.
pub fn accept(control: &UnixStream) -> ServerResult<Accepted> {
    let (fd, request) = fdpass::receive_forwarded(control)?;
    let stream = UnixStream::from(fd);
    stream
        .set_nonblocking(false)
        .map_err(ProtocolError::from)?;

    debug!(
        protocol = %request.protocol,
        version = %request.version,
        "Accepted forwarded client"
    );
    Ok(Accepted { stream, request })
}

/// Sends the empty acceptance frame.
pub fn ack(stream: &UnixStream) -> ServerResult<()> {
    FrameWriter::new(stream).write_frame(&[])?;
    Ok(())
}

/// Sends a `{"error":...}` rejection frame.
pub fn nack(stream: &UnixStream, message: &str) -> ServerResult<()> {
    let payload = Ack::reject(message).encode(Encoding::Text)?;
    FrameWriter::new(stream).write_frame(&payload)?;
    Ok(())
}
