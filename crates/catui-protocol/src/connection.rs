//! One end of a brokered byte channel.
//!
//! A [`Connection`] owns either a single duplex descriptor (a socket) or a
//! pair of pipe ends. It exposes [`Read`]/[`Write`] for application data and
//! framed helpers for the handshake exchange. Both descriptors are released
//! exactly once, by [`Connection::close`] or on drop.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, IntoRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::process::{ChildStdin, ChildStdout};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::ack::Ack;
use crate::error::ProtocolResult;
use crate::framing::{FrameReader, FrameWriter};
use crate::handshake::{Encoding, HandshakeRequest};
use crate::{ACK_MESSAGE_SIZE, CONNECT_MESSAGE_SIZE, MAX_MESSAGE_SIZE};

enum Ends {
    Duplex(File),
    Split { input: File, output: File },
}

/// An open channel to a peer.
pub struct Connection {
    ends: Option<Ends>,
    remote: bool,
}

impl Connection {
    /// Takes ownership of `input` and `output`.
    ///
    /// Pass `None` for `output` when one descriptor carries both directions.
    pub fn new(input: OwnedFd, output: Option<OwnedFd>, remote: bool) -> Self {
        let ends = match output {
            Some(output) => Ends::Split {
                input: File::from(input),
                output: File::from(output),
            },
            None => Ends::Duplex(File::from(input)),
        };
        Self {
            ends: Some(ends),
            remote,
        }
    }

    /// Wraps a connected socket to a separate process.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self::new(stream.into(), None, true)
    }

    /// Wraps the pipes of a locally spawned child.
    pub fn from_child(stdout: ChildStdout, stdin: ChildStdin) -> Self {
        Self::new(stdout.into(), Some(stdin.into()), false)
    }

    /// Returns true if the peer was reached over a socket.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Returns true until the connection is closed.
    pub fn is_open(&self) -> bool {
        self.ends.is_some()
    }

    /// Borrows the input descriptor.
    pub fn input_fd(&self) -> Option<BorrowedFd<'_>> {
        self.ends.as_ref().map(|ends| match ends {
            Ends::Duplex(file) => file.as_fd(),
            Ends::Split { input, .. } => input.as_fd(),
        })
    }

    /// Borrows the output descriptor.
    pub fn output_fd(&self) -> Option<BorrowedFd<'_>> {
        self.ends.as_ref().map(|ends| match ends {
            Ends::Duplex(file) => file.as_fd(),
            Ends::Split { output, .. } => output.as_fd(),
        })
    }

    /// Writes `message` in the structured encoding as one frame.
    pub fn write_message<T: Serialize>(&mut self, message: &T) -> ProtocolResult<()> {
        let payload = serde_cbor::to_vec(message)?;
        FrameWriter::new(self).write_frame(&payload)
    }

    /// Reads one frame and decodes it from the structured encoding.
    pub fn read_message<T: DeserializeOwned>(&mut self) -> ProtocolResult<T> {
        let payload = FrameReader::new(self).expect_frame(MAX_MESSAGE_SIZE)?;
        Ok(serde_cbor::from_slice(&payload)?)
    }

    /// Sends a handshake request.
    pub fn write_request(
        &mut self,
        request: &HandshakeRequest,
        encoding: Encoding,
    ) -> ProtocolResult<()> {
        let payload = request.encode(encoding)?;
        FrameWriter::new(self).write_frame(&payload)
    }

    /// Receives a handshake request, detecting its encoding.
    pub fn read_request(&mut self) -> ProtocolResult<(HandshakeRequest, Encoding)> {
        let payload = FrameReader::new(self).expect_frame(CONNECT_MESSAGE_SIZE)?;
        HandshakeRequest::decode_detected(&payload)
    }

    /// Sends an acknowledgement.
    pub fn write_ack(&mut self, ack: &Ack, encoding: Encoding) -> ProtocolResult<()> {
        let payload = ack.encode(encoding)?;
        FrameWriter::new(self).write_frame(&payload)
    }

    /// Receives the acknowledgement to a request sent in `encoding`.
    pub fn read_ack(&mut self, encoding: Encoding) -> ProtocolResult<Ack> {
        let payload = FrameReader::new(self).expect_frame(ACK_MESSAGE_SIZE)?;
        Ok(Ack::decode(encoding, &payload))
    }

    /// Releases both descriptors.
    ///
    /// Both are closed even if the first fails; the first failure is
    /// returned. Calling this again is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        match self.ends.take() {
            None => Ok(()),
            Some(Ends::Duplex(file)) => close_file(file),
            Some(Ends::Split { input, output }) => {
                let input = close_file(input);
                let output = close_file(output);
                input.and(output)
            }
        }
    }

    /// Splits into an input and an output handle for concurrent use.
    ///
    /// A duplex descriptor is duplicated so each half can be closed
    /// independently.
    pub fn into_halves(mut self) -> io::Result<(File, File)> {
        match self.ends.take() {
            None => Err(not_connected()),
            Some(Ends::Duplex(file)) => {
                let output = file.try_clone()?;
                Ok((file, output))
            }
            Some(Ends::Split { input, output }) => Ok((input, output)),
        }
    }

    fn input(&mut self) -> io::Result<&mut File> {
        match self.ends.as_mut() {
            Some(Ends::Duplex(file)) => Ok(file),
            Some(Ends::Split { input, .. }) => Ok(input),
            None => Err(not_connected()),
        }
    }

    fn output(&mut self) -> io::Result<&mut File> {
        match self.ends.as_mut() {
            Some(Ends::Duplex(file)) => Ok(file),
            Some(Ends::Split { output, .. }) => Ok(output),
            None => Err(not_connected()),
        }
    }
}

fn close_file(file: File) -> io::Result<()> {
    let fd = OwnedFd::from(file).into_raw_fd();
    nix::unistd::close(fd).map_err(io::Error::from)
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is closed")
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input()?.read(buf)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output()?.flush()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close connection");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("input", &self.input_fd())
            .field("output", &self.output_fd())
            .field("remote", &self.remote)
            .finish()
    }
}
