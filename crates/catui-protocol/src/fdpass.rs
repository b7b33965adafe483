//! Passing open descriptors between processes over a unix socket.
//!
//! The broker hands an accepted client socket to a server process by sending
//! it as `SCM_RIGHTS` ancillary data on the server's control socket. The
//! descriptor rides along with a framed, text-encoded copy of the client's
//! handshake request.

use std::io::{self, IoSlice, IoSliceMut, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::cmsg_space;
use nix::sys::socket::{ControlMessage, ControlMessageOwned, MsgFlags, recvmsg, sendmsg};

use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::{FRAME_HEADER_SIZE, encode_frame, frame_len};
use crate::handshake::{Encoding, HandshakeRequest};
use crate::CONNECT_MESSAGE_SIZE;

/// Sends `data` with `fd` attached.
///
/// `data` must not be empty; stream sockets drop ancillary data sent with
/// no payload. Returns the number of payload bytes written, which may be
/// short.
pub fn send_fd(socket: BorrowedFd<'_>, fd: BorrowedFd<'_>, data: &[u8]) -> io::Result<usize> {
    let fds = [fd.as_raw_fd()];
    let cmsgs = [ControlMessage::ScmRights(&fds)];
    let iov = [IoSlice::new(data)];
    sendmsg::<()>(socket.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None)
        .map_err(io::Error::from)
}

/// Receives bytes into `buf` and at most one attached descriptor.
///
/// Returns `(0, None)` at end of stream. A received descriptor is
/// close-on-exec.
pub fn recv_fd(socket: BorrowedFd<'_>, buf: &mut [u8]) -> io::Result<(usize, Option<OwnedFd>)> {
    let mut cmsg_buffer = cmsg_space!([RawFd; 1]);
    let mut iov = [IoSliceMut::new(buf)];
    let msg = recvmsg::<()>(
        socket.as_raw_fd(),
        &mut iov,
        Some(&mut cmsg_buffer),
        MsgFlags::MSG_CMSG_CLOEXEC,
    )
    .map_err(io::Error::from)?;

    let mut received = Vec::new();
    for cmsg in msg.cmsgs().map_err(io::Error::from)? {
        if let ControlMessageOwned::ScmRights(fds) = cmsg {
            received.extend(fds);
        }
    }
    let bytes = msg.bytes;

    // SAFETY: the kernel installed these descriptors in our table for this
    // message; nothing else refers to them yet.
    let mut owned: Vec<OwnedFd> = received
        .into_iter()
        .map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
        .collect();

    if owned.len() > 1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected one descriptor, received {}", owned.len()),
        ));
    }

    Ok((bytes, owned.pop()))
}

/// Builds the payload that accompanies a forwarded descriptor.
pub fn forward_frame(request: &HandshakeRequest) -> ProtocolResult<Vec<u8>> {
    encode_frame(&request.encode(Encoding::Text)?)
}

/// Sends `fd` and the request it carries over a control socket.
pub fn send_forwarded(
    control: &UnixStream,
    fd: BorrowedFd<'_>,
    request: &HandshakeRequest,
) -> ProtocolResult<()> {
    let frame = forward_frame(request)?;
    let mut sent = send_fd(control.as_fd(), fd, &frame)?;
    while sent < frame.len() {
        sent += io::Write::write(&mut &*control, &frame[sent..])?;
    }
    Ok(())
}

/// Receives a forwarded descriptor and its request from a control socket.
///
/// The descriptor is attached to the first bytes of the frame; the rest of
/// the frame is read normally.
pub fn receive_forwarded(control: &UnixStream) -> ProtocolResult<(OwnedFd, HandshakeRequest)> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let mut filled = 0;
    let mut descriptor = None;

    while filled < FRAME_HEADER_SIZE {
        let (n, fd) = recv_fd(control.as_fd(), &mut header[filled..])?;
        if n == 0 {
            return Err(if filled == 0 {
                ProtocolError::ConnectionClosed
            } else {
                ProtocolError::IncompleteMessage {
                    expected: FRAME_HEADER_SIZE,
                    received: filled,
                }
            });
        }
        if fd.is_some() {
            descriptor = fd;
        }
        filled += n;
    }

    let descriptor = descriptor.ok_or(ProtocolError::MissingDescriptor)?;

    let len = frame_len(header, CONNECT_MESSAGE_SIZE)?;
    let mut payload = vec![0u8; len];
    (&mut &*control).read_exact(&mut payload).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::IncompleteMessage {
                expected: FRAME_HEADER_SIZE + len,
                received: FRAME_HEADER_SIZE,
            }
        } else {
            e.into()
        }
    })?;

    let request = HandshakeRequest::decode(Encoding::Text, &payload)?;
    Ok((descriptor, request))
}
