//! Copies data between a local reader/writer pair and a connection.

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::thread;

use nix::sys::socket::{Shutdown, shutdown};
use tracing::debug;

use catui_protocol::Connection;

/// Pumps `local_in` into `conn` and `conn` into `local_out`.
///
/// The outbound copy runs on its own thread. When `local_in` ends, the
/// peer sees end of stream (a write shutdown for sockets, a closed pipe
/// otherwise). Returns once the peer stops sending.
pub fn bridge<R, W>(conn: Connection, mut local_in: R, mut local_out: W) -> io::Result<u64>
where
    R: Read + Send + 'static,
    W: Write,
{
    let remote = conn.is_remote();
    let (mut input, mut output) = conn.into_halves()?;

    thread::spawn(move || {
        match io::copy(&mut local_in, &mut output) {
            Ok(n) => debug!(bytes = n, "Local input finished"),
            Err(e) => debug!(error = %e, "Local input copy failed"),
        }
        if remote
            && let Err(e) = shutdown(output.as_raw_fd(), Shutdown::Write)
        {
            debug!(error = %e, "Failed to shut down write half");
        }
    });

    let received = io::copy(&mut input, &mut local_out)?;
    local_out.flush()?;
    Ok(received)
}
