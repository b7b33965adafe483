//! Starting protocol server processes.
//!
//! The broker hands every server one end of a private control socket. The
//! descriptor survives `exec` and its number is published through
//! [`LOAD_BALANCER_FD_ENV`]. Launching sits behind [`ProcessLauncher`] so
//! the registry can be driven without forking.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::process::Stdio;

use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use tokio::process::Command;
use tracing::{debug, info, warn};

use catui_protocol::{LOAD_BALANCER_FD_ENV, ProtocolName};

use crate::error::{BrokerError, BrokerResult};

/// A freshly started server, seen from the broker.
#[derive(Debug)]
pub struct LaunchedServer {
    /// Broker end of the control socket.
    pub control: UnixStream,
    /// Process id, when there is a real process.
    pub pid: Option<u32>,
}

/// Starts protocol servers.
pub trait ProcessLauncher: Send + Sync {
    /// Starts `exec` (program followed by arguments) as the server for
    /// `protocol`.
    fn launch(&self, protocol: &ProtocolName, exec: &[String]) -> BrokerResult<LaunchedServer>;
}

/// Launches servers as child processes.
///
/// Must be used from within a Tokio runtime; each child is reaped by a
/// background task that logs its exit status.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkExecLauncher;

impl ProcessLauncher for ForkExecLauncher {
    fn launch(&self, protocol: &ProtocolName, exec: &[String]) -> BrokerResult<LaunchedServer> {
        let (program, args) = exec
            .split_first()
            .ok_or_else(|| BrokerError::config(format!("empty exec for {}", protocol)))?;

        let (control, server_end) = UnixStream::pair()?;
        let server_fd: RawFd = server_end.as_raw_fd();

        let mut command = Command::new(program);
        command
            .args(args)
            .env(LOAD_BALANCER_FD_ENV, server_fd.to_string())
            .stdin(Stdio::null());

        // SAFETY: the closure only calls fcntl, which is async-signal-safe.
        unsafe {
            command.pre_exec(move || {
                fcntl(server_fd, FcntlArg::F_SETFD(FdFlag::empty()))
                    .map(drop)
                    .map_err(io::Error::from)
            });
        }

        let mut child = command.spawn().map_err(|source| BrokerError::Launch {
            program: program.clone(),
            source,
        })?;
        drop(server_end);

        let pid = child.id();
        info!(%protocol, program = %program, pid, "Launched server");

        let name = protocol.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!(protocol = %name, pid, "Server exited");
                }
                Ok(status) => warn!(protocol = %name, pid, %status, "Server exited"),
                Err(e) => warn!(protocol = %name, pid, error = %e, "Failed to reap server"),
            }
        });

        Ok(LaunchedServer { control, pid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::time::Duration;

    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    fn exec(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn child_inherits_control_socket() {
        let protocol = ProtocolName::new("com.example.echo").unwrap();
        let exec = exec(&[
            "/bin/sh",
            "-c",
            "[ -S /proc/self/fd/$CATUI_LOAD_BALANCER_FD ] && exec sleep 30",
        ]);

        let launched = ForkExecLauncher.launch(&protocol, &exec).unwrap();
        let pid = launched.pid.unwrap();

        // the socket stays open while the child holds its end
        let mut control = launched.control;
        control
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        let result = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 8];
            control.read(&mut buf)
        })
        .await
        .unwrap();

        kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
        let err = result.unwrap_err();
        assert!(
            matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
            "unexpected {err:?}"
        );
    }

    #[tokio::test]
    async fn control_eof_when_child_exits() {
        let protocol = ProtocolName::new("com.example.true").unwrap();

        let launched = ForkExecLauncher
            .launch(&protocol, &exec(&["/bin/sh", "-c", "exit 0"]))
            .unwrap();
        let mut control = launched.control;
        let n = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 8];
            control.read(&mut buf).unwrap()
        })
        .await
        .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn missing_program_is_launch_error() {
        let protocol = ProtocolName::new("com.example.none").unwrap();

        let err = ForkExecLauncher
            .launch(&protocol, &exec(&["/nonexistent/catui-server"]))
            .unwrap_err();
        assert!(matches!(err, BrokerError::Launch { .. }));
    }

    #[tokio::test]
    async fn empty_exec_is_config_error() {
        let protocol = ProtocolName::new("com.example.none").unwrap();

        let err = ForkExecLauncher.launch(&protocol, &[]).unwrap_err();
        assert!(matches!(err, BrokerError::Config { .. }));
    }
}
