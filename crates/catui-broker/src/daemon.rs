//! The broker's accept loop.
//!
//! One task multiplexes the listening socket with the control socket of
//! every running server. A client's handshake is read and routed before
//! the next client is accepted. Servers that close their control socket are
//! dropped from the [`Registry`].

use std::future::Future;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use tokio::io::{AsyncReadExt, AsyncWriteExt, Interest};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use catui_core::CATUI_VERSION;
use catui_protocol::{
    Ack, CONNECT_MESSAGE_SIZE, Encoding, FRAME_HEADER_SIZE, HandshakeRequest, encode_frame,
    fdpass, frame_len,
};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::registry::{Registry, ServerId};

/// The broker daemon.
pub struct Broker {
    config: BrokerConfig,
    listener: UnixListener,
    registry: Registry,
    watchers: FuturesUnordered<BoxFuture<'static, ServerId>>,
}

impl Broker {
    /// Binds the listening socket described by `config`.
    ///
    /// Missing parent directories are created. An existing socket file is
    /// removed if nothing answers on it and `cleanup_stale_socket` is set.
    pub async fn bind(config: BrokerConfig, registry: Registry) -> BrokerResult<Self> {
        let socket_path = &config.socket_path;

        if let Some(parent) = socket_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)
                .map_err(|_| BrokerError::socket_path_invalid(parent.to_string_lossy()))?;
        }

        if socket_path.exists() {
            if !config.cleanup_stale_socket {
                return Err(BrokerError::socket_in_use(socket_path.to_string_lossy()));
            }
            match UnixStream::connect(socket_path).await {
                Ok(_) => {
                    return Err(BrokerError::socket_in_use(socket_path.to_string_lossy()));
                }
                Err(_) => {
                    info!(path = %socket_path.display(), "Removing stale socket");
                    std::fs::remove_file(socket_path)?;
                }
            }
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(
            path = %socket_path.display(),
            catui_version = %CATUI_VERSION,
            "Broker listening"
        );

        Ok(Self {
            config,
            listener,
            registry,
            watchers: FuturesUnordered::new(),
        })
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Returns the server table.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Serves clients until `shutdown` completes.
    pub async fn run_until_shutdown<S>(&mut self, shutdown: S) -> BrokerResult<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        debug!("Accepted new connection");
                        self.handle_client(stream).await;
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                Some(id) = self.watchers.next(), if !self.watchers.is_empty() => {
                    self.registry.deactivate(id);
                }
            }
        }
    }

    async fn handle_client(&mut self, mut stream: UnixStream) {
        let payload = match read_handshake(&mut stream, self.config.connection_timeout).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Dropping client without a handshake");
                return;
            }
        };

        let encoding = Encoding::detect(&payload);
        if let Err(e) = self.route(&stream, encoding, &payload).await {
            warn!(error = %e, %encoding, "Rejecting client");
            reject(&mut stream, encoding, &e.to_string()).await;
        }
    }

    async fn route(
        &mut self,
        client: &UnixStream,
        encoding: Encoding,
        payload: &[u8],
    ) -> BrokerResult<()> {
        let request = HandshakeRequest::decode(encoding, payload)?;
        debug!(
            protocol = %request.protocol,
            version = %request.version,
            catui_version = %request.catui_version,
            "Received handshake"
        );

        if !request.catui_version.can_use(&CATUI_VERSION) {
            return Err(BrokerError::IncompatibleCatui {
                requested: request.catui_version,
                implemented: CATUI_VERSION,
            });
        }

        let (id, spawned) = self
            .registry
            .fork_server(&request.protocol, &request.version)?;
        let control = self
            .registry
            .get(id)
            .map(|entry| entry.control.clone())
            .ok_or_else(|| BrokerError::config(format!("server {} vanished", id)))?;

        if spawned {
            self.watchers.push(watch_control(id, control.clone()));
        }

        forward(&control, client, &request).await?;
        debug!(protocol = %request.protocol, id, "Forwarded client");
        Ok(())
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        let path = &self.config.socket_path;
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove socket file");
            } else {
                debug!(path = %path.display(), "Removed socket file");
            }
        }
    }
}

async fn read_handshake(stream: &mut UnixStream, timeout: Duration) -> BrokerResult<Vec<u8>> {
    let read = async {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        stream.read_exact(&mut header).await?;
        let len = frame_len(header, CONNECT_MESSAGE_SIZE)?;

        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;
        Ok::<_, BrokerError>(payload)
    };

    tokio::time::timeout(timeout, read)
        .await
        .map_err(|_| BrokerError::timeout("read handshake"))?
}

/// Passes `client` to the server behind `control`, followed by the framed
/// request.
///
/// The server shares the client's file description, so it is switched back
/// to blocking mode before it leaves.
async fn forward(
    control: &UnixStream,
    client: &UnixStream,
    request: &HandshakeRequest,
) -> BrokerResult<()> {
    let frame = fdpass::forward_frame(request)?;
    set_blocking(client.as_fd())?;

    let sent = control
        .async_io(Interest::WRITABLE, || {
            fdpass::send_fd(control.as_fd(), client.as_fd(), &frame)
        })
        .await?;

    let mut rest = &frame[sent..];
    while !rest.is_empty() {
        control.writable().await?;
        match control.try_write(rest) {
            Ok(n) => rest = &rest[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn set_blocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags - OFlag::O_NONBLOCK))?;
    Ok(())
}

async fn reject(stream: &mut UnixStream, encoding: Encoding, message: &str) {
    let frame = match Ack::reject(message)
        .encode(encoding)
        .and_then(|payload| encode_frame(&payload))
    {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "Failed to encode rejection");
            return;
        }
    };

    if let Err(e) = stream.write_all(&frame).await {
        debug!(error = %e, "Failed to send rejection");
    }
}

/// Resolves with `id` once the server closes its end of `control`.
fn watch_control(id: ServerId, control: Arc<UnixStream>) -> BoxFuture<'static, ServerId> {
    async move {
        let mut buf = [0u8; 64];
        loop {
            if let Err(e) = control.readable().await {
                warn!(id, error = %e, "Control socket failed");
                return id;
            }
            match control.try_read(&mut buf) {
                Ok(0) => return id,
                Ok(n) => debug!(id, bytes = n, "Ignoring data on control socket"),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    warn!(id, error = %e, "Control socket failed");
                    return id;
                }
            }
        }
    }
    .boxed()
}
