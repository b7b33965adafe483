//! SIGTERM and SIGINT handling for `catuid`.
//!
//! Signals only flip a watch flag. The accept loop sees the flag through
//! [`ShutdownSignal`] and returns, and dropping the [`Broker`] unlinks the
//! socket outside signal context.
//!
//! [`Broker`]: crate::Broker

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::error::BrokerResult;

/// Owns the shutdown flag raised by SIGTERM or SIGINT.
pub struct SignalHandler {
    stop: Arc<watch::Sender<bool>>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            stop: Arc::new(stop),
        }
    }

    /// Registers for SIGTERM and SIGINT and spawns the task that raises the
    /// flag on the first of either.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_listener(&self) -> BrokerResult<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let stop = self.stop.clone();

        tokio::spawn(async move {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            info!(signal = name, "Stopping broker");
            stop.send_replace(true);
        });

        Ok(())
    }

    /// Future for [`Broker::run_until_shutdown`](crate::Broker::run_until_shutdown).
    pub fn shutdown(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.stop.subscribe(),
        }
    }
}

/// Resolves once the flag is raised.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for the flag. Also returns if the [`SignalHandler`] is gone.
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
