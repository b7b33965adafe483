//! The catui broker daemon.
//!
//! Clients connect to a well-known unix socket and send a handshake naming
//! a protocol and version. The broker finds a running server that can serve
//! it, or starts one from the install roots, and passes the client's socket
//! to that server over a private control socket.
//!
//! # Example
//!
//! ```rust,no_run
//! use catui_broker::{Broker, BrokerConfig, Registry, SignalHandler};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BrokerConfig::default();
//!     let registry = Registry::from_config(&config);
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener()?;
//!
//!     let mut broker = Broker::bind(config, registry).await?;
//!     broker.run_until_shutdown(signals.shutdown().wait()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod daemon;
pub mod error;
pub mod launcher;
pub mod pidfile;
pub mod registry;
pub mod signals;

pub use config::{BrokerConfig, DEFAULT_MAX_SERVERS, default_socket_path};
pub use daemon::Broker;
pub use error::{BrokerError, BrokerResult};
pub use launcher::{ForkExecLauncher, LaunchedServer, ProcessLauncher};
pub use pidfile::PidFile;
pub use registry::{Registry, ServerEntry, ServerId};
pub use signals::{ShutdownSignal, SignalHandler};
