//! Broker configuration.

use std::path::PathBuf;
use std::time::Duration;

use catui_core::install::install_roots_from_env;

/// Default size of the server table.
pub const DEFAULT_MAX_SERVERS: usize = 128;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Path to the listening Unix socket.
    pub socket_path: PathBuf,

    /// Install roots searched for protocol implementations.
    pub search_roots: Vec<PathBuf>,

    /// Maximum number of live servers.
    pub max_servers: usize,

    /// Time allowed for a client to send its handshake.
    pub connection_timeout: Duration,

    /// Whether to remove a stale socket on startup.
    pub cleanup_stale_socket: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            search_roots: install_roots_from_env(),
            max_servers: DEFAULT_MAX_SERVERS,
            connection_timeout: Duration::from_secs(30),
            cleanup_stale_socket: true,
        }
    }
}

impl BrokerConfig {
    /// Creates a configuration listening on `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    /// Builder: set the install roots.
    pub fn with_search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.search_roots = roots;
        self
    }

    /// Builder: set the server table size.
    pub fn with_max_servers(mut self, max: usize) -> Self {
        self.max_servers = max;
        self
    }

    /// Builder: set the handshake timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Builder: set cleanup stale socket.
    pub fn with_cleanup_stale_socket(mut self, cleanup: bool) -> Self {
        self.cleanup_stale_socket = cleanup;
        self
    }
}

/// Returns the default broker socket path.
///
/// Uses `<cache dir>/catui/load_balancer.sock` if the platform has a cache
/// directory, otherwise `/tmp/catui-$UID/load_balancer.sock`.
pub fn default_socket_path() -> PathBuf {
    if let Some(cache) = dirs::cache_dir() {
        cache.join("catui").join("load_balancer.sock")
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        PathBuf::from(format!("/tmp/catui-{}", uid)).join("load_balancer.sock")
    }
}
