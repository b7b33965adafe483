//! Environment read by the connector.

use std::path::PathBuf;

use catui_core::install::{INSTALL_ROOT_ENV, parse_install_roots};

/// Broker protocol version advertised to clients.
pub const VERSION_ENV: &str = "GULACHEK_CATUI_VERSION";

/// Transport kind; only `unix` is recognized.
pub const ADDR_TYPE_ENV: &str = "GULACHEK_CATUI_ADDR_TYPE";

/// Broker address for the transport.
pub const ADDR_ENV: &str = "GULACHEK_CATUI_ADDR";

/// Older override for the broker socket path.
pub const LEGACY_ADDRESS_ENV: &str = "CATUI_ADDRESS";

/// Snapshot of the variables that steer [`Connector`](crate::Connector).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectEnv {
    /// `GULACHEK_CATUI_VERSION`.
    pub version: Option<String>,
    /// `GULACHEK_CATUI_ADDR_TYPE`.
    pub addr_type: Option<String>,
    /// `GULACHEK_CATUI_ADDR`.
    pub addr: Option<String>,
    /// `CATUI_ADDRESS`.
    pub legacy_address: Option<String>,
    /// `CATUI_INSTALL_ROOT`.
    pub install_root: Option<String>,
}

impl ConnectEnv {
    /// Reads the process environment.
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            version: var(VERSION_ENV),
            addr_type: var(ADDR_TYPE_ENV),
            addr: var(ADDR_ENV),
            legacy_address: var(LEGACY_ADDRESS_ENV),
            install_root: var(INSTALL_ROOT_ENV),
        }
    }

    /// Environment pointing at a broker listening on a unix socket.
    pub fn unix(version: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            addr_type: Some("unix".to_string()),
            addr: Some(addr.into()),
            ..Self::default()
        }
    }

    /// Sets the install roots (`:` separated).
    pub fn with_install_root(mut self, roots: impl Into<String>) -> Self {
        self.install_root = Some(roots.into());
        self
    }

    /// Install roots to search, falling back to the default root.
    pub fn install_roots(&self) -> Vec<PathBuf> {
        parse_install_roots(self.install_root.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_env() {
        let env = ConnectEnv::unix("0.1.0", "/tmp/lb.sock");
        assert_eq!(env.version.as_deref(), Some("0.1.0"));
        assert_eq!(env.addr_type.as_deref(), Some("unix"));
        assert_eq!(env.addr.as_deref(), Some("/tmp/lb.sock"));
        assert!(env.legacy_address.is_none());
    }

    #[test]
    fn install_roots_split_on_colon() {
        let env = ConnectEnv::default().with_install_root("/opt/a:/opt/b");
        assert_eq!(
            env.install_roots(),
            vec![PathBuf::from("/opt/a"), PathBuf::from("/opt/b")]
        );
        assert_eq!(
            ConnectEnv::default().install_roots(),
            vec![PathBuf::from("/usr/local/share/catui")]
        );
    }
}
