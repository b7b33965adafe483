//! The broker's table of running protocol servers.
//!
//! Entries are keyed by a generated [`ServerId`] and kept in id order.
//! Lookup is a linear scan in that order and the first entry whose protocol
//! matches and whose version the request can use wins. A new entry is only
//! recorded after its server started, so failed launches leave nothing
//! behind.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::UnixStream;
use tracing::{debug, info};

use catui_core::{InstallConfig, SemVer, find_version_dir};
use catui_protocol::ProtocolName;

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::launcher::{ForkExecLauncher, ProcessLauncher};

/// Identifier of a server entry, unique for the broker's lifetime.
pub type ServerId = u64;

/// A running protocol server.
#[derive(Debug)]
pub struct ServerEntry {
    /// Protocol the server implements.
    pub protocol: ProtocolName,
    /// Version of the installation it was launched from.
    pub version: SemVer,
    /// Broker end of the control socket.
    pub control: Arc<UnixStream>,
    /// Process id, if known.
    pub pid: Option<u32>,
}

/// Running servers and the means to start more.
pub struct Registry {
    servers: BTreeMap<ServerId, ServerEntry>,
    next_id: ServerId,
    max_servers: usize,
    roots: Vec<PathBuf>,
    launcher: Box<dyn ProcessLauncher>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new(
        roots: Vec<PathBuf>,
        max_servers: usize,
        launcher: Box<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            servers: BTreeMap::new(),
            next_id: 0,
            max_servers,
            roots,
            launcher,
        }
    }

    /// Creates a registry that forks real servers.
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(
            config.search_roots.clone(),
            config.max_servers,
            Box::new(ForkExecLauncher),
        )
    }

    /// Number of live servers.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Returns true if no server is running.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Returns the entry for `id`.
    pub fn get(&self, id: ServerId) -> Option<&ServerEntry> {
        self.servers.get(&id)
    }

    /// Iterates entries in lookup order.
    pub fn iter(&self) -> impl Iterator<Item = (ServerId, &ServerEntry)> {
        self.servers.iter().map(|(id, entry)| (*id, entry))
    }

    /// Finds the first running server for `protocol` usable at `version`.
    pub fn find(&self, protocol: &ProtocolName, version: &SemVer) -> Option<ServerId> {
        self.iter()
            .find(|(_, entry)| entry.protocol == *protocol && version.can_use(&entry.version))
            .map(|(id, _)| id)
    }

    /// Returns a server able to take a client of `protocol` at `version`,
    /// starting one if none is running.
    ///
    /// The flag is true when a new server was started.
    pub fn fork_server(
        &mut self,
        protocol: &ProtocolName,
        version: &SemVer,
    ) -> BrokerResult<(ServerId, bool)> {
        if let Some(id) = self.find(protocol, version) {
            debug!(%protocol, %version, id, "Reusing running server");
            return Ok((id, false));
        }

        if self.servers.len() >= self.max_servers {
            return Err(BrokerError::Capacity {
                protocol: protocol.to_string(),
                max: self.max_servers,
            });
        }

        let dir = find_version_dir(&self.roots, protocol.as_str(), version).ok_or_else(|| {
            BrokerError::NoCompatibleServer {
                protocol: protocol.to_string(),
                version: *version,
            }
        })?;

        let config = InstallConfig::load(&dir.config_path())?;
        let launched = self.launcher.launch(protocol, &config.exec)?;

        launched.control.set_nonblocking(true)?;
        let control = UnixStream::from_std(launched.control)?;

        let id = self.next_id;
        self.next_id += 1;

        info!(
            %protocol,
            version = %dir.version,
            pid = launched.pid,
            id,
            "Registered server"
        );

        self.servers.insert(
            id,
            ServerEntry {
                protocol: protocol.clone(),
                version: dir.version,
                control: Arc::new(control),
                pid: launched.pid,
            },
        );

        Ok((id, true))
    }

    /// Removes a server whose control socket closed.
    pub fn deactivate(&mut self, id: ServerId) -> Option<ServerEntry> {
        let entry = self.servers.remove(&id)?;
        info!(
            protocol = %entry.protocol,
            version = %entry.version,
            pid = entry.pid,
            id,
            "Server closed its control socket"
        );
        Some(entry)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("servers", &self.servers)
            .field("max_servers", &self.max_servers)
            .field("roots", &self.roots)
            .finish_non_exhaustive()
    }
}
