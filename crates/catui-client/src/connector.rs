//! Establishes a connection to a protocol implementation.
//!
//! With [`VERSION_ENV`](crate::env::VERSION_ENV) set, the connector talks to
//! the broker at the address given by the environment. With only the legacy
//! [`LEGACY_ADDRESS_ENV`](crate::env::LEGACY_ADDRESS_ENV) set, it connects
//! to that socket directly. Otherwise it launches the installed
//! implementation itself and talks to it over pipes.

use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use nix::sys::socket::{AddressFamily, SockFlag, SockType, UnixAddr, connect, socket};
use tracing::{debug, info};

use catui_core::install::{DEFAULT_INSTALL_ROOT, major_config_path};
use catui_core::{CATUI_VERSION, InstallConfig, InstallError, SemVer};
use catui_protocol::{Ack, Connection, Encoding, HandshakeRequest, ProtocolName};

use crate::env::ConnectEnv;
use crate::error::{ConnectError, ConnectResult};

/// Opens brokered connections.
#[derive(Debug, Clone)]
pub struct Connector {
    env: ConnectEnv,
    encoding: Encoding,
}

impl Connector {
    /// Creates a connector for an explicit environment.
    pub fn new(env: ConnectEnv) -> Self {
        Self {
            env,
            encoding: Encoding::default(),
        }
    }

    /// Creates a connector from the process environment.
    pub fn from_env() -> Self {
        Self::new(ConnectEnv::from_process())
    }

    /// Selects the handshake encoding (structured by default).
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Returns the environment in use.
    pub fn env(&self) -> &ConnectEnv {
        &self.env
    }

    /// Connects to `protocol` at a version compatible with `version`.
    ///
    /// Returns an open connection only after the peer accepted the request.
    pub fn connect(&self, protocol: &str, version: SemVer) -> ConnectResult<Connection> {
        let protocol = ProtocolName::new(protocol).map_err(ConnectError::BadProtocol)?;
        let request = HandshakeRequest::new(protocol, version);

        if self.env.version.is_some() {
            self.connect_remote(&request)
        } else if let Some(address) = self.env.legacy_address.as_deref() {
            let conn = open_socket(address)?;
            self.handshake(conn, &request)
        } else {
            self.connect_installed(&request)
        }
    }

    /// Connects through the broker described by the environment.
    pub fn connect_remote(&self, request: &HandshakeRequest) -> ConnectResult<Connection> {
        let text = self.env.version.as_deref().ok_or(ConnectError::NoVersion)?;
        let broker_version =
            SemVer::parse(text).map_err(|source| ConnectError::VersionParse {
                origin: crate::env::VERSION_ENV.to_string(),
                source,
            })?;

        if !CATUI_VERSION.can_use(&broker_version) {
            return Err(ConnectError::VersionIncompatible {
                implementation: CATUI_VERSION,
                other: broker_version,
                origin: "server's",
            });
        }

        let kind = self.env.addr_type.as_deref().ok_or(ConnectError::NoAddrType)?;
        if kind != "unix" {
            return Err(ConnectError::UnknownAddrType(kind.to_string()));
        }

        let addr = self.env.addr.as_deref().ok_or(ConnectError::NoAddr)?;
        let conn = open_socket(addr)?;
        self.handshake(conn, request)
    }

    /// Launches the installed implementation and connects over its stdio.
    pub fn connect_installed(&self, request: &HandshakeRequest) -> ConnectResult<Connection> {
        let path = installed_config_path(
            &self.env.install_roots(),
            request.protocol.as_str(),
            request.version.major(),
        );
        debug!(config = %path.display(), "Reading installed config");

        let config = InstallConfig::load(&path).map_err(install_error)?;

        let catui_version = config
            .catui_version
            .ok_or_else(|| ConnectError::NoCatuiVersion { path: path.clone() })?;
        if !CATUI_VERSION.can_use(&catui_version) {
            return Err(ConnectError::VersionIncompatible {
                implementation: CATUI_VERSION,
                other: catui_version,
                origin: "installed",
            });
        }

        let installed = config
            .version
            .ok_or_else(|| ConnectError::NoVersionField { path: path.clone() })?;
        if !request.version.can_use(&installed) {
            return Err(ConnectError::ProtocolVersionIncompatible {
                protocol: request.protocol.to_string(),
                requested: request.version,
                installed,
            });
        }

        let conn = spawn(&config.exec)?;
        self.handshake(conn, request)
    }

    fn handshake(
        &self,
        mut conn: Connection,
        request: &HandshakeRequest,
    ) -> ConnectResult<Connection> {
        conn.write_request(request, self.encoding)
            .map_err(|source| ConnectError::NoAck {
                stage: "write connection request",
                source,
            })?;

        let ack = conn.read_ack(self.encoding).map_err(|source| ConnectError::NoAck {
            stage: "read acknowledgement from server",
            source,
        })?;

        match ack {
            Ack::Accept => {
                info!(
                    protocol = %request.protocol,
                    version = %request.version,
                    remote = conn.is_remote(),
                    "Connection accepted"
                );
                Ok(conn)
            }
            Ack::Reject(message) => Err(ConnectError::Rejected(message)),
        }
    }
}

/// Picks the first root holding a config for `protocol` at `major`.
///
/// When none has one, the first root's path is returned so the read error
/// names a concrete file.
fn installed_config_path(roots: &[PathBuf], protocol: &str, major: u32) -> PathBuf {
    roots
        .iter()
        .map(|root| major_config_path(root, protocol, major))
        .find(|path| path.is_file())
        .or_else(|| {
            roots
                .first()
                .map(|root| major_config_path(root, protocol, major))
        })
        .unwrap_or_else(|| major_config_path(Path::new(DEFAULT_INSTALL_ROOT), protocol, major))
}

fn install_error(err: InstallError) -> ConnectError {
    match err {
        InstallError::NoExec { .. }
        | InstallError::EmptyExec { .. }
        | InstallError::ExecTooLong { .. } => ConnectError::NoExec(err),
        InstallError::BadVersion {
            field: "version",
            path,
            ..
        } => ConnectError::NoVersionField { path },
        InstallError::BadVersion {
            path,
            field,
            source,
            ..
        } => ConnectError::VersionParse {
            origin: format!("{} from config {}", field, path.display()),
            source,
        },
        other => ConnectError::NoConfig(other),
    }
}

fn open_socket(addr: &str) -> ConnectResult<Connection> {
    let fd = socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        None,
    )
    .map_err(|e| ConnectError::NoSocket(e.into()))?;

    let no_connect = |source: std::io::Error| ConnectError::NoConnect {
        addr: addr.to_string(),
        source,
    };
    let sockaddr = UnixAddr::new(addr).map_err(|e| no_connect(e.into()))?;
    connect(fd.as_raw_fd(), &sockaddr).map_err(|e| no_connect(e.into()))?;

    debug!(addr, "Connected to broker");
    Ok(Connection::new(fd, None, true))
}

fn spawn(exec: &[String]) -> ConnectResult<Connection> {
    let (program, args) = exec.split_first().ok_or_else(|| {
        ConnectError::NoFork(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty exec",
        ))
    })?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(ConnectError::NoFork)?;

    let missing = || {
        ConnectError::NoPipe(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "child stdio was not captured",
        ))
    };
    let stdin = child.stdin.take().ok_or_else(missing)?;
    let stdout = child.stdout.take().ok_or_else(missing)?;

    debug!(program = %program, pid = child.id(), "Launched installed server");
    Ok(Connection::from_child(stdout, stdin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use catui_core::install::CONFIG_FILE_NAME;
    use tempfile::tempdir;

    use crate::error::ConnectErrorCode;

    fn code(result: ConnectResult<Connection>) -> ConnectErrorCode {
        result.unwrap_err().code()
    }

    fn v(major: u32, minor: u32, patch: u32) -> SemVer {
        SemVer::new(major, minor, patch)
    }

    #[test]
    fn invalid_protocol_name() {
        let connector = Connector::new(ConnectEnv::unix("0.1.0", "/nonexistent"));
        assert_eq!(
            code(connector.connect("a/b", v(1, 0, 0))),
            ConnectErrorCode::BadProtocol
        );
    }

    #[test]
    fn broker_socket_is_close_on_exec() {
        use nix::fcntl::{FcntlArg, FdFlag, fcntl};

        let dir = tempdir().unwrap();
        let path = dir.path().join("broker.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&path).unwrap();

        let conn = open_socket(path.to_str().unwrap()).unwrap();
        let fd = conn.input_fd().unwrap();
        let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFD).unwrap();
        assert!(FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC));
    }

    #[test]
    fn remote_env_checks_in_order() {
        let mut env = ConnectEnv {
            version: Some("nope".into()),
            ..ConnectEnv::default()
        };
        let connect = |env: &ConnectEnv| Connector::new(env.clone()).connect("p", v(1, 0, 0));

        assert_eq!(code(connect(&env)), ConnectErrorCode::VersionParse);

        env.version = Some("0.2.0".into());
        assert_eq!(code(connect(&env)), ConnectErrorCode::VersionIncompatible);

        env.version = Some("0.1.0".into());
        assert_eq!(code(connect(&env)), ConnectErrorCode::NoAddrType);

        env.addr_type = Some("tcp".into());
        assert_eq!(code(connect(&env)), ConnectErrorCode::UnknownAddrType);

        env.addr_type = Some("unix".into());
        assert_eq!(code(connect(&env)), ConnectErrorCode::NoAddr);

        let dir = tempdir().unwrap();
        env.addr = Some(dir.path().join("missing.sock").display().to_string());
        assert_eq!(code(connect(&env)), ConnectErrorCode::NoConnect);
    }

    #[test]
    fn newer_broker_patch_is_usable() {
        let dir = tempdir().unwrap();
        let env = ConnectEnv::unix("0.1.7", dir.path().join("x.sock").display().to_string());
        // version check passes, so failure comes from the missing socket
        assert_eq!(
            code(Connector::new(env).connect("p", v(1, 0, 0))),
            ConnectErrorCode::NoConnect
        );
    }

    fn write_config(root: &Path, protocol: &str, major: u32, config: &str) {
        let dir = root.join(protocol).join(major.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE_NAME), config).unwrap();
    }

    fn installed(root: &Path) -> Connector {
        Connector::new(ConnectEnv::default().with_install_root(root.display().to_string()))
    }

    #[test]
    fn installed_config_errors() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let connector = installed(root);

        assert_eq!(
            code(connector.connect("com.example.missing", v(1, 0, 0))),
            ConnectErrorCode::NoConfig
        );

        write_config(root, "bad.catui", 1, r#"{"catui_version":"0.2.0","version":"1.0.0","exec":["/bin/true"]}"#);
        assert_eq!(
            code(connector.connect("bad.catui", v(1, 0, 0))),
            ConnectErrorCode::VersionIncompatible
        );

        write_config(root, "noversion", 1, r#"{"catui_version":"0.1.0","exec":["/bin/true"]}"#);
        assert_eq!(
            code(connector.connect("noversion", v(1, 0, 0))),
            ConnectErrorCode::NoVersionField
        );

        write_config(root, "old", 1, r#"{"catui_version":"0.1.0","version":"1.0.0","exec":["/bin/true"]}"#);
        assert_eq!(
            code(connector.connect("old", v(1, 2, 0))),
            ConnectErrorCode::ProtocolVersionIncompatible
        );

        write_config(root, "noexec", 1, r#"{"catui_version":"0.1.0","version":"1.0.0"}"#);
        assert_eq!(
            code(connector.connect("noexec", v(1, 0, 0))),
            ConnectErrorCode::NoExec
        );

        write_config(root, "nobinary", 1, r#"{"catui_version":"0.1.0","version":"1.0.0","exec":["/nonexistent/catui-server"]}"#);
        assert_eq!(
            code(connector.connect("nobinary", v(1, 0, 0))),
            ConnectErrorCode::NoFork
        );
    }

    #[test]
    fn config_path_prefers_existing_root() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        write_config(second.path(), "proto", 2, "{}");

        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        assert_eq!(
            installed_config_path(&roots, "proto", 2),
            second.path().join("proto/2/config.json")
        );
        assert_eq!(
            installed_config_path(&roots, "other", 1),
            first.path().join("other/1/config.json")
        );
    }
}
