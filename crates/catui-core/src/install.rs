//! Installed protocol configurations.
//!
//! A protocol implementation is installed under a root directory as
//!
//! ```text
//! <root>/<protocol>/<version-dir>/config.json
//! ```
//!
//! where the version directory is either a full version (`1.4.2`, searched by
//! the broker) or a bare major number (`1`, used for direct launches). The
//! configuration is a JSON object:
//!
//! ```json
//! { "catui_version": "0.1.0", "version": "1.4.2", "exec": ["/usr/bin/impl", "--flag"] }
//! ```
//!
//! Only `exec` is mandatory for the broker; direct launches also need both
//! versions.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::semver::{SemVer, SemVerError};

/// File name of an installed configuration.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Largest accepted configuration file, in bytes.
pub const MAX_CONFIG_SIZE: u64 = 4096;

/// Largest accepted `exec` argument vector.
pub const MAX_EXEC_ARGS: usize = 255;

/// Environment variable listing install roots, separated by `:`.
pub const INSTALL_ROOT_ENV: &str = "CATUI_INSTALL_ROOT";

/// Install root used when [`INSTALL_ROOT_ENV`] is unset.
pub const DEFAULT_INSTALL_ROOT: &str = "/usr/local/share/catui";

/// Result type for install operations.
pub type InstallResult<T> = Result<T, InstallError>;

/// Errors reading or validating an installed configuration.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is larger than [`MAX_CONFIG_SIZE`].
    #[error("{} is {size} bytes (max: {max})", path.display(), max = MAX_CONFIG_SIZE)]
    TooLarge { path: PathBuf, size: u64 },

    /// The file is not a JSON object of the expected shape.
    #[error("malformed config {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// `exec` is missing.
    #[error("config {} has no 'exec' array", path.display())]
    NoExec { path: PathBuf },

    /// `exec` is present but empty.
    #[error("config {} has an empty 'exec' array", path.display())]
    EmptyExec { path: PathBuf },

    /// `exec` has more than [`MAX_EXEC_ARGS`] entries.
    #[error("config {} has {len} 'exec' arguments (max: {max})", path.display(), max = MAX_EXEC_ARGS)]
    ExecTooLong { path: PathBuf, len: usize },

    /// A version field does not parse.
    #[error("config {} has invalid '{field}' value '{value}': {source}", path.display())]
    BadVersion {
        path: PathBuf,
        field: &'static str,
        value: String,
        #[source]
        source: SemVerError,
    },
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default, alias = "catui-version")]
    catui_version: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    exec: Option<Vec<String>>,
}

/// A validated installed configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    /// Broker protocol version the implementation speaks, if declared.
    pub catui_version: Option<SemVer>,
    /// Protocol version the implementation provides, if declared.
    pub version: Option<SemVer>,
    /// Program and arguments used to launch the implementation.
    pub exec: Vec<String>,
}

impl InstallConfig {
    /// Reads and validates the configuration at `path`.
    pub fn load(path: &Path) -> InstallResult<Self> {
        let read_err = |source| InstallError::Read {
            path: path.to_path_buf(),
            source,
        };

        let size = fs::metadata(path).map_err(read_err)?.len();
        if size > MAX_CONFIG_SIZE {
            return Err(InstallError::TooLarge {
                path: path.to_path_buf(),
                size,
            });
        }

        let bytes = fs::read(path).map_err(read_err)?;
        Self::parse(path, &bytes)
    }

    /// Validates configuration bytes; `path` is only used for error context.
    pub fn parse(path: &Path, bytes: &[u8]) -> InstallResult<Self> {
        if bytes.len() as u64 > MAX_CONFIG_SIZE {
            return Err(InstallError::TooLarge {
                path: path.to_path_buf(),
                size: bytes.len() as u64,
            });
        }

        let raw: RawConfig =
            serde_json::from_slice(bytes).map_err(|source| InstallError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let exec = raw.exec.ok_or_else(|| InstallError::NoExec {
            path: path.to_path_buf(),
        })?;
        if exec.is_empty() {
            return Err(InstallError::EmptyExec {
                path: path.to_path_buf(),
            });
        }
        if exec.len() > MAX_EXEC_ARGS {
            return Err(InstallError::ExecTooLong {
                path: path.to_path_buf(),
                len: exec.len(),
            });
        }

        let version_field = |field: &'static str, value: Option<String>| {
            value
                .map(|value| {
                    SemVer::parse(&value).map_err(|source| InstallError::BadVersion {
                        path: path.to_path_buf(),
                        field,
                        value,
                        source,
                    })
                })
                .transpose()
        };

        Ok(Self {
            catui_version: version_field("catui_version", raw.catui_version)?,
            version: version_field("version", raw.version)?,
            exec,
        })
    }
}

/// A version directory found by [`find_version_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDir {
    /// The directory itself.
    pub path: PathBuf,
    /// The version parsed from the directory name.
    pub version: SemVer,
}

impl VersionDir {
    /// Path of the configuration file inside this directory.
    pub fn config_path(&self) -> PathBuf {
        self.path.join(CONFIG_FILE_NAME)
    }
}

/// Finds the first installed version of `protocol` that a consumer requiring
/// `requested` can use.
///
/// Roots are searched in order. Within a protocol directory, entries are
/// visited in the order the filesystem returns them and the first compatible
/// one wins; there is no attempt to pick the newest. Entries whose names are
/// not versions are skipped.
pub fn find_version_dir(
    roots: &[PathBuf],
    protocol: &str,
    requested: &SemVer,
) -> Option<VersionDir> {
    for root in roots {
        let protocol_dir = root.join(protocol);
        let entries = match fs::read_dir(&protocol_dir) {
            Ok(entries) => entries,
            Err(e) => {
                trace!(dir = %protocol_dir.display(), error = %e, "skipping install root");
                continue;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(version) = name.to_str().and_then(|n| SemVer::parse(n).ok()) else {
                continue;
            };

            if !entry.path().is_dir() {
                continue;
            }

            if requested.can_use(&version) {
                debug!(
                    protocol,
                    requested = %requested,
                    found = %version,
                    "found compatible install"
                );
                return Some(VersionDir {
                    path: entry.path(),
                    version,
                });
            }
        }
    }

    None
}

/// Config path for a direct launch: `<root>/<protocol>/<major>/config.json`.
pub fn major_config_path(root: &Path, protocol: &str, major: u32) -> PathBuf {
    root.join(protocol)
        .join(major.to_string())
        .join(CONFIG_FILE_NAME)
}

/// Install roots from [`INSTALL_ROOT_ENV`], or the default root.
pub fn install_roots_from_env() -> Vec<PathBuf> {
    parse_install_roots(std::env::var(INSTALL_ROOT_ENV).ok().as_deref())
}

/// Splits a `:`-separated root list, falling back to [`DEFAULT_INSTALL_ROOT`].
pub fn parse_install_roots(value: Option<&str>) -> Vec<PathBuf> {
    let roots: Vec<PathBuf> = value
        .unwrap_or_default()
        .split(':')
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect();

    if roots.is_empty() {
        vec![PathBuf::from(DEFAULT_INSTALL_ROOT)]
    } else {
        roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn install(root: &Path, protocol: &str, dir: &str, config: &str) -> PathBuf {
        let path = root.join(protocol).join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(CONFIG_FILE_NAME), config).unwrap();
        path
    }

    #[test]
    fn parse_full_config() {
        let config = InstallConfig::parse(
            Path::new("config.json"),
            br#"{"catui_version":"0.1.0","version":"1.2.3","exec":["/bin/echo","hi"]}"#,
        )
        .unwrap();

        assert_eq!(config.catui_version, Some(SemVer::new(0, 1, 0)));
        assert_eq!(config.version, Some(SemVer::new(1, 2, 3)));
        assert_eq!(config.exec, vec!["/bin/echo", "hi"]);
    }

    #[test]
    fn parse_accepts_dashed_catui_version() {
        let config = InstallConfig::parse(
            Path::new("config.json"),
            br#"{"catui-version":"0.1.0","exec":["/bin/true"]}"#,
        )
        .unwrap();
        assert_eq!(config.catui_version, Some(SemVer::new(0, 1, 0)));
        assert_eq!(config.version, None);
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        let path = Path::new("config.json");

        assert!(matches!(
            InstallConfig::parse(path, b"not json"),
            Err(InstallError::Malformed { .. })
        ));
        assert!(matches!(
            InstallConfig::parse(path, b"[]"),
            Err(InstallError::Malformed { .. })
        ));
        assert!(matches!(
            InstallConfig::parse(path, br#"{"exec":"/bin/true"}"#),
            Err(InstallError::Malformed { .. })
        ));
        assert!(matches!(
            InstallConfig::parse(path, br#"{"exec":["/bin/true", 3]}"#),
            Err(InstallError::Malformed { .. })
        ));
        assert!(matches!(
            InstallConfig::parse(path, br#"{"version":"1.0.0"}"#),
            Err(InstallError::NoExec { .. })
        ));
        assert!(matches!(
            InstallConfig::parse(path, br#"{"exec":[]}"#),
            Err(InstallError::EmptyExec { .. })
        ));
        assert!(matches!(
            InstallConfig::parse(path, br#"{"exec":["/bin/true"],"version":"1.0"}"#),
            Err(InstallError::BadVersion {
                field: "version",
                ..
            })
        ));
    }

    #[test]
    fn parse_limits_exec_length() {
        let args: Vec<String> = (0..=MAX_EXEC_ARGS).map(|i| format!("\"{i}\"")).collect();
        let json = format!("{{\"exec\":[{}]}}", args.join(","));
        // stay under the size cap so the length check is what fires
        assert!(json.len() as u64 <= MAX_CONFIG_SIZE);

        assert!(matches!(
            InstallConfig::parse(Path::new("config.json"), json.as_bytes()),
            Err(InstallError::ExecTooLong { len: 256, .. })
        ));
    }

    #[test]
    fn load_rejects_oversized_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let padding = " ".repeat(MAX_CONFIG_SIZE as usize);
        fs::write(&path, format!("{{\"exec\":[\"/bin/true\"]}}{padding}")).unwrap();

        assert!(matches!(
            InstallConfig::load(&path),
            Err(InstallError::TooLarge { .. })
        ));
    }

    #[test]
    fn load_missing_file() {
        let dir = tempdir().unwrap();
        let result = InstallConfig::load(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(InstallError::Read { .. })));
    }

    #[test]
    fn find_first_compatible_version() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        install(&root, "com.example.echo", "2.0.0", r#"{"exec":["/bin/true"]}"#);
        install(&root, "com.example.echo", "1.4.0", r#"{"exec":["/bin/true"]}"#);
        fs::create_dir_all(root.join("com.example.echo").join("not-a-version")).unwrap();

        let found = find_version_dir(&[root.clone()], "com.example.echo", &SemVer::new(1, 2, 0))
            .unwrap();
        assert_eq!(found.version, SemVer::new(1, 4, 0));
        assert_eq!(
            found.config_path(),
            root.join("com.example.echo").join("1.4.0").join(CONFIG_FILE_NAME)
        );
    }

    #[test]
    fn find_nothing_compatible() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        install(&root, "com.example.echo", "1.1.0", r#"{"exec":["/bin/true"]}"#);

        assert!(find_version_dir(&[root.clone()], "com.example.echo", &SemVer::new(1, 2, 0))
            .is_none());
        assert!(find_version_dir(&[root], "com.example.other", &SemVer::new(1, 0, 0)).is_none());
    }

    #[test]
    fn find_searches_roots_in_order() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        install(second.path(), "p", "0.3.1", r#"{"exec":["/bin/true"]}"#);

        let roots = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = find_version_dir(&roots, "p", &SemVer::new(0, 3, 0)).unwrap();
        assert_eq!(found.path, second.path().join("p").join("0.3.1"));
    }

    #[test]
    fn major_config_layout() {
        assert_eq!(
            major_config_path(Path::new("/opt/catui"), "com.example.echo", 2),
            PathBuf::from("/opt/catui/com.example.echo/2/config.json")
        );
    }

    #[test]
    fn install_root_list() {
        assert_eq!(
            parse_install_roots(Some("/a:/b::/c")),
            vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]
        );
        assert_eq!(
            parse_install_roots(None),
            vec![PathBuf::from(DEFAULT_INSTALL_ROOT)]
        );
        assert_eq!(
            parse_install_roots(Some("")),
            vec![PathBuf::from(DEFAULT_INSTALL_ROOT)]
        );
    }
}
