//! Core types shared by the catui broker, client, and server helpers.
//!
//! - [`SemVer`]: three-part versions and the `can_use` compatibility rule
//! - [`install`]: installed protocol configurations and version lookup
//! - [`tracing`]: subscriber setup for the binaries

pub mod install;
pub mod semver;
pub mod tracing;

pub use self::install::{
    find_version_dir, major_config_path, InstallConfig, InstallError, InstallResult, VersionDir,
};
pub use self::semver::{can_support, can_use, Component, SemVer, SemVerError};
pub use self::tracing::{init_tracing, LogFormat, TracingConfig, TracingError};

/// Version of the broker handshake protocol implemented by this workspace.
pub const CATUI_VERSION: SemVer = SemVer::new(0, 1, 0);
