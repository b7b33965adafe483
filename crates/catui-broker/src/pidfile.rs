//! PID file that keeps a second broker from starting.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::error::{BrokerError, BrokerResult};

/// PID file manager.
///
/// Writes the current PID on creation and removes the file on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Creates a PID file at `path`.
    ///
    /// A file naming a live process fails with
    /// [`BrokerError::AlreadyRunning`]; stale or unreadable files are
    /// replaced.
    pub fn create(path: impl Into<PathBuf>) -> BrokerResult<Self> {
        let path = path.into();

        if path.exists() {
            match Self::read_pid(&path) {
                Some(pid) if Self::is_process_running(pid) => {
                    return Err(BrokerError::already_running(path.to_string_lossy()));
                }
                Some(pid) => {
                    warn!(path = %path.display(), pid, "Removing stale PID file");
                    fs::remove_file(&path)?;
                }
                None => {
                    warn!(path = %path.display(), "Removing invalid PID file");
                    fs::remove_file(&path)?;
                }
            }
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let pid = process::id();
        let mut file = File::create(&path)?;
        writeln!(file, "{}", pid)?;
        file.sync_all()?;

        info!(path = %path.display(), pid, "Created PID file");

        Ok(Self { path })
    }

    /// Returns the path to the PID file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_pid(path: &Path) -> Option<i32> {
        let contents = fs::read_to_string(path).ok()?;
        contents.trim().parse::<i32>().ok().filter(|pid| *pid > 0)
    }

    // signal 0 checks for existence without delivering anything
    fn is_process_running(pid: i32) -> bool {
        kill(Pid::from_raw(pid), None).is_ok()
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed PID file"),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove PID file"
            ),
        }
    }
}
