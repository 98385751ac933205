//! Ephemeral configuration sandboxes for the CLI under test.
//!
//! A [`ConfigSandbox`] stands in for the real user configuration directory
//! for the duration of exactly one test run. While it is active, every
//! configuration read or write the CLI under test performs lands inside the
//! sandbox; on release the directory and all of its contents are removed.
//!
//! Installation is per-child-process, not global: the sandbox hands out an
//! environment variable pair via [`ConfigSandbox::env_for`] that the runner
//! sets on the spawned suite command. Nothing in the harness process
//! environment is mutated, so concurrent runs cannot observe each other's
//! sandboxes and nothing leaks into subsequent runs.
//!
//! # Examples
//!
//! ```rust,no_run
//! use gauntlet::sandbox::ConfigSandbox;
//!
//! # fn example() -> gauntlet::Result<()> {
//! let sandbox = ConfigSandbox::acquire()?;
//! let (var, value) = sandbox.env_for("APP_CONFIG_DIR");
//! // ...spawn the suite with `var=value`...
//! sandbox.release()?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::errors::{HarnessError, Result};

/// An ephemeral directory standing in for the CLI's real configuration root.
///
/// Each sandbox owns a unique temporary directory. Uniqueness is guaranteed
/// by construction, so concurrent runs always receive distinct, non-nested,
/// non-shared sandboxes.
///
/// Release is guaranteed on all exit paths: calling [`release`] removes the
/// directory and reports any failure, while dropping a still-active sandbox
/// (the unwinding path) removes it too, logging a warning on failure.
///
/// [`release`]: ConfigSandbox::release
#[derive(Debug)]
pub struct ConfigSandbox {
    /// Some while active; taken on release so Drop becomes a no-op.
    dir: Option<TempDir>,
    /// Retained past release so callers can still ask where the sandbox was.
    path: PathBuf,
}

impl ConfigSandbox {
    /// Creates a new empty sandbox directory at a unique temporary location.
    pub fn acquire() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("gauntlet-")
            .tempdir()
            .map_err(|e| HarnessError::sandbox("<temp>", e.to_string()))?;
        let path = dir.path().to_path_buf();
        debug!("Acquired config sandbox at {}", path.display());
        Ok(ConfigSandbox {
            dir: Some(dir),
            path,
        })
    }

    /// The filesystem path of the sandbox directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true until [`release`](ConfigSandbox::release) has run.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.dir.is_some()
    }

    /// Returns the environment variable pair that installs this sandbox as
    /// the active configuration root for one child process.
    ///
    /// `var_name` is the CLI-under-test's configuration override variable
    /// (for example `APP_CONFIG_DIR`). The pair is meant to be set on the
    /// spawned suite command only; it must never be exported globally.
    #[must_use]
    pub fn env_for(&self, var_name: &str) -> (String, String) {
        (
            var_name.to_string(),
            self.path.to_string_lossy().into_owned(),
        )
    }

    /// Recursively removes the sandbox directory and all contents.
    ///
    /// A removal failure (permissions, disk state) is surfaced as a
    /// [`HarnessError::Sandbox`]; callers treat it as a warning and never
    /// let it alter the underlying test result.
    pub fn release(mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => {
                debug!("Releasing config sandbox at {}", self.path.display());
                dir.close().map_err(|e| {
                    HarnessError::sandbox(self.path.display().to_string(), e.to_string())
                })
            }
            None => Ok(()),
        }
    }
}

impl Drop for ConfigSandbox {
    fn drop(&mut self) {
        // Unwinding path: TempDir's own Drop removes the tree, but a failure
        // there is silent. Close explicitly so we can at least log it.
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                warn!(
                    "Failed to remove config sandbox {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}
