//! Runtime environment provisioning.
//!
//! The orchestrator does not care how a runtime version comes into
//! existence, only that one can be provisioned by identifier and torn down
//! afterwards. [`Provisioner`] is that capability interface; containers,
//! pre-installed toolchains, and virtual environments all satisfy it.
//!
//! The built-in [`ExecProvisioner`] covers the pre-installed-toolchain case:
//! it renders an executable name from a template (`python{version}` →
//! `python3.12`) and resolves it on PATH. Provisioning is idempotent and
//! teardown is a no-op since nothing was created.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::configuration::RuntimeConfig;
use crate::errors::{HarnessError, Result};

/// A provisioned execution environment for one runtime version.
#[derive(Clone, Debug)]
pub struct Environment {
    version: String,
    /// Resolved runtime executable, when the suite command wants one.
    runtime: Option<PathBuf>,
    /// Extra environment variables for every process run in this environment.
    env: HashMap<String, String>,
}

impl Environment {
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn runtime(&self) -> Option<&std::path::Path> {
        self.runtime.as_deref()
    }

    #[must_use]
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }
}

/// Capability interface for version-specific execution environments.
///
/// Implementations must make `provision` idempotent: provisioning the same
/// version twice yields an equivalent environment with no accumulated state.
pub trait Provisioner: Send + Sync {
    /// Provisions an environment for the given runtime version.
    fn provision(&self, version: &str) -> Result<Environment>;

    /// Tears the environment down. Guaranteed to be called once per
    /// successfully provisioned environment, whatever the run outcome.
    fn teardown(&self, env: Environment) -> Result<()>;
}

/// Resolves pre-installed runtimes on PATH from an executable name template.
#[derive(Clone, Debug, Default)]
pub struct ExecProvisioner {
    template: Option<String>,
    env: HashMap<String, String>,
}

impl ExecProvisioner {
    /// Builds a provisioner from the `[runtime]` config section.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        ExecProvisioner {
            template: config.template.clone(),
            env: config.env.clone(),
        }
    }

    /// Renders the executable name for a version, e.g. `python{version}` →
    /// `python3.12`.
    fn render(template: &str, version: &str) -> String {
        template.replace("{version}", version)
    }
}

impl Provisioner for ExecProvisioner {
    fn provision(&self, version: &str) -> Result<Environment> {
        let runtime = match &self.template {
            Some(template) => {
                let name = Self::render(template, version);
                debug!("Resolving runtime '{}' for version {}", name, version);
                let path = which::which(&name).map_err(|e| {
                    HarnessError::provision(version, format!("'{}' not found: {}", name, e))
                })?;
                info!("Provisioned {} -> {}", version, path.display());
                Some(path)
            }
            // No template means the suite command is version-agnostic; the
            // environment still exists so the run is attributed to a version.
            None => None,
        };

        Ok(Environment {
            version: version.to_string(),
            runtime,
            env: self.env.clone(),
        })
    }

    fn teardown(&self, env: Environment) -> Result<()> {
        // Pre-installed toolchains own their lifecycle; nothing to remove.
        debug!("Tearing down environment for version {}", env.version());
        Ok(())
    }
}
