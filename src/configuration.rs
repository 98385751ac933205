//! Harness configuration: the suite command, the version matrix, and the
//! runtime template, loaded from `gauntlet.toml`.
//!
//! Resolution order follows the usual CLI conventions: an explicit
//! `--config` path wins, then `./gauntlet.toml` in the working directory,
//! then the user-level `~/.config/gauntlet/config.toml`. On top of the file,
//! `GAUNTLET_*` environment variables override individual keys (for example
//! `GAUNTLET_SUITE__TIMEOUT_SECS=120`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use config::{Config, Environment, File};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{HarnessError, Result};
use crate::matrix::VersionMatrix;

/// Default per-version run timeout when the config file does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

static DEFAULT_CONFIG_FILE: &str = "gauntlet.toml";
static USER_CONFIG_FILE_PATH: &str = ".config/gauntlet/config.toml";

/// The suite under test: what to run and how the CLI's configuration root
/// is overridden.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SuiteConfig {
    /// Command line executing the test collection. The `{runtime}`
    /// placeholder, when present, is replaced with the provisioned runtime
    /// path for the version being tested.
    pub command: String,

    /// Name of the environment variable the CLI under test honors as its
    /// configuration-root override. Set to the sandbox path for each run.
    pub config_env: String,

    /// Per-version run timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// Runtime provisioning settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// Executable name template, rendered per version (e.g. `python{version}`)
    /// and resolved on PATH.
    pub template: Option<String>,

    /// Extra environment variables set on every provisioned run.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Coverage collection settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CoverageConfig {
    /// Arguments appended to the suite command when coverage is requested.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct MatrixSection {
    versions: Vec<String>,
}

/// Top-level harness configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HarnessConfig {
    pub suite: SuiteConfig,
    matrix: MatrixSection,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub coverage: CoverageConfig,
}

impl HarnessConfig {
    /// Loads configuration from an explicit path, or from the default
    /// locations when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };
        Self::load_from(&file)
    }

    /// Loads and validates configuration from a specific file.
    pub fn load_from(file: &Path) -> Result<Self> {
        debug!("Loading harness config from {}", file.display());
        if !file.exists() {
            return Err(HarnessError::Config(anyhow::anyhow!(
                "config file not found: {}",
                file.display()
            )));
        }

        let settings = Config::builder()
            .add_source(File::from(file.to_path_buf()))
            .add_source(Environment::with_prefix("GAUNTLET").separator("__"))
            .build()?;

        let config: HarnessConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the default config file: `./gauntlet.toml` if present,
    /// otherwise the user-level config under the home directory.
    fn default_config_path() -> Result<PathBuf> {
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Ok(local);
        }
        let dirs = BaseDirs::new()
            .context("Failed to get base directories")
            .map_err(HarnessError::Config)?;
        Ok(dirs.home_dir().join(USER_CONFIG_FILE_PATH))
    }

    /// The declared version matrix, normalized.
    pub fn matrix(&self) -> Result<VersionMatrix> {
        VersionMatrix::new(self.matrix.versions.iter().cloned())
    }

    /// Effective per-version timeout.
    #[must_use]
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.suite.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    fn validate(&self) -> Result<()> {
        if self.suite.command.trim().is_empty() {
            return Err(HarnessError::Config(anyhow::anyhow!(
                "suite.command must not be empty"
            )));
        }
        if self.suite.config_env.trim().is_empty() {
            return Err(HarnessError::Config(anyhow::anyhow!(
                "suite.config_env must not be empty; the harness cannot isolate \
                 configuration without the CLI's override variable"
            )));
        }
        if self.suite.config_env.contains('=') || self.suite.config_env.contains('\0') {
            return Err(HarnessError::Config(anyhow::anyhow!(
                "suite.config_env is not a valid environment variable name: {:?}",
                self.suite.config_env
            )));
        }
        // Matrix problems surface here too, before any run starts.
        self.matrix()?;
        Ok(())
    }
}
