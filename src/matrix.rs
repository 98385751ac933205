//! The declared set of runtime versions a suite must be validated against.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{HarnessError, Result};

/// An ordered set of declared runtime versions.
///
/// The matrix is read-only input to the orchestrator: declared order
/// determines report ordering, duplicates are dropped (first occurrence
/// wins), and an empty matrix is a configuration fault that aborts the
/// whole operation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VersionMatrix {
    versions: Vec<String>,
}

impl VersionMatrix {
    /// Builds a matrix from declared version identifiers.
    pub fn new<I, S>(versions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen: Vec<String> = Vec::new();
        for version in versions {
            let version = version.into();
            let trimmed = version.trim();
            if trimmed.is_empty() {
                warn!("Ignoring empty version identifier in matrix");
                continue;
            }
            if seen.iter().any(|v| v == trimmed) {
                warn!("Ignoring duplicate matrix entry '{}'", trimmed);
                continue;
            }
            seen.push(trimmed.to_string());
        }

        if seen.is_empty() {
            return Err(HarnessError::Config(anyhow::anyhow!(
                "version matrix is empty; declare at least one runtime version"
            )));
        }

        Ok(VersionMatrix { versions: seen })
    }

    /// A single-entry matrix, used by the single-version runner command.
    pub fn single<S: Into<String>>(version: S) -> Result<Self> {
        Self::new([version.into()])
    }

    /// Declared versions, in declared order.
    #[must_use]
    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    /// The first declared version, the default for a single run.
    #[must_use]
    pub fn first(&self) -> &str {
        // Invariant: construction rejects empty matrices.
        &self.versions[0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
