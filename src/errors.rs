//! Error types for the gauntlet test harness.
//!
//! This module provides unified error handling across sandbox management,
//! environment provisioning, suite execution, and report generation,
//! replacing ad-hoc error patterns with a structured approach.

use thiserror::Error;

/// The main error type for harness operations.
///
/// The variants mirror the harness error taxonomy: sandbox errors are
/// warnings that must never mask a test result, provisioning errors are
/// recorded per-version, and only configuration/orchestration faults abort
/// an entire matrix run.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Configuration-related errors (file parsing, validation, etc.)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Config sandbox creation or teardown failures
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Runtime environment provisioning failures
    #[error("Environment provisioning failed: {0}")]
    Provision(String),

    /// Suite command execution failures (spawn errors, not test failures)
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// A version run exceeded its configured timeout
    #[error("Run timed out: {0}")]
    Timeout(String),

    /// Concurrent access or task scheduling errors
    #[error("Concurrency error: {0}")]
    Concurrency(String),
}

/// A type alias for Results that use HarnessError.
pub type Result<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    /// Creates a new Sandbox error with context.
    pub fn sandbox<S1, S2>(path: S1, msg: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        HarnessError::Sandbox(format!("{}: {}", path.into(), msg.into()))
    }

    /// Creates a new Provision error with context.
    pub fn provision<S1, S2>(version: S1, msg: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        HarnessError::Provision(format!("version {}: {}", version.into(), msg.into()))
    }

    /// Creates a new CommandFailed error with context.
    pub fn command_failed<S1, S2>(cmd: S1, details: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        HarnessError::CommandFailed(format!("{}: {}", cmd.into(), details.into()))
    }

    /// Returns the error category as a string for logging/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            HarnessError::Config(_) => "config",
            HarnessError::Sandbox(_) => "sandbox",
            HarnessError::Provision(_) => "provision",
            HarnessError::CommandFailed(_) => "command_failed",
            HarnessError::Timeout(_) => "timeout",
            HarnessError::Concurrency(_) => "concurrency",
        }
    }
}

impl From<config::ConfigError> for HarnessError {
    fn from(err: config::ConfigError) -> Self {
        HarnessError::Config(anyhow::Error::from(err))
    }
}

impl From<tokio::task::JoinError> for HarnessError {
    fn from(err: tokio::task::JoinError) -> Self {
        HarnessError::Concurrency(format!("Task join error: {}", err))
    }
}
