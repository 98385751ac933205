//! Gauntlet - a config-isolated, multi-version test harness for CLIs
//!
//! Gauntlet runs a command-line application's test suite across a declared
//! set of runtime versions while guaranteeing that no test run ever reads
//! or writes the user's real configuration directory.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gauntlet::configuration::HarnessConfig;
//! use gauntlet::runner::{MatrixRunner, RunnerOptions};
//!
//! # async fn example() -> gauntlet::Result<()> {
//! let config = HarnessConfig::load(None)?;
//! let matrix = config.matrix()?;
//! let runner = MatrixRunner::new(config, RunnerOptions::default());
//! let report = runner.run(&matrix).await?;
//! report.print_summary();
//! std::process::exit(report.exit_code());
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`sandbox::ConfigSandbox`]: ephemeral stand-in for the CLI's real
//!   configuration root, with guaranteed teardown on all exit paths
//! - [`matrix::VersionMatrix`]: the declared set of runtime versions
//! - [`provision::Provisioner`]: capability interface for version-specific
//!   execution environments
//! - [`runner::MatrixRunner`]: orchestrates one run per declared version
//!   and aggregates the results
//! - [`report::SuiteReport`]: the combined verdict, coverage figures, and
//!   exit-code mapping
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T>`] where the error type is
//! [`HarnessError`]. Errors local to one version's run are contained and
//! recorded in that version's report entry; only configuration and
//! orchestration faults abort an entire matrix run.

pub mod configuration;
pub mod errors;
pub mod matrix;
pub mod output;
pub mod provision;
pub mod report;
pub mod runner;
pub mod sandbox;
pub mod suite;

// Re-export commonly used types
pub use configuration::HarnessConfig;
pub use errors::{HarnessError, Result};
pub use matrix::VersionMatrix;
pub use report::{RunStatus, SuiteReport, TestRun};
pub use runner::{MatrixRunner, RunnerOptions};
pub use sandbox::ConfigSandbox;
