//! Run records and the aggregated suite report.
//!
//! Every declared version produces exactly one [`TestRun`], whatever its
//! outcome; the [`SuiteReport`] aggregates them into a single verdict, a
//! rendered table, and the process exit code.
//!
//! Coverage aggregation policy: per-version figures are reported
//! individually and the minimum across runs is the headline, since an
//! average can mask a regression confined to one version.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabular::{Row, Table};

use crate::errors::Result;

/// Exit code when every declared version passed.
pub const EXIT_OK: i32 = 0;
/// Exit code when test failures are present but every environment worked.
pub const EXIT_TEST_FAILURES: i32 = 1;
/// Exit code when one or more versions could not be provisioned or timed out.
pub const EXIT_ENV_ERRORS: i32 = 2;

/// Outcome of one version's run.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every test in the collection passed.
    Passed,
    /// One or more test assertions failed or errored.
    Failed,
    /// The environment could not be provisioned, or the run timed out.
    EnvError,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Passed => "pass",
            RunStatus::Failed => "fail",
            RunStatus::EnvError => "env error",
        };
        write!(f, "{}", s)
    }
}

/// One execution of the suite against a single runtime version.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TestRun {
    pub version: String,
    pub status: RunStatus,
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    pub skipped: u32,
    /// Line coverage percentage, when collected and parseable.
    pub coverage: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Human-readable context for non-pass outcomes.
    pub detail: Option<String>,
}

impl TestRun {
    /// Wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Aggregation of all TestRuns across the matrix.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SuiteReport {
    runs: Vec<TestRun>,
    coverage_requested: bool,
}

impl SuiteReport {
    #[must_use]
    pub fn new(coverage_requested: bool) -> Self {
        SuiteReport {
            runs: Vec::new(),
            coverage_requested,
        }
    }

    pub fn record(&mut self, run: TestRun) {
        self.runs.push(run);
    }

    #[must_use]
    pub fn runs(&self) -> &[TestRun] {
        &self.runs
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.runs.iter().all(|r| r.status == RunStatus::Passed)
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.runs.iter().any(|r| r.status == RunStatus::Failed)
    }

    #[must_use]
    pub fn has_env_errors(&self) -> bool {
        self.runs.iter().any(|r| r.status == RunStatus::EnvError)
    }

    /// The headline coverage figure: the minimum across runs that produced
    /// one. None when no run produced a figure.
    #[must_use]
    pub fn headline_coverage(&self) -> Option<f64> {
        self.runs
            .iter()
            .filter_map(|r| r.coverage)
            .fold(None, |min, c| match min {
                Some(m) if m <= c => Some(m),
                _ => Some(c),
            })
    }

    /// Maps the aggregate outcome onto the process exit code.
    ///
    /// Environment errors take precedence over test failures so that a
    /// half-run matrix is never mistaken for a plain red suite.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.has_env_errors() {
            EXIT_ENV_ERRORS
        } else if self.all_passed() {
            EXIT_OK
        } else {
            EXIT_TEST_FAILURES
        }
    }

    /// Serializes the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::errors::HarnessError::Config(anyhow::Error::from(e)))
    }

    /// Renders the per-version table.
    #[must_use]
    pub fn render_table(&self) -> String {
        let mut table = Table::new("{:<}  {:<}  {:>}  {:>}  {:>}  {:>}  {:>}");
        table.add_row(
            Row::new()
                .with_cell("VERSION")
                .with_cell("RESULT")
                .with_cell("PASSED")
                .with_cell("FAILED")
                .with_cell("ERRORS")
                .with_cell("COVERAGE")
                .with_cell("DURATION"),
        );

        for run in &self.runs {
            let coverage = match run.coverage {
                Some(pct) => format!("{:.1}%", pct),
                None if self.coverage_requested => "n/a".to_string(),
                None => "-".to_string(),
            };
            let duration_ms = run.duration().num_milliseconds().max(0);
            table.add_row(
                Row::new()
                    .with_cell(&run.version)
                    .with_cell(run.status.to_string())
                    .with_cell(run.passed)
                    .with_cell(run.failed)
                    .with_cell(run.errors)
                    .with_cell(coverage)
                    .with_cell(format!("{:.1}s", duration_ms as f64 / 1000.0)),
            );
        }

        table.to_string()
    }

    /// Prints the table, per-run details, and the colored overall verdict.
    pub fn print_summary(&self) {
        println!("{}", self.render_table());

        for run in &self.runs {
            if let Some(detail) = &run.detail {
                println!(
                    "  {}: {}",
                    crate::output::version_name(&run.version),
                    detail.dimmed()
                );
            }
        }

        if self.coverage_requested {
            match self.headline_coverage() {
                Some(pct) => println!("\nCoverage (minimum across versions): {:.1}%", pct),
                None => {
                    println!();
                    crate::output::warning("Coverage requested but unavailable");
                }
            }
        }

        let verdict = if self.all_passed() {
            format!("{} all {} version(s) passed", "✓".green(), self.runs.len())
        } else if self.has_env_errors() {
            format!(
                "{} {} of {} version(s) hit environment errors",
                "⚠".yellow(),
                self.runs
                    .iter()
                    .filter(|r| r.status == RunStatus::EnvError)
                    .count(),
                self.runs.len()
            )
        } else {
            format!(
                "{} {} of {} version(s) failed",
                "✗".red(),
                self.runs
                    .iter()
                    .filter(|r| r.status == RunStatus::Failed)
                    .count(),
                self.runs.len()
            )
        };
        println!("\n{}", verdict);
    }
}
