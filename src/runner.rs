//! The multi-version test orchestrator.
//!
//! [`MatrixRunner`] drives the suite once per declared runtime version:
//! provision the environment, acquire a config sandbox, execute the suite
//! with the sandbox installed, record a [`TestRun`], and release everything.
//! Failures are contained per version; all declared versions are always
//! attempted and the final report carries exactly one entry per entry in
//! the matrix.
//!
//! Runs execute sequentially by default. With `jobs > 1` each version runs
//! in its own tokio task behind a semaphore; every worker owns its own
//! sandbox and environment, and report order stays matrix order regardless
//! of completion order.

use std::sync::Arc;

use chrono::Utc;
use derive_builder::Builder;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::configuration::HarnessConfig;
use crate::errors::{HarnessError, Result};
use crate::matrix::VersionMatrix;
use crate::provision::{ExecProvisioner, Provisioner};
use crate::report::{RunStatus, SuiteReport, TestRun};
use crate::sandbox::ConfigSandbox;
use crate::suite::{parse_coverage, parse_summary, SuiteInvocation};

/// Options controlling a matrix run.
#[derive(Builder, Clone, Debug)]
#[builder(setter(into))]
pub struct RunnerOptions {
    /// Maximum concurrent version runs. 1 means sequential, declared order.
    #[builder(default = "1")]
    pub jobs: usize,

    /// Whether to instrument the suite for coverage collection.
    #[builder(default = "false")]
    pub collect_coverage: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        RunnerOptionsBuilder::default()
            .build()
            .expect("default runner options are valid")
    }
}

/// Executes the full test collection once per declared runtime version and
/// produces one aggregated report.
pub struct MatrixRunner {
    config: Arc<HarnessConfig>,
    provisioner: Arc<dyn Provisioner>,
    options: RunnerOptions,
}

impl MatrixRunner {
    /// Builds a runner with the default PATH-based provisioner.
    #[must_use]
    pub fn new(config: HarnessConfig, options: RunnerOptions) -> Self {
        let provisioner = Arc::new(ExecProvisioner::from_config(&config.runtime));
        Self::with_provisioner(config, options, provisioner)
    }

    /// Builds a runner with a custom provisioning mechanism.
    #[must_use]
    pub fn with_provisioner(
        config: HarnessConfig,
        options: RunnerOptions,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        MatrixRunner {
            config: Arc::new(config),
            provisioner,
            options,
        }
    }

    /// Runs the suite against every version in the matrix.
    ///
    /// One version's failure never aborts the others; the only errors
    /// escaping this method are orchestrator-level faults (task scheduling).
    pub async fn run(&self, matrix: &VersionMatrix) -> Result<SuiteReport> {
        info!(
            "Running matrix of {} version(s), coverage={}",
            matrix.len(),
            self.options.collect_coverage
        );

        let mut report = SuiteReport::new(self.options.collect_coverage);

        if self.options.jobs <= 1 {
            for version in matrix.versions() {
                report.record(self.run_version(version).await);
            }
            return Ok(report);
        }

        let semaphore = Arc::new(Semaphore::new(self.options.jobs));
        let mut handles = Vec::with_capacity(matrix.len());
        for version in matrix.versions() {
            let version = version.clone();
            let config = self.config.clone();
            let provisioner = self.provisioner.clone();
            let collect_coverage = self.options.collect_coverage;
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| HarnessError::Concurrency(e.to_string()))?;
                Ok::<TestRun, HarnessError>(
                    run_one_version(&config, provisioner.as_ref(), &version, collect_coverage)
                        .await,
                )
            }));
        }

        // join_all preserves spawn order, which is matrix order.
        for (version, joined) in matrix.versions().iter().zip(join_all(handles).await) {
            let run = match joined {
                Ok(Ok(run)) => run,
                // A worker fault still produces this version's entry.
                Ok(Err(e)) => env_error_run(version, format!("scheduling error: {}", e)),
                Err(e) => env_error_run(version, HarnessError::from(e).to_string()),
            };
            report.record(run);
        }

        Ok(report)
    }

    /// Runs the suite against a single version.
    pub async fn run_version(&self, version: &str) -> TestRun {
        run_one_version(
            &self.config,
            self.provisioner.as_ref(),
            version,
            self.options.collect_coverage,
        )
        .await
    }
}

/// One matrix iteration: provision, sandbox, execute, record, release.
async fn run_one_version(
    config: &HarnessConfig,
    provisioner: &dyn Provisioner,
    version: &str,
    collect_coverage: bool,
) -> TestRun {
    let started_at = Utc::now();
    info!("Starting run for version {}", version);

    let environment = match provisioner.provision(version) {
        Ok(env) => env,
        Err(e) => {
            warn!("Provisioning failed for {}: {}", version, e);
            return env_error_run(version, e.to_string());
        }
    };

    // Without a sandbox the isolation guarantee cannot hold, so the run is
    // not attempted. Recorded as an environment error, not a test failure.
    let sandbox = match ConfigSandbox::acquire() {
        Ok(sandbox) => sandbox,
        Err(e) => {
            warn!("Sandbox acquisition failed for {}: {}", version, e);
            teardown_environment(provisioner, environment);
            return env_error_run(version, e.to_string());
        }
    };

    let run = execute_suite(config, &environment, &sandbox, version, collect_coverage).await;

    // Release unconditionally: success, failure, and internal error all
    // reach this point. A removal failure is a warning, never a result.
    if let Err(e) = sandbox.release() {
        warn!("{}", e);
    }
    teardown_environment(provisioner, environment);

    let finished_at = Utc::now();
    TestRun {
        started_at,
        finished_at,
        ..run
    }
}

fn teardown_environment(provisioner: &dyn Provisioner, env: crate::provision::Environment) {
    let version = env.version().to_string();
    if let Err(e) = provisioner.teardown(env) {
        warn!("Environment teardown failed for {}: {}", version, e);
    }
}

/// Builds and executes the suite invocation inside an installed sandbox,
/// translating the outcome into a TestRun skeleton (timestamps are filled
/// in by the caller).
async fn execute_suite(
    config: &HarnessConfig,
    environment: &crate::provision::Environment,
    sandbox: &ConfigSandbox,
    version: &str,
    collect_coverage: bool,
) -> TestRun {
    let coverage_args: &[String] = if collect_coverage {
        &config.coverage.args
    } else {
        &[]
    };

    let invocation =
        match SuiteInvocation::build(&config.suite.command, environment.runtime(), coverage_args) {
            Ok(inv) => inv,
            Err(e) => return env_error_run(version, e.to_string()),
        };

    let (var, value) = sandbox.env_for(&config.suite.config_env);
    let mut invocation = invocation.with_env(var, value);
    for (key, val) in environment.env() {
        invocation = invocation.with_env(key.clone(), val.clone());
    }

    let output = match invocation.execute(config.timeout()).await {
        Ok(output) => output,
        Err(e @ HarnessError::Timeout(_)) => {
            // Per-version timeouts are environment errors, not test failures.
            return env_error_run(version, e.to_string());
        }
        Err(e) => return env_error_run(version, e.to_string()),
    };

    let combined = format!("{}\n{}", output.stdout, output.stderr);

    let (summary, detail) = match parse_summary(&combined) {
        Some(summary) => (summary, None),
        None => {
            warn!(
                "No summary line found for {}; deriving status from exit code",
                version
            );
            (
                Default::default(),
                Some("no summary line found; status derived from exit code".to_string()),
            )
        }
    };

    // Non-zero exit with no reported failures still counts as a failure so
    // a crashed or summary-less runner is never reported green.
    let status = if summary.failed > 0 || summary.errors > 0 || !output.success {
        RunStatus::Failed
    } else {
        RunStatus::Passed
    };

    let coverage = if collect_coverage {
        let parsed = parse_coverage(&combined);
        if parsed.is_none() {
            // Degrades to "coverage unavailable", never fails the run.
            warn!("Coverage requested but no figure found for {}", version);
        }
        parsed
    } else {
        None
    };

    debug!(
        "Version {} finished: {} ({} passed, {} failed, {} errors)",
        version, status, summary.passed, summary.failed, summary.errors
    );

    let now = Utc::now();
    TestRun {
        version: version.to_string(),
        status,
        passed: summary.passed,
        failed: summary.failed,
        errors: summary.errors,
        skipped: summary.skipped,
        coverage,
        started_at: now,
        finished_at: now,
        detail,
    }
}

fn env_error_run(version: &str, detail: String) -> TestRun {
    let now = Utc::now();
    TestRun {
        version: version.to_string(),
        status: RunStatus::EnvError,
        passed: 0,
        failed: 0,
        errors: 0,
        skipped: 0,
        coverage: None,
        started_at: now,
        finished_at: now,
        detail: Some(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(command: &str, versions: &[&str], template: Option<&str>) -> HarnessConfig {
        let versions = versions
            .iter()
            .map(|v| format!("{:?}", v))
            .collect::<Vec<_>>()
            .join(", ");
        let template_line = match template {
            Some(t) => format!("[runtime]\ntemplate = {:?}\n", t),
            None => String::new(),
        };
        let toml = format!(
            "[suite]\ncommand = {:?}\nconfig_env = \"APP_CONFIG_DIR\"\ntimeout_secs = 30\n\n\
             [matrix]\nversions = [{}]\n\n{}",
            command, versions, template_line
        );
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        use std::io::Write;
        file.write_all(toml.as_bytes()).unwrap();
        file.flush().unwrap();
        HarnessConfig::load_from(file.path()).unwrap()
    }

    #[tokio::test]
    async fn test_passing_run() {
        let config = config_with("echo 4 passed in 0.2s", &["v1"], None);
        let matrix = config.matrix().unwrap();
        let runner = MatrixRunner::new(config, RunnerOptions::default());
        let report = runner.run(&matrix).await.unwrap();
        assert_eq!(report.runs().len(), 1);
        assert_eq!(report.runs()[0].status, RunStatus::Passed);
        assert_eq!(report.runs()[0].passed, 4);
        assert_eq!(report.exit_code(), crate::report::EXIT_OK);
    }

    #[tokio::test]
    async fn test_failing_run_counts() {
        let config = config_with("echo 1 failed, 2 passed in 0.1s; exit 1", &["v1"], None);
        let matrix = config.matrix().unwrap();
        let runner = MatrixRunner::new(config, RunnerOptions::default());
        let report = runner.run(&matrix).await.unwrap();
        let run = &report.runs()[0];
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.failed, 1);
        assert_eq!(run.passed, 2);
        assert_eq!(report.exit_code(), crate::report::EXIT_TEST_FAILURES);
    }

    #[tokio::test]
    async fn test_unprovisionable_version_is_env_error_and_does_not_abort() {
        let config = config_with(
            "{runtime} -c 'echo 2 passed'",
            &["good", "missing"],
            Some("gauntlet-test-runtime-{version}"),
        );
        let matrix = config.matrix().unwrap();
        let runner = MatrixRunner::new(config, RunnerOptions::default());
        let report = runner.run(&matrix).await.unwrap();
        assert_eq!(report.runs().len(), 2);
        assert_eq!(report.runs()[0].status, RunStatus::EnvError);
        assert_eq!(report.runs()[1].status, RunStatus::EnvError);
        assert_eq!(report.exit_code(), crate::report::EXIT_ENV_ERRORS);
    }

    #[tokio::test]
    async fn test_mixed_matrix_one_entry_per_version() {
        // A failing suite must not stop later versions from being attempted.
        let config = config_with("echo 1 failed, 1 passed; exit 1", &["v1", "v2"], None);
        let matrix = config.matrix().unwrap();
        let runner = MatrixRunner::new(config, RunnerOptions::default());
        let report = runner.run(&matrix).await.unwrap();
        assert_eq!(report.runs().len(), matrix.len());
        assert_eq!(report.runs()[0].version, "v1");
        assert_eq!(report.runs()[1].version, "v2");
    }

    #[tokio::test]
    async fn test_sandbox_env_is_installed_for_the_run() {
        let config = config_with(
            "test -d \"$APP_CONFIG_DIR\" && touch \"$APP_CONFIG_DIR/canary\" && echo 1 passed",
            &["v1"],
            None,
        );
        let matrix = config.matrix().unwrap();
        let runner = MatrixRunner::new(config, RunnerOptions::default());
        let report = runner.run(&matrix).await.unwrap();
        assert_eq!(report.runs()[0].status, RunStatus::Passed);
    }

    #[tokio::test]
    async fn test_timeout_is_env_error() {
        let mut config = config_with("sleep 10", &["v1"], None);
        config.suite.timeout_secs = Some(0);
        let matrix = config.matrix().unwrap();
        let runner = MatrixRunner::new(config, RunnerOptions::default());
        let report = runner.run(&matrix).await.unwrap();
        assert_eq!(report.runs()[0].status, RunStatus::EnvError);
        let detail = report.runs()[0].detail.as_deref().unwrap();
        assert!(detail.contains("timed out") || detail.contains("exceeded"));
    }

    #[tokio::test]
    async fn test_no_summary_falls_back_to_exit_status() {
        let config = config_with("true", &["v1"], None);
        let matrix = config.matrix().unwrap();
        let runner = MatrixRunner::new(config, RunnerOptions::default());
        let report = runner.run(&matrix).await.unwrap();
        assert_eq!(report.runs()[0].status, RunStatus::Passed);
        assert!(report.runs()[0].detail.as_deref().unwrap().contains("exit code"));
    }

    #[tokio::test]
    async fn test_coverage_parsed_from_output() {
        let config = config_with("printf '2 passed\\nTOTAL 100 20 80%%\\n'", &["v1"], None);
        let matrix = config.matrix().unwrap();
        let options = RunnerOptionsBuilder::default()
            .collect_coverage(true)
            .build()
            .unwrap();
        let runner = MatrixRunner::new(config, options);
        let report = runner.run(&matrix).await.unwrap();
        assert_eq!(report.runs()[0].coverage, Some(80.0));
        assert_eq!(report.headline_coverage(), Some(80.0));
    }

    #[tokio::test]
    async fn test_coverage_degrades_to_unavailable() {
        let config = config_with("echo 2 passed", &["v1"], None);
        let matrix = config.matrix().unwrap();
        let options = RunnerOptionsBuilder::default()
            .collect_coverage(true)
            .build()
            .unwrap();
        let runner = MatrixRunner::new(config, options);
        let report = runner.run(&matrix).await.unwrap();
        assert_eq!(report.runs()[0].status, RunStatus::Passed);
        assert_eq!(report.runs()[0].coverage, None);
    }

    #[tokio::test]
    async fn test_parallel_report_order_matches_matrix() {
        let config = config_with("echo 1 passed", &["a", "b", "c", "d"], None);
        let matrix = config.matrix().unwrap();
        let options = RunnerOptionsBuilder::default().jobs(4usize).build().unwrap();
        let runner = MatrixRunner::new(config, options);
        let report = runner.run(&matrix).await.unwrap();
        let versions: Vec<&str> = report.runs().iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, ["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_idempotent_across_consecutive_runs() {
        let config = config_with("echo 2 passed, 1 failed; exit 1", &["v1", "v2"], None);
        let matrix = config.matrix().unwrap();
        let runner = MatrixRunner::new(config, RunnerOptions::default());
        let first = runner.run(&matrix).await.unwrap();
        let second = runner.run(&matrix).await.unwrap();
        let outcomes = |r: &SuiteReport| {
            r.runs()
                .iter()
                .map(|run| (run.version.clone(), run.status, run.passed, run.failed))
                .collect::<Vec<_>>()
        };
        assert_eq!(outcomes(&first), outcomes(&second));
    }
}
