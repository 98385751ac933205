//! Suite command construction, execution, and output parsing.
//!
//! A suite invocation is the rendered command line that executes the test
//! collection for one version run: the configured template with `{runtime}`
//! substituted (shell-escaped), coverage arguments appended when requested,
//! and the sandbox/environment variables applied to the child process only.
//!
//! Output parsing is deliberately tolerant. The harness looks for a
//! pytest-style summary line (`2 passed, 1 failed in 0.21s`) and a
//! `TOTAL ... NN%` coverage row; when no summary is found the child's exit
//! status decides pass/fail.

use std::borrow::Cow;
use std::time::Duration;

use shell_escape::escape;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::errors::{HarnessError, Result};

const MACHINE_KIND: &str = if cfg!(windows) {
    "windows"
} else if cfg!(unix) {
    "unix"
} else {
    "unknown"
};

/// Keywords recognized in a summary line, mapped onto counter slots.
const SUMMARY_KEYWORDS: [(&str, usize); 5] = [
    ("passed", 0),
    ("failed", 1),
    ("error", 2),
    ("errors", 2),
    ("skipped", 3),
];

/// A fully rendered suite command plus the environment it runs with.
#[derive(Clone, Debug)]
pub struct SuiteInvocation {
    command: String,
    env: Vec<(String, String)>,
}

/// Raw result of one suite execution.
#[derive(Clone, Debug)]
pub struct SuiteOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Parsed pass/fail/error/skip counts from a summary line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SuiteSummary {
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    pub skipped: u32,
}

impl SuiteInvocation {
    /// Renders the suite command for one run.
    ///
    /// The `{runtime}` placeholder is replaced with the shell-escaped
    /// runtime path; coverage args are appended verbatim. If the template
    /// references `{runtime}` but none was provisioned, the run cannot be
    /// built and the error is reported as a provisioning problem.
    pub fn build(
        template: &str,
        runtime: Option<&std::path::Path>,
        coverage_args: &[String],
    ) -> Result<Self> {
        let mut command = if template.contains("{runtime}") {
            match runtime {
                Some(path) => {
                    let escaped = escape(Cow::from(path.to_string_lossy().into_owned()));
                    template.replace("{runtime}", &escaped)
                }
                None => {
                    return Err(HarnessError::Provision(
                        "suite command references {runtime} but no runtime template is configured"
                            .to_string(),
                    ))
                }
            }
        } else {
            template.to_string()
        };

        for arg in coverage_args {
            command.push(' ');
            command.push_str(arg);
        }

        Ok(SuiteInvocation {
            command,
            env: Vec::new(),
        })
    }

    /// Adds an environment variable for the child process.
    #[must_use]
    pub fn with_env<S1, S2>(mut self, key: S1, value: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The rendered command line, for logging and error messages.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runs the suite command to completion with a timeout.
    ///
    /// A non-zero exit from the suite is not an error here; it is a result
    /// (`success == false`). Errors are reserved for spawn failures and
    /// timeouts.
    pub async fn execute(&self, limit: Duration) -> Result<SuiteOutput> {
        debug!("Running suite command: {}", self.command);

        let mut cmd = if MACHINE_KIND != "windows" {
            // Use sh -c for Unix systems for better shell compatibility
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.command);
            c
        } else {
            // Use PowerShell for Windows
            let mut c = Command::new("pwsh.exe");
            c.args([
                "-NonInteractive",
                "-NoLogo",
                "-NoProfile",
                "-Command",
                &self.command,
            ]);
            c
        };

        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.kill_on_drop(true);

        match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if !output.status.success() {
                    debug!("Suite command exited non-zero: {}", output.status);
                }
                Ok(SuiteOutput {
                    success: output.status.success(),
                    stdout,
                    stderr,
                })
            }
            Ok(Err(e)) => {
                error!("Process error: {}", e);
                Err(HarnessError::command_failed(
                    &self.command,
                    format!("Process error: {}", e),
                ))
            }
            Err(_) => {
                error!(
                    "Suite command timed out after {}s: {}",
                    limit.as_secs(),
                    self.command
                );
                Err(HarnessError::Timeout(format!(
                    "exceeded {}s: {}",
                    limit.as_secs(),
                    self.command
                )))
            }
        }
    }
}

/// Extracts pass/fail/error/skip counts from a test-runner summary line.
///
/// Scans from the last line backwards for `<count> <keyword>` pairs, so the
/// final summary wins over any per-file progress lines.
#[must_use]
pub fn parse_summary(output: &str) -> Option<SuiteSummary> {
    for line in output.lines().rev() {
        let mut counts = [0u32; 4];
        let mut matched = false;

        for part in line.trim_matches(['=', ' ', '\t']).split(',') {
            let tokens: Vec<&str> = part.split_whitespace().collect();
            // Look for adjacent "<number> <keyword>" pairs within the part.
            for pair in tokens.windows(2) {
                let Ok(count) = pair[0].parse::<u32>() else {
                    continue;
                };
                let keyword = pair[1].trim_end_matches(['.', ',']);
                if let Some(&(_, slot)) = SUMMARY_KEYWORDS
                    .iter()
                    .find(|(kw, _)| keyword.eq_ignore_ascii_case(kw))
                {
                    // Child output is untrusted; repeated keywords must not
                    // overflow the counter.
                    counts[slot] = counts[slot].saturating_add(count);
                    matched = true;
                }
            }
        }

        if matched {
            return Some(SuiteSummary {
                passed: counts[0],
                failed: counts[1],
                errors: counts[2],
                skipped: counts[3],
            });
        }
    }
    None
}

/// Extracts a coverage percentage from instrumented suite output.
///
/// Recognizes the `TOTAL ... NN%` row emitted by line-coverage term reports
/// and bare `coverage: NN%`-style lines. Returns the last match, which in a
/// multi-section report is the aggregate.
#[must_use]
pub fn parse_coverage(output: &str) -> Option<f64> {
    let mut found = None;
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            continue;
        };
        let is_coverage_line = first.eq_ignore_ascii_case("total")
            || first.eq_ignore_ascii_case("coverage:")
            || first.eq_ignore_ascii_case("coverage");
        if !is_coverage_line {
            continue;
        }
        if let Some(last) = tokens.last() {
            if let Some(num) = last.strip_suffix('%') {
                match num.parse::<f64>() {
                    Ok(pct) if (0.0..=100.0).contains(&pct) => found = Some(pct),
                    Ok(pct) => warn!("Ignoring out-of-range coverage figure: {}%", pct),
                    Err(_) => {}
                }
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use std::path::Path;

    #[test]
    fn test_build_substitutes_runtime() {
        let inv = SuiteInvocation::build(
            "{runtime} -m pytest tests/ -q",
            Some(Path::new("/usr/bin/python3.12")),
            &[],
        )
        .unwrap();
        assert_eq!(inv.command(), "/usr/bin/python3.12 -m pytest tests/ -q");
    }

    #[test]
    fn test_build_escapes_runtime_path() {
        let inv = SuiteInvocation::build(
            "{runtime} --version",
            Some(Path::new("/opt/my runtimes/python")),
            &[],
        )
        .unwrap();
        assert!(inv.command().contains("'/opt/my runtimes/python'"));
    }

    #[test]
    fn test_build_appends_coverage_args() {
        let inv = SuiteInvocation::build(
            "pytest tests/",
            None,
            &["--cov".to_string(), "--cov-report=term".to_string()],
        )
        .unwrap();
        assert_eq!(inv.command(), "pytest tests/ --cov --cov-report=term");
    }

    #[test]
    fn test_build_rejects_placeholder_without_runtime() {
        let err = SuiteInvocation::build("{runtime} -m pytest", None, &[]).unwrap_err();
        assert_eq!(err.category(), "provision");
    }

    #[rstest]
    #[case("3 passed in 0.12s", SuiteSummary { passed: 3, ..Default::default() })]
    #[case(
        "== 1 failed, 2 passed in 0.03s ==",
        SuiteSummary { passed: 2, failed: 1, ..Default::default() }
    )]
    #[case(
        "= 2 passed, 1 failed, 3 errors, 1 skipped in 1.2s =",
        SuiteSummary { passed: 2, failed: 1, errors: 3, skipped: 1 }
    )]
    #[case("5 passed, 1 error in 0.5s", SuiteSummary { passed: 5, errors: 1, ..Default::default() })]
    fn test_parse_summary(#[case] line: &str, #[case] expected: SuiteSummary) {
        assert_eq!(parse_summary(line), Some(expected));
    }

    #[test]
    fn test_parse_summary_prefers_last_line() {
        let output = "1 passed in 0.1s\ncollected 4 items\n3 passed, 1 failed in 0.4s";
        let summary = parse_summary(output).unwrap();
        assert_eq!(summary.passed, 3);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_parse_summary_saturates_on_huge_counts() {
        let summary = parse_summary("4294967295 passed, 4294967295 passed in 0.1s").unwrap();
        assert_eq!(summary.passed, u32::MAX);

        let summary = parse_summary("4294967290 failed, 10 failed in 0.1s").unwrap();
        assert_eq!(summary.failed, u32::MAX);
    }

    #[test]
    fn test_parse_summary_absent() {
        assert_eq!(parse_summary("no tests ran here"), None);
        assert_eq!(parse_summary(""), None);
    }

    #[rstest]
    #[case("TOTAL    100    20    80%", Some(80.0))]
    #[case("TOTAL 250 0 100%", Some(100.0))]
    #[case("coverage: 42.5%", Some(42.5))]
    #[case("no figures here", None)]
    #[case("TOTAL 10 2 120%", None)]
    fn test_parse_coverage(#[case] line: &str, #[case] expected: Option<f64>) {
        assert_eq!(parse_coverage(line), expected);
    }

    #[test]
    fn test_parse_coverage_takes_aggregate_row() {
        let output = "src/a.py  50  10  80%\nsrc/b.py  50  15  70%\nTOTAL  100  25  75%";
        assert_eq!(parse_coverage(output), Some(75.0));
    }

    #[cfg(unix)]
    mod execution {
        use super::*;
        use std::time::Duration;

        #[tokio::test]
        async fn test_execute_success_captures_stdout() {
            let inv = SuiteInvocation::build("echo 2 passed", None, &[]).unwrap();
            let output = inv.execute(Duration::from_secs(10)).await.unwrap();
            assert!(output.success);
            assert!(output.stdout.contains("2 passed"));
        }

        #[tokio::test]
        async fn test_execute_nonzero_exit_is_not_an_error() {
            let inv = SuiteInvocation::build("exit 3", None, &[]).unwrap();
            let output = inv.execute(Duration::from_secs(10)).await.unwrap();
            assert!(!output.success);
        }

        #[tokio::test]
        async fn test_execute_env_reaches_child_only() {
            let inv = SuiteInvocation::build("printf '%s' \"$GAUNTLET_PROBE\"", None, &[])
                .unwrap()
                .with_env("GAUNTLET_PROBE", "sandboxed");
            let output = inv.execute(Duration::from_secs(10)).await.unwrap();
            assert_eq!(output.stdout, "sandboxed");
            assert!(std::env::var("GAUNTLET_PROBE").is_err());
        }

        #[tokio::test]
        async fn test_execute_timeout() {
            let inv = SuiteInvocation::build("sleep 5", None, &[]).unwrap();
            let err = inv.execute(Duration::from_millis(100)).await.unwrap_err();
            assert_eq!(err.category(), "timeout");
        }
    }
}
