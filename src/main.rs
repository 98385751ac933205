use anyhow::Context;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use gauntlet::configuration::HarnessConfig;
use gauntlet::runner::{MatrixRunner, RunnerOptionsBuilder};
use gauntlet::VersionMatrix;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::path::PathBuf;

/// Run a CLI's test suite across runtime versions, with every run isolated
/// from the real user configuration directory.
#[derive(Parser)]
#[clap(author, version = clap::crate_version!(), max_term_width = 100)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Path to the harness config file (default: ./gauntlet.toml)
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase logging level (-v: info, -vv: debug, -vvv: trace)
    #[clap(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the suite once, against a single runtime version
    Run {
        /// Collect line coverage during the run
        #[clap(long)]
        coverage: bool,

        /// Runtime version to test (default: first matrix entry)
        #[clap(short, long)]
        runtime_version: Option<String>,
    },
    /// Runs the suite against every version in the declared matrix
    Matrix {
        /// Collect line coverage during each run
        #[clap(long)]
        coverage: bool,

        /// Number of versions to run concurrently
        #[clap(short, long, default_value_t = 1)]
        jobs: usize,

        /// Emit the report as JSON instead of a table
        #[clap(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

pub async fn run() -> Result<i32, anyhow::Error> {
    let cli = Cli::parse();

    // Handle shell completions before logger setup
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "gauntlet", &mut std::io::stdout());
        return Ok(0);
    }

    // Initialize tracing subscriber with structured logging
    let log_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    debug!("Argument parsing complete.");
    let config = HarnessConfig::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Run {
            coverage,
            runtime_version,
        } => {
            let version = match runtime_version {
                Some(v) => v.clone(),
                None => config.matrix()?.first().to_string(),
            };
            let matrix = VersionMatrix::single(version)?;
            let options = RunnerOptionsBuilder::default()
                .collect_coverage(*coverage)
                .build()
                .context("Failed to build runner options")?;
            let runner = MatrixRunner::new(config, options);
            let report = runner.run(&matrix).await?;
            report.print_summary();
            Ok(report.exit_code())
        }
        Commands::Matrix {
            coverage,
            jobs,
            json,
        } => {
            let matrix = config.matrix()?;
            let options = RunnerOptionsBuilder::default()
                .jobs(*jobs)
                .collect_coverage(*coverage)
                .build()
                .context("Failed to build runner options")?;
            let runner = MatrixRunner::new(config, options);
            let report = runner.run(&matrix).await?;
            if *json {
                println!("{}", report.to_json()?);
            } else {
                report.print_summary();
            }
            Ok(report.exit_code())
        }
        Commands::Completions { shell: _ } => {
            // This is handled earlier in the function
            unreachable!("Completions should be handled before this point");
        }
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            gauntlet::output::error(&format!("{err:#}"));
            std::process::exit(2);
        }
    }
}
