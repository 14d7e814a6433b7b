//! # harness
//!
//! Command-line entry point for the BeatSpace integration-test harness.
//!
//! ## Usage
//!
//! ```bash
//! # Run every scenario against the configured backend
//! harness run
//!
//! # Run specific scenarios and keep the artifact
//! harness run po-upload realtime-events --artifact runs/latest.json
//!
//! # List known scenarios with their required roles
//! harness list
//!
//! # Re-render a prior run artifact
//! harness report runs/latest.json
//! ```
//!
//! Exit codes: 0 all required steps passed; 1 at least one required step
//! failed; 2 configuration error; 130 interrupted.

use clap::{Parser, Subcommand};
use colored::Colorize;
use harness_core::scenarios;
use harness_core::{
    Artifact, ConfigError, HarnessConfig, RunReport, RunnerOptions, Scenario, ScenarioRunner,
    TerminalReporter, Verbosity, create_progress_callback,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

const EXIT_OK: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

/// Integration-test harness for the BeatSpace backend.
#[derive(Parser, Debug)]
#[command(name = "harness")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (defaults to ./harness.yml if present)
    #[arg(long, global = true, env = "HARNESS_CONFIG")]
    config: Option<PathBuf>,

    /// Show body excerpts and skip reasons for passing steps too
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print the final summary
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute scenarios against the configured backend
    Run {
        /// Scenario ids to execute (default: all)
        scenario_ids: Vec<String>,

        /// Only run scenarios whose id or description contains this pattern
        #[arg(long)]
        filter: Option<String>,

        /// Write the run artifact (JSON) to this path
        #[arg(long)]
        artifact: Option<PathBuf>,

        /// Leave created fixtures in place (skips teardown steps)
        #[arg(long)]
        no_cleanup: bool,
    },

    /// List known scenarios with their required roles
    List,

    /// Re-render a prior run artifact as human output
    Report {
        /// Path to an artifact written by `harness run --artifact`
        artifact_path: PathBuf,
    },
}

fn main() -> ExitCode {
    // The reporter owns stdout; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let code = match cli.command {
        Command::Run {
            ref scenario_ids,
            ref filter,
            ref artifact,
            no_cleanup,
        } => runtime.block_on(run(
            &cli,
            verbosity,
            scenario_ids,
            filter.as_deref(),
            artifact.clone(),
            no_cleanup,
        )),
        Command::List => list(&cli),
        Command::Report { ref artifact_path } => report(verbosity, artifact_path),
    };
    ExitCode::from(code)
}

fn load_config(cli: &Cli) -> Result<HarnessConfig, u8> {
    HarnessConfig::load(cli.config.as_deref()).map_err(|e| {
        eprintln!("{} {e}", "Configuration error:".red().bold());
        EXIT_CONFIG
    })
}

async fn run(
    cli: &Cli,
    verbosity: Verbosity,
    scenario_ids: &[String],
    filter: Option<&str>,
    artifact: Option<PathBuf>,
    no_cleanup: bool,
) -> u8 {
    let mut config = match load_config(cli) {
        Ok(config) => config,
        Err(code) => return code,
    };
    if artifact.is_some() {
        config.artifact_path = artifact;
    }

    // CLI arguments override the configured scenario list.
    let requested: Vec<String> = if scenario_ids.is_empty() {
        config.scenarios.clone()
    } else {
        scenario_ids.to_vec()
    };
    let selected = match scenarios::select(&config, &requested) {
        Ok(selected) => selected,
        Err(unknown) => {
            eprintln!(
                "{} {}",
                "Configuration error:".red().bold(),
                ConfigError::UnknownScenario(unknown)
            );
            return EXIT_CONFIG;
        }
    };
    let selected = apply_filter(selected, filter);
    if selected.is_empty() {
        eprintln!(
            "{} no scenarios matched",
            "Configuration error:".red().bold()
        );
        return EXIT_CONFIG;
    }

    println!(
        "{} {}",
        "BeatSpace harness".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("{}", format!("Backend: {}", config.base_url).dimmed());

    let snapshot = config.snapshot();
    let artifact_path = config.artifact_path.clone();
    let runner = match ScenarioRunner::new(config) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("{} {e}", "Configuration error:".red().bold());
            return EXIT_CONFIG;
        }
    };
    let runner = runner
        .with_options(RunnerOptions {
            skip_teardown: no_cleanup,
        })
        .on_progress(create_progress_callback(verbosity));

    // Interrupts stop the run at the next step boundary; the in-flight
    // probe resolves and everything recorded so far is flushed below.
    let interrupt = runner.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "Interrupt received, finishing current probe...".yellow());
            interrupt.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let run_report = runner.run(&selected).await;
    finish(verbosity, &snapshot, artifact_path.as_deref(), &run_report)
}

/// Writes the artifact (if configured), prints the final report, and maps
/// the outcome to an exit code.
fn finish(
    verbosity: Verbosity,
    config_snapshot: &serde_json::Value,
    artifact_path: Option<&std::path::Path>,
    run_report: &RunReport,
) -> u8 {
    let summary = run_report.summary();

    if let Some(path) = artifact_path {
        let artifact = Artifact::new(config_snapshot.clone(), run_report);
        match artifact.write(path) {
            Ok(written) => {
                if verbosity != Verbosity::Quiet {
                    println!("{}", format!("Artifact written: {}", written.display()).dimmed());
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to write artifact");
                eprintln!("{} failed to write artifact: {e}", "Warning:".yellow());
            }
        }
    }

    let reporter = TerminalReporter::with_verbosity(verbosity);
    if !summary.failures.is_empty() {
        reporter.print_failures(&summary, &run_report.results);
    }
    reporter.print_summary(&summary, &run_report.results);

    exit_code(run_report)
}

fn exit_code(run_report: &RunReport) -> u8 {
    if run_report.interrupted {
        EXIT_INTERRUPTED
    } else if run_report.all_required_passed() {
        EXIT_OK
    } else {
        EXIT_FAILED
    }
}

fn apply_filter(selected: Vec<Scenario>, filter: Option<&str>) -> Vec<Scenario> {
    let Some(pattern) = filter else {
        return selected;
    };
    let pattern = pattern.to_lowercase();
    selected
        .into_iter()
        .filter(|s| {
            s.id.to_lowercase().contains(&pattern)
                || s.description.to_lowercase().contains(&pattern)
        })
        .collect()
}

fn list(cli: &Cli) -> u8 {
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(code) => return code,
    };

    println!("{}\n", "Available scenarios:".bold());
    for scenario in scenarios::catalog(&config) {
        let roles = if scenario.required_roles.is_empty() {
            "no roles".to_string()
        } else {
            scenario.required_roles.join(", ")
        };
        println!(
            "  {}  {} {}",
            scenario.id.cyan(),
            scenario.description.dimmed(),
            format!("[{roles}]").dimmed()
        );
    }
    EXIT_OK
}

fn report(verbosity: Verbosity, artifact_path: &std::path::Path) -> u8 {
    let artifact = match Artifact::read(artifact_path) {
        Ok(artifact) => artifact,
        Err(e) => {
            eprintln!("{} {e}", "Configuration error:".red().bold());
            return EXIT_CONFIG;
        }
    };

    let reporter = TerminalReporter::with_verbosity(verbosity);
    reporter.render_artifact(&artifact);

    if artifact.run_summary.all_required_passed() {
        EXIT_OK
    } else {
        EXIT_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn empty_report(interrupted: bool) -> RunReport {
        RunReport {
            outcomes: vec![],
            results: vec![],
            started_at: Utc::now(),
            finished_at: Utc::now(),
            interrupted,
        }
    }

    #[test]
    fn test_cli_parses_run_with_ids() {
        let cli = Cli::parse_from(["harness", "run", "po-upload", "--filter", "po"]);
        match cli.command {
            Command::Run {
                scenario_ids,
                filter,
                ..
            } => {
                assert_eq!(scenario_ids, vec!["po-upload"]);
                assert_eq!(filter.as_deref(), Some("po"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_report() {
        let cli = Cli::parse_from(["harness", "report", "runs/latest.json"]);
        match cli.command {
            Command::Report { artifact_path } => {
                assert_eq!(artifact_path, PathBuf::from("runs/latest.json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(&empty_report(true)), EXIT_INTERRUPTED);
        assert_eq!(exit_code(&empty_report(false)), EXIT_OK);
    }

    #[test]
    fn test_apply_filter_matches_id_and_description() {
        let config = HarnessConfig::default();
        let all = scenarios::catalog(&config);
        let total = all.len();

        let filtered = apply_filter(scenarios::catalog(&config), Some("monitoring"));
        assert_eq!(filtered.len(), 2);

        let filtered = apply_filter(scenarios::catalog(&config), Some("WEBSOCKET"));
        assert_eq!(filtered.len(), 1);

        let filtered = apply_filter(scenarios::catalog(&config), None);
        assert_eq!(filtered.len(), total);
    }

    #[test]
    fn test_report_missing_artifact_is_config_error() {
        let code = report(Verbosity::Quiet, std::path::Path::new("/nonexistent.json"));
        assert_eq!(code, EXIT_CONFIG);
    }
}
