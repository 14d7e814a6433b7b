//! Reporters and the run artifact.
//!
//! The terminal reporter is the only component that writes colored output
//! to stdout; everything else emits structured progress events to it. The
//! artifact writer persists one JSON document per run
//! (`{config_snapshot, run_summary, results[]}`) which `harness report`
//! can re-render later.

use crate::models::{ProbeResult, RunSummary, truncate};
use crate::runner::{ProgressEvent, RunReport};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest response excerpt printed for a failing probe.
const EXCERPT_LEN: usize = 200;

/// Verbosity level for terminal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Show only the final summary.
    Quiet,
    /// Per-probe lines and failures.
    #[default]
    Normal,
    /// Also show skip reasons and body excerpts for passing probes.
    Verbose,
}

/// Errors that can occur while writing or reading artifacts.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize artifact: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The one file a run persists, when an artifact path is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Configuration snapshot with passwords redacted.
    pub config_snapshot: Value,
    pub run_summary: RunSummary,
    /// Every recorded result, in insertion order.
    pub results: Vec<ProbeResult>,
}

impl Artifact {
    /// Builds the artifact for a finished run.
    pub fn new(config_snapshot: Value, report: &RunReport) -> Self {
        Self {
            config_snapshot,
            run_summary: report.summary(),
            results: report.results.clone(),
        }
    }

    /// Writes the artifact as pretty-printed JSON.
    pub fn write(&self, path: &Path) -> Result<PathBuf, ReporterError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(path.to_path_buf())
    }

    /// Reads a previously written artifact.
    pub fn read(path: &Path) -> Result<Self, ReporterError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Terminal reporter for harness runs.
#[derive(Debug)]
pub struct TerminalReporter {
    verbosity: Verbosity,
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self {
            verbosity: Verbosity::Normal,
        }
    }

    pub fn with_verbosity(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    /// Handles a progress event, printing appropriate output.
    pub fn handle_progress(&mut self, event: &ProgressEvent) {
        if self.verbosity == Verbosity::Quiet {
            return;
        }
        match event {
            ProgressEvent::RunStarted { total_scenarios } => {
                println!(
                    "\n{}",
                    format!(
                        "Running {} scenario{}...",
                        total_scenarios,
                        if *total_scenarios == 1 { "" } else { "s" }
                    )
                    .bold()
                );
            }
            ProgressEvent::ScenarioStarted {
                scenario_id,
                description,
            } => {
                println!("\n{}", scenario_id.bold().underline());
                println!("{}", description.dimmed());
            }
            ProgressEvent::StepCompleted { result, .. } => {
                self.print_result_line(result);
            }
            ProgressEvent::StepSkipped { step, reason, .. } => {
                println!(
                    "  {} {} {}",
                    "⏭️".dimmed(),
                    step.dimmed(),
                    format!("({reason})").dimmed()
                );
            }
            ProgressEvent::ScenarioCompleted { outcome } => {
                let verdict = if outcome.passed {
                    "passed".green()
                } else {
                    "failed".red()
                };
                println!(
                    "  {} {}",
                    verdict,
                    format!("({:.1}s)", outcome.duration.as_secs_f64()).dimmed()
                );
            }
            ProgressEvent::RunCompleted => {}
        }
        io::stdout().flush().ok();
    }

    /// One line per probe: status icon, name, HTTP status, latency.
    fn print_result_line(&self, result: &ProbeResult) {
        let icon = if result.success { "✅" } else { "❌" };
        println!(
            "  {} {} – {} – {}",
            icon,
            result.name,
            result.actual_status,
            format!("{:.3}s", result.latency_seconds).dimmed()
        );
        if !result.success {
            if let Some(error) = &result.error {
                println!("     {}", error.red());
            }
            let excerpt = result.body_excerpt(EXCERPT_LEN);
            if !excerpt.is_empty() {
                println!("     {}", excerpt.dimmed());
            }
        } else if self.verbosity == Verbosity::Verbose {
            let excerpt = result.body_excerpt(EXCERPT_LEN);
            if !excerpt.is_empty() {
                println!("     {}", excerpt.dimmed());
            }
        }
    }

    /// Prints the grouped failure block naming each failure and its kind.
    pub fn print_failures(&self, summary: &RunSummary, results: &[ProbeResult]) {
        if summary.failures.is_empty() {
            return;
        }

        println!("\n{}", "FAILED TESTS".red().bold());
        for failure in &summary.failures {
            let kind = failure
                .kind
                .map_or_else(|| "unknown".to_string(), |k| k.to_string());
            println!(
                "  {} {} [{}] – {}",
                "❌".red(),
                failure.name.red(),
                kind,
                truncate(failure.error.as_deref().unwrap_or("no error text"), EXCERPT_LEN)
            );
            if let Some(result) = results.iter().find(|r| r.name == failure.name) {
                let excerpt = result.body_excerpt(EXCERPT_LEN);
                if !excerpt.is_empty() {
                    println!("     {}", excerpt.dimmed());
                }
            }
        }
    }

    /// Prints the aggregate summary, per-scenario verdicts, skip reasons,
    /// and the critical-test roll-up.
    pub fn print_summary(&self, summary: &RunSummary, results: &[ProbeResult]) {
        println!("\n{}", "━".repeat(40).dimmed());

        let pct = summary.pass_rate * 100.0;
        let headline = format!(
            "{}/{} passed ({:.1}%)",
            summary.passed, summary.total_probes, pct
        );
        if summary.failed == 0 {
            println!("{}", headline.green().bold());
        } else {
            println!("{}", headline.yellow().bold());
        }

        for scenario in &summary.scenarios {
            let icon = if scenario.passed { "✅" } else { "❌" };
            println!("  {} {}", icon, scenario.scenario_id);
            if self.verbosity == Verbosity::Verbose {
                for skip in &scenario.skipped {
                    println!(
                        "     {} {}",
                        "⏭️".dimmed(),
                        format!("{} ({})", skip.name, skip.reason).dimmed()
                    );
                }
            }
        }

        self.print_critical_rollup(summary, results);

        if summary.interrupted {
            println!("\n{}", "Run interrupted; partial results flushed.".yellow());
        }

        let elapsed = summary.finished_at - summary.started_at;
        println!(
            "\n{}",
            format!(
                "Completed in {:.1}s",
                elapsed.num_milliseconds() as f64 / 1000.0
            )
            .dimmed()
        );
    }

    /// Rolls up the per-scenario critical allow-lists.
    fn print_critical_rollup(&self, summary: &RunSummary, results: &[ProbeResult]) {
        let mut lines = Vec::new();
        for scenario in &summary.scenarios {
            for name in &scenario.critical {
                let passed = results.iter().find(|r| &r.name == name).map(|r| r.success);
                lines.push((scenario.scenario_id.clone(), name.clone(), passed));
            }
        }
        if lines.is_empty() {
            return;
        }

        println!("\n{}", "Critical tests".bold());
        for (scenario_id, name, passed) in lines {
            match passed {
                Some(true) => println!("  {} {} ({})", "✅", name, scenario_id.dimmed()),
                Some(false) => println!("  {} {} ({})", "❌", name.red(), scenario_id.dimmed()),
                None => println!(
                    "  {} {} ({})",
                    "⏭️".dimmed(),
                    name.dimmed(),
                    format!("{scenario_id}, not executed").dimmed()
                ),
            }
        }
    }

    /// Re-renders a previously written artifact as human output.
    pub fn render_artifact(&self, artifact: &Artifact) {
        println!(
            "{}",
            format!(
                "Run of {} (started {})",
                artifact.run_summary.scenario_ids.join(", "),
                artifact.run_summary.started_at.format("%Y-%m-%dT%H:%M:%SZ")
            )
            .bold()
        );
        for result in &artifact.results {
            self.print_result_line(result);
        }
        self.print_failures(&artifact.run_summary, &artifact.results);
        self.print_summary(&artifact.run_summary, &artifact.results);
    }
}

/// Creates a progress callback that feeds a terminal reporter.
pub fn create_progress_callback(verbosity: Verbosity) -> crate::runner::ProgressCallback {
    let reporter = std::sync::Arc::new(std::sync::Mutex::new(TerminalReporter::with_verbosity(
        verbosity,
    )));

    Box::new(move |event| {
        if let Ok(mut r) = reporter.lock() {
            r.handle_progress(&event);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorKind, FailureEntry, Method, ScenarioOutcome};
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    fn sample_result(name: &str, success: bool) -> ProbeResult {
        ProbeResult {
            name: name.to_string(),
            method: Method::Get,
            url: "http://h/api/x".to_string(),
            success,
            expected_status: 200,
            actual_status: if success { 200 } else { 500 },
            latency_seconds: 0.2,
            body: json!({"detail": "x"}),
            error: if success {
                None
            } else {
                Some("expected status 200, got 500".to_string())
            },
            error_kind: if success {
                None
            } else {
                Some(ErrorKind::StatusMismatch)
            },
        }
    }

    fn sample_summary() -> RunSummary {
        RunSummary {
            scenario_ids: vec!["admin-dashboard".to_string()],
            started_at: Utc::now(),
            finished_at: Utc::now(),
            total_probes: 2,
            passed: 1,
            failed: 1,
            pass_rate: 0.5,
            scenarios: vec![ScenarioOutcome {
                scenario_id: "admin-dashboard".to_string(),
                passed: false,
                step_names: vec!["admin login".to_string(), "admin listing".to_string()],
                skipped: vec![],
                critical: vec!["admin login".to_string()],
                duration: Duration::from_secs(3),
            }],
            failures: vec![FailureEntry {
                scenario_id: "admin-dashboard".to_string(),
                name: "admin listing".to_string(),
                kind: Some(ErrorKind::StatusMismatch),
                error: Some("expected status 200, got 500".to_string()),
            }],
            interrupted: false,
        }
    }

    #[test]
    fn test_reporter_does_not_panic_on_events() {
        let mut reporter = TerminalReporter::new();
        reporter.handle_progress(&ProgressEvent::RunStarted { total_scenarios: 2 });
        reporter.handle_progress(&ProgressEvent::ScenarioStarted {
            scenario_id: "admin-dashboard".to_string(),
            description: "Admin listings".to_string(),
        });
        reporter.handle_progress(&ProgressEvent::StepCompleted {
            scenario_id: "admin-dashboard".to_string(),
            result: sample_result("admin login", true),
        });
        reporter.handle_progress(&ProgressEvent::StepSkipped {
            scenario_id: "admin-dashboard".to_string(),
            step: "admin listing".to_string(),
            reason: "role 'admin' unavailable".to_string(),
        });
    }

    #[test]
    fn test_quiet_mode_swallows_progress() {
        let mut reporter = TerminalReporter::with_verbosity(Verbosity::Quiet);
        reporter.handle_progress(&ProgressEvent::RunStarted { total_scenarios: 1 });
    }

    #[test]
    fn test_print_summary_and_failures_do_not_panic() {
        let reporter = TerminalReporter::new();
        let summary = sample_summary();
        let results = vec![
            sample_result("admin login", true),
            sample_result("admin listing", false),
        ];
        reporter.print_failures(&summary, &results);
        reporter.print_summary(&summary, &results);
    }

    #[test]
    fn test_artifact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts").join("run.json");

        let artifact = Artifact {
            config_snapshot: json!({"base_url": "http://h/api"}),
            run_summary: sample_summary(),
            results: vec![sample_result("admin login", true)],
        };
        artifact.write(&path).unwrap();

        let back = Artifact::read(&path).unwrap();
        assert_eq!(back.results.len(), 1);
        assert_eq!(back.run_summary.total_probes, 2);
        assert_eq!(back.config_snapshot["base_url"], json!("http://h/api"));
    }

    #[test]
    fn test_artifact_read_missing_file() {
        let err = Artifact::read(Path::new("/nonexistent/run.json")).unwrap_err();
        assert!(matches!(err, ReporterError::Io(_)));
    }

    #[test]
    fn test_artifact_results_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");

        let artifact = Artifact {
            config_snapshot: json!({}),
            run_summary: sample_summary(),
            results: vec![
                sample_result("first", true),
                sample_result("second", false),
                sample_result("third", true),
            ],
        };
        artifact.write(&path).unwrap();

        let back = Artifact::read(&path).unwrap();
        let names: Vec<_> = back.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_render_artifact_does_not_panic() {
        let reporter = TerminalReporter::with_verbosity(Verbosity::Verbose);
        let artifact = Artifact {
            config_snapshot: json!({}),
            run_summary: sample_summary(),
            results: vec![
                sample_result("admin login", true),
                sample_result("admin listing", false),
            ],
        };
        reporter.render_artifact(&artifact);
    }

    #[test]
    fn test_create_progress_callback() {
        let callback = create_progress_callback(Verbosity::Quiet);
        callback(ProgressEvent::RunStarted { total_scenarios: 1 });
    }
}
