//! Scenario runner.
//!
//! Executes scenarios step by step against a shared backend: resolves
//! required roles, drives probes through the HTTP client and WebSocket
//! prober, applies the catalog's shape checks, captures values for later
//! steps, and evaluates step policies. Steps are strictly sequential;
//! probe N's result is recorded before probe N+1 starts. A process-wide
//! lock serializes scenarios against the one backend this runner targets.
//!
//! Errors never cross this boundary as `Err`: every executed probe yields
//! a result, and steps that cannot execute are skipped with a declared
//! reason.

use crate::auth::{self, AuthContext};
use crate::checks::{Vars, resolve_template, substitute_body};
use crate::client::HttpClient;
use crate::config::{ConfigError, HarnessConfig};
use crate::fixtures::{FixtureRegistry, sub_step_names};
use crate::models::{
    ErrorKind, FailureEntry, Probe, ProbeResult, RunSummary, ScenarioOutcome, SkippedStep,
};
use crate::scenario::{HttpStep, Scenario, Step, StepAction, StepPolicy, WsAction};
use crate::store::ResultStore;
use crate::ws::WsProber;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Options affecting a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Skip fixture teardown steps (for debugging against a scratch
    /// backend).
    pub skip_teardown: bool,
}

/// Progress callback for live reporting.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Events emitted while a run executes.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    RunStarted {
        total_scenarios: usize,
    },
    ScenarioStarted {
        scenario_id: String,
        description: String,
    },
    /// One probe completed and its result was recorded.
    StepCompleted {
        scenario_id: String,
        result: ProbeResult,
    },
    /// A step was skipped with its declared reason.
    StepSkipped {
        scenario_id: String,
        step: String,
        reason: String,
    },
    ScenarioCompleted {
        outcome: ScenarioOutcome,
    },
    RunCompleted,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcomes: Vec<ScenarioOutcome>,
    /// All recorded results, in execution order.
    pub results: Vec<ProbeResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub interrupted: bool,
}

impl RunReport {
    /// True iff every required step of every scenario passed.
    pub fn all_required_passed(&self) -> bool {
        !self.interrupted && self.outcomes.iter().all(|o| o.passed)
    }

    /// Builds the aggregate summary embedded in the run artifact.
    pub fn summary(&self) -> RunSummary {
        let mut scenario_of: HashMap<&str, &str> = HashMap::new();
        for outcome in &self.outcomes {
            for name in &outcome.step_names {
                scenario_of.insert(name, &outcome.scenario_id);
            }
        }

        let passed = self.results.iter().filter(|r| r.success).count();
        let failed = self.results.len() - passed;
        let failures = self
            .results
            .iter()
            .filter(|r| !r.success)
            .map(|r| FailureEntry {
                scenario_id: scenario_of.get(r.name.as_str()).map_or_else(
                    || "unknown".to_string(),
                    |id| (*id).to_string(),
                ),
                name: r.name.clone(),
                kind: r.error_kind,
                error: r.error.clone(),
            })
            .collect();

        RunSummary {
            scenario_ids: self.outcomes.iter().map(|o| o.scenario_id.clone()).collect(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            total_probes: self.results.len(),
            passed,
            failed,
            pass_rate: if self.results.is_empty() {
                1.0
            } else {
                passed as f64 / self.results.len() as f64
            },
            scenarios: self.outcomes.clone(),
            failures,
            interrupted: self.interrupted,
        }
    }
}

/// Drives scenarios against one backend.
pub struct ScenarioRunner {
    config: HarnessConfig,
    client: HttpClient,
    ws: WsProber,
    options: RunnerOptions,
    /// Serializes scenarios against the shared backend.
    backend_lock: Mutex<()>,
    on_progress: Option<ProgressCallback>,
    interrupt: Arc<AtomicBool>,
}

impl ScenarioRunner {
    pub fn new(config: HarnessConfig) -> Result<Self, ConfigError> {
        let client = HttpClient::new(&config)?;
        let ws = WsProber::new(&config);
        Ok(Self {
            config,
            client,
            ws,
            options: RunnerOptions::default(),
            backend_lock: Mutex::new(()),
            on_progress: None,
            interrupt: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets a callback for progress updates.
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// A flag that, once set, stops the run at the next step boundary.
    /// In-flight probes always resolve and are recorded first.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.on_progress {
            callback(event);
        }
    }

    /// Runs the given scenarios in order, sharing one result store so
    /// probe names stay unique across the whole run.
    pub async fn run(&self, scenarios: &[Scenario]) -> RunReport {
        let started_at = Utc::now();
        let mut store = ResultStore::new();
        let mut outcomes = Vec::with_capacity(scenarios.len());

        self.emit(ProgressEvent::RunStarted {
            total_scenarios: scenarios.len(),
        });

        for scenario in scenarios {
            if self.interrupted() {
                info!(scenario = %scenario.id, "skipping scenario after interrupt");
                break;
            }
            self.emit(ProgressEvent::ScenarioStarted {
                scenario_id: scenario.id.clone(),
                description: scenario.description.clone(),
            });
            let outcome = self.run_scenario(scenario, &mut store).await;
            self.emit(ProgressEvent::ScenarioCompleted {
                outcome: outcome.clone(),
            });
            outcomes.push(outcome);
        }

        self.emit(ProgressEvent::RunCompleted);

        RunReport {
            outcomes,
            results: store.into_results(),
            started_at,
            finished_at: Utc::now(),
            interrupted: self.interrupted(),
        }
    }

    /// Runs one scenario under the backend lock.
    pub async fn run_scenario(
        &self,
        scenario: &Scenario,
        store: &mut ResultStore,
    ) -> ScenarioOutcome {
        let _guard = self.backend_lock.lock().await;
        let start = Instant::now();
        info!(scenario = %scenario.id, steps = scenario.steps.len(), "scenario started");

        let mut state = ScenarioState::default();
        // Set when a required step fails or is skipped; remaining
        // non-cleanup steps skip with this reason.
        let mut abort_reason: Option<String> = None;

        for step in &scenario.steps {
            if self.interrupted() {
                self.skip(scenario, &mut state, step, "interrupted".to_string());
                continue;
            }

            if let Some(reason) = &abort_reason
                && !step.cleanup
            {
                self.skip(scenario, &mut state, step, reason.clone());
                continue;
            }

            if let Some(role) = step.required_role()
                && !state.auth.is_logged_in(role)
            {
                self.skip(scenario, &mut state, step, AuthContext::skip_reason(role));
                if step.policy == StepPolicy::Required {
                    abort_reason.get_or_insert_with(|| AuthContext::skip_reason(role));
                }
                continue;
            }

            let step_outcome = self.execute_step(scenario, step, &mut state, store).await;
            match step_outcome {
                StepOutcome::Skipped(reason) => {
                    self.skip(scenario, &mut state, step, reason.clone());
                    if step.policy == StepPolicy::Required {
                        abort_reason.get_or_insert(reason);
                    }
                }
                StepOutcome::Failed(hint) => {
                    if step.policy == StepPolicy::Required {
                        abort_reason.get_or_insert_with(|| {
                            hint.unwrap_or_else(|| {
                                "scenario aborted by earlier required failure".to_string()
                            })
                        });
                        debug!(scenario = %scenario.id, step = %step.name, "required step failed");
                    }
                }
                StepOutcome::Passed => {}
            }
        }

        let outcome = ScenarioOutcome {
            scenario_id: scenario.id.clone(),
            passed: abort_reason.is_none() && !self.interrupted(),
            step_names: state.step_names,
            skipped: state.skipped,
            critical: scenario.critical.clone(),
            duration: start.elapsed(),
        };
        info!(scenario = %scenario.id, passed = outcome.passed, "scenario finished");
        outcome
    }

    fn skip(&self, scenario: &Scenario, state: &mut ScenarioState, step: &Step, reason: String) {
        debug!(scenario = %scenario.id, step = %step.name, %reason, "step skipped");
        state.skipped.push(SkippedStep {
            name: step.name.clone(),
            reason: reason.clone(),
        });
        self.emit(ProgressEvent::StepSkipped {
            scenario_id: scenario.id.clone(),
            step: step.name.clone(),
            reason,
        });
    }

    /// Records a result and reports whether it passed.
    fn record(
        &self,
        scenario: &Scenario,
        state: &mut ScenarioState,
        store: &mut ResultStore,
        result: ProbeResult,
    ) -> bool {
        let passed = result.success;
        let stored_name = store.append(result);
        state.step_names.push(stored_name.clone());
        // The stored result is immutable; clone it back out for the event.
        let result = store.get(&stored_name).expect("just appended").clone();
        self.emit(ProgressEvent::StepCompleted {
            scenario_id: scenario.id.clone(),
            result,
        });
        passed
    }

    async fn execute_step(
        &self,
        scenario: &Scenario,
        step: &Step,
        state: &mut ScenarioState,
        store: &mut ResultStore,
    ) -> StepOutcome {
        match &step.action {
            StepAction::Login { role } => {
                let Some(credential) = self.config.credential(role) else {
                    return StepOutcome::Skipped(AuthContext::skip_reason(role));
                };
                let probe = auth::login_probe(&step.name, role, credential);
                let mut result = self.client.execute(&probe, None).await;
                if result.success {
                    match auth::entry_from_login_body(role, &result.body) {
                        Some(entry) => state.auth.insert(entry),
                        None => result.fail(
                            ErrorKind::Shape,
                            "login response missing access_token or user fields",
                        ),
                    }
                }
                outcome_of(self.record(scenario, state, store, result))
            }

            StepAction::Http(http) => {
                match self
                    .execute_http(scenario, &step.name, http, state, store)
                    .await
                {
                    Ok(passed) => outcome_of(passed),
                    Err(reason) => StepOutcome::Skipped(reason),
                }
            }

            StepAction::EnsureFixture(recipe) => {
                let (verify_name, create_name) = sub_step_names(&step.name);
                match self
                    .execute_http(scenario, &verify_name, &recipe.verify, state, store)
                    .await
                {
                    Ok(true) => {
                        debug!(kind = %recipe.kind, "fixture verified, creation skipped");
                        StepOutcome::Passed
                    }
                    Ok(false) => {
                        match self
                            .execute_http(scenario, &create_name, &recipe.create, state, store)
                            .await
                        {
                            Ok(true) => StepOutcome::Passed,
                            Ok(false) => {
                                warn!(kind = %recipe.kind, "fixture creation failed");
                                StepOutcome::Failed(Some(recipe.kind.skip_reason()))
                            }
                            Err(reason) => StepOutcome::Skipped(reason),
                        }
                    }
                    Err(reason) => StepOutcome::Skipped(reason),
                }
            }

            StepAction::TeardownFixtures => {
                if self.options.skip_teardown {
                    return StepOutcome::Skipped("teardown disabled (--no-cleanup)".to_string());
                }
                let probes = state.fixtures.drain_teardown();
                if probes.is_empty() {
                    debug!(scenario = %scenario.id, "no fixtures to tear down");
                    return StepOutcome::Passed;
                }
                for probe in probes {
                    let token = probe
                        .auth_role
                        .as_deref()
                        .and_then(|role| state.auth.token_for(role));
                    let result = self.client.execute(&probe, token).await;
                    if !result.success {
                        warn!(probe = %result.name, error = ?result.error, "fixture teardown failed");
                    }
                    self.record(scenario, state, store, result);
                }
                // Teardown failures are logged but never mask the outcome.
                StepOutcome::Passed
            }

            StepAction::Ws(action) => self.execute_ws(scenario, step, action, state, store).await,
        }
    }

    /// Executes one declarative HTTP step: template resolution, the probe
    /// itself, envelope and shape checks, captures, and cleanup
    /// registration. `Err` carries a skip reason (nothing was executed).
    async fn execute_http(
        &self,
        scenario: &Scenario,
        name: &str,
        http: &HttpStep,
        state: &mut ScenarioState,
        store: &mut ResultStore,
    ) -> Result<bool, String> {
        let endpoint = resolve_template(&http.endpoint, &state.vars)
            .map_err(|var| format!("value '{var}' unavailable from earlier step"))?;
        let body = match &http.body {
            Some(body) => Some(
                substitute_body(body, &state.vars)
                    .map_err(|var| format!("value '{var}' unavailable from earlier step"))?,
            ),
            None => None,
        };

        let mut probe = Probe::new(name, http.method, endpoint);
        probe.expected_status = http.expected_status;
        probe.body = body;
        probe.query = http.query.clone();
        probe.auth_role = http.auth_role.clone();
        probe.multipart = http.multipart.clone();
        probe.expect_json = http.expect_json;

        let token = http
            .auth_role
            .as_deref()
            .and_then(|role| state.auth.token_for(role));
        let mut result = self.client.execute(&probe, token).await;

        if result.success {
            self.apply_checks(http, &mut result, &state.vars);
        }
        if result.success {
            capture_values(http, &result, &mut state.vars);
            if let Some(spec) = &http.register_cleanup {
                if let Err(e) = state.fixtures.register(name, spec, &state.vars) {
                    warn!(step = name, error = %e, "cleanup registration failed");
                }
            }
        }

        Ok(self.record(scenario, state, store, result))
    }

    /// Applies the step's envelope and body checks, downgrading the result
    /// to a shape failure on the first mismatch.
    fn apply_checks(&self, http: &HttpStep, result: &mut ProbeResult, vars: &Vars) {
        let payload = match http.envelope.extract(&result.body) {
            Ok(payload) => payload,
            Err(problem) => {
                result.fail(ErrorKind::Shape, problem);
                return;
            }
        };
        for check in &http.checks {
            if let Err(problem) = check.apply(payload, vars) {
                let message = format!("{}: {problem}", check.describe());
                result.fail(ErrorKind::Shape, message);
                return;
            }
        }
    }

    async fn execute_ws(
        &self,
        scenario: &Scenario,
        step: &Step,
        action: &WsAction,
        state: &mut ScenarioState,
        store: &mut ResultStore,
    ) -> StepOutcome {
        // WS actions need the principal's entry; role presence was checked
        // by the caller, so a miss here is a logic error worth surfacing
        // as a skip rather than a panic.
        match action {
            WsAction::Ping { role, strict } => {
                let Some(entry) = state.auth.entry(role).cloned() else {
                    return StepOutcome::Skipped(AuthContext::skip_reason(role));
                };
                let result = self.ws.ping(&step.name, &entry, *strict).await;
                outcome_of(self.record(scenario, state, store, result))
            }
            WsAction::Reject { role, token } => {
                let Some(entry) = state.auth.entry(role).cloned() else {
                    return StepOutcome::Skipped(AuthContext::skip_reason(role));
                };
                let result = self
                    .ws
                    .reject(&step.name, &entry.user_id, token.as_deref())
                    .await;
                outcome_of(self.record(scenario, state, store, result))
            }
            WsAction::Fanout { role, connections } => {
                let Some(entry) = state.auth.entry(role).cloned() else {
                    return StepOutcome::Skipped(AuthContext::skip_reason(role));
                };
                let results = self.ws.fanout(&step.name, &entry, *connections).await;
                let mut all_passed = true;
                for result in results {
                    all_passed &= self.record(scenario, state, store, result);
                }
                outcome_of(all_passed)
            }
        }
    }
}

/// Per-scenario mutable state.
#[derive(Default)]
struct ScenarioState {
    auth: AuthContext,
    fixtures: FixtureRegistry,
    vars: Vars,
    step_names: Vec<String>,
    skipped: Vec<SkippedStep>,
}

enum StepOutcome {
    Passed,
    /// Failed, optionally carrying the reason downstream skips should
    /// declare (e.g. `fixture asset unavailable`).
    Failed(Option<String>),
    Skipped(String),
}

fn outcome_of(passed: bool) -> StepOutcome {
    if passed {
        StepOutcome::Passed
    } else {
        StepOutcome::Failed(None)
    }
}

/// Copies captured values out of a successful response body.
fn capture_values(http: &HttpStep, result: &ProbeResult, vars: &mut Vars) {
    for capture in &http.capture {
        match result.body.pointer(capture.pointer) {
            Some(serde_json::Value::String(s)) => {
                vars.insert(capture.var.to_string(), s.clone());
            }
            Some(serde_json::Value::Number(n)) => {
                vars.insert(capture.var.to_string(), n.to_string());
            }
            Some(other) => {
                vars.insert(capture.var.to_string(), other.to_string());
            }
            None => {
                warn!(var = capture.var, pointer = capture.pointer, "capture pointer missing");
            }
        }
    }
}
