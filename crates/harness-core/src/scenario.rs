//! Scenario and step vocabulary.
//!
//! A [`Scenario`] is a static, declarative description of one end-to-end
//! flow: an ordered list of named [`Step`]s, the roles it needs, and the
//! allow-list of critical steps the reporter rolls up. Steps carry data,
//! not code; the runner interprets them against live harness state.

use crate::checks::{BodyCheck, Envelope};
use crate::fixtures::{FixtureKind, FixtureRecipe};
use crate::models::{Method, MultipartSpec};
use serde_json::Value;

/// How a step failure affects the rest of the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepPolicy {
    /// Failure marks the scenario failed; remaining non-cleanup steps are
    /// skipped.
    #[default]
    Required,
    /// Failure is recorded; the scenario continues and may still pass.
    Optional,
    /// Failure is recorded; execution continues unconditionally.
    ContinueOnFail,
}

/// A value captured from a response body into the run's variable map.
#[derive(Debug, Clone)]
pub struct Capture {
    pub var: &'static str,
    /// JSON pointer applied to the full decoded body.
    pub pointer: &'static str,
}

/// Declarative HTTP probe step.
///
/// `endpoint` may contain `{var}` placeholders and JSON bodies may contain
/// `"{{var}}"` string placeholders; both resolve against values captured by
/// earlier steps. An unresolved placeholder skips the step with a
/// precondition reason.
#[derive(Debug, Clone)]
pub struct HttpStep {
    pub method: Method,
    pub endpoint: String,
    pub expected_status: u16,
    pub auth_role: Option<String>,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    pub multipart: Option<MultipartSpec>,
    pub expect_json: bool,
    pub envelope: Envelope,
    pub checks: Vec<BodyCheck>,
    pub capture: Vec<Capture>,
    /// When set, a successful response registers a fixture whose cleanup
    /// probe runs at teardown.
    pub register_cleanup: Option<CleanupSpec>,
}

/// Cleanup registration attached to a creating step.
#[derive(Debug, Clone)]
pub struct CleanupSpec {
    pub kind: FixtureKind,
    pub method: Method,
    /// Endpoint template; `{var}`s resolve at registration time.
    pub endpoint: String,
    pub auth_role: String,
    pub expected_status: u16,
    /// Variable holding the created server id.
    pub id_var: &'static str,
}

impl HttpStep {
    fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            expected_status: 200,
            auth_role: None,
            body: None,
            query: Vec::new(),
            multipart: None,
            expect_json: true,
            envelope: Envelope::Any,
            checks: Vec::new(),
            capture: Vec::new(),
            register_cleanup: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Post, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Put, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Delete, endpoint)
    }

    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    pub fn as_role(mut self, role: impl Into<String>) -> Self {
        self.auth_role = Some(role.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_multipart(mut self, multipart: MultipartSpec) -> Self {
        self.multipart = Some(multipart);
        self
    }

    pub fn raw_body(mut self) -> Self {
        self.expect_json = false;
        self
    }

    pub fn envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn check(mut self, check: BodyCheck) -> Self {
        self.checks.push(check);
        self
    }

    pub fn capture(mut self, var: &'static str, pointer: &'static str) -> Self {
        self.capture.push(Capture { var, pointer });
        self
    }

    pub fn register_cleanup(mut self, spec: CleanupSpec) -> Self {
        self.register_cleanup = Some(spec);
        self
    }
}

/// WebSocket probe step.
#[derive(Debug, Clone)]
pub enum WsAction {
    /// Connect as the role's principal and expect a framed reply to a ping
    /// within the receive timeout. `strict` turns malformed-frame warnings
    /// into failures.
    Ping { role: String, strict: bool },
    /// Expect the handshake to be refused or the socket to close before
    /// any data frame. `token` overrides the real token (use an invalid
    /// value or `None` for the no-token case).
    Reject {
        role: String,
        token: Option<String>,
    },
    /// Open N concurrent sockets for one principal; each must round-trip
    /// a message.
    Fanout { role: String, connections: usize },
}

/// What a step does when executed.
#[derive(Debug, Clone)]
pub enum StepAction {
    /// Log a role in via the configured login endpoint.
    Login { role: String },
    /// One HTTP probe.
    Http(HttpStep),
    /// Composite fixture setup: verify, then create when absent.
    EnsureFixture(FixtureRecipe),
    /// Flush registered fixtures in reverse creation order.
    TeardownFixtures,
    /// One WebSocket probe.
    Ws(WsAction),
}

/// One unit in a scenario.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub policy: StepPolicy,
    /// Cleanup-flagged steps still run after a required failure.
    pub cleanup: bool,
    pub action: StepAction,
}

impl Step {
    pub fn new(name: impl Into<String>, action: StepAction) -> Self {
        Self {
            name: name.into(),
            policy: StepPolicy::Required,
            cleanup: false,
            action,
        }
    }

    pub fn login(role: &str) -> Self {
        Self::new(
            format!("{role} login"),
            StepAction::Login {
                role: role.to_string(),
            },
        )
    }

    pub fn http(name: impl Into<String>, step: HttpStep) -> Self {
        Self::new(name, StepAction::Http(step))
    }

    pub fn ws(name: impl Into<String>, action: WsAction) -> Self {
        Self::new(name, StepAction::Ws(action))
    }

    pub fn teardown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: StepPolicy::ContinueOnFail,
            cleanup: true,
            action: StepAction::TeardownFixtures,
        }
    }

    pub fn optional(mut self) -> Self {
        self.policy = StepPolicy::Optional;
        self
    }

    pub fn continue_on_fail(mut self) -> Self {
        self.policy = StepPolicy::ContinueOnFail;
        self
    }

    pub fn cleanup(mut self) -> Self {
        self.cleanup = true;
        self
    }

    /// The role this step depends on being logged in, if any. Login steps
    /// depend on credentials, not on an existing entry.
    pub fn required_role(&self) -> Option<&str> {
        match &self.action {
            StepAction::Login { .. } | StepAction::TeardownFixtures => None,
            StepAction::Http(http) => http.auth_role.as_deref(),
            StepAction::EnsureFixture(recipe) => Some(&recipe.owning_role),
            StepAction::Ws(WsAction::Ping { role, .. })
            | StepAction::Ws(WsAction::Reject { role, .. })
            | StepAction::Ws(WsAction::Fanout { role, .. }) => Some(role),
        }
    }
}

/// An ordered, named sequence of steps expressing one end-to-end flow.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub id: String,
    pub description: String,
    pub required_roles: Vec<String>,
    /// Step names rolled up by the reporter as critical tests.
    pub critical: Vec<String>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            required_roles: Vec::new(),
            critical: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn requires_role(mut self, role: &str) -> Self {
        self.required_roles.push(role.to_string());
        self
    }

    pub fn critical_step(mut self, name: &str) -> Self {
        self.critical.push(name.to_string());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}
