//! Data models for the integration-test harness.
//!
//! This module defines the core data structures shared by every component:
//! outbound probes, their recorded results, and the aggregate run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Reserved key under which an undecodable response body is stored as text.
pub const RAW_TEXT_KEY: &str = "raw_text";

/// HTTP method of a probe. `Ws` marks WebSocket probes in recorded results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Ws,
}

impl Method {
    /// Returns the wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Ws => "WS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file part plus accompanying text fields for a multipart request.
#[derive(Debug, Clone)]
pub struct MultipartSpec {
    /// Form field name of the file part (e.g. `file`).
    pub file_field: String,
    /// File name reported to the server.
    pub file_name: String,
    /// Content type of the file part.
    pub content_type: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
    /// Additional plain-text form fields.
    pub text_fields: Vec<(String, String)>,
}

/// A single outbound request plus its expected outcome.
///
/// Probes are created per step and consumed by the HTTP client wrapper;
/// only the recorded [`ProbeResult`] outlives the step.
#[derive(Debug, Clone)]
pub struct Probe {
    /// Name under which the result is recorded (unique per run).
    pub name: String,
    pub method: Method,
    /// Endpoint path relative to the base URL, or an absolute `http(s)` URL.
    pub url: String,
    /// The sole success axis: the response status must equal this exactly.
    pub expected_status: u16,
    /// JSON request body, if any.
    pub body: Option<Value>,
    /// Query string pairs.
    pub query: Vec<(String, String)>,
    /// Role whose bearer token is attached, if any.
    pub auth_role: Option<String>,
    /// Multipart payload; when set, `body` is ignored and no JSON
    /// content type is sent.
    pub multipart: Option<MultipartSpec>,
    /// Whether an unparseable body is a decode failure (true for API
    /// endpoints, false for binary downloads).
    pub expect_json: bool,
}

impl Probe {
    /// Creates a probe expecting status 200 with no body or auth.
    pub fn new(name: impl Into<String>, method: Method, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            url: url.into(),
            expected_status: 200,
            body: None,
            query: Vec::new(),
            auth_role: None,
            multipart: None,
            expect_json: true,
        }
    }

    /// Sets the expected response status.
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Sets the JSON request body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends a query pair.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attaches the bearer token of the given role.
    pub fn as_role(mut self, role: impl Into<String>) -> Self {
        self.auth_role = Some(role.into());
        self
    }

    /// Replaces the body with a multipart payload.
    pub fn with_multipart(mut self, multipart: MultipartSpec) -> Self {
        self.multipart = Some(multipart);
        self
    }

    /// Marks the response body as raw (not expected to decode as JSON).
    pub fn raw_body(mut self) -> Self {
        self.expect_json = false;
        self
    }
}

/// Behavioral classification of a probe failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection refused, DNS, TLS, or timeout. Status recorded as 0.
    Transport,
    /// Response arrived but its status differs from the expected one.
    StatusMismatch,
    /// Body expected to be JSON but unparseable.
    Decode,
    /// Body parsed but missing fields named by the catalog.
    Shape,
    /// A required role, fixture, or captured value was absent.
    Precondition,
    /// Socket closed before the expected frame.
    WsClosedUnexpected,
    /// Negative-path test satisfied because the socket was refused.
    WsClosedExpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::StatusMismatch => "status_mismatch",
            ErrorKind::Decode => "decode",
            ErrorKind::Shape => "shape",
            ErrorKind::Precondition => "precondition",
            ErrorKind::WsClosedUnexpected => "ws_closed_unexpected",
            ErrorKind::WsClosedExpected => "ws_closed_expected",
        };
        f.write_str(name)
    }
}

/// The recorded outcome of a single probe. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Probe name, suffixed `#2`, `#3`… on collision within a run.
    pub name: String,
    pub method: Method,
    /// Resolved URL (tokens redacted for WebSocket probes).
    pub url: String,
    pub success: bool,
    pub expected_status: u16,
    /// Actual response status; 0 when no response arrived.
    pub actual_status: u16,
    pub latency_seconds: f64,
    /// Decoded JSON body, or `{"raw_text": …}` when decoding failed.
    pub body: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ProbeResult {
    /// Marks this result as failed with the given kind and message,
    /// keeping the already-recorded status and body for diagnostics.
    pub fn fail(&mut self, kind: ErrorKind, error: impl Into<String>) {
        self.success = false;
        self.error_kind = Some(kind);
        self.error = Some(error.into());
    }

    /// A short body excerpt for terminal output, capped at `max_len` characters.
    pub fn body_excerpt(&self, max_len: usize) -> String {
        let text = match &self.body {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        truncate(&text, max_len)
    }
}

/// A step that was skipped rather than executed, with its declared reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedStep {
    pub name: String,
    pub reason: String,
}

/// Outcome of one scenario within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario_id: String,
    /// True iff every required step executed and passed.
    pub passed: bool,
    /// Names of the results this scenario recorded, in execution order.
    pub step_names: Vec<String>,
    /// Steps skipped with their declared reasons.
    pub skipped: Vec<SkippedStep>,
    /// Names of critical steps (reporter roll-up allow-list).
    pub critical: Vec<String>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// One entry in the grouped failure block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEntry {
    pub scenario_id: String,
    pub name: String,
    pub kind: Option<ErrorKind>,
    pub error: Option<String>,
}

/// Aggregate outcome of a single harness invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub scenario_ids: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_probes: usize,
    pub passed: usize,
    pub failed: usize,
    /// Fraction of probes that passed, in `[0, 1]`.
    pub pass_rate: f64,
    pub scenarios: Vec<ScenarioOutcome>,
    pub failures: Vec<FailureEntry>,
    /// True when the run was cut short by an interrupt.
    pub interrupted: bool,
}

impl RunSummary {
    /// Returns true iff every required step of every scenario passed.
    pub fn all_required_passed(&self) -> bool {
        self.scenarios.iter().all(|s| s.passed)
    }
}

/// Truncates a string to at most `max_len` bytes, backing off to a valid
/// UTF-8 character boundary and appending `...` when cut.
pub fn truncate(s: &str, max_len: usize) -> String {
    let flat = s.replace(['\n', '\r'], " ");
    if flat.len() <= max_len {
        return flat;
    }
    let mut boundary = max_len.min(flat.len());
    while boundary > 0 && !flat.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}...", &flat[..boundary])
}

/// Serde helper for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_probe_builder_defaults() {
        let probe = Probe::new("login", Method::Post, "auth/login");
        assert_eq!(probe.expected_status, 200);
        assert!(probe.body.is_none());
        assert!(probe.auth_role.is_none());
        assert!(probe.expect_json);
    }

    #[test]
    fn test_probe_builder_chaining() {
        let probe = Probe::new("list", Method::Get, "admin/assets")
            .expect_status(201)
            .as_role("admin")
            .with_query("page", "1")
            .with_body(json!({"k": "v"}));
        assert_eq!(probe.expected_status, 201);
        assert_eq!(probe.auth_role.as_deref(), Some("admin"));
        assert_eq!(probe.query, vec![("page".to_string(), "1".to_string())]);
        assert_eq!(probe.body, Some(json!({"k": "v"})));
    }

    #[test]
    fn test_method_display() {
        assert_eq!(Method::Get.to_string(), "GET");
        assert_eq!(Method::Delete.to_string(), "DELETE");
        assert_eq!(Method::Ws.to_string(), "WS");
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let v = serde_json::to_value(ErrorKind::StatusMismatch).unwrap();
        assert_eq!(v, json!("status_mismatch"));
        let v = serde_json::to_value(ErrorKind::WsClosedExpected).unwrap();
        assert_eq!(v, json!("ws_closed_expected"));
    }

    #[test]
    fn test_probe_result_fail_keeps_body() {
        let mut result = ProbeResult {
            name: "x".to_string(),
            method: Method::Get,
            url: "http://h/api/x".to_string(),
            success: true,
            expected_status: 200,
            actual_status: 200,
            latency_seconds: 0.1,
            body: json!({"id": 1}),
            error: None,
            error_kind: None,
        };
        result.fail(ErrorKind::Shape, "missing fields: [status]");
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Shape));
        assert_eq!(result.body, json!({"id": 1}));
    }

    #[test]
    fn test_body_excerpt_caps_length() {
        let result = ProbeResult {
            name: "x".to_string(),
            method: Method::Get,
            url: String::new(),
            success: true,
            expected_status: 200,
            actual_status: 200,
            latency_seconds: 0.0,
            body: Value::String("a".repeat(500)),
            error: None,
            error_kind: None,
        };
        let excerpt = result.body_excerpt(200);
        assert_eq!(excerpt.len(), 203); // 200 chars + "..."
    }

    #[test]
    fn test_truncate_multibyte_boundary() {
        let s = format!("{}✅{}", "x".repeat(99), "y".repeat(10));
        let out = truncate(&s, 100);
        // Must not panic and must remain valid UTF-8.
        for _ in out.chars() {}
    }

    #[test]
    fn test_truncate_flattens_newlines() {
        assert_eq!(truncate("a\nb\rc", 10), "a b c");
    }

    #[test]
    fn test_probe_result_serde_round_trip() {
        let result = ProbeResult {
            name: "admin list".to_string(),
            method: Method::Get,
            url: "http://h/api/admin/users".to_string(),
            success: false,
            expected_status: 200,
            actual_status: 500,
            latency_seconds: 1.25,
            body: json!({"detail": "boom"}),
            error: Some("expected 200, got 500".to_string()),
            error_kind: Some(ErrorKind::StatusMismatch),
        };
        let text = serde_json::to_string(&result).unwrap();
        let back: ProbeResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back.name, "admin list");
        assert_eq!(back.actual_status, 500);
        assert_eq!(back.error_kind, Some(ErrorKind::StatusMismatch));
    }

    #[test]
    fn test_run_summary_all_required_passed() {
        let outcome = |passed| ScenarioOutcome {
            scenario_id: "s".to_string(),
            passed,
            step_names: vec![],
            skipped: vec![],
            critical: vec![],
            duration: Duration::from_secs(1),
        };
        let summary = RunSummary {
            scenario_ids: vec!["s".to_string()],
            started_at: Utc::now(),
            finished_at: Utc::now(),
            total_probes: 2,
            passed: 1,
            failed: 1,
            pass_rate: 0.5,
            scenarios: vec![outcome(true), outcome(false)],
            failures: vec![],
            interrupted: false,
        };
        assert!(!summary.all_required_passed());
    }
}
