//! HTTP client wrapper.
//!
//! One primitive, [`HttpClient::execute`], turns a [`Probe`] into a
//! [`ProbeResult`]: it times the request, enforces the configured timeout,
//! decodes the body (with a raw-text fallback), and folds transport errors
//! and status mismatches into the result instead of returning `Err`.
//! Nothing in this module panics or raises across the component boundary.

use crate::config::{ConfigError, HarnessConfig};
use crate::models::{ErrorKind, Method, Probe, ProbeResult, RAW_TEXT_KEY};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest raw-text excerpt stored for an undecodable body. JSON bodies
/// are stored in full; binary payloads only need their leading bytes for
/// diagnostics (`%PDF` checks and the like).
const RAW_TEXT_CAP: usize = 2048;

pub struct HttpClient {
    inner: Client,
    base_url: String,
}

impl HttpClient {
    /// Builds a client with the configured request timeout. The base URL
    /// is supplied once here; probes carry endpoint paths.
    pub fn new(config: &HarnessConfig) -> Result<Self, ConfigError> {
        let inner = Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_seconds))
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            inner,
            base_url: config.base_url.clone(),
        })
    }

    /// Resolves a probe URL against the base URL. Absolute URLs (e.g. a
    /// returned CDN link) pass through untouched.
    pub fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    /// Executes a probe and records its outcome. `token` is the bearer
    /// token already resolved for the probe's auth role, if any.
    pub async fn execute(&self, probe: &Probe, token: Option<&str>) -> ProbeResult {
        let url = self.resolve_url(&probe.url);
        debug!(name = %probe.name, method = %probe.method, %url, "executing probe");

        let mut request = match probe.method {
            Method::Get => self.inner.get(&url),
            Method::Post => self.inner.post(&url),
            Method::Put => self.inner.put(&url),
            Method::Patch => self.inner.patch(&url),
            Method::Delete => self.inner.delete(&url),
            Method::Ws => {
                let mut result = empty_result(probe, &url);
                result.fail(ErrorKind::Transport, "WS probes are not HTTP-executable");
                return result;
            }
        };

        if !probe.query.is_empty() {
            request = request.query(&probe.query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        if let Some(multipart) = &probe.multipart {
            let part = match reqwest::multipart::Part::bytes(multipart.bytes.clone())
                .file_name(multipart.file_name.clone())
                .mime_str(&multipart.content_type)
            {
                Ok(part) => part,
                Err(e) => {
                    let mut result = empty_result(probe, &url);
                    result.fail(
                        ErrorKind::Transport,
                        format!("invalid multipart content type: {e}"),
                    );
                    return result;
                }
            };
            let mut form = reqwest::multipart::Form::new().part(multipart.file_field.clone(), part);
            for (name, value) in &multipart.text_fields {
                form = form.text(name.clone(), value.clone());
            }
            request = request.multipart(form);
        } else if let Some(body) = &probe.body {
            request = request.json(body);
        }

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let mut result = empty_result(probe, &url);
                result.latency_seconds = start.elapsed().as_secs_f64();
                let message = if e.is_timeout() {
                    format!("request timed out: {e}")
                } else {
                    format!("transport error: {e}")
                };
                result.fail(ErrorKind::Transport, message);
                return result;
            }
        };

        let actual_status = response.status().as_u16();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                let mut result = empty_result(probe, &url);
                result.actual_status = actual_status;
                result.latency_seconds = start.elapsed().as_secs_f64();
                result.fail(ErrorKind::Transport, format!("failed to read body: {e}"));
                return result;
            }
        };
        let latency_seconds = start.elapsed().as_secs_f64();

        let (body, decoded) = decode_body(&bytes);
        let mut result = ProbeResult {
            name: probe.name.clone(),
            method: probe.method,
            url,
            success: true,
            expected_status: probe.expected_status,
            actual_status,
            latency_seconds,
            body,
            error: None,
            error_kind: None,
        };

        if actual_status != probe.expected_status {
            result.fail(
                ErrorKind::StatusMismatch,
                format!("expected status {}, got {actual_status}", probe.expected_status),
            );
        } else if !decoded && probe.expect_json {
            result.fail(ErrorKind::Decode, "response body is not valid JSON");
        }

        debug!(
            name = %probe.name,
            status = actual_status,
            success = result.success,
            latency = format!("{latency_seconds:.3}s"),
            "probe completed"
        );
        result
    }
}

/// Decodes a response body as JSON, falling back to a capped raw-text
/// excerpt under [`RAW_TEXT_KEY`]. Returns the value and whether JSON
/// decoding succeeded.
fn decode_body(bytes: &[u8]) -> (Value, bool) {
    if bytes.is_empty() {
        return (Value::Null, true);
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => (value, true),
        Err(_) => {
            let text = String::from_utf8_lossy(bytes);
            let mut excerpt: String = text.chars().take(RAW_TEXT_CAP).collect();
            if text.chars().count() > RAW_TEXT_CAP {
                excerpt.push_str("...");
            }
            (json!({ RAW_TEXT_KEY: excerpt }), false)
        }
    }
}

/// A result shell for probes that never produced a response.
fn empty_result(probe: &Probe, url: &str) -> ProbeResult {
    ProbeResult {
        name: probe.name.clone(),
        method: probe.method,
        url: url.to_string(),
        success: true,
        expected_status: probe.expected_status,
        actual_status: 0,
        latency_seconds: 0.0,
        body: Value::Null,
        error: None,
        error_kind: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubResponse, StubServer};

    fn config_for(base_url: String) -> HarnessConfig {
        HarnessConfig {
            base_url,
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn test_resolve_url_joins_relative_paths() {
        let config = config_for("http://localhost:8001/api".to_string());
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(
            client.resolve_url("assets/public"),
            "http://localhost:8001/api/assets/public"
        );
        assert_eq!(
            client.resolve_url("/assets/public"),
            "http://localhost:8001/api/assets/public"
        );
    }

    #[test]
    fn test_resolve_url_passes_absolute_through() {
        let config = config_for("http://localhost:8001/api".to_string());
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(
            client.resolve_url("https://cdn.example.com/po/doc.pdf"),
            "https://cdn.example.com/po/doc.pdf"
        );
    }

    #[test]
    fn test_decode_body_json() {
        let (value, decoded) = decode_body(br#"{"id": 1}"#);
        assert!(decoded);
        assert_eq!(value, json!({"id": 1}));
    }

    #[test]
    fn test_decode_body_raw_fallback() {
        let (value, decoded) = decode_body(b"<html>not json</html>");
        assert!(!decoded);
        assert_eq!(value[RAW_TEXT_KEY], json!("<html>not json</html>"));
    }

    #[test]
    fn test_decode_body_empty_is_null() {
        let (value, decoded) = decode_body(b"");
        assert!(decoded);
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_execute_success_records_body() {
        let server = StubServer::spawn(|path, _| match path {
            "/api/assets/public" => StubResponse::json(200, r#"[{"id": "a1"}]"#),
            _ => StubResponse::json(404, r#"{"detail": "not found"}"#),
        })
        .await;

        let config = config_for(server.base_url());
        let client = HttpClient::new(&config).unwrap();
        let probe = Probe::new("public assets", Method::Get, "assets/public");
        let result = client.execute(&probe, None).await;

        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.actual_status, 200);
        assert_eq!(result.body, json!([{"id": "a1"}]));
        assert!(result.latency_seconds > 0.0);
    }

    #[tokio::test]
    async fn test_execute_status_mismatch_is_exact() {
        // 204 against an expectation of 200 fails; no 2xx bucketing.
        let server =
            StubServer::spawn(|_, _| StubResponse::json(204, "")).await;

        let config = config_for(server.base_url());
        let client = HttpClient::new(&config).unwrap();
        let probe = Probe::new("exact status", Method::Get, "whatever");
        let result = client.execute(&probe, None).await;

        assert!(!result.success);
        assert_eq!(result.actual_status, 204);
        assert_eq!(result.error_kind, Some(ErrorKind::StatusMismatch));
    }

    #[tokio::test]
    async fn test_execute_attaches_bearer_token() {
        let server = StubServer::spawn(|_, request| {
            if request.contains("Authorization: Bearer token-123")
                || request.contains("authorization: Bearer token-123")
            {
                StubResponse::json(200, r#"{"ok": true}"#)
            } else {
                StubResponse::json(401, r#"{"detail": "missing token"}"#)
            }
        })
        .await;

        let config = config_for(server.base_url());
        let client = HttpClient::new(&config).unwrap();
        let probe = Probe::new("authed", Method::Get, "admin/users").as_role("admin");
        let result = client.execute(&probe, Some("token-123")).await;

        assert!(result.success, "server saw no bearer token: {:?}", result.body);
    }

    #[tokio::test]
    async fn test_execute_transport_error_has_status_zero() {
        // Nothing listens on this port.
        let config = config_for("http://127.0.0.1:1/api".to_string());
        let client = HttpClient::new(&config).unwrap();
        let probe = Probe::new("unreachable", Method::Get, "assets/public");
        let result = client.execute(&probe, None).await;

        assert!(!result.success);
        assert_eq!(result.actual_status, 0);
        assert_eq!(result.error_kind, Some(ErrorKind::Transport));
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_execute_decode_failure_is_soft() {
        let server =
            StubServer::spawn(|_, _| StubResponse::text(200, "<html>oops</html>")).await;

        let config = config_for(server.base_url());
        let client = HttpClient::new(&config).unwrap();
        let probe = Probe::new("html body", Method::Get, "assets/public");
        let result = client.execute(&probe, None).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Decode));
        assert_eq!(result.body[RAW_TEXT_KEY], json!("<html>oops</html>"));
    }

    #[tokio::test]
    async fn test_execute_raw_body_probe_accepts_binary() {
        let server = StubServer::spawn(|_, _| {
            StubResponse::bytes(200, "application/pdf", b"%PDF-1.4 rest".to_vec())
        })
        .await;

        let config = config_for(server.base_url());
        let client = HttpClient::new(&config).unwrap();
        let probe = Probe::new("fetch pdf", Method::Get, "files/doc.pdf").raw_body();
        let result = client.execute(&probe, None).await;

        assert!(result.success);
        let text = result.body[RAW_TEXT_KEY].as_str().unwrap();
        assert!(text.starts_with("%PDF"));
    }

    #[tokio::test]
    async fn test_execute_sends_json_body_and_query() {
        let server = StubServer::spawn(|_, request| {
            let has_json = request.contains(r#""frequency":"weekly""#);
            let has_query = request.lines().next().is_some_and(|l| l.contains("page=2"));
            if has_json && has_query {
                StubResponse::json(200, r#"{"ok": true}"#)
            } else {
                StubResponse::json(400, r#"{"detail": "bad request"}"#)
            }
        })
        .await;

        let config = config_for(server.base_url());
        let client = HttpClient::new(&config).unwrap();
        let probe = Probe::new("create", Method::Post, "monitoring/services")
            .with_body(json!({"frequency": "weekly"}))
            .with_query("page", "2");
        let result = client.execute(&probe, None).await;

        assert!(result.success, "stub rejected request: {:?}", result.body);
    }

    #[tokio::test]
    async fn test_execute_multipart_posts_file_and_fields() {
        let server = StubServer::spawn(|_, request| {
            let head = request.to_lowercase();
            let has_file = request.contains("filename=\"po.pdf\"") && request.contains("%PDF");
            let has_field = request.contains("name=\"uploaded_by\"") && request.contains("buyer");
            let no_json_ctype = !head.contains("content-type: application/json\r\n");
            if has_file && has_field && no_json_ctype {
                StubResponse::json(200, r#"{"status": "PO Uploaded"}"#)
            } else {
                StubResponse::json(400, r#"{"detail": "bad upload"}"#)
            }
        })
        .await;

        let config = config_for(server.base_url());
        let client = HttpClient::new(&config).unwrap();
        let probe = Probe::new("upload", Method::Post, "offers/o1/upload-po").with_multipart(
            crate::models::MultipartSpec {
                file_field: "file".to_string(),
                file_name: "po.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                bytes: b"%PDF-1.4 test".to_vec(),
                text_fields: vec![("uploaded_by".to_string(), "buyer".to_string())],
            },
        );
        let result = client.execute(&probe, None).await;

        assert!(result.success, "stub rejected upload: {:?}", result.body);
    }
}
