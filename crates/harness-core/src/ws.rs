//! WebSocket prober.
//!
//! Targeted probes over the backend's notification socket: an
//! authenticated ping round-trip, rejection of bad credentials, and a
//! multi-connection fan-out for one principal. Frames are JSON carrying at
//! least `{type, timestamp}` with an ISO-8601 timestamp; the ping probe
//! accepts any well-formed frame because the server may push a welcome
//! frame before answering the ping.

use crate::auth::AuthEntry;
use crate::config::HarnessConfig;
use crate::models::{ErrorKind, Method, ProbeResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};
use tungstenite::Error as WsError;
use tungstenite::protocol::Message;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Status recorded for a completed WebSocket handshake.
const HANDSHAKE_OK: u16 = 101;

pub struct WsProber {
    ws_base: String,
    open_timeout: Duration,
    recv_timeout: Duration,
}

impl WsProber {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            ws_base: config.ws_base_url(),
            open_timeout: Duration::from_secs(config.timeouts.ws_open_seconds),
            recv_timeout: Duration::from_secs(config.timeouts.ws_recv_seconds),
        }
    }

    /// The connect URL for a principal. `token: None` omits the query
    /// string entirely (the no-token negative path).
    fn connect_url(&self, user_id: &str, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("{}/ws/{user_id}?token={token}", self.ws_base),
            None => format!("{}/ws/{user_id}", self.ws_base),
        }
    }

    /// The URL recorded in results, with no token material.
    fn recorded_url(&self, user_id: &str) -> String {
        format!("{}/ws/{user_id}", self.ws_base)
    }

    /// Connects as the principal and sends a ping, accepting a `pong` or
    /// any well-formed `{type, timestamp}` frame within the receive
    /// timeout. With `strict`, a malformed frame fails instead of warning.
    pub async fn ping(&self, name: &str, entry: &AuthEntry, strict: bool) -> ProbeResult {
        let url = self.connect_url(&entry.user_id, Some(&entry.token));
        let mut result = self.empty_result(name, &entry.user_id);
        let start = Instant::now();

        let mut socket = match self.open(&url).await {
            Ok(socket) => socket,
            Err((status, message)) => {
                result.actual_status = status;
                result.latency_seconds = start.elapsed().as_secs_f64();
                result.fail(ErrorKind::WsClosedUnexpected, message);
                return result;
            }
        };
        result.actual_status = HANDSHAKE_OK;

        let ping = json!({"type": "ping", "timestamp": Utc::now().to_rfc3339()});
        if let Err(e) = socket.send(Message::Text(ping.to_string())).await {
            result.latency_seconds = start.elapsed().as_secs_f64();
            result.fail(ErrorKind::WsClosedUnexpected, format!("send failed: {e}"));
            return result;
        }

        match self.recv_frame(&mut socket).await {
            FrameOutcome::Frame(frame) => {
                result.latency_seconds = start.elapsed().as_secs_f64();
                match validate_frame(&frame) {
                    Ok(()) => {
                        debug!(name, frame_type = frame["type"].as_str(), "framed reply received");
                        result.body = frame;
                    }
                    Err(problem) if strict => {
                        result.body = frame;
                        result.fail(ErrorKind::Shape, problem);
                    }
                    Err(problem) => {
                        warn!(name, %problem, "frame missing fields, accepting (relaxed)");
                        result.body = json!({"frame": frame, "warning": problem});
                    }
                }
            }
            FrameOutcome::Closed(code) => {
                result.latency_seconds = start.elapsed().as_secs_f64();
                result.fail(
                    ErrorKind::WsClosedUnexpected,
                    match code {
                        Some(code) => format!("socket closed before reply (close code {code})"),
                        None => "socket closed before reply".to_string(),
                    },
                );
            }
            FrameOutcome::TimedOut => {
                result.latency_seconds = start.elapsed().as_secs_f64();
                result.fail(
                    ErrorKind::Transport,
                    format!("no frame within {}s", self.recv_timeout.as_secs()),
                );
            }
        }

        close_quietly(socket).await;
        result
    }

    /// Asserts the server refuses the handshake or closes before any data
    /// frame. Either outcome satisfies the negative assertion.
    pub async fn reject(&self, name: &str, user_id: &str, token: Option<&str>) -> ProbeResult {
        let url = self.connect_url(user_id, token);
        let mut result = self.empty_result(name, user_id);
        let start = Instant::now();

        match tokio::time::timeout(self.open_timeout, connect_async(url.as_str())).await {
            Err(_) => {
                result.latency_seconds = start.elapsed().as_secs_f64();
                result.fail(
                    ErrorKind::Transport,
                    format!(
                        "handshake neither accepted nor refused within {}s",
                        self.open_timeout.as_secs()
                    ),
                );
            }
            Ok(Err(e)) => {
                result.latency_seconds = start.elapsed().as_secs_f64();
                if let WsError::Http(response) = &e {
                    result.actual_status = response.status().as_u16();
                }
                result.error_kind = Some(ErrorKind::WsClosedExpected);
                result.error = Some(format!("handshake refused: {e}"));
                result.body = json!({"refused": true});
            }
            Ok(Ok((mut socket, _))) => {
                // Handshake was accepted; the server must still close
                // before sending any data frame.
                result.actual_status = HANDSHAKE_OK;
                match self.recv_frame(&mut socket).await {
                    FrameOutcome::Closed(code) => {
                        result.latency_seconds = start.elapsed().as_secs_f64();
                        result.error_kind = Some(ErrorKind::WsClosedExpected);
                        result.error = Some(match code {
                            Some(code) => format!("closed after handshake (close code {code})"),
                            None => "closed after handshake".to_string(),
                        });
                        result.body = json!({"refused": true});
                    }
                    FrameOutcome::Frame(frame) => {
                        result.latency_seconds = start.elapsed().as_secs_f64();
                        result.body = frame;
                        result.fail(
                            ErrorKind::WsClosedUnexpected,
                            "expected rejection but received a data frame",
                        );
                        close_quietly(socket).await;
                    }
                    FrameOutcome::TimedOut => {
                        result.latency_seconds = start.elapsed().as_secs_f64();
                        result.fail(
                            ErrorKind::WsClosedUnexpected,
                            "expected rejection but the socket stayed open",
                        );
                        close_quietly(socket).await;
                    }
                }
            }
        }
        result
    }

    /// Opens `connections` concurrent sockets for one principal; each must
    /// round-trip one message. Returns one result per socket, all closed
    /// on the way out.
    pub async fn fanout(&self, name: &str, entry: &AuthEntry, connections: usize) -> Vec<ProbeResult> {
        let tasks = (1..=connections).map(|i| {
            let socket_name = format!("{name}/socket-{i}");
            async move { self.ping(&socket_name, entry, false).await }
        });
        futures::future::join_all(tasks).await
    }

    /// Opens a socket, mapping failures to a (status, message) pair.
    async fn open(&self, url: &str) -> Result<WsStream, (u16, String)> {
        match tokio::time::timeout(self.open_timeout, connect_async(url)).await {
            Err(_) => Err((
                0,
                format!("connect timed out after {}s", self.open_timeout.as_secs()),
            )),
            Ok(Err(e)) => {
                let status = match &e {
                    WsError::Http(response) => response.status().as_u16(),
                    _ => 0,
                };
                Err((status, format!("connect failed: {e}")))
            }
            Ok(Ok((socket, _response))) => Ok(socket),
        }
    }

    /// Awaits the next data frame, skipping protocol ping/pong control
    /// frames, within the receive timeout.
    async fn recv_frame(&self, socket: &mut WsStream) -> FrameOutcome {
        let deadline = tokio::time::Instant::now() + self.recv_timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, socket.next()).await;
            match next {
                Err(_) => return FrameOutcome::TimedOut,
                Ok(None) => return FrameOutcome::Closed(None),
                Ok(Some(Err(_))) => return FrameOutcome::Closed(None),
                Ok(Some(Ok(message))) => match message {
                    Message::Text(text) => {
                        let frame = serde_json::from_str(&text)
                            .unwrap_or_else(|_| json!({"raw_text": text}));
                        return FrameOutcome::Frame(frame);
                    }
                    Message::Binary(bytes) => {
                        let frame = serde_json::from_slice(&bytes)
                            .unwrap_or_else(|_| json!({"raw_text": String::from_utf8_lossy(&bytes)}));
                        return FrameOutcome::Frame(frame);
                    }
                    Message::Close(frame) => {
                        return FrameOutcome::Closed(frame.map(|f| u16::from(f.code)));
                    }
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                },
            }
        }
    }

    fn empty_result(&self, name: &str, user_id: &str) -> ProbeResult {
        ProbeResult {
            name: name.to_string(),
            method: Method::Ws,
            url: self.recorded_url(user_id),
            success: true,
            expected_status: HANDSHAKE_OK,
            actual_status: 0,
            latency_seconds: 0.0,
            body: Value::Null,
            error: None,
            error_kind: None,
        }
    }
}

enum FrameOutcome {
    Frame(Value),
    Closed(Option<u16>),
    TimedOut,
}

async fn close_quietly(mut socket: WsStream) {
    let _ = socket.close(None).await;
}

/// Validates the `{type, timestamp}` frame contract. The timestamp must
/// parse as ISO-8601, with or without a UTC offset.
pub fn validate_frame(frame: &Value) -> Result<(), String> {
    let mut missing = Vec::new();
    if frame.get("type").and_then(Value::as_str).is_none() {
        missing.push("type");
    }
    match frame.get("timestamp").and_then(Value::as_str) {
        None => missing.push("timestamp"),
        Some(ts) if !parses_as_iso8601(ts) => {
            return Err(format!("timestamp {ts:?} is not ISO-8601"));
        }
        Some(_) => {}
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing fields: {missing:?}"))
    }
}

fn parses_as_iso8601(ts: &str) -> bool {
    DateTime::parse_from_rfc3339(ts).is_ok()
        || NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}
