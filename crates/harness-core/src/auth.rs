//! Authentication context.
//!
//! Bearer tokens indexed by role name, obtained by login probes against the
//! configured login endpoint. Entries live for the duration of a run and
//! are mutated only by login steps. A login failure is an ordinary failed
//! probe result; steps depending on the role are skipped with a declared
//! reason, never silently treated as success.

use crate::config::Credential;
use crate::models::{Method, Probe};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Endpoint path of the login probe, declared once here.
pub const LOGIN_ENDPOINT: &str = "auth/login";

/// One authenticated principal.
#[derive(Debug, Clone)]
pub struct AuthEntry {
    pub role: String,
    pub token: String,
    pub user_id: String,
    pub email: String,
    pub obtained_at: DateTime<Utc>,
}

/// Role name to authenticated principal.
#[derive(Debug, Default)]
pub struct AuthContext {
    entries: HashMap<String, AuthEntry>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bearer token for a role, if logged in.
    pub fn token_for(&self, role: &str) -> Option<&str> {
        self.entries.get(role).map(|e| e.token.as_str())
    }

    /// Returns the full entry for a role, if logged in.
    pub fn entry(&self, role: &str) -> Option<&AuthEntry> {
        self.entries.get(role)
    }

    pub fn is_logged_in(&self, role: &str) -> bool {
        self.entries.contains_key(role)
    }

    /// Records a successful login. Replaces any previous entry for the role.
    pub fn insert(&mut self, entry: AuthEntry) {
        debug!(role = %entry.role, user_id = %entry.user_id, "auth context updated");
        self.entries.insert(entry.role.clone(), entry);
    }

    /// The declared skip reason for steps depending on an absent role.
    pub fn skip_reason(role: &str) -> String {
        format!("role '{role}' unavailable (login failed or missing credentials)")
    }
}

/// Builds the login probe for a role.
pub fn login_probe(step_name: &str, role: &str, credential: &Credential) -> Probe {
    Probe::new(step_name, Method::Post, LOGIN_ENDPOINT).with_body(json!({
        "email": credential.email,
        "password": credential.password,
    }))
}

/// Extracts an [`AuthEntry`] from a login response body of the shape
/// `{access_token, user: {id, email, role, status}}`. Returns `None` when
/// a required field is missing, logging what was absent.
pub fn entry_from_login_body(role: &str, body: &Value) -> Option<AuthEntry> {
    let token = body.get("access_token").and_then(Value::as_str);
    let user_id = body.pointer("/user/id").and_then(Value::as_str);
    let email = body.pointer("/user/email").and_then(Value::as_str);

    match (token, user_id, email) {
        (Some(token), Some(user_id), Some(email)) => Some(AuthEntry {
            role: role.to_string(),
            token: token.to_string(),
            user_id: user_id.to_string(),
            email: email.to_string(),
            obtained_at: Utc::now(),
        }),
        _ => {
            let mut missing = Vec::new();
            if token.is_none() {
                missing.push("access_token");
            }
            if user_id.is_none() {
                missing.push("user.id");
            }
            if email.is_none() {
                missing.push("user.email");
            }
            warn!(role, ?missing, "login response missing fields");
            None
        }
    }
}
