//! Harness configuration.
//!
//! Configuration is constructed once at startup and passed explicitly to
//! every component; nothing reads the environment after this module returns.
//! Sources are layered, later overriding earlier:
//!
//! 1. built-in defaults
//! 2. optional `harness.yml` file
//! 3. environment variables (`HARNESS_BASE_URL`, `HARNESS_<ROLE>_EMAIL`, …)
//!
//! Only configuration errors are fatal at startup; everything else in the
//! harness degrades into skipped steps or failed probes.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that abort startup (process exit code 2).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Base URL is empty or not http(s).
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),

    /// Config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed.
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Underlying HTTP client could not be constructed.
    #[error("failed to build http client: {0}")]
    Client(String),

    /// An unknown scenario id was requested.
    #[error("unknown scenario id: {0}")]
    UnknownScenario(String),
}

/// Login credentials for one role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub email: String,
    pub password: String,
}

/// Timeouts in seconds for the three suspension kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub request_seconds: u64,
    pub ws_open_seconds: u64,
    pub ws_recv_seconds: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_seconds: 30,
            ws_open_seconds: 5,
            ws_recv_seconds: 10,
        }
    }
}

/// Expected host and folder of uploaded-file URLs, when the deployment
/// declares them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileService {
    /// Host substring the URL must contain (e.g. `res.cloudinary.com`).
    pub host: String,
    /// Folder segment the URL must contain (e.g. `beatspace/po`).
    pub folder: String,
}

/// Complete harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Normalized base URL; always ends with `/api` after loading.
    pub base_url: String,
    /// Role name to credentials. Roles without credentials are not an
    /// error; steps requiring them are skipped with a declared reason.
    pub credentials: BTreeMap<String, Credential>,
    pub timeouts: Timeouts,
    /// Where the run artifact is written, if anywhere.
    pub artifact_path: Option<PathBuf>,
    /// Scenario ids to execute; empty means all, in catalog order.
    pub scenarios: Vec<String>,
    /// Optional uploaded-file URL expectations.
    pub file_service: Option<FileService>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            credentials: BTreeMap::new(),
            timeouts: Timeouts::default(),
            artifact_path: None,
            scenarios: Vec::new(),
            file_service: None,
        }
    }
}

impl HarnessConfig {
    /// Loads configuration from defaults, an optional YAML file, and the
    /// process environment, then normalizes the base URL.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new("harness.yml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(std::env::vars());
        config.base_url = normalize_base_url(&config.base_url)?;
        debug!(base_url = %config.base_url, roles = config.credentials.len(), "configuration loaded");
        Ok(config)
    }

    /// Parses a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Applies environment-style overrides from an iterator of key/value
    /// pairs. Recognized keys:
    ///
    /// - `HARNESS_BASE_URL`
    /// - `HARNESS_ARTIFACT`
    /// - `HARNESS_REQUEST_TIMEOUT_SECS`, `HARNESS_WS_OPEN_TIMEOUT_SECS`,
    ///   `HARNESS_WS_RECV_TIMEOUT_SECS`
    /// - `HARNESS_<ROLE>_EMAIL` / `HARNESS_<ROLE>_PASSWORD` pairs
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut emails: BTreeMap<String, String> = BTreeMap::new();
        let mut passwords: BTreeMap<String, String> = BTreeMap::new();

        for (key, value) in vars {
            match key.as_str() {
                "HARNESS_BASE_URL" => self.base_url = value,
                "HARNESS_ARTIFACT" => self.artifact_path = Some(PathBuf::from(value)),
                "HARNESS_REQUEST_TIMEOUT_SECS" => {
                    if let Ok(secs) = value.parse() {
                        self.timeouts.request_seconds = secs;
                    }
                }
                "HARNESS_WS_OPEN_TIMEOUT_SECS" => {
                    if let Ok(secs) = value.parse() {
                        self.timeouts.ws_open_seconds = secs;
                    }
                }
                "HARNESS_WS_RECV_TIMEOUT_SECS" => {
                    if let Ok(secs) = value.parse() {
                        self.timeouts.ws_recv_seconds = secs;
                    }
                }
                _ => {
                    if let Some(role) = key
                        .strip_prefix("HARNESS_")
                        .and_then(|rest| rest.strip_suffix("_EMAIL"))
                    {
                        emails.insert(role.to_lowercase(), value);
                    } else if let Some(role) = key
                        .strip_prefix("HARNESS_")
                        .and_then(|rest| rest.strip_suffix("_PASSWORD"))
                    {
                        passwords.insert(role.to_lowercase(), value);
                    }
                }
            }
        }

        for (role, email) in emails {
            if let Some(password) = passwords.remove(&role) {
                self.credentials.insert(role, Credential { email, password });
            }
        }
    }

    /// Returns the credentials for a role, if configured.
    pub fn credential(&self, role: &str) -> Option<&Credential> {
        self.credentials.get(role)
    }

    /// The WebSocket base URL derived from the HTTP base URL.
    pub fn ws_base_url(&self) -> String {
        self.base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1)
    }

    /// A serializable snapshot of this configuration with passwords
    /// redacted, suitable for embedding in the run artifact.
    pub fn snapshot(&self) -> Value {
        let credentials: BTreeMap<&String, Value> = self
            .credentials
            .iter()
            .map(|(role, cred)| (role, json!({"email": cred.email, "password": "********"})))
            .collect();
        json!({
            "base_url": self.base_url,
            "credentials": credentials,
            "timeouts": self.timeouts,
            "artifact_path": self.artifact_path,
            "scenarios": self.scenarios,
            "file_service": self.file_service,
        })
    }
}

/// Normalizes a base URL: trims whitespace and trailing slashes, requires
/// an http(s) scheme, and appends `/api` unless already present.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidBaseUrl("empty".to_string()));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ConfigError::InvalidBaseUrl(trimmed.to_string()));
    }
    if trimmed.ends_with("/api") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/api"))
    }
}
