//! # harness-core
//!
//! Core library for the BeatSpace integration-test harness.
//!
//! The harness drives end-to-end scenarios against a live REST+WebSocket
//! backend: it sequences probes with shared authentication state, records
//! every outcome, manages server-side fixtures over the same HTTP surface,
//! and renders human- and machine-readable reports.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ ScenarioRunner │────▶│ Scenario Catalog │     │  HttpClient  │
//! └────────────────┘     └──────────────────┘  ┌─▶│  WsProber    │
//!        │                                     │  └──────────────┘
//!        ├─────────────────────────────────────┘
//!        ▼                                        ┌──────────────┐
//! ┌────────────────┐     ┌──────────────────┐    │   Backend    │
//! │  ResultStore   │────▶│    Reporter      │    │ (opaque API) │
//! └────────────────┘     └──────────────────┘    └──────────────┘
//! ```
//!
//! Probes never raise across component boundaries; every executed probe
//! yields exactly one recorded result, and steps that cannot run are
//! skipped with a declared reason.

pub use crate::auth::{AuthContext, AuthEntry};
pub use crate::checks::{BodyCheck, Envelope, Vars};
pub use crate::client::HttpClient;
pub use crate::config::{
    ConfigError, Credential, FileService, HarnessConfig, Timeouts, normalize_base_url,
};
pub use crate::fixtures::{FixtureHandle, FixtureKind, FixtureRecipe, FixtureRegistry};
pub use crate::models::{
    ErrorKind, FailureEntry, Method, MultipartSpec, Probe, ProbeResult, RAW_TEXT_KEY, RunSummary,
    ScenarioOutcome, SkippedStep,
};
pub use crate::reporter::{
    Artifact, ReporterError, TerminalReporter, Verbosity, create_progress_callback,
};
pub use crate::runner::{
    ProgressCallback, ProgressEvent, RunReport, RunnerOptions, ScenarioRunner,
};
pub use crate::scenario::{
    CleanupSpec, HttpStep, Scenario, Step, StepAction, StepPolicy, WsAction,
};
pub use crate::store::ResultStore;
pub use crate::ws::WsProber;

pub mod auth;
pub mod checks;
pub mod client;
pub mod config;
pub mod fixtures;
pub mod models;
pub mod reporter;
pub mod runner;
pub mod scenario;
pub mod scenarios;
pub mod store;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_support;

/// Library version, matching the crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
