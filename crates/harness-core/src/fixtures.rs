//! Fixture management.
//!
//! Server-side seed state is expressed as [`FixtureRecipe`]s: a verification
//! probe, a creation probe, and an optional cleanup registration, all going
//! through the same HTTP surface as ordinary steps. The manager is
//! idempotent: when verification finds the expected shape, creation is
//! skipped. Created fixtures are registered and flushed in reverse order at
//! teardown; teardown failures are logged but never mask the run outcome.

use crate::checks::{Vars, resolve_template};
use crate::models::Probe;
use crate::scenario::{CleanupSpec, HttpStep};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Kinds of server-side seed state the harness manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureKind {
    User,
    Asset,
    Campaign,
    Offer,
    MonitoringSubscription,
    UploadedPdf,
}

impl fmt::Display for FixtureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FixtureKind::User => "user",
            FixtureKind::Asset => "asset",
            FixtureKind::Campaign => "campaign",
            FixtureKind::Offer => "offer",
            FixtureKind::MonitoringSubscription => "monitoring_subscription",
            FixtureKind::UploadedPdf => "uploaded_pdf",
        };
        f.write_str(name)
    }
}

impl FixtureKind {
    /// The declared skip reason for steps depending on an absent fixture.
    pub fn skip_reason(&self) -> String {
        format!("fixture {self} unavailable")
    }
}

/// Recipe for one fixture kind: how to verify it exists and how to create
/// it. Both probes run under the owning role.
#[derive(Debug, Clone)]
pub struct FixtureRecipe {
    pub kind: FixtureKind,
    pub owning_role: String,
    /// Succeeding with the expected shape means the fixture already exists;
    /// its captures still run so later steps see the server id.
    pub verify: HttpStep,
    /// Runs only when verification fails.
    pub create: HttpStep,
}

/// A fixture created (or adopted) during the run.
#[derive(Debug, Clone)]
pub struct FixtureHandle {
    pub kind: FixtureKind,
    pub server_id: String,
    pub owning_role: String,
    pub created_by_step: String,
    /// Fully resolved cleanup probe, built at registration time.
    pub cleanup: Option<Probe>,
}

/// Registry of created fixtures, flushed in reverse creation order.
#[derive(Debug, Default)]
pub struct FixtureRegistry {
    created: Vec<FixtureHandle>,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a created fixture. The cleanup spec's endpoint template is
    /// resolved now, against the current variable map, so teardown does not
    /// depend on variables surviving.
    pub fn register(
        &mut self,
        created_by_step: &str,
        spec: &CleanupSpec,
        vars: &Vars,
    ) -> Result<(), String> {
        let server_id = vars
            .get(spec.id_var)
            .cloned()
            .ok_or_else(|| format!("value '{}' unavailable from earlier step", spec.id_var))?;
        let endpoint = resolve_template(&spec.endpoint, vars)
            .map_err(|var| format!("value '{var}' unavailable from earlier step"))?;

        let cleanup = Probe::new(
            format!("teardown {} {server_id}", spec.kind),
            spec.method,
            endpoint,
        )
        .expect_status(spec.expected_status)
        .as_role(spec.auth_role.clone());

        debug!(kind = %spec.kind, %server_id, "fixture registered");
        self.created.push(FixtureHandle {
            kind: spec.kind,
            server_id,
            owning_role: spec.auth_role.clone(),
            created_by_step: created_by_step.to_string(),
            cleanup: Some(cleanup),
        });
        Ok(())
    }

    /// Records a fixture that needs no cleanup (e.g. adopted seed data).
    pub fn adopt(&mut self, kind: FixtureKind, server_id: &str, role: &str, step: &str) {
        self.created.push(FixtureHandle {
            kind,
            server_id: server_id.to_string(),
            owning_role: role.to_string(),
            created_by_step: step.to_string(),
            cleanup: None,
        });
    }

    pub fn is_registered(&self, kind: FixtureKind) -> bool {
        self.created.iter().any(|h| h.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Drains cleanup probes in reverse creation order. Fixtures without a
    /// cleanup probe are dropped with a note.
    pub fn drain_teardown(&mut self) -> Vec<Probe> {
        let mut probes = Vec::new();
        while let Some(handle) = self.created.pop() {
            match handle.cleanup {
                Some(probe) => probes.push(probe),
                None => {
                    warn!(kind = %handle.kind, id = %handle.server_id, "fixture has no cleanup probe, leaving in place");
                }
            }
        }
        probes
    }
}

/// Builds a fixture-ensuring recipe step name pair used by the runner:
/// `<step>/verify` and `<step>/create`.
pub fn sub_step_names(step_name: &str) -> (String, String) {
    (format!("{step_name}/verify"), format!("{step_name}/create"))
}
