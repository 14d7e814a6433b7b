//! Scenario catalog.
//!
//! Declarative descriptions of the end-to-end flows the harness exercises
//! against the marketplace backend. Each submodule builds one scenario as
//! data (steps, envelopes, shape checks); nothing here performs I/O.
//!
//! Endpoint envelopes are annotated per step, so a backend that flips
//! between a bare array and a keyed object (`{services: [...]}`) is a
//! one-line catalog change, not a core change.

mod admin;
mod marketplace;
mod monitoring;
mod po_upload;
mod realtime;

use crate::checks::{BodyCheck, Envelope};
use crate::config::HarnessConfig;
use crate::fixtures::{FixtureKind, FixtureRecipe};
use crate::scenario::{HttpStep, Scenario, Step, StepAction};
use serde_json::{Value, json};

pub use admin::admin_dashboard;
pub use marketplace::marketplace_state;
pub use monitoring::{monitoring_admin_lifecycle, monitoring_subscription};
pub use po_upload::po_upload;
pub use realtime::realtime_events;

/// Role names used by the catalog. The configuration supplies exactly one
/// credential per role; a missing credential skips dependent steps.
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_BUYER: &str = "buyer";

/// Seed-data recipe shared by scenarios that need a marketplace asset:
/// adopt one from the public listing, or have the admin create the
/// canonical test asset when the marketplace is empty. Either path leaves
/// `asset_id` captured for later steps.
pub(crate) fn ensure_asset_step() -> Step {
    let recipe = FixtureRecipe {
        kind: FixtureKind::Asset,
        owning_role: ROLE_ADMIN.to_string(),
        verify: HttpStep::get("assets/public")
            .envelope(Envelope::Array)
            .check(BodyCheck::Custom {
                name: "marketplace has assets",
                f: has_assets,
            })
            .capture("asset_id", "/0/id"),
        create: HttpStep::post("admin/assets")
            .as_role(ROLE_ADMIN)
            .with_body(canonical_asset_body())
            .capture("asset_id", "/id"),
    };
    Step::new("ensure marketplace asset", StepAction::EnsureFixture(recipe))
}

pub(crate) fn has_assets(payload: &Value) -> Result<(), String> {
    match payload.as_array() {
        Some(assets) if !assets.is_empty() => Ok(()),
        Some(_) => Err("marketplace returned no assets".to_string()),
        None => Err("expected an array of assets".to_string()),
    }
}

fn canonical_asset_body() -> Value {
    json!({
        "name": "Harness Canonical Billboard",
        "type": "Billboard",
        "address": "Gulshan Avenue, Dhaka",
        "dimensions": "10x20 ft",
        "pricing": {"weekly_rate": 5000, "monthly_rate": 18000, "yearly_rate": 200000},
        "status": "Available",
        "photos": [],
        "description": "Seed asset created by the integration-test harness",
    })
}

/// All known scenarios, in execution order.
pub fn catalog(config: &HarnessConfig) -> Vec<Scenario> {
    vec![
        admin_dashboard(),
        marketplace_state(),
        monitoring_subscription(),
        monitoring_admin_lifecycle(),
        po_upload(config),
        realtime_events(),
    ]
}

/// Looks up scenarios by id, preserving catalog order. Unknown ids are
/// returned in the error so the CLI can fail with a configuration error.
pub fn select(config: &HarnessConfig, ids: &[String]) -> Result<Vec<Scenario>, String> {
    let all = catalog(config);
    if ids.is_empty() {
        return Ok(all);
    }
    for id in ids {
        if !all.iter().any(|s| &s.id == id) {
            return Err(id.clone());
        }
    }
    Ok(all.into_iter().filter(|s| ids.contains(&s.id)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::StepAction;

    #[test]
    fn test_catalog_lists_all_six_scenarios() {
        let config = HarnessConfig::default();
        let scenarios = catalog(&config);
        let ids: Vec<_> = scenarios.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "admin-dashboard",
                "marketplace-state",
                "monitoring-subscription",
                "monitoring-admin-lifecycle",
                "po-upload",
                "realtime-events",
            ]
        );
    }

    #[test]
    fn test_scenario_ids_are_unique() {
        let config = HarnessConfig::default();
        let scenarios = catalog(&config);
        let mut ids: Vec<_> = scenarios.iter().map(|s| s.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_select_by_id_preserves_catalog_order() {
        let config = HarnessConfig::default();
        let picked = select(
            &config,
            &["po-upload".to_string(), "admin-dashboard".to_string()],
        )
        .unwrap();
        let ids: Vec<_> = picked.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["admin-dashboard", "po-upload"]);
    }

    #[test]
    fn test_select_unknown_id_is_error() {
        let config = HarnessConfig::default();
        let err = select(&config, &["nonsense".to_string()]).unwrap_err();
        assert_eq!(err, "nonsense");
    }

    #[test]
    fn test_select_empty_returns_all() {
        let config = HarnessConfig::default();
        assert_eq!(select(&config, &[]).unwrap().len(), 6);
    }

    #[test]
    fn test_every_scenario_declares_roles_it_logs_into() {
        let config = HarnessConfig::default();
        for scenario in catalog(&config) {
            for step in &scenario.steps {
                if let StepAction::Login { role } = &step.action {
                    assert!(
                        scenario.required_roles.contains(role),
                        "scenario {} logs in '{role}' without declaring it",
                        scenario.id
                    );
                }
            }
        }
    }

    #[test]
    fn test_critical_steps_exist() {
        let config = HarnessConfig::default();
        for scenario in catalog(&config) {
            for critical in &scenario.critical {
                assert!(
                    scenario.steps.iter().any(|s| &s.name == critical),
                    "scenario {} rolls up unknown step '{critical}'",
                    scenario.id
                );
            }
        }
    }

    #[test]
    fn test_ensure_asset_recipe_captures_id_on_both_paths() {
        let step = ensure_asset_step();
        let StepAction::EnsureFixture(recipe) = &step.action else {
            panic!("expected fixture step");
        };
        assert_eq!(recipe.kind, FixtureKind::Asset);
        assert_eq!(recipe.owning_role, ROLE_ADMIN);
        assert!(recipe.verify.capture.iter().any(|c| c.var == "asset_id"));
        assert!(recipe.create.capture.iter().any(|c| c.var == "asset_id"));
        // Verification reads the public listing unauthenticated.
        assert!(recipe.verify.auth_role.is_none());
        assert_eq!(recipe.create.auth_role.as_deref(), Some(ROLE_ADMIN));
    }

    #[test]
    fn test_has_assets_check() {
        use serde_json::json;
        assert!(has_assets(&json!([{"id": "a"}])).is_ok());
        assert!(has_assets(&json!([])).is_err());
        assert!(has_assets(&json!({"not": "array"})).is_err());
    }
}
