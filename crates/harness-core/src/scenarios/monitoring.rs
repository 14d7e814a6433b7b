//! Monitoring subscription lifecycle.
//!
//! Two scenarios over the monitoring service API. The buyer-facing one
//! creates an individual-asset subscription (no campaign association) and
//! sees it listed under the `{services: [...]}` envelope. The admin-facing
//! one walks the full lifecycle: list, update, delete, verify absence from
//! both views, and recreate for the same asset.

use super::{ROLE_ADMIN, ROLE_BUYER};
use crate::checks::{BodyCheck, Envelope};
use crate::fixtures::FixtureKind;
use crate::models::Method;
use crate::scenario::{CleanupSpec, HttpStep, Scenario, Step};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

/// Start today, end in thirty days.
fn service_dates() -> (String, String) {
    let now = Utc::now();
    (
        now.format("%Y-%m-%d").to_string(),
        (now + Duration::days(30)).format("%Y-%m-%d").to_string(),
    )
}

/// Subscription request body for one asset, with no `campaign_id`.
fn subscription_body(frequency: &str, service_level: &str) -> Value {
    let (start_date, end_date) = service_dates();
    json!({
        "asset_ids": ["{{asset_id}}"],
        "frequency": frequency,
        "start_date": start_date,
        "end_date": end_date,
        "service_level": service_level,
        "notification_preferences": {"email": true, "in_app": true, "sms": false},
    })
}

/// Picks an asset from the public marketplace for later steps. The
/// buyer-only scenario cannot create seed assets, so an empty marketplace
/// fails here rather than in the admin-owned fixture recipe.
fn discover_asset() -> Step {
    Step::http(
        "discover asset",
        HttpStep::get("assets/public")
            .envelope(Envelope::Array)
            .check(BodyCheck::Custom {
                name: "marketplace has assets",
                f: super::has_assets,
            })
            .capture("asset_id", "/0/id"),
    )
}

fn cleanup_subscription(role: &str) -> CleanupSpec {
    CleanupSpec {
        kind: FixtureKind::MonitoringSubscription,
        method: Method::Delete,
        endpoint: "monitoring/services/{service_id}".to_string(),
        auth_role: role.to_string(),
        expected_status: 200,
        id_var: "service_id",
    }
}

pub fn monitoring_subscription() -> Scenario {
    Scenario::new(
        "monitoring-subscription",
        "Buyer creates an individual-asset monitoring subscription without a campaign",
    )
    .requires_role(ROLE_BUYER)
    .critical_step("create subscription")
    .critical_step("subscription listed")
    .step(Step::login(ROLE_BUYER))
    .step(discover_asset())
    .step(Step::http(
        "create subscription",
        HttpStep::post("monitoring/services")
            .as_role(ROLE_BUYER)
            .with_body(subscription_body("weekly", "standard"))
            .capture("service_id", "/id")
            .register_cleanup(cleanup_subscription(ROLE_BUYER)),
    ))
    .step(Step::http(
        "subscription listed",
        HttpStep::get("monitoring/services")
            .as_role(ROLE_BUYER)
            .envelope(Envelope::Keyed("services"))
            .check(BodyCheck::ContainsWhere("/id", "service_id"))
            .check(BodyCheck::ElementWhere {
                pointer: "/id",
                var: "service_id",
                checks: vec![
                    BodyCheck::FieldEquals("/frequency", json!("weekly")),
                    BodyCheck::FieldEquals("/service_level", json!("standard")),
                    BodyCheck::FieldAbsentOrNull("/campaign_id"),
                ],
            }),
    ))
    .step(Step::teardown("remove subscription"))
}

pub fn monitoring_admin_lifecycle() -> Scenario {
    Scenario::new(
        "monitoring-admin-lifecycle",
        "Admin updates and deactivates a monitoring service; buyer can recreate it",
    )
    .requires_role(ROLE_BUYER)
    .requires_role(ROLE_ADMIN)
    .critical_step("admin deletes service")
    .critical_step("service gone from admin view")
    .step(Step::login(ROLE_BUYER))
    .step(Step::login(ROLE_ADMIN))
    .step(super::ensure_asset_step())
    .step(Step::http(
        "buyer creates service",
        HttpStep::post("monitoring/services")
            .as_role(ROLE_BUYER)
            .with_body(subscription_body("weekly", "standard"))
            .capture("service_id", "/id"),
    ))
    .step(Step::http(
        "admin sees service",
        HttpStep::get("monitoring/services")
            .as_role(ROLE_ADMIN)
            .envelope(Envelope::Keyed("services"))
            .check(BodyCheck::ContainsWhere("/id", "service_id")),
    ))
    .step(Step::http(
        "admin updates service",
        HttpStep::put("monitoring/services/{service_id}")
            .as_role(ROLE_ADMIN)
            .with_body(update_body()),
    ))
    .step(Step::http(
        "update visible",
        HttpStep::get("monitoring/services")
            .as_role(ROLE_ADMIN)
            .envelope(Envelope::Keyed("services"))
            .check(BodyCheck::ElementWhere {
                pointer: "/id",
                var: "service_id",
                checks: vec![
                    BodyCheck::FieldEquals("/service_level", json!("premium")),
                    BodyCheck::FieldEquals("/frequency", json!("monthly")),
                ],
            }),
    ))
    .step(Step::http(
        "admin deletes service",
        HttpStep::delete("monitoring/services/{service_id}").as_role(ROLE_ADMIN),
    ))
    .step(Step::http(
        "service gone from admin view",
        HttpStep::get("monitoring/services")
            .as_role(ROLE_ADMIN)
            .envelope(Envelope::Keyed("services"))
            .check(BodyCheck::NoneWhere("/id", "service_id")),
    ))
    .step(Step::http(
        "service gone from buyer view",
        HttpStep::get("monitoring/services")
            .as_role(ROLE_BUYER)
            .envelope(Envelope::Keyed("services"))
            .check(BodyCheck::NoneWhere("/id", "service_id")),
    ))
    .step(Step::http(
        "buyer recreates service",
        HttpStep::post("monitoring/services")
            .as_role(ROLE_BUYER)
            .with_body(subscription_body("bi_weekly", "basic"))
            .capture("service_id", "/id")
            .register_cleanup(cleanup_subscription(ROLE_BUYER)),
    ))
    .step(Step::teardown("remove recreated service"))
}

/// Fields the admin edit flow touches.
fn update_body() -> Value {
    let (_, end_date) = service_dates();
    json!({
        "service_level": "premium",
        "frequency": "monthly",
        "notification_preferences": {"email": true, "in_app": false, "sms": false},
        "end_date": end_date,
    })
}
