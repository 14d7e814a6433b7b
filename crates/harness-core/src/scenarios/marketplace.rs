//! Marketplace asset state.
//!
//! Pure-read probe of the public marketplace. Every asset must expose the
//! offer-derived pair: a boolean `waiting_for_go_live` and, whenever
//! waiting is set, a populated `asset_expiry_date`. The companion
//! invariant (some asset with an expiry is already live) depends on
//! backend state that may legitimately be absent, so it runs as an
//! optional step.

use crate::checks::{BodyCheck, Envelope};
use crate::scenario::{HttpStep, Scenario, Step};
use serde_json::Value;

pub fn marketplace_state() -> Scenario {
    Scenario::new(
        "marketplace-state",
        "Public marketplace exposes offer-derived expiry state on every asset",
    )
    .critical_step("public assets expiry invariant")
    .step(Step::http(
        "public assets expiry invariant",
        HttpStep::get("assets/public")
            .envelope(Envelope::Array)
            .check(BodyCheck::Custom {
                name: "waiting implies expiry",
                f: expiry_invariant,
            }),
    ))
    .step(
        Step::http(
            "some expiring asset is live",
            HttpStep::get("assets/public")
                .envelope(Envelope::Array)
                .check(BodyCheck::Custom {
                    name: "live offer among expiring assets",
                    f: live_presence,
                }),
        )
        .optional(),
    )
}

/// Every element: `waiting_for_go_live` is a boolean, and
/// `waiting_for_go_live == true` implies `asset_expiry_date` is a
/// non-empty string.
fn expiry_invariant(payload: &Value) -> Result<(), String> {
    let assets = payload.as_array().ok_or("expected an array of assets")?;
    for (i, asset) in assets.iter().enumerate() {
        let Some(waiting) = asset.get("waiting_for_go_live").and_then(Value::as_bool) else {
            return Err(format!("element {i}: waiting_for_go_live is not a boolean"));
        };
        if waiting {
            let expiry = asset.get("asset_expiry_date").and_then(Value::as_str);
            if expiry.is_none_or(str::is_empty) {
                return Err(format!(
                    "element {i}: waiting_for_go_live is true but asset_expiry_date is unset"
                ));
            }
        }
    }
    Ok(())
}

/// When any asset carries an expiry date, at least one of those must be
/// past waiting (a live offer). Vacuously true with no expiring assets.
fn live_presence(payload: &Value) -> Result<(), String> {
    let assets = payload.as_array().ok_or("expected an array of assets")?;
    let expiring: Vec<_> = assets
        .iter()
        .filter(|a| {
            a.get("asset_expiry_date")
                .and_then(Value::as_str)
                .is_some_and(|s| !s.is_empty())
        })
        .collect();
    if expiring.is_empty() {
        return Ok(());
    }
    let any_live = expiring.iter().any(|a| {
        a.get("waiting_for_go_live")
            .and_then(Value::as_bool)
            .is_some_and(|w| !w)
    });
    if any_live {
        Ok(())
    } else {
        Err("every asset with an expiry date is still waiting for go-live".to_string())
    }
}
