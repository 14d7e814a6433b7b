//! Admin dashboard probe.
//!
//! Logs the admin in and walks the dashboard listings. Each listing must
//! come back authorized and array-shaped; non-empty listings must carry
//! an `id` and their domain keys.

use super::ROLE_ADMIN;
use crate::checks::{BodyCheck, Envelope};
use crate::scenario::{HttpStep, Scenario, Step};

pub fn admin_dashboard() -> Scenario {
    Scenario::new(
        "admin-dashboard",
        "Admin login and dashboard listings (offer-requests, assets, users, campaigns)",
    )
    .requires_role(ROLE_ADMIN)
    .critical_step("admin login")
    .critical_step("admin offer-requests")
    .step(Step::login(ROLE_ADMIN))
    .step(Step::http(
        "admin offer-requests",
        HttpStep::get("admin/offer-requests")
            .as_role(ROLE_ADMIN)
            .envelope(Envelope::Array)
            .check(BodyCheck::ElementsHaveKeys(vec!["id", "status"])),
    ))
    .step(Step::http(
        "admin assets",
        HttpStep::get("admin/assets")
            .as_role(ROLE_ADMIN)
            .envelope(Envelope::Array)
            .check(BodyCheck::ElementsHaveKeys(vec!["id", "name"])),
    ))
    .step(Step::http(
        "admin users",
        HttpStep::get("admin/users")
            .as_role(ROLE_ADMIN)
            .envelope(Envelope::Array)
            .check(BodyCheck::ElementsHaveKeys(vec!["id", "email", "role"])),
    ))
    .step(Step::http(
        "admin campaigns",
        HttpStep::get("admin/campaigns")
            .as_role(ROLE_ADMIN)
            .envelope(Envelope::Array)
            .check(BodyCheck::ElementsHaveKeys(vec!["id", "status"])),
    ))
}
