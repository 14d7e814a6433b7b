//! Purchase-order upload round-trip.
//!
//! Creates an offer request, has the admin quote it, uploads a PDF
//! purchase order as multipart form data, and verifies the stored URL:
//! exactly one `.pdf` suffix, optionally hosted by the configured file
//! service, retrievable without authentication, and reflected back on the
//! offer in the admin listing.

use super::{ROLE_ADMIN, ROLE_BUYER};
use crate::checks::{BodyCheck, Envelope};
use crate::config::HarnessConfig;
use crate::fixtures::FixtureKind;
use crate::models::{Method, MultipartSpec};
use crate::scenario::{CleanupSpec, HttpStep, Scenario, Step};
use serde_json::{Value, json};

pub fn po_upload(config: &HarnessConfig) -> Scenario {
    let mut upload = HttpStep::post("offers/{offer_id}/upload-po")
        .as_role(ROLE_BUYER)
        .with_multipart(MultipartSpec {
            file_field: "file".to_string(),
            file_name: "purchase-order.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: minimal_pdf(),
            text_fields: vec![("uploaded_by".to_string(), ROLE_BUYER.to_string())],
        })
        .check(BodyCheck::FieldEquals("/status", json!("PO Uploaded")))
        .check(BodyCheck::FieldRegex("/po_url", r"\.pdf(\?.*)?$".to_string()))
        .check(BodyCheck::Custom {
            name: "po_url ends in exactly one .pdf",
            f: po_url_single_pdf,
        })
        .capture("po_url", "/po_url");
    if let Some(file_service) = &config.file_service {
        upload = upload
            .check(BodyCheck::FieldContains("/po_url", file_service.host.clone()))
            .check(BodyCheck::FieldContains("/po_url", file_service.folder.clone()));
    }

    Scenario::new(
        "po-upload",
        "Buyer uploads a PDF purchase order for a quoted offer; URL round-trips",
    )
    .requires_role(ROLE_BUYER)
    .requires_role(ROLE_ADMIN)
    .critical_step("upload purchase order")
    .critical_step("fetch uploaded pdf")
    .step(Step::login(ROLE_BUYER))
    .step(Step::login(ROLE_ADMIN))
    .step(super::ensure_asset_step())
    .step(Step::http(
        "create offer request",
        HttpStep::post("offers/requests")
            .as_role(ROLE_BUYER)
            .with_body(offer_body())
            .capture("offer_id", "/id")
            .register_cleanup(CleanupSpec {
                kind: FixtureKind::Offer,
                method: Method::Delete,
                endpoint: "admin/offer-requests/{offer_id}".to_string(),
                auth_role: ROLE_ADMIN.to_string(),
                expected_status: 200,
                id_var: "offer_id",
            }),
    ))
    .step(Step::http(
        "admin quotes offer",
        HttpStep::put("admin/offer-requests/{offer_id}/status")
            .as_role(ROLE_ADMIN)
            .with_body(json!({"status": "Quoted"})),
    ))
    .step(Step::http("upload purchase order", upload))
    .step(Step::http(
        "fetch uploaded pdf",
        HttpStep::get("{po_url}")
            .raw_body()
            .check(BodyCheck::FieldStartsWith("/raw_text", "%PDF".to_string())),
    ))
    .step(Step::http(
        "admin sees po on offer",
        HttpStep::get("admin/offer-requests")
            .as_role(ROLE_ADMIN)
            .envelope(Envelope::Array)
            .check(BodyCheck::ElementWhere {
                pointer: "/id",
                var: "offer_id",
                checks: vec![
                    BodyCheck::FieldMatchesVar("/po_document_url", "po_url"),
                    BodyCheck::FieldEquals("/po_uploaded_by", json!("buyer")),
                    BodyCheck::FieldPresent("/po_uploaded_at"),
                ],
            }),
    ))
    .step(Step::teardown("remove offer request"))
}

/// Offer request for the discovered asset.
fn offer_body() -> Value {
    json!({
        "asset_id": "{{asset_id}}",
        "campaign_name": "Harness PO round-trip",
        "contract_duration": "3_months",
        "estimated_budget": 15000,
        "service_bundles": {"printing": true, "setup": true, "monitoring": false},
        "timeline": "within_1_month",
        "special_requirements": "",
    })
}

/// The URL must end in `.pdf` with no second occurrence (a double
/// extension such as `.pdf.pdf` is the upload bug this guards against).
/// Query parameters are ignored.
fn po_url_single_pdf(body: &Value) -> Result<(), String> {
    let url = body
        .get("po_url")
        .and_then(Value::as_str)
        .ok_or("missing fields: [/po_url]")?;
    let path = url.split('?').next().unwrap_or(url);
    let occurrences = path.matches(".pdf").count();
    if !path.ends_with(".pdf") {
        return Err(format!("po_url {path:?} does not end in .pdf"));
    }
    if occurrences != 1 {
        return Err(format!(
            "po_url {path:?} contains .pdf {occurrences} times, expected exactly one"
        ));
    }
    Ok(())
}

/// The smallest well-formed PDF the upload endpoint accepts: header,
/// a one-page body, and a trailer. Viewers render it as a blank page.
fn minimal_pdf() -> Vec<u8> {
    let mut pdf = Vec::new();
    pdf.extend_from_slice(b"%PDF-1.4\n");
    pdf.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    pdf.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    pdf.extend_from_slice(
        b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >> endobj\n",
    );
    pdf.extend_from_slice(b"trailer << /Root 1 0 R >>\n%%EOF\n");
    pdf
}
