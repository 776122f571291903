//! Paystack webhook integration tests.

mod common;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum_test::TestResponse;
use common::{TestHarness, ADMIN_KEY};
use serde_json::json;

fn charge_event(event: &str, reference: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": event,
        "data": {
            "reference": reference,
            // Webhook amounts are never trusted; verification decides.
            "amount": 99_999_999,
            "currency": "GHS",
            "status": "success"
        }
    }))
    .unwrap()
}

async fn deliver(
    harness: &TestHarness,
    payload: Vec<u8>,
    signature: Option<String>,
) -> TestResponse {
    let mut request = harness
        .server
        .post("/webhooks/paystack")
        .content_type("application/json");
    if let Some(signature) = signature {
        request = request.add_header("x-paystack-signature", signature);
    }
    request.bytes(Bytes::from(payload)).await
}

// ============================================================================
// Signature verification
// ============================================================================

#[tokio::test]
async fn webhook_rejects_missing_signature() {
    let harness = TestHarness::with_paystack().await;
    let (reference, _) = harness.start_top_up("50.00").await;
    harness.paystack_reports(&reference, "success", 5_000).await;

    let response = deliver(&harness, charge_event("charge.success", &reference), None).await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(harness.balance().await, "0.00");
}

#[tokio::test]
async fn webhook_rejects_bad_signature() {
    let harness = TestHarness::with_paystack().await;
    let (reference, _) = harness.start_top_up("50.00").await;
    harness.paystack_reports(&reference, "success", 5_000).await;

    let payload = charge_event("charge.success", &reference);
    let forged = TestHarness::sign(b"some other body");
    let response = deliver(&harness, payload, Some(forged)).await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(harness.balance().await, "0.00");
}

#[tokio::test]
async fn webhook_without_gateway_is_unavailable() {
    let harness = TestHarness::new();
    let payload = charge_event("charge.success", "TOPUP-ANY");
    let signature = TestHarness::sign(&payload);

    let response = deliver(&harness, payload, Some(signature)).await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// Event handling
// ============================================================================

#[tokio::test]
async fn charge_success_credits_verified_amount_once() {
    let harness = TestHarness::with_paystack().await;
    let (reference, top_up_id) = harness.start_top_up("50.00").await;
    harness.paystack_reports(&reference, "success", 5_000).await;

    for _ in 0..2 {
        let payload = charge_event("charge.success", &reference);
        let signature = TestHarness::sign(&payload);
        let response = deliver(&harness, payload, Some(signature)).await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["received"], true);
    }

    assert_eq!(harness.balance().await, "50.00");

    let top_up: serde_json::Value = harness
        .server
        .get(&format!("/v1/topups/{top_up_id}"))
        .add_header("authorization", harness.auth_header())
        .await
        .json();
    assert_eq!(top_up["status"], "verified");
}

#[tokio::test]
async fn webhook_for_unknown_reference_is_acknowledged() {
    let harness = TestHarness::with_paystack().await;
    let payload = charge_event("charge.success", "TOPUP-UNKNOWN");
    let signature = TestHarness::sign(&payload);

    let response = deliver(&harness, payload, Some(signature)).await;

    response.assert_status_ok();
}

#[tokio::test]
async fn non_charge_events_are_acknowledged() {
    let harness = TestHarness::with_paystack().await;
    let (reference, _) = harness.start_top_up("50.00").await;
    let payload = charge_event("transfer.success", &reference);
    let signature = TestHarness::sign(&payload);

    let response = deliver(&harness, payload, Some(signature)).await;

    response.assert_status_ok();
    assert_eq!(harness.balance().await, "0.00");
}

#[tokio::test]
async fn webhook_for_cancelled_top_up_is_acknowledged() {
    let harness = TestHarness::with_paystack().await;
    let (reference, top_up_id) = harness.start_top_up("50.00").await;
    harness
        .server
        .post(&format!("/v1/topups/{top_up_id}/cancel"))
        .add_header("authorization", harness.auth_header())
        .await
        .assert_status_ok();
    harness.paystack_reports(&reference, "success", 5_000).await;

    let payload = charge_event("charge.success", &reference);
    let signature = TestHarness::sign(&payload);
    let response = deliver(&harness, payload, Some(signature)).await;

    response.assert_status_ok();
    assert_eq!(harness.balance().await, "0.00");
}

#[tokio::test]
async fn webhook_for_failed_top_up_is_acknowledged_without_credit() {
    let harness = TestHarness::with_paystack().await;
    let (reference, _) = harness.start_top_up("50.00").await;
    harness
        .server
        .post(&format!("/v1/admin/topups/{reference}/fail"))
        .add_header("x-admin-key", ADMIN_KEY)
        .json(&json!({ "reason": "payer disputed" }))
        .await
        .assert_status_ok();
    harness.paystack_reports(&reference, "success", 5_000).await;

    let payload = charge_event("charge.success", &reference);
    let signature = TestHarness::sign(&payload);
    let response = deliver(&harness, payload, Some(signature)).await;

    response.assert_status_ok();
    assert_eq!(harness.balance().await, "0.00");
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let harness = TestHarness::with_paystack().await;
    let payload = b"{not json".to_vec();
    let signature = TestHarness::sign(&payload);

    let response = deliver(&harness, payload, Some(signature)).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}
