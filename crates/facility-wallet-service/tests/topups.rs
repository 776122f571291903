//! Top-up integration tests against a mocked Paystack API.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, ADMIN_KEY};
use serde_json::json;

// ============================================================================
// Initialization
// ============================================================================

#[tokio::test]
async fn top_up_requires_payment_gateway() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/topups")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "amount": "50.00", "email": "billing@clinic.example" }))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let list: serde_json::Value = harness
        .server
        .get("/v1/topups")
        .add_header("authorization", harness.auth_header())
        .await
        .json();
    assert!(list["top_ups"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn top_up_amount_bounds_are_enforced() {
    let harness = TestHarness::with_paystack().await;

    let below = harness
        .server
        .post("/v1/topups")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "amount": "4.99", "email": "billing@clinic.example" }))
        .await;
    below.assert_status(StatusCode::BAD_REQUEST);

    let above = harness
        .server
        .post("/v1/topups")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "amount": "10000.01", "email": "billing@clinic.example" }))
        .await;
    above.assert_status(StatusCode::BAD_REQUEST);

    let minimum = harness
        .server
        .post("/v1/topups")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "amount": "5.00", "email": "billing@clinic.example" }))
        .await;
    minimum.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn top_up_rejects_bad_email_and_currency() {
    let harness = TestHarness::with_paystack().await;

    harness
        .server
        .post("/v1/topups")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "amount": "50.00", "email": "not-an-email" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    harness
        .server
        .post("/v1/topups")
        .add_header("authorization", harness.auth_header())
        .json(&json!({
            "amount": "50.00",
            "currency": "USD",
            "email": "billing@clinic.example"
        }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn top_up_returns_checkout_session() {
    let harness = TestHarness::with_paystack().await;

    let response = harness
        .server
        .post("/v1/topups")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "amount": "100.00", "email": "billing@clinic.example" }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(
        body["authorization_url"],
        "https://checkout.paystack.com/test"
    );
    assert_eq!(body["top_up"]["status"], "pending");
    assert_eq!(body["top_up"]["amount_requested"], "100.00");
    assert_eq!(body["top_up"]["attempts"], 1);
    assert!(body["top_up"]["reference"].as_str().unwrap().len() > 8);

    // Nothing is credited until the payment is verified.
    assert_eq!(harness.balance().await, "0.00");
}

// ============================================================================
// Verification
// ============================================================================

#[tokio::test]
async fn verified_top_up_credits_wallet_once() {
    let harness = TestHarness::with_paystack().await;
    let (reference, top_up_id) = harness.start_top_up("100.00").await;
    harness.paystack_reports(&reference, "success", 10_000).await;

    for _ in 0..2 {
        let response = harness
            .server
            .post("/v1/topups/verify")
            .add_header("authorization", harness.auth_header())
            .json(&json!({ "reference": reference }))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["id"], top_up_id);
        assert_eq!(body["status"], "verified");
        assert_eq!(body["amount_received"], "100.00");
    }

    assert_eq!(harness.balance().await, "100.00");

    let history: serde_json::Value = harness
        .server
        .get("/v1/wallet/transactions")
        .add_header("authorization", harness.auth_header())
        .await
        .json();
    let entries = history["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["entry_type"], "topup");
    assert_eq!(entries[0]["reference_id"], top_up_id);
}

#[tokio::test]
async fn pending_payment_leaves_top_up_pending() {
    let harness = TestHarness::with_paystack().await;
    let (reference, _) = harness.start_top_up("20.00").await;
    harness.paystack_reports(&reference, "ongoing", 2_000).await;

    let response = harness
        .server
        .post("/v1/topups/verify")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "reference": reference }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "pending");
    assert_eq!(harness.balance().await, "0.00");
}

#[tokio::test]
async fn failed_payment_marks_top_up_failed() {
    let harness = TestHarness::with_paystack().await;
    let (reference, _) = harness.start_top_up("20.00").await;
    harness.paystack_reports(&reference, "failed", 2_000).await;

    let response = harness
        .server
        .post("/v1/topups/verify")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "reference": reference }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "failed");
    assert_eq!(body["failure_reason"], "Declined");
    assert_eq!(harness.balance().await, "0.00");
}

#[tokio::test]
async fn verify_unknown_reference_is_not_found() {
    let harness = TestHarness::with_paystack().await;

    let response = harness
        .server
        .post("/v1/topups/verify")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "reference": "TOPUP-DOES-NOT-EXIST" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_facility_cannot_see_top_up() {
    let harness = TestHarness::with_paystack().await;
    let (reference, top_up_id) = harness.start_top_up("20.00").await;

    harness
        .server
        .get(&format!("/v1/topups/{top_up_id}"))
        .add_header("authorization", TestHarness::other_facility_auth_header())
        .await
        .assert_status(StatusCode::NOT_FOUND);

    harness
        .server
        .post("/v1/topups/verify")
        .add_header("authorization", TestHarness::other_facility_auth_header())
        .json(&json!({ "reference": reference }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// ============================================================================
// Cancel and retry
// ============================================================================

#[tokio::test]
async fn cancelled_top_up_cannot_be_verified() {
    let harness = TestHarness::with_paystack().await;
    let (reference, top_up_id) = harness.start_top_up("20.00").await;

    let cancel = harness
        .server
        .post(&format!("/v1/topups/{top_up_id}/cancel"))
        .add_header("authorization", harness.auth_header())
        .await;
    cancel.assert_status_ok();
    let body: serde_json::Value = cancel.json();
    assert_eq!(body["status"], "cancelled");

    harness.paystack_reports(&reference, "success", 2_000).await;
    harness
        .server
        .post("/v1/topups/verify")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "reference": reference }))
        .await
        .assert_status(StatusCode::CONFLICT);

    assert_eq!(harness.balance().await, "0.00");
}

#[tokio::test]
async fn retry_after_failure_issues_new_reference() {
    let harness = TestHarness::with_paystack().await;
    let (reference, top_up_id) = harness.start_top_up("30.00").await;
    harness.paystack_reports(&reference, "failed", 3_000).await;
    harness
        .server
        .post("/v1/topups/verify")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "reference": reference }))
        .await
        .assert_status_ok();

    let retry = harness
        .server
        .post(&format!("/v1/topups/{top_up_id}/retry"))
        .add_header("authorization", harness.auth_header())
        .await;

    retry.assert_status_ok();
    let body: serde_json::Value = retry.json();
    let new_reference = body["top_up"]["reference"].as_str().unwrap().to_string();
    assert_ne!(new_reference, reference);
    assert_eq!(body["top_up"]["status"], "pending");
    assert_eq!(body["top_up"]["attempts"], 2);

    harness.paystack_reports(&new_reference, "success", 3_000).await;
    let verified: serde_json::Value = harness
        .server
        .post("/v1/topups/verify")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "reference": new_reference }))
        .await
        .json();
    assert_eq!(verified["status"], "verified");
    assert_eq!(harness.balance().await, "30.00");
}

#[tokio::test]
async fn top_ups_are_listed_newest_first() {
    let harness = TestHarness::with_paystack().await;
    let (_, first) = harness.start_top_up("10.00").await;
    // Ids order by creation millisecond.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (_, second) = harness.start_top_up("20.00").await;

    let response = harness
        .server
        .get("/v1/topups")
        .add_header("authorization", harness.auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let top_ups = body["top_ups"].as_array().unwrap();
    assert_eq!(top_ups.len(), 2);
    assert_eq!(top_ups[0]["id"], second);
    assert_eq!(top_ups[1]["id"], first);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn admin_can_mark_top_up_failed() {
    let harness = TestHarness::with_paystack().await;
    let (reference, _) = harness.start_top_up("20.00").await;

    let response = harness
        .server
        .post(&format!("/v1/admin/topups/{reference}/fail"))
        .add_header("x-admin-key", ADMIN_KEY)
        .json(&json!({ "reason": "payer disputed" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "failed");
    assert_eq!(body["failure_reason"], "payer disputed");

    harness
        .server
        .post("/v1/topups/verify")
        .add_header("authorization", harness.auth_header())
        .json(&json!({ "reference": reference }))
        .await
        .assert_status(StatusCode::CONFLICT);
}
