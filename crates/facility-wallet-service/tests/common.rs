//! Common test utilities for facility-wallet integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use facility_wallet_core::FacilityId;
use facility_wallet_service::crypto::hmac_sha512_hex;
use facility_wallet_service::{create_router, AppState, ServiceConfig};
use facility_wallet_store::{RocksStore, Store};

/// Paystack secret key used by the harness.
pub const PAYSTACK_SECRET: &str = "sk_test_harness";

/// Admin key used by the harness.
pub const ADMIN_KEY: &str = "test-admin-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server.
    pub store: Arc<dyn Store>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test facility for authenticated requests.
    pub facility_id: FacilityId,
    /// Fake Paystack API, when payments are enabled.
    pub paystack: Option<MockServer>,
}

impl TestHarness {
    /// Create a harness without a payment gateway.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a harness whose Paystack client talks to a local mock server.
    pub async fn with_paystack() -> Self {
        let paystack = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/test",
                    "access_code": "test-access-code",
                    "reference": "echo"
                }
            })))
            .mount(&paystack)
            .await;
        Self::build(Some(paystack))
    }

    fn build(paystack: Option<MockServer>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store: Arc<dyn Store> =
            Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            auth_base_url: "http://localhost".into(),
            auth_audience: "facility-wallet".into(),
            admin_api_key: Some(ADMIN_KEY.to_string()),
            paystack_secret_key: paystack.as_ref().map(|_| PAYSTACK_SECRET.to_string()),
            paystack_base_url: paystack
                .as_ref()
                .map_or_else(|| "http://localhost:1".to_string(), MockServer::uri),
            ..ServiceConfig::default()
        };

        let state = AppState::new(store.clone(), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            _temp_dir: temp_dir,
            facility_id: FacilityId::generate(),
            paystack,
        }
    }

    /// Authorization header for the test facility.
    pub fn auth_header(&self) -> String {
        format!("Bearer test-token:{}", self.facility_id)
    }

    /// Authorization header for a different facility (for isolation tests).
    pub fn other_facility_auth_header() -> String {
        format!("Bearer test-token:{}", FacilityId::generate())
    }

    /// Credit the test facility through the admin endpoint.
    pub async fn fund(&self, amount: &str) {
        self.server
            .post(&format!("/v1/admin/wallets/{}/credits", self.facility_id))
            .add_header("x-admin-key", ADMIN_KEY)
            .json(&json!({
                "amount": amount,
                "kind": "adjustment",
                "description": "opening balance"
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    /// Start a top-up for the test facility and return its reference and id.
    pub async fn start_top_up(&self, amount: &str) -> (String, String) {
        let response = self
            .server
            .post("/v1/topups")
            .add_header("authorization", self.auth_header())
            .json(&json!({ "amount": amount, "email": "billing@clinic.example" }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        (
            body["top_up"]["reference"].as_str().unwrap().to_string(),
            body["top_up"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Make Paystack report a transaction outcome.
    pub async fn paystack_reports(&self, reference: &str, status: &str, amount_minor: i64) {
        let paystack = self.paystack.as_ref().expect("harness has no Paystack mock");
        let gateway_response = if status == "success" {
            "Approved"
        } else {
            "Declined"
        };
        Mock::given(method("GET"))
            .and(path(format!("/transaction/verify/{reference}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "status": status,
                    "reference": reference,
                    "amount": amount_minor,
                    "currency": "GHS",
                    "gateway_response": gateway_response
                }
            })))
            .mount(paystack)
            .await;
    }

    /// Sign a webhook payload the way Paystack does.
    pub fn sign(payload: &[u8]) -> String {
        hmac_sha512_hex(PAYSTACK_SECRET, payload).expect("HMAC accepts any key")
    }

    /// Current balance of the test facility as reported by the API.
    pub async fn balance(&self) -> String {
        let response = self
            .server
            .get("/v1/wallet/balance")
            .add_header("authorization", self.auth_header())
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["balance"].as_str().unwrap().to_string()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
