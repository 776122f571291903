//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, health, pricing, topups, wallet, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for facility API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for admin endpoints.
const ADMIN_MAX_CONCURRENT_REQUESTS: usize = 10;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/pricing` - Effective prices
/// - `GET /v1/pricing/:analysis_type` - Price of one analysis type
///
/// ## Wallet (JWT auth)
/// - `GET /v1/wallet` - Wallet details
/// - `GET /v1/wallet/balance` - Current balance
/// - `GET /v1/wallet/transactions` - Ledger history
/// - `POST /v1/wallet/charges` - Pay for an analysis
///
/// ## Top-ups (JWT auth)
/// - `POST /v1/topups` - Start a top-up
/// - `GET /v1/topups` - List top-ups
/// - `GET /v1/topups/:id` - Get a top-up
/// - `POST /v1/topups/verify` - Verify a top-up by reference
/// - `POST /v1/topups/:id/cancel` - Cancel a pending top-up
/// - `POST /v1/topups/:id/retry` - New payment session
///
/// ## Admin (`X-Admin-Key`)
/// - `PUT /v1/admin/pricing` - Set a price
/// - `POST /v1/admin/wallets/:facility_id/credits` - Refund or adjustment
/// - `GET /v1/admin/wallets/:facility_id/reconcile` - Ledger replay
/// - `POST /v1/admin/topups/:reference/fail` - Mark a top-up failed
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/paystack` - Paystack events
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let admin_routes = Router::new()
        .route("/pricing", put(admin::set_price))
        .route("/wallets/:facility_id/credits", post(admin::credit_wallet))
        .route("/wallets/:facility_id/reconcile", get(admin::reconcile_wallet))
        .route("/topups/:reference/fail", post(admin::mark_top_up_failed))
        .layer(ConcurrencyLimitLayer::new(ADMIN_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Wallet
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/balance", get(wallet::get_balance))
        .route("/wallet/transactions", get(wallet::list_transactions))
        .route("/wallet/charges", post(wallet::charge_analysis))
        // Pricing
        .route("/pricing", get(pricing::list_prices))
        .route("/pricing/:analysis_type", get(pricing::get_price))
        // Top-ups
        .route("/topups", post(topups::create_top_up).get(topups::list_top_ups))
        .route("/topups/verify", post(topups::verify_top_up))
        .route("/topups/:id", get(topups::get_top_up))
        .route("/topups/:id/cancel", post(topups::cancel_top_up))
        .route("/topups/:id/retry", post(topups::retry_top_up))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .nest("/admin", admin_routes);

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - Paystack retries on failure)
        .route("/webhooks/paystack", post(webhooks::paystack_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
