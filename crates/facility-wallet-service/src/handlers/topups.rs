//! Top-up handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use facility_wallet_core::{TopUpId, WalletError};

use super::{PageQuery, TopUpResponse, TopUpSessionResponse};
use crate::auth::AuthFacility;
use crate::error::ApiError;
use crate::state::AppState;

/// Create top-up request.
#[derive(Debug, Deserialize)]
pub struct CreateTopUpRequest {
    /// Amount to add, e.g. `"100.00"`.
    pub amount: Decimal,
    /// Currency (defaults to the service currency).
    #[serde(default)]
    pub currency: Option<String>,
    /// Payer email for the gateway receipt.
    pub email: String,
}

/// Start a top-up and return the checkout URL.
pub async fn create_top_up(
    State(state): State<Arc<AppState>>,
    auth: AuthFacility,
    Json(request): Json<CreateTopUpRequest>,
) -> Result<(StatusCode, Json<TopUpSessionResponse>), ApiError> {
    let currency = request
        .currency
        .unwrap_or_else(|| state.config.currency.clone());

    let session = state
        .topups
        .initialize(auth.facility_id, request.amount, &currency, &request.email)
        .await?;

    Ok((StatusCode::CREATED, Json(session.into())))
}

/// List top-ups response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListTopUpsResponse {
    /// Top-ups, newest first.
    pub top_ups: Vec<TopUpResponse>,
}

/// List the facility's top-ups.
pub async fn list_top_ups(
    State(state): State<Arc<AppState>>,
    auth: AuthFacility,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListTopUpsResponse>, ApiError> {
    let top_ups = state
        .topups
        .list(auth.facility_id, query.limit(), query.offset())
        .await?;

    Ok(Json(ListTopUpsResponse {
        top_ups: top_ups.into_iter().map(TopUpResponse::from).collect(),
    }))
}

fn parse_top_up_id(raw: &str) -> Result<TopUpId, ApiError> {
    raw.parse::<TopUpId>()
        .map_err(|e| WalletError::from(e).into())
}

/// Get one top-up.
pub async fn get_top_up(
    State(state): State<Arc<AppState>>,
    auth: AuthFacility,
    Path(top_up_id): Path<String>,
) -> Result<Json<TopUpResponse>, ApiError> {
    let top_up_id = parse_top_up_id(&top_up_id)?;
    let top_up = state
        .topups
        .get(top_up_id, Some(auth.facility_id))
        .await?;
    Ok(Json(top_up.into()))
}

/// Verify top-up request.
#[derive(Debug, Deserialize)]
pub struct VerifyTopUpRequest {
    /// Gateway reference returned when the top-up was created.
    pub reference: String,
}

/// Confirm a top-up with the gateway. Safe to call repeatedly.
pub async fn verify_top_up(
    State(state): State<Arc<AppState>>,
    auth: AuthFacility,
    Json(request): Json<VerifyTopUpRequest>,
) -> Result<Json<TopUpResponse>, ApiError> {
    let top_up = state
        .topups
        .verify(request.reference.trim(), Some(auth.facility_id))
        .await?;
    Ok(Json(top_up.into()))
}

/// Cancel a pending top-up.
pub async fn cancel_top_up(
    State(state): State<Arc<AppState>>,
    auth: AuthFacility,
    Path(top_up_id): Path<String>,
) -> Result<Json<TopUpResponse>, ApiError> {
    let top_up_id = parse_top_up_id(&top_up_id)?;
    let top_up = state
        .topups
        .cancel(top_up_id, Some(auth.facility_id))
        .await?;
    Ok(Json(top_up.into()))
}

/// Open a new payment session for a pending or failed top-up.
pub async fn retry_top_up(
    State(state): State<Arc<AppState>>,
    auth: AuthFacility,
    Path(top_up_id): Path<String>,
) -> Result<Json<TopUpSessionResponse>, ApiError> {
    let top_up_id = parse_top_up_id(&top_up_id)?;
    let session = state
        .topups
        .retry(top_up_id, Some(auth.facility_id))
        .await?;
    Ok(Json(session.into()))
}
