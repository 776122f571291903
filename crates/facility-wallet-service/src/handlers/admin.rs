//! Admin handlers: pricing, manual credits, reconciliation and failure marking.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use facility_wallet_core::{
    Amount, AnalysisType, CreditKind, FacilityId, Metadata, WalletError,
};

use super::{money, EntryResponse, TopUpResponse};
use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;
use crate::wallet::Reconciliation;

/// Set price request.
#[derive(Debug, Deserialize)]
pub struct SetPriceRequest {
    /// `standard` or `image`.
    pub analysis_type: String,
    /// Price per analysis.
    pub price: Decimal,
    /// Currency (defaults to the service currency).
    #[serde(default)]
    pub currency: Option<String>,
    /// Whether the row is used (default: true).
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Stored price response.
#[derive(Debug, Serialize, Deserialize)]
pub struct PricingConfigResponse {
    /// Analysis type.
    pub analysis_type: String,
    /// Price per analysis.
    pub price_per_analysis: String,
    /// Currency.
    pub currency: String,
    /// Whether the row is used.
    pub active: bool,
}

/// Insert or replace the price of an analysis type.
pub async fn set_price(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(request): Json<SetPriceRequest>,
) -> Result<Json<PricingConfigResponse>, ApiError> {
    let analysis_type: AnalysisType = request.analysis_type.parse()?;
    let price = Amount::new(request.price)?;
    let currency = request
        .currency
        .unwrap_or_else(|| state.config.currency.clone());

    let config = state
        .pricing
        .set_price(analysis_type, price, &currency, request.active)
        .await?;

    tracing::info!(admin_id = %admin.admin_id, analysis_type = %analysis_type, "Admin set price");

    Ok(Json(PricingConfigResponse {
        analysis_type: config.analysis_type.as_str().to_string(),
        price_per_analysis: money(config.price_per_analysis),
        currency: config.currency,
        active: config.active,
    }))
}

/// Manual credit request.
#[derive(Debug, Deserialize)]
pub struct AdminCreditRequest {
    /// Amount to credit.
    pub amount: Decimal,
    /// `refund` or `adjustment`.
    pub kind: CreditKind,
    /// Description shown in the ledger.
    pub description: String,
    /// Linked record, e.g. the refunded analysis.
    #[serde(default)]
    pub reference_id: Option<String>,
}

/// Credit a facility's wallet with a refund or adjustment.
pub async fn credit_wallet(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(facility_id): Path<String>,
    Json(request): Json<AdminCreditRequest>,
) -> Result<(StatusCode, Json<EntryResponse>), ApiError> {
    let facility_id: FacilityId = facility_id.parse().map_err(WalletError::from)?;

    if request.kind == CreditKind::Topup {
        return Err(ApiError::BadRequest(
            "top-up credits are only created by verified top-ups".into(),
        ));
    }
    let amount = Amount::new(request.amount)?;
    if request.description.trim().is_empty() {
        return Err(ApiError::BadRequest("description is required".into()));
    }

    let mut metadata = Metadata::new();
    metadata.insert("admin_id".to_string(), admin.admin_id.as_str().into());

    let entry = state
        .wallets
        .credit(
            facility_id,
            request.kind,
            amount,
            request.description.trim(),
            request.reference_id,
            metadata,
        )
        .await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        facility_id = %facility_id,
        amount = %amount,
        "Admin credited wallet"
    );

    Ok((StatusCode::CREATED, Json(entry.into())))
}

/// Replay a facility's ledger against its balance.
pub async fn reconcile_wallet(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(facility_id): Path<String>,
) -> Result<Json<Reconciliation>, ApiError> {
    let facility_id: FacilityId = facility_id.parse().map_err(WalletError::from)?;
    let report = state.wallets.reconcile(facility_id).await?;
    Ok(Json(report))
}

/// Mark failed request.
#[derive(Debug, Default, Deserialize)]
pub struct MarkFailedRequest {
    /// Why the top-up failed.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Mark a pending top-up failed.
pub async fn mark_top_up_failed(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(reference): Path<String>,
    Json(request): Json<MarkFailedRequest>,
) -> Result<Json<TopUpResponse>, ApiError> {
    let reason = request
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| format!("marked failed by {}", admin.admin_id));

    let top_up = state.topups.mark_failed(&reference, &reason).await?;
    Ok(Json(top_up.into()))
}
