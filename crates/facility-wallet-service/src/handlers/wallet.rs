//! Wallet balance, history and charge handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use facility_wallet_core::{LedgerQuery, DEFAULT_PAGE_SIZE};

use super::{money, EntryResponse, PriceResponse};
use crate::auth::AuthFacility;
use crate::error::ApiError;
use crate::state::AppState;

/// Wallet response.
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    /// Wallet ID.
    pub id: String,
    /// Owning facility.
    pub facility_id: String,
    /// Current balance.
    pub balance: String,
    /// Currency.
    pub currency: String,
    /// Number of ledger entries.
    pub entry_count: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Get the facility's wallet, creating it on first access.
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    auth: AuthFacility,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state.wallets.ensure_wallet(auth.facility_id).await?;

    Ok(Json(WalletResponse {
        id: wallet.id.to_string(),
        facility_id: wallet.facility_id.to_string(),
        balance: money(wallet.balance),
        currency: wallet.currency,
        entry_count: wallet.entry_count,
        created_at: wallet.created_at,
        updated_at: wallet.updated_at,
    }))
}

/// Balance response.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// Current balance.
    pub balance: String,
    /// Currency.
    pub currency: String,
}

/// Get the current balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthFacility,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.wallets.get_balance(auth.facility_id).await?;

    Ok(Json(BalanceResponse {
        balance: money(balance),
        currency: state.wallets.currency().to_string(),
    }))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of entries to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
    /// Only entries created at or after this instant (RFC 3339).
    pub from: Option<DateTime<Utc>>,
    /// Only entries created at or before this instant (RFC 3339).
    pub to: Option<DateTime<Utc>>,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

/// List transactions response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListTransactionsResponse {
    /// Entries, newest first.
    pub entries: Vec<EntryResponse>,
    /// Page size that was applied.
    pub limit: usize,
    /// Offset that was applied.
    pub offset: usize,
}

/// List ledger entries.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthFacility,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let ledger_query = LedgerQuery {
        from: query.from,
        to: query.to,
        limit: query.limit,
        offset: query.offset,
    };
    let limit = ledger_query.clone().validated()?.limit;

    let entries = state
        .wallets
        .list_entries(auth.facility_id, ledger_query)
        .await?;

    Ok(Json(ListTransactionsResponse {
        entries: entries.into_iter().map(EntryResponse::from).collect(),
        limit,
        offset: query.offset,
    }))
}

/// Charge request.
#[derive(Debug, Deserialize)]
pub struct ChargeRequest {
    /// Analysis type (`standard` or `image`; anything else is priced as standard).
    pub analysis_type: String,
    /// The analysis being paid for.
    #[serde(default)]
    pub analysis_id: Option<String>,
}

/// Charge response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChargeResponse {
    /// The price applied.
    pub price: PriceResponse,
    /// The deduction entry.
    pub entry: EntryResponse,
}

/// Charge the wallet for an analysis.
pub async fn charge_analysis(
    State(state): State<Arc<AppState>>,
    auth: AuthFacility,
    Json(request): Json<ChargeRequest>,
) -> Result<(StatusCode, Json<ChargeResponse>), ApiError> {
    let charge = state
        .wallets
        .charge_analysis(auth.facility_id, &request.analysis_type, request.analysis_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ChargeResponse {
            price: charge.price.into(),
            entry: charge.entry.into(),
        }),
    ))
}
