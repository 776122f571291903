//! Pricing handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::PriceResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// List prices response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListPricesResponse {
    /// Effective price of every analysis type.
    pub prices: Vec<PriceResponse>,
}

/// List the effective price of every analysis type.
pub async fn list_prices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListPricesResponse>, ApiError> {
    let prices = state.pricing.list_prices().await?;

    Ok(Json(ListPricesResponse {
        prices: prices.into_iter().map(PriceResponse::from).collect(),
    }))
}

/// Get the price of one analysis type. Unknown types get the standard price.
pub async fn get_price(
    State(state): State<Arc<AppState>>,
    Path(analysis_type): Path<String>,
) -> Result<Json<PriceResponse>, ApiError> {
    let price = state.pricing.get_price(&analysis_type).await?;
    Ok(Json(price.into()))
}
