//! Analysis price resolution.

use std::sync::Arc;

use chrono::Utc;
use facility_wallet_core::{
    AnalysisType, Amount, Price, PriceDefaults, PriceSource, PricingConfig, Result, WalletError,
};
use facility_wallet_store::Store;

/// Resolves the current price of an analysis type.
///
/// The stored pricing table wins when it has an active row; otherwise the
/// configured defaults apply.
#[derive(Clone)]
pub struct PricingResolver {
    store: Arc<dyn Store>,
    defaults: PriceDefaults,
}

impl PricingResolver {
    /// Create a resolver over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, defaults: PriceDefaults) -> Self {
        Self { store, defaults }
    }

    /// Price of an analysis type given by name.
    ///
    /// Unknown names are priced as `standard`.
    pub async fn get_price(&self, analysis_type: &str) -> Result<Price> {
        let resolved = AnalysisType::resolve(analysis_type);
        if resolved.as_str() != analysis_type.trim().to_ascii_lowercase() {
            tracing::debug!(
                requested = %analysis_type,
                resolved = %resolved,
                "Unknown analysis type, using standard price"
            );
        }
        self.price_of(resolved).await
    }

    /// Price of a known analysis type.
    pub async fn price_of(&self, analysis_type: AnalysisType) -> Result<Price> {
        let stored = self.store.get_pricing(analysis_type).await?;
        if let Some(row) = stored
            .as_ref()
            .filter(|row| !row.currency.eq_ignore_ascii_case(&self.defaults.currency))
        {
            tracing::warn!(
                analysis_type = %analysis_type,
                row_currency = %row.currency,
                currency = %self.defaults.currency,
                "Stored price is in another currency, using default price"
            );
        }
        let price = Price::resolve(analysis_type, stored.as_ref(), &self.defaults);
        if price.source == PriceSource::Default {
            tracing::debug!(
                analysis_type = %analysis_type,
                amount = %price.amount,
                "No active pricing row, using default price"
            );
        }
        Ok(price)
    }

    /// Insert or replace the stored price of an analysis type.
    pub async fn set_price(
        &self,
        analysis_type: AnalysisType,
        amount: Amount,
        currency: &str,
        active: bool,
    ) -> Result<PricingConfig> {
        let currency = currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(WalletError::Validation(format!(
                "invalid currency code: {currency}"
            )));
        }
        if !currency.eq_ignore_ascii_case(&self.defaults.currency) {
            return Err(WalletError::Validation(format!(
                "prices must be in {}, got {currency}",
                self.defaults.currency
            )));
        }

        let config = PricingConfig {
            active,
            updated_at: Utc::now(),
            ..PricingConfig::new(analysis_type, amount, currency)
        };
        self.store.put_pricing(&config).await?;

        tracing::info!(
            analysis_type = %analysis_type,
            amount = %amount,
            currency = %config.currency,
            active = %active,
            "Pricing updated"
        );

        Ok(config)
    }

    /// The effective price of every analysis type.
    pub async fn list_prices(&self) -> Result<Vec<Price>> {
        let stored = self.store.list_pricing().await?;
        Ok(AnalysisType::ALL
            .iter()
            .map(|&analysis_type| {
                let row = stored.iter().find(|row| row.analysis_type == analysis_type);
                Price::resolve(analysis_type, row, &self.defaults)
            })
            .collect())
    }
}
