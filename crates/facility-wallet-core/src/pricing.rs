//! Analysis pricing.
//!
//! Prices live in stored [`PricingConfig`] rows. When a type has no active row
//! the [`PriceDefaults`] apply, which match the seeded values.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};
use crate::money::Amount;

/// Kinds of paid analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Signal-based interpretation.
    Standard,
    /// Interpretation of a scanned or photographed tracing.
    Image,
}

impl AnalysisType {
    /// All analysis types.
    pub const ALL: [Self; 2] = [Self::Standard, Self::Image];

    /// Stable lowercase name used in storage and APIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Image => "image",
        }
    }

    /// Resolve a caller-supplied name, treating anything unrecognised as
    /// [`AnalysisType::Standard`].
    #[must_use]
    pub fn resolve(name: &str) -> Self {
        name.trim()
            .to_ascii_lowercase()
            .parse()
            .unwrap_or(Self::Standard)
    }
}

impl std::fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(Self::Standard),
            "image" => Ok(Self::Image),
            other => Err(WalletError::Validation(format!("unknown analysis type: {other}"))),
        }
    }
}

/// A stored price for one analysis type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// The analysis type.
    pub analysis_type: AnalysisType,

    /// Price charged per analysis.
    pub price_per_analysis: Decimal,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Inactive rows are ignored by price resolution.
    pub active: bool,

    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl PricingConfig {
    /// A new active price.
    #[must_use]
    pub fn new(analysis_type: AnalysisType, price: Amount, currency: impl Into<String>) -> Self {
        Self {
            analysis_type,
            price_per_analysis: price.value(),
            currency: currency.into(),
            active: true,
            updated_at: Utc::now(),
        }
    }
}

/// Fallback prices used when no active row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceDefaults {
    /// Standard analysis price.
    pub standard: Decimal,
    /// Image analysis price.
    pub image: Decimal,
    /// Currency of both prices.
    pub currency: String,
}

impl Default for PriceDefaults {
    fn default() -> Self {
        Self {
            standard: Decimal::new(500, 2),
            image: Decimal::new(1000, 2),
            currency: "GHS".to_string(),
        }
    }
}

impl PriceDefaults {
    /// The fallback price for a type.
    #[must_use]
    pub const fn price_for(&self, analysis_type: AnalysisType) -> Decimal {
        match analysis_type {
            AnalysisType::Standard => self.standard,
            AnalysisType::Image => self.image,
        }
    }
}

/// Where a resolved price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// An active stored row.
    Configured,
    /// The fallback defaults.
    Default,
}

/// The effective price of an analysis type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// The analysis type.
    pub analysis_type: AnalysisType,
    /// Amount charged.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Whether the price came from storage or the defaults.
    pub source: PriceSource,
}

impl Price {
    /// Pick the effective price from an optional stored row.
    ///
    /// A row priced in a currency other than the defaults' is ignored.
    #[must_use]
    pub fn resolve(
        analysis_type: AnalysisType,
        stored: Option<&PricingConfig>,
        defaults: &PriceDefaults,
    ) -> Self {
        match stored {
            Some(row)
                if row.active && row.currency.eq_ignore_ascii_case(&defaults.currency) =>
            {
                Self {
                    analysis_type,
                    amount: row.price_per_analysis,
                    currency: row.currency.clone(),
                    source: PriceSource::Configured,
                }
            }
            Some(_) | None => Self {
                analysis_type,
                amount: defaults.price_for(analysis_type),
                currency: defaults.currency.clone(),
                source: PriceSource::Default,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn unknown_types_resolve_to_standard() {
        assert_eq!(AnalysisType::resolve("image"), AnalysisType::Image);
        assert_eq!(AnalysisType::resolve(" IMAGE "), AnalysisType::Image);
        assert_eq!(AnalysisType::resolve("unknown-type"), AnalysisType::Standard);
        assert_eq!(AnalysisType::resolve(""), AnalysisType::Standard);
    }

    #[test]
    fn strict_parse_rejects_unknown_types() {
        assert!("holter".parse::<AnalysisType>().is_err());
    }

    #[test]
    fn defaults_match_seeded_prices() {
        let defaults = PriceDefaults::default();
        assert_eq!(defaults.price_for(AnalysisType::Standard), dec!(5.00));
        assert_eq!(defaults.price_for(AnalysisType::Image), dec!(10.00));
    }

    #[test]
    fn active_row_wins_over_defaults() {
        let defaults = PriceDefaults::default();
        let row = PricingConfig::new(AnalysisType::Image, Amount::new(dec!(12.5)).unwrap(), "GHS");

        let price = Price::resolve(AnalysisType::Image, Some(&row), &defaults);
        assert_eq!(price.amount, dec!(12.5));
        assert_eq!(price.source, PriceSource::Configured);
    }

    #[test]
    fn row_in_other_currency_falls_back() {
        let defaults = PriceDefaults {
            currency: "NGN".to_string(),
            ..PriceDefaults::default()
        };
        let row = PricingConfig::new(AnalysisType::Standard, Amount::new(dec!(5)).unwrap(), "GHS");

        let price = Price::resolve(AnalysisType::Standard, Some(&row), &defaults);
        assert_eq!(price.currency, "NGN");
        assert_eq!(price.source, PriceSource::Default);
    }

    #[test]
    fn inactive_row_falls_back() {
        let defaults = PriceDefaults::default();
        let mut row = PricingConfig::new(AnalysisType::Image, Amount::new(dec!(12.5)).unwrap(), "GHS");
        row.active = false;

        let price = Price::resolve(AnalysisType::Image, Some(&row), &defaults);
        assert_eq!(price.amount, dec!(10.00));
        assert_eq!(price.source, PriceSource::Default);
    }
}
