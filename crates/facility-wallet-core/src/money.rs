//! Monetary amounts.
//!
//! Balances and amounts are fixed-point decimals with at most two fractional
//! digits. Gateways exchange amounts in minor units (pesewas, cents), so
//! conversions in both directions are exact.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};

/// Number of fractional digits a monetary value may carry.
pub const MONEY_SCALE: u32 = 2;

/// A strictly positive monetary amount with at most [`MONEY_SCALE`] decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Validate and wrap a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Validation`] if the value is zero, negative, or
    /// has more than two fractional digits.
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(WalletError::Validation(format!(
                "amount must be positive, got {value}"
            )));
        }
        let normalized = value.normalize();
        if normalized.scale() > MONEY_SCALE {
            return Err(WalletError::Validation(format!(
                "amount {value} has more than {MONEY_SCALE} decimal places"
            )));
        }
        Ok(Self(normalized))
    }

    /// Build an amount from integer minor units (e.g. pesewas).
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Validation`] if `minor` is not positive.
    pub fn from_minor_units(minor: i64) -> Result<Self> {
        Self::new(Decimal::new(minor, MONEY_SCALE))
    }

    /// The decimal value.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// The value in integer minor units, if it fits in an `i64`.
    #[must_use]
    pub fn to_minor_units(&self) -> Option<i64> {
        (self.0 * Decimal::ONE_HUNDRED).to_i64()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = WalletError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn positive_amounts_are_accepted() {
        assert_eq!(Amount::new(dec!(10)).unwrap().value(), dec!(10));
        assert_eq!(Amount::new(dec!(0.01)).unwrap().value(), dec!(0.01));
        // Trailing zeros beyond the money scale are harmless.
        assert_eq!(Amount::new(dec!(5.000)).unwrap().value(), dec!(5));
    }

    #[test]
    fn zero_and_negative_amounts_are_rejected() {
        assert!(matches!(Amount::new(dec!(0)), Err(WalletError::Validation(_))));
        assert!(matches!(Amount::new(dec!(-1)), Err(WalletError::Validation(_))));
    }

    #[test]
    fn sub_minor_unit_precision_is_rejected() {
        assert!(matches!(
            Amount::new(dec!(1.005)),
            Err(WalletError::Validation(_))
        ));
    }

    #[test]
    fn minor_unit_conversions() {
        let amount = Amount::from_minor_units(10_050).unwrap();
        assert_eq!(amount.value(), dec!(100.50));
        assert_eq!(amount.to_minor_units(), Some(10_050));
        assert_eq!(amount.to_string(), "100.50");
    }

    #[test]
    fn deserialization_validates() {
        let ok: Amount = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(ok.value(), dec!(12.5));
        assert!(serde_json::from_str::<Amount>("\"-3\"").is_err());
    }
}
