//! Error taxonomy for wallet operations.

use rust_decimal::Decimal;

use crate::ids::IdError;
use crate::topup::TopUpStatus;

/// Result type for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;

/// Errors returned by the public wallet, ledger, pricing and top-up operations.
///
/// Lower layers (storage, payment gateway) translate their failures into one of
/// these variants before returning.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WalletError {
    /// Malformed or out-of-bounds input. Nothing was persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The wallet cannot cover the requested debit.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Balance at the time of the check.
        balance: Decimal,
        /// Amount that was requested.
        required: Decimal,
    },

    /// A wallet, top-up or reference does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The top-up already left the state the operation requires.
    #[error("top-up {top_up_id} is already {status}")]
    AlreadyTerminal {
        /// The top-up identifier.
        top_up_id: String,
        /// Its current status.
        status: TopUpStatus,
    },

    /// The payment gateway definitively rejected the request.
    #[error("payment gateway rejected the request: {0}")]
    Gateway(String),

    /// The payment gateway could not be reached or failed transiently.
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The storage transaction failed and was rolled back.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl WalletError {
    /// Shorthand for a [`WalletError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<IdError> for WalletError {
    fn from(err: IdError) -> Self {
        Self::Validation(err.to_string())
    }
}
