//! Payment gateway integration.
//!
//! The gateway:
//! - Opens payment sessions for top-ups
//! - Reports the confirmed amount of a transaction
//! - Signs webhook payloads

pub mod paystack;
pub mod types;

use async_trait::async_trait;
use facility_wallet_core::WalletError;

pub use paystack::PaystackClient;
pub use types::{ChargeRequest, ChargeSession, TransactionVerification, VerificationState};

/// Error type for gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Transport failure or timeout.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered and refused the request.
    #[error("gateway rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Gateway message.
        message: String,
    },

    /// The gateway failed on its side.
    #[error("gateway unavailable ({status}): {message}")]
    Unavailable {
        /// HTTP status code.
        status: u16,
        /// Gateway message.
        message: String,
    },

    /// The response could not be understood.
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Whether retrying the same request cannot succeed.
    #[must_use]
    pub const fn is_definitive(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Configuration(_))
    }
}

impl From<GatewayError> for WalletError {
    fn from(err: GatewayError) -> Self {
        if err.is_definitive() {
            Self::Gateway(err.to_string())
        } else {
            Self::GatewayUnavailable(err.to_string())
        }
    }
}

/// A payment processor the top-up workflow talks to.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a payment session.
    async fn initialize_charge(&self, request: &ChargeRequest)
        -> Result<ChargeSession, GatewayError>;

    /// Ask the gateway what happened to a transaction.
    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<TransactionVerification, GatewayError>;

    /// Check a webhook payload against its signature header.
    fn validate_webhook_signature(&self, payload: &[u8], signature: Option<&str>) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_definitive() {
        let rejected = GatewayError::Rejected {
            status: 400,
            message: "Invalid amount".into(),
        };
        assert!(rejected.is_definitive());
        assert!(matches!(WalletError::from(rejected), WalletError::Gateway(_)));

        let unavailable = GatewayError::Unavailable {
            status: 502,
            message: "upstream".into(),
        };
        assert!(!unavailable.is_definitive());
        assert!(matches!(
            WalletError::from(unavailable),
            WalletError::GatewayUnavailable(_)
        ));
    }
}
