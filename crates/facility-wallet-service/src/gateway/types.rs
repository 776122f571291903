//! Payment gateway request, response and wire types.

use facility_wallet_core::{Amount, Metadata};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A request to open a payment session.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Our reference for the session.
    pub reference: String,
    /// Amount to charge.
    pub amount: Amount,
    /// ISO currency code.
    pub currency: String,
    /// Payer email address.
    pub email: String,
    /// Where the gateway redirects the payer afterwards.
    pub callback_url: Option<String>,
    /// Extra data echoed back by the gateway.
    pub metadata: Metadata,
}

/// An opened payment session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeSession {
    /// Reference the gateway registered.
    pub reference: String,
    /// Checkout URL for the payer.
    pub authorization_url: String,
    /// Gateway access code, if any.
    pub access_code: Option<String>,
}

/// Outcome of a transaction as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    /// Payment confirmed.
    Success,
    /// Payment definitively failed or was reversed.
    Failed,
    /// Payment still in progress.
    Pending,
}

impl VerificationState {
    /// Map a Paystack transaction status.
    ///
    /// Abandoned sessions can still be completed by the payer, so they stay
    /// pending.
    #[must_use]
    pub fn from_paystack(status: &str) -> Self {
        match status {
            "success" => Self::Success,
            "failed" | "reversed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A gateway's view of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionVerification {
    /// Transaction reference.
    pub reference: String,
    /// Settlement state.
    pub state: VerificationState,
    /// Amount the gateway actually collected.
    pub confirmed_amount: Decimal,
    /// Currency of the collected amount.
    pub currency: String,
    /// Free-text gateway response, kept for failure reasons.
    pub gateway_response: Option<String>,
}

// ============================================================================
// Paystack wire types
// ============================================================================

/// Standard Paystack response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackEnvelope<T> {
    /// Whether the request succeeded.
    pub status: bool,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Payload, absent on errors.
    pub data: Option<T>,
}

/// Body of `POST /transaction/initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct PaystackInitializeRequest {
    /// Payer email.
    pub email: String,
    /// Amount in minor units.
    pub amount: i64,
    /// ISO currency code.
    pub currency: String,
    /// Our reference.
    pub reference: String,
    /// Redirect URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// Metadata echoed back in webhooks.
    pub metadata: Metadata,
}

/// Data of a successful initialize call.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackInitializeData {
    /// Checkout URL.
    pub authorization_url: String,
    /// Access code.
    #[serde(default)]
    pub access_code: Option<String>,
    /// Registered reference.
    pub reference: String,
}

/// Data of a verify call.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackTransaction {
    /// Transaction status (`success`, `failed`, `abandoned`, ...).
    pub status: String,
    /// Transaction reference.
    pub reference: String,
    /// Amount in minor units.
    pub amount: i64,
    /// ISO currency code.
    pub currency: String,
    /// Gateway message.
    #[serde(default)]
    pub gateway_response: Option<String>,
}

/// A Paystack webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackEvent {
    /// Event name, e.g. `charge.success`.
    pub event: String,
    /// Event payload.
    pub data: PaystackEventData,
}

/// The part of a webhook payload we use.
#[derive(Debug, Clone, Deserialize)]
pub struct PaystackEventData {
    /// Transaction reference.
    #[serde(default)]
    pub reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paystack_status_mapping() {
        assert_eq!(VerificationState::from_paystack("success"), VerificationState::Success);
        assert_eq!(VerificationState::from_paystack("failed"), VerificationState::Failed);
        assert_eq!(VerificationState::from_paystack("reversed"), VerificationState::Failed);
        assert_eq!(VerificationState::from_paystack("abandoned"), VerificationState::Pending);
        assert_eq!(VerificationState::from_paystack("ongoing"), VerificationState::Pending);
    }

    #[test]
    fn webhook_event_parses() {
        let event: PaystackEvent = serde_json::from_str(
            r#"{"event":"charge.success","data":{"reference":"TOPUP-1","amount":10000,"status":"success"}}"#,
        )
        .unwrap();
        assert_eq!(event.event, "charge.success");
        assert_eq!(event.data.reference.as_deref(), Some("TOPUP-1"));
    }
}
