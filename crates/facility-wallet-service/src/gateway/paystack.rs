//! Paystack REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;

use facility_wallet_core::MONEY_SCALE;

use super::types::{
    ChargeRequest, ChargeSession, PaystackEnvelope, PaystackInitializeData,
    PaystackInitializeRequest, PaystackTransaction, TransactionVerification, VerificationState,
};
use super::{GatewayError, PaymentGateway};
use crate::crypto::{constant_time_eq, hmac_sha512_hex};

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Paystack API client.
#[derive(Debug, Clone)]
pub struct PaystackClient {
    client: Client,
    base_url: String,
    secret_key: String,
    webhook_secret: Option<String>,
}

impl PaystackClient {
    /// Create a new Paystack client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API base URL, normally `https://api.paystack.co`
    /// * `secret_key` - Secret key (`sk_test_...` or `sk_live_...`)
    /// * `webhook_secret` - Key used to check webhook signatures
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        webhook_secret: Option<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        let webhook_secret = webhook_secret.filter(|s| !s.is_empty());
        if webhook_secret.is_none() {
            tracing::warn!(
                "Paystack webhook secret not configured - webhook signatures will not be checked"
            );
        }

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            webhook_secret,
        })
    }

    /// Handle an API response and classify failures.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_server_error() {
            return Err(GatewayError::Unavailable {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        let envelope: PaystackEnvelope<T> = serde_json::from_str(&body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        if !envelope.status {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: envelope.message,
            });
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("missing data".into()))
    }
}

/// Best-effort message from an error body.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    serde_json::from_str::<PaystackEnvelope<serde_json::Value>>(body)
        .map(|e| e.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize_charge(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeSession, GatewayError> {
        let amount = request.amount.to_minor_units().ok_or_else(|| {
            GatewayError::Configuration(format!("amount {} out of range", request.amount))
        })?;

        let body = PaystackInitializeRequest {
            email: request.email.clone(),
            amount,
            currency: request.currency.clone(),
            reference: request.reference.clone(),
            callback_url: request.callback_url.clone(),
            metadata: request.metadata.clone(),
        };

        tracing::debug!(
            reference = %request.reference,
            amount_minor = %amount,
            currency = %request.currency,
            "Initializing Paystack transaction"
        );

        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?;

        let data: PaystackInitializeData = Self::handle_response(response).await?;

        Ok(ChargeSession {
            reference: data.reference,
            authorization_url: data.authorization_url,
            access_code: data.access_code,
        })
    }

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<TransactionVerification, GatewayError> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let data: PaystackTransaction = Self::handle_response(response).await?;

        tracing::debug!(
            reference = %data.reference,
            status = %data.status,
            amount_minor = %data.amount,
            "Paystack transaction verified"
        );

        Ok(TransactionVerification {
            reference: data.reference,
            state: VerificationState::from_paystack(&data.status),
            confirmed_amount: Decimal::new(data.amount, MONEY_SCALE),
            currency: data.currency,
            gateway_response: data.gateway_response,
        })
    }

    fn validate_webhook_signature(&self, payload: &[u8], signature: Option<&str>) -> bool {
        let Some(secret) = &self.webhook_secret else {
            tracing::warn!("Accepting unsigned Paystack webhook - no webhook secret configured");
            return true;
        };

        let Some(signature) = signature else {
            return false;
        };

        hmac_sha512_hex(secret, payload)
            .is_some_and(|expected| constant_time_eq(&expected, &signature.to_ascii_lowercase()))
    }
}
