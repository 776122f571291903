//! Paystack webhook handler.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use facility_wallet_core::{TopUpStatus, WalletError};

use crate::error::ApiError;
use crate::gateway::paystack::SIGNATURE_HEADER;
use crate::gateway::types::PaystackEvent;
use crate::state::AppState;

/// Webhook response.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
}

/// Handle Paystack webhooks.
///
/// `charge.*` events re-verify the transaction with the gateway before
/// anything is credited; the payload itself is never trusted for amounts.
/// Unknown references and finished top-ups are acknowledged so Paystack
/// stops retrying. Other failures return an error status so it retries.
pub async fn paystack_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let gateway = state.gateway.as_ref().ok_or_else(|| {
        tracing::warn!("Paystack webhook received but payments are not configured");
        ApiError::ServiceUnavailable("payment gateway not configured".into())
    })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if !gateway.validate_webhook_signature(&body, signature) {
        tracing::warn!(has_signature = %signature.is_some(), "Invalid Paystack webhook signature");
        return Err(ApiError::Unauthorized);
    }

    let event: PaystackEvent =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event = %event.event,
        reference = ?event.data.reference,
        "Received Paystack webhook"
    );

    if !event.event.starts_with("charge.") {
        tracing::debug!(event = %event.event, "Unhandled Paystack event");
        return Ok(Json(WebhookResponse { received: true }));
    }

    let Some(reference) = event.data.reference.as_deref() else {
        tracing::warn!(event = %event.event, "Paystack charge event without reference");
        return Ok(Json(WebhookResponse { received: true }));
    };

    match state.topups.verify(reference, None).await {
        Ok(top_up) => {
            tracing::info!(
                top_up_id = %top_up.id,
                reference = %reference,
                status = %top_up.status,
                "Paystack webhook processed"
            );
        }
        Err(WalletError::NotFound { .. }) => {
            tracing::warn!(reference = %reference, "Paystack webhook for unknown reference");
        }
        Err(WalletError::AlreadyTerminal { top_up_id, status }) => {
            if reports_uncredited_payment(&event.event, status) {
                tracing::error!(
                    top_up_id = %top_up_id,
                    reference = %reference,
                    status = %status,
                    "Payment confirmed for a finished top-up; manual refund required"
                );
            } else {
                tracing::info!(
                    top_up_id = %top_up_id,
                    reference = %reference,
                    status = %status,
                    "Paystack webhook for finished top-up"
                );
            }
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Json(WebhookResponse { received: true }))
}

/// Whether a charge event reports money the wallet will never receive.
fn reports_uncredited_payment(event: &str, status: TopUpStatus) -> bool {
    event == "charge.success" && matches!(status, TopUpStatus::Failed | TopUpStatus::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_charge_on_finished_top_up_needs_refund() {
        assert!(reports_uncredited_payment("charge.success", TopUpStatus::Failed));
        assert!(reports_uncredited_payment("charge.success", TopUpStatus::Cancelled));
        assert!(!reports_uncredited_payment("charge.success", TopUpStatus::Verified));
        assert!(!reports_uncredited_payment("charge.failed", TopUpStatus::Failed));
    }
}
