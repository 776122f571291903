//! Top-up workflow.
//!
//! A top-up is created `pending` with a unique gateway reference, then
//! settled once the gateway confirms the payment. Settlement marks the top-up
//! `verified` and credits the wallet in one store transaction, so repeated
//! or concurrent confirmations (client polling and webhooks) credit at most
//! once.
//!
//! ```text
//! pending ──verify(success)──▶ verified
//!    │  ╲───verify(failed)/mark_failed──▶ failed ──retry──▶ pending
//!    ╰─────cancel──▶ cancelled
//! ```

use std::sync::Arc;

use facility_wallet_core::{
    generate_reference, Amount, FacilityId, Metadata, Result, TopUp, TopUpId, TopUpStatus,
    TopUpTransition, WalletError, MAX_PAGE_SIZE,
};
use facility_wallet_store::{Settlement, Store};
use rust_decimal::Decimal;

use crate::gateway::{ChargeRequest, ChargeSession, PaymentGateway, VerificationState};

/// Top-up limits and gateway options.
#[derive(Debug, Clone)]
pub struct TopUpSettings {
    /// Service currency; top-ups in any other currency are refused.
    pub currency: String,
    /// Smallest accepted amount, inclusive.
    pub min_amount: Decimal,
    /// Largest accepted amount, inclusive.
    pub max_amount: Decimal,
    /// Redirect URL handed to the gateway.
    pub callback_url: Option<String>,
}

/// A top-up together with the checkout session opened for it.
#[derive(Debug, Clone)]
pub struct TopUpSession {
    /// The pending top-up.
    pub top_up: TopUp,
    /// Where to send the payer.
    pub authorization_url: String,
    /// Gateway access code, if any.
    pub access_code: Option<String>,
}

/// Orchestrates top-ups between the store and the payment gateway.
#[derive(Clone)]
pub struct TopUpWorkflow {
    store: Arc<dyn Store>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    settings: TopUpSettings,
}

impl TopUpWorkflow {
    /// Create the workflow. Without a gateway every operation that needs one
    /// fails with [`WalletError::GatewayUnavailable`].
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        settings: TopUpSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            settings,
        }
    }

    fn gateway(&self) -> Result<&Arc<dyn PaymentGateway>> {
        self.gateway
            .as_ref()
            .ok_or_else(|| WalletError::GatewayUnavailable("payment gateway not configured".into()))
    }

    fn validate_request(&self, amount: Decimal, currency: &str, payer_email: &str) -> Result<Amount> {
        let amount = Amount::new(amount)?;
        if amount.value() < self.settings.min_amount || amount.value() > self.settings.max_amount {
            return Err(WalletError::Validation(format!(
                "amount must be between {:.2} and {:.2}, got {amount}",
                self.settings.min_amount, self.settings.max_amount
            )));
        }
        if !currency.trim().eq_ignore_ascii_case(&self.settings.currency) {
            return Err(WalletError::Validation(format!(
                "unsupported currency {currency}, expected {}",
                self.settings.currency
            )));
        }
        if !is_plausible_email(payer_email) {
            return Err(WalletError::Validation(format!(
                "invalid payer email: {payer_email}"
            )));
        }
        Ok(amount)
    }

    /// Create a pending top-up and open a payment session for it.
    ///
    /// Input is validated before anything is persisted. A definitive gateway
    /// rejection marks the top-up failed; a transient one leaves it pending.
    pub async fn initialize(
        &self,
        facility_id: FacilityId,
        amount: Decimal,
        currency: &str,
        payer_email: &str,
    ) -> Result<TopUpSession> {
        let amount = self.validate_request(amount, currency, payer_email)?;
        let gateway = self.gateway()?;

        self.store
            .ensure_wallet(facility_id, &self.settings.currency)
            .await?;

        let top_up = TopUp::new(
            facility_id,
            amount,
            self.settings.currency.clone(),
            payer_email.trim(),
        );
        self.store.insert_top_up(&top_up).await?;

        tracing::info!(
            facility_id = %facility_id,
            top_up_id = %top_up.id,
            reference = %top_up.gateway_reference,
            amount = %amount,
            "Top-up created"
        );

        self.open_session(gateway.as_ref(), top_up).await
    }

    /// Ask the gateway for a checkout session for the top-up's current reference.
    async fn open_session(&self, gateway: &dyn PaymentGateway, top_up: TopUp) -> Result<TopUpSession> {
        let amount = Amount::new(top_up.amount_requested)?;
        let mut metadata = Metadata::new();
        metadata.insert("top_up_id".to_string(), top_up.id.to_string().into());
        metadata.insert("facility_id".to_string(), top_up.facility_id.to_string().into());

        let request = ChargeRequest {
            reference: top_up.gateway_reference.clone(),
            amount,
            currency: top_up.currency.clone(),
            email: top_up.payer_email.clone(),
            callback_url: self.settings.callback_url.clone(),
            metadata,
        };

        match gateway.initialize_charge(&request).await {
            Ok(ChargeSession {
                authorization_url,
                access_code,
                ..
            }) => Ok(TopUpSession {
                top_up,
                authorization_url,
                access_code,
            }),
            Err(e) if e.is_definitive() => {
                tracing::warn!(
                    top_up_id = %top_up.id,
                    reference = %top_up.gateway_reference,
                    error = %e,
                    "Gateway rejected top-up"
                );
                self.store
                    .transition_top_up(
                        top_up.id,
                        TopUpTransition::Fail {
                            reason: e.to_string(),
                        },
                    )
                    .await?;
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(
                    top_up_id = %top_up.id,
                    reference = %top_up.gateway_reference,
                    error = %e,
                    "Gateway unavailable, top-up left pending"
                );
                Err(e.into())
            }
        }
    }

    /// Confirm a top-up with the gateway and credit the wallet once.
    ///
    /// `facility_id` restricts the lookup to one facility's top-ups.
    pub async fn verify(&self, reference: &str, facility_id: Option<FacilityId>) -> Result<TopUp> {
        let top_up = self
            .store
            .find_top_up_by_reference(reference)
            .await?
            .ok_or_else(|| WalletError::not_found("top-up", reference))?;
        let top_up = scoped(top_up, facility_id)?;

        match top_up.status {
            TopUpStatus::Verified => {
                tracing::debug!(
                    top_up_id = %top_up.id,
                    reference = %reference,
                    "Top-up already verified"
                );
                return Ok(top_up);
            }
            TopUpStatus::Failed | TopUpStatus::Cancelled => {
                return Err(WalletError::AlreadyTerminal {
                    top_up_id: top_up.id.to_string(),
                    status: top_up.status,
                });
            }
            TopUpStatus::Pending => {}
        }

        let verification = self
            .gateway()?
            .verify_transaction(reference)
            .await
            .map_err(WalletError::from)?;

        match verification.state {
            VerificationState::Pending => {
                tracing::debug!(
                    top_up_id = %top_up.id,
                    reference = %reference,
                    "Payment still in progress"
                );
                Ok(top_up)
            }
            VerificationState::Failed => {
                let reason = verification
                    .gateway_response
                    .unwrap_or_else(|| "payment failed".to_string());
                self.fail_session(top_up, reference, reason).await
            }
            VerificationState::Success => {
                if !verification.currency.eq_ignore_ascii_case(&top_up.currency) {
                    let reason = format!(
                        "gateway confirmed {} {}, expected {}",
                        verification.confirmed_amount, verification.currency, top_up.currency
                    );
                    return self.fail_session(top_up, reference, reason).await;
                }
                let Ok(amount) = Amount::new(verification.confirmed_amount) else {
                    let reason = format!(
                        "gateway confirmed invalid amount {}",
                        verification.confirmed_amount
                    );
                    return self.fail_session(top_up, reference, reason).await;
                };
                if amount.value() != top_up.amount_requested {
                    tracing::warn!(
                        top_up_id = %top_up.id,
                        requested = %top_up.amount_requested,
                        confirmed = %amount,
                        "Confirmed amount differs from requested amount"
                    );
                }
                self.settle(&top_up, amount).await
            }
        }
    }

    async fn settle(&self, top_up: &TopUp, amount: Amount) -> Result<TopUp> {
        match self.store.settle_top_up(top_up.id, amount).await {
            Ok(Settlement::Credited { top_up, entry }) => {
                tracing::info!(
                    facility_id = %top_up.facility_id,
                    top_up_id = %top_up.id,
                    reference = %top_up.gateway_reference,
                    amount = %amount,
                    balance_after = %entry.balance_after,
                    "Top-up verified and wallet credited"
                );
                Ok(top_up)
            }
            Ok(Settlement::AlreadyVerified(top_up)) => {
                tracing::debug!(
                    top_up_id = %top_up.id,
                    "Top-up verified concurrently, nothing credited"
                );
                Ok(top_up)
            }
            Err(e) => {
                let err = WalletError::from(e);
                if let WalletError::AlreadyTerminal {
                    status: TopUpStatus::Cancelled,
                    ..
                } = &err
                {
                    tracing::error!(
                        facility_id = %top_up.facility_id,
                        top_up_id = %top_up.id,
                        amount = %amount,
                        "Payment confirmed for a cancelled top-up; manual refund required"
                    );
                }
                Err(err)
            }
        }
    }

    /// Fail the top-up only if `reference` is its current session.
    ///
    /// A superseded session failing says nothing about the open one.
    async fn fail_session(&self, top_up: TopUp, reference: &str, reason: String) -> Result<TopUp> {
        if top_up.gateway_reference != reference {
            tracing::debug!(
                top_up_id = %top_up.id,
                reference = %reference,
                current_reference = %top_up.gateway_reference,
                reason = %reason,
                "Superseded session failed, top-up left pending"
            );
            return Ok(top_up);
        }
        self.fail(top_up.id, reason).await
    }

    async fn fail(&self, top_up_id: TopUpId, reason: String) -> Result<TopUp> {
        let top_up = self
            .store
            .transition_top_up(top_up_id, TopUpTransition::Fail { reason })
            .await?;
        tracing::info!(
            top_up_id = %top_up.id,
            reason = ?top_up.failure_reason,
            "Top-up failed"
        );
        Ok(top_up)
    }

    /// Mark a pending top-up failed without touching the wallet.
    pub async fn mark_failed(&self, reference: &str, reason: &str) -> Result<TopUp> {
        let top_up = self
            .store
            .find_top_up_by_reference(reference)
            .await?
            .ok_or_else(|| WalletError::not_found("top-up", reference))?;
        self.fail(top_up.id, reason.to_string()).await
    }

    /// Cancel a pending top-up.
    pub async fn cancel(&self, top_up_id: TopUpId, facility_id: Option<FacilityId>) -> Result<TopUp> {
        self.get(top_up_id, facility_id).await?;
        let top_up = self
            .store
            .transition_top_up(top_up_id, TopUpTransition::Cancel)
            .await?;
        tracing::info!(
            facility_id = %top_up.facility_id,
            top_up_id = %top_up.id,
            "Top-up cancelled"
        );
        Ok(top_up)
    }

    /// Open a fresh payment session for a pending or failed top-up.
    ///
    /// The top-up gets a new reference; earlier references keep resolving to it.
    pub async fn retry(
        &self,
        top_up_id: TopUpId,
        facility_id: Option<FacilityId>,
    ) -> Result<TopUpSession> {
        self.get(top_up_id, facility_id).await?;
        let gateway = self.gateway()?;

        let top_up = self
            .store
            .transition_top_up(
                top_up_id,
                TopUpTransition::Reissue {
                    reference: generate_reference(),
                },
            )
            .await?;

        tracing::info!(
            facility_id = %top_up.facility_id,
            top_up_id = %top_up.id,
            reference = %top_up.gateway_reference,
            attempts = %top_up.attempts,
            "Top-up reissued"
        );

        self.open_session(gateway.as_ref(), top_up).await
    }

    /// Get a top-up by id.
    pub async fn get(&self, top_up_id: TopUpId, facility_id: Option<FacilityId>) -> Result<TopUp> {
        let top_up = self
            .store
            .get_top_up(top_up_id)
            .await?
            .ok_or_else(|| WalletError::not_found("top-up", top_up_id))?;
        scoped(top_up, facility_id)
    }

    /// A facility's top-ups, newest first.
    pub async fn list(
        &self,
        facility_id: FacilityId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TopUp>> {
        if limit == 0 {
            return Err(WalletError::Validation("limit must be at least 1".into()));
        }
        Ok(self
            .store
            .list_top_ups(facility_id, limit.min(MAX_PAGE_SIZE), offset)
            .await?)
    }
}

/// Hide top-ups that belong to another facility.
fn scoped(top_up: TopUp, facility_id: Option<FacilityId>) -> Result<TopUp> {
    match facility_id {
        Some(facility_id) if facility_id != top_up.facility_id => {
            Err(WalletError::not_found("top-up", top_up.id))
        }
        _ => Ok(top_up),
    }
}

fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}
