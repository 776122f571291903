//! Top-up requests and their state machine.
//!
//! ```text
//! pending ──verify──▶ verified
//!    │  ╰──cancel──▶ cancelled
//!    ╰────fail────▶ failed ──retry──▶ pending
//! ```
//!
//! `verified` and `cancelled` are final. `failed` is terminal for verification
//! but may be reopened by a retry, which issues a new gateway reference.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};
use crate::ids::{FacilityId, TopUpId};
use crate::money::Amount;

/// Prefix of generated gateway references.
pub const REFERENCE_PREFIX: &str = "TOPUP";

/// Status of a top-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopUpStatus {
    /// Waiting for the payer to complete the gateway session.
    Pending,
    /// Payment confirmed and credited.
    Verified,
    /// The gateway reported a definitive failure.
    Failed,
    /// Cancelled by the facility before payment.
    Cancelled,
}

impl TopUpStatus {
    /// Stable lowercase name used in storage and APIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the status is one of the terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        match self {
            Self::Pending => false,
            Self::Verified | Self::Failed | Self::Cancelled => true,
        }
    }
}

impl std::fmt::Display for TopUpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TopUpStatus {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "verified" => Ok(Self::Verified),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(WalletError::Validation(format!("unknown top-up status: {other}"))),
        }
    }
}

/// A request to fund a wallet through the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopUp {
    /// Top-up id.
    pub id: TopUpId,

    /// Facility being funded.
    pub facility_id: FacilityId,

    /// Amount the facility asked to pay.
    pub amount_requested: Decimal,

    /// Amount confirmed by the gateway. Set only on verification.
    pub amount_received: Option<Decimal>,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Email the gateway charges.
    pub payer_email: String,

    /// Current status.
    pub status: TopUpStatus,

    /// Reference of the current gateway session.
    pub gateway_reference: String,

    /// Number of gateway sessions requested for this top-up.
    pub attempts: u32,

    /// Why the top-up failed, when it did.
    pub failure_reason: Option<String>,

    /// When the top-up was created.
    pub created_at: DateTime<Utc>,

    /// When the top-up last changed.
    pub updated_at: DateTime<Utc>,

    /// When the payment was verified.
    pub verified_at: Option<DateTime<Utc>>,
}

/// A status change applied to a stored top-up under its lock.
///
/// Verification is not a transition: it only happens together with the
/// wallet credit, through [`TopUp::mark_verified`] inside the store's
/// settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopUpTransition {
    /// `pending → failed`.
    Fail {
        /// Reason reported by the gateway or operator.
        reason: String,
    },
    /// `pending → cancelled`.
    Cancel,
    /// `pending | failed → pending` with a fresh gateway reference.
    Reissue {
        /// The new reference.
        reference: String,
    },
}

impl TopUpTransition {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Fail { .. } => "fail",
            Self::Cancel => "cancel",
            Self::Reissue { .. } => "reissue",
        }
    }
}

/// Generate a unique gateway reference.
#[must_use]
pub fn generate_reference() -> String {
    format!("{REFERENCE_PREFIX}-{}", ulid::Ulid::new())
}

impl TopUp {
    /// A new pending top-up with a freshly generated reference.
    #[must_use]
    pub fn new(
        facility_id: FacilityId,
        amount: Amount,
        currency: impl Into<String>,
        payer_email: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TopUpId::generate(),
            facility_id,
            amount_requested: amount.value(),
            amount_received: None,
            currency: currency.into(),
            payer_email: payer_email.into(),
            status: TopUpStatus::Pending,
            gateway_reference: generate_reference(),
            attempts: 1,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            verified_at: None,
        }
    }

    fn already_terminal(&self) -> WalletError {
        WalletError::AlreadyTerminal {
            top_up_id: self.id.to_string(),
            status: self.status,
        }
    }

    /// Record the gateway-confirmed payment.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::AlreadyTerminal`] unless the top-up is pending.
    pub fn mark_verified(&mut self, amount_received: Amount, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            TopUpStatus::Pending => {
                self.status = TopUpStatus::Verified;
                self.amount_received = Some(amount_received.value());
                self.verified_at = Some(now);
                self.updated_at = now;
                Ok(())
            }
            TopUpStatus::Verified | TopUpStatus::Failed | TopUpStatus::Cancelled => {
                Err(self.already_terminal())
            }
        }
    }

    /// Apply a transition.
    ///
    /// On error the top-up is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::AlreadyTerminal`] if the current status does not
    /// permit the transition. Failing an already failed top-up succeeds without
    /// changing it.
    pub fn apply(&mut self, transition: TopUpTransition, now: DateTime<Utc>) -> Result<()> {
        match (self.status, transition) {
            (TopUpStatus::Pending, TopUpTransition::Fail { reason }) => {
                self.status = TopUpStatus::Failed;
                self.failure_reason = Some(reason);
            }
            (TopUpStatus::Pending, TopUpTransition::Cancel) => {
                self.status = TopUpStatus::Cancelled;
            }
            // Repeated failure reports are a no-op.
            (TopUpStatus::Failed, TopUpTransition::Fail { .. }) => return Ok(()),
            (TopUpStatus::Pending | TopUpStatus::Failed, TopUpTransition::Reissue { reference }) => {
                self.status = TopUpStatus::Pending;
                self.gateway_reference = reference;
                self.attempts += 1;
                self.failure_reason = None;
            }
            (
                TopUpStatus::Verified | TopUpStatus::Cancelled,
                TopUpTransition::Fail { .. } | TopUpTransition::Cancel | TopUpTransition::Reissue { .. },
            )
            | (TopUpStatus::Failed, TopUpTransition::Cancel) => {
                return Err(self.already_terminal());
            }
        }
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending() -> TopUp {
        TopUp::new(
            FacilityId::generate(),
            Amount::new(dec!(100)).unwrap(),
            "GHS",
            "billing@clinic.example",
        )
    }

    #[test]
    fn new_top_up_is_pending_with_reference() {
        let top_up = pending();
        assert_eq!(top_up.status, TopUpStatus::Pending);
        assert!(top_up.gateway_reference.starts_with("TOPUP-"));
        assert_eq!(top_up.attempts, 1);
        assert!(top_up.amount_received.is_none());
    }

    #[test]
    fn references_are_unique() {
        assert_ne!(generate_reference(), generate_reference());
    }

    #[test]
    fn verify_sets_received_amount() {
        let mut top_up = pending();
        let now = Utc::now();
        top_up
            .mark_verified(Amount::new(dec!(100)).unwrap(), now)
            .unwrap();
        assert_eq!(top_up.status, TopUpStatus::Verified);
        assert_eq!(top_up.amount_received, Some(dec!(100)));
        assert_eq!(top_up.verified_at, Some(now));
    }

    #[test]
    fn verified_and_cancelled_are_final() {
        for transition in [
            TopUpTransition::Cancel,
            TopUpTransition::Fail {
                reason: "declined".into(),
            },
            TopUpTransition::Reissue {
                reference: generate_reference(),
            },
        ] {
            let mut top_up = pending();
            top_up.apply(TopUpTransition::Cancel, Utc::now()).unwrap();
            let snapshot = top_up.clone();

            let err = top_up.apply(transition, Utc::now()).unwrap_err();
            assert!(matches!(
                err,
                WalletError::AlreadyTerminal {
                    status: TopUpStatus::Cancelled,
                    ..
                }
            ));
            assert_eq!(top_up, snapshot);
        }
    }

    #[test]
    fn failed_top_up_can_be_reissued() {
        let mut top_up = pending();
        let first_reference = top_up.gateway_reference.clone();
        top_up
            .apply(
                TopUpTransition::Fail {
                    reason: "card declined".into(),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(top_up.failure_reason.as_deref(), Some("card declined"));

        let reference = generate_reference();
        top_up
            .apply(
                TopUpTransition::Reissue {
                    reference: reference.clone(),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(top_up.status, TopUpStatus::Pending);
        assert_eq!(top_up.gateway_reference, reference);
        assert_ne!(top_up.gateway_reference, first_reference);
        assert_eq!(top_up.attempts, 2);
        assert!(top_up.failure_reason.is_none());
    }

    #[test]
    fn failed_top_up_cannot_be_verified() {
        let mut top_up = pending();
        top_up
            .apply(
                TopUpTransition::Fail {
                    reason: "abandoned".into(),
                },
                Utc::now(),
            )
            .unwrap();
        let err = top_up
            .mark_verified(Amount::new(dec!(100)).unwrap(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, WalletError::AlreadyTerminal { .. }));
    }

    #[test]
    fn repeated_failure_is_a_no_op() {
        let mut top_up = pending();
        top_up
            .apply(
                TopUpTransition::Fail {
                    reason: "declined".into(),
                },
                Utc::now(),
            )
            .unwrap();
        let snapshot = top_up.clone();
        top_up
            .apply(
                TopUpTransition::Fail {
                    reason: "declined again".into(),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(top_up, snapshot);
    }

    #[test]
    fn verified_top_up_cannot_be_verified_twice() {
        let mut top_up = pending();
        top_up
            .mark_verified(Amount::new(dec!(100)).unwrap(), Utc::now())
            .unwrap();
        assert!(matches!(
            top_up.mark_verified(Amount::new(dec!(100)).unwrap(), Utc::now()),
            Err(WalletError::AlreadyTerminal {
                status: TopUpStatus::Verified,
                ..
            })
        ));
    }

    #[test]
    fn status_names_parse_back() {
        for status in [
            TopUpStatus::Pending,
            TopUpStatus::Verified,
            TopUpStatus::Failed,
            TopUpStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TopUpStatus>().unwrap(), status);
        }
    }
}
