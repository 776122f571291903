//! API handlers.
//!
//! Money is rendered as strings with two decimals.

pub mod admin;
pub mod health;
pub mod pricing;
pub mod topups;
pub mod wallet;
pub mod webhooks;

use chrono::{DateTime, Utc};
use facility_wallet_core::{LedgerEntry, Metadata, Price, TopUp, DEFAULT_PAGE_SIZE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::topup::TopUpSession;

/// Format an amount with two decimals.
pub(crate) fn money(value: Decimal) -> String {
    format!("{value:.2}")
}

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Maximum number of results (1-100, default 50).
    pub limit: Option<usize>,
    /// Results to skip.
    pub offset: Option<usize>,
}

impl PageQuery {
    pub(crate) fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

/// A ledger entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct EntryResponse {
    /// Entry ID.
    pub id: String,
    /// Per-facility sequence number.
    pub sequence: u64,
    /// `topup`, `deduction`, `refund` or `adjustment`.
    pub entry_type: String,
    /// Amount (always positive).
    pub amount: String,
    /// Balance before the entry.
    pub balance_before: String,
    /// Balance after the entry.
    pub balance_after: String,
    /// Description.
    pub description: String,
    /// Linked top-up or analysis.
    pub reference_id: Option<String>,
    /// Entry status.
    pub status: String,
    /// Extra data.
    pub metadata: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for EntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            sequence: entry.sequence,
            entry_type: entry.entry_type.as_str().to_string(),
            amount: money(entry.amount),
            balance_before: money(entry.balance_before),
            balance_after: money(entry.balance_after),
            description: entry.description,
            reference_id: entry.reference_id,
            status: entry.status.as_str().to_string(),
            metadata: entry.metadata,
            created_at: entry.created_at,
        }
    }
}

/// A top-up.
#[derive(Debug, Serialize, Deserialize)]
pub struct TopUpResponse {
    /// Top-up ID.
    pub id: String,
    /// Owning facility.
    pub facility_id: String,
    /// Requested amount.
    pub amount_requested: String,
    /// Amount confirmed by the gateway.
    pub amount_received: Option<String>,
    /// Currency.
    pub currency: String,
    /// Payer email.
    pub payer_email: String,
    /// `pending`, `verified`, `failed` or `cancelled`.
    pub status: String,
    /// Current gateway reference.
    pub reference: String,
    /// Payment sessions requested so far.
    pub attempts: u32,
    /// Why the top-up failed.
    pub failure_reason: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Verification timestamp.
    pub verified_at: Option<DateTime<Utc>>,
}

impl From<TopUp> for TopUpResponse {
    fn from(top_up: TopUp) -> Self {
        Self {
            id: top_up.id.to_string(),
            facility_id: top_up.facility_id.to_string(),
            amount_requested: money(top_up.amount_requested),
            amount_received: top_up.amount_received.map(money),
            currency: top_up.currency,
            payer_email: top_up.payer_email,
            status: top_up.status.as_str().to_string(),
            reference: top_up.gateway_reference,
            attempts: top_up.attempts,
            failure_reason: top_up.failure_reason,
            created_at: top_up.created_at,
            updated_at: top_up.updated_at,
            verified_at: top_up.verified_at,
        }
    }
}

/// A top-up with its checkout session.
#[derive(Debug, Serialize, Deserialize)]
pub struct TopUpSessionResponse {
    /// The top-up.
    pub top_up: TopUpResponse,
    /// Checkout URL for the payer.
    pub authorization_url: String,
    /// Gateway access code.
    pub access_code: Option<String>,
}

impl From<TopUpSession> for TopUpSessionResponse {
    fn from(session: TopUpSession) -> Self {
        Self {
            top_up: session.top_up.into(),
            authorization_url: session.authorization_url,
            access_code: session.access_code,
        }
    }
}

/// The effective price of an analysis type.
#[derive(Debug, Serialize, Deserialize)]
pub struct PriceResponse {
    /// `standard` or `image`.
    pub analysis_type: String,
    /// Price per analysis.
    pub amount: String,
    /// Currency.
    pub currency: String,
    /// `configured` or `default`.
    pub source: String,
}

impl From<Price> for PriceResponse {
    fn from(price: Price) -> Self {
        Self {
            analysis_type: price.analysis_type.as_str().to_string(),
            amount: money(price.amount),
            currency: price.currency,
            source: match price.source {
                facility_wallet_core::PriceSource::Configured => "configured",
                facility_wallet_core::PriceSource::Default => "default",
            }
            .to_string(),
        }
    }
}
