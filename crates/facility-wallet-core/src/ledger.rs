//! Ledger entry types.
//!
//! Every change to a wallet balance appends exactly one [`LedgerEntry`] in the
//! same unit of work. Entries are never updated or deleted; corrections are new
//! entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};
use crate::ids::{FacilityId, LedgerEntryId};
use crate::money::Amount;

/// Opaque key/value metadata carried on ledger entries.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Free text.
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Kind of balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Funds added through a verified top-up.
    Topup,
    /// Funds removed, e.g. to pay for an analysis.
    Deduction,
    /// Funds returned to the facility.
    Refund,
    /// Manual correction credited by an operator.
    Adjustment,
}

impl EntryType {
    /// Whether this entry type increases the balance.
    #[must_use]
    pub const fn is_credit(self) -> bool {
        match self {
            Self::Topup | Self::Refund | Self::Adjustment => true,
            Self::Deduction => false,
        }
    }

    /// Stable lowercase name used in storage and APIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Topup => "topup",
            Self::Deduction => "deduction",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
        }
    }
}

impl std::str::FromStr for EntryType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "topup" => Ok(Self::Topup),
            "deduction" => Ok(Self::Deduction),
            "refund" => Ok(Self::Refund),
            "adjustment" => Ok(Self::Adjustment),
            other => Err(WalletError::Validation(format!("unknown entry type: {other}"))),
        }
    }
}

/// The credit-side entry types a caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditKind {
    /// Verified top-up.
    Topup,
    /// Refund of a previous deduction.
    Refund,
    /// Manual adjustment.
    Adjustment,
}

impl From<CreditKind> for EntryType {
    fn from(kind: CreditKind) -> Self {
        match kind {
            CreditKind::Topup => Self::Topup,
            CreditKind::Refund => Self::Refund,
            CreditKind::Adjustment => Self::Adjustment,
        }
    }
}

/// Processing status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Applied to the balance.
    Completed,
    /// Recorded but not yet applied.
    Pending,
    /// Recorded as failed; did not change the balance.
    Failed,
}

impl EntryStatus {
    /// Stable lowercase name used in storage and APIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(Self::Completed),
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            other => Err(WalletError::Validation(format!("unknown entry status: {other}"))),
        }
    }
}

/// An immutable record of one balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry id.
    pub id: LedgerEntryId,

    /// Facility whose wallet changed.
    pub facility_id: FacilityId,

    /// Position in the facility's ledger, starting at 1.
    pub sequence: u64,

    /// Kind of change.
    pub entry_type: EntryType,

    /// Positive magnitude of the change.
    pub amount: Decimal,

    /// Balance before the change.
    pub balance_before: Decimal,

    /// Balance after the change.
    pub balance_after: Decimal,

    /// Human-readable description.
    pub description: String,

    /// Optional link to a top-up or external charge.
    pub reference_id: Option<String>,

    /// Processing status.
    pub status: EntryStatus,

    /// Pass-through metadata.
    #[serde(default)]
    pub metadata: Metadata,

    /// When the entry was appended.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// The signed effect of this entry on the balance.
    #[must_use]
    pub fn signed_amount(&self) -> Decimal {
        if self.entry_type.is_credit() {
            self.amount
        } else {
            -self.amount
        }
    }
}

/// A requested balance change, applied to a wallet under its lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// Kind of change.
    pub entry_type: EntryType,
    /// Magnitude.
    pub amount: Amount,
    /// Human-readable description.
    pub description: String,
    /// Optional link to a top-up or external charge.
    pub reference_id: Option<String>,
    /// Pass-through metadata.
    pub metadata: Metadata,
}

impl Posting {
    /// A deduction.
    #[must_use]
    pub fn debit(amount: Amount, description: impl Into<String>) -> Self {
        Self {
            entry_type: EntryType::Deduction,
            amount,
            description: description.into(),
            reference_id: None,
            metadata: Metadata::new(),
        }
    }

    /// A credit of the given kind.
    #[must_use]
    pub fn credit(kind: CreditKind, amount: Amount, description: impl Into<String>) -> Self {
        Self {
            entry_type: kind.into(),
            amount,
            description: description.into(),
            reference_id: None,
            metadata: Metadata::new(),
        }
    }

    /// Attach a reference id.
    #[must_use]
    pub fn with_reference(mut self, reference_id: Option<String>) -> Self {
        self.reference_id = reference_id;
        self
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Maximum page size for ledger listings.
pub const MAX_PAGE_SIZE: usize = 100;

/// Default page size for ledger listings.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Filter and pagination for ledger listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerQuery {
    /// Only entries created at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only entries created at or before this instant.
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of entries.
    pub limit: usize,
    /// Entries to skip (after filtering).
    pub offset: usize,
}

impl Default for LedgerQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl LedgerQuery {
    /// Check the range and clamp the page size.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Validation`] if `from` is after `to` or `limit` is zero.
    pub fn validated(mut self) -> Result<Self> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(WalletError::Validation(
                    "date range start must not be after its end".into(),
                ));
            }
        }
        if self.limit == 0 {
            return Err(WalletError::Validation("limit must be at least 1".into()));
        }
        self.limit = self.limit.min(MAX_PAGE_SIZE);
        Ok(self)
    }

    /// Whether an entry falls inside the date range.
    #[must_use]
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.from.map_or(true, |from| entry.created_at >= from)
            && self.to.map_or(true, |to| entry.created_at <= to)
    }
}

/// Ledger inconsistencies detected while replaying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// Sequence numbers are not contiguous.
    #[error("expected sequence {expected}, found {found}")]
    SequenceGap {
        /// The next expected sequence.
        expected: u64,
        /// The sequence actually found.
        found: u64,
    },

    /// An entry does not start from the running balance.
    #[error("entry {sequence} starts at {recorded}, running balance is {running}")]
    Discontinuity {
        /// Entry sequence.
        sequence: u64,
        /// Running balance before the entry.
        running: Decimal,
        /// The entry's recorded `balance_before`.
        recorded: Decimal,
    },

    /// An entry's before/after balances disagree with its amount.
    #[error("entry {sequence} does not balance")]
    Unbalanced {
        /// Entry sequence.
        sequence: u64,
    },

    /// The running balance went negative.
    #[error("balance negative after entry {sequence}")]
    NegativeBalance {
        /// Entry sequence.
        sequence: u64,
    },
}

/// Fold completed entries in chronological order, starting from zero.
///
/// Entries must be ordered by ascending sequence. Returns the resulting
/// balance, which must equal the wallet's stored balance.
///
/// # Errors
///
/// Returns a [`ReplayError`] describing the first inconsistency found.
pub fn replay<'a, I>(entries: I) -> std::result::Result<Decimal, ReplayError>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut running = Decimal::ZERO;
    let mut expected = 1_u64;

    for entry in entries {
        if entry.sequence != expected {
            return Err(ReplayError::SequenceGap {
                expected,
                found: entry.sequence,
            });
        }
        expected += 1;

        match entry.status {
            EntryStatus::Completed => {}
            EntryStatus::Pending | EntryStatus::Failed => continue,
        }

        if entry.balance_before != running {
            return Err(ReplayError::Discontinuity {
                sequence: entry.sequence,
                running,
                recorded: entry.balance_before,
            });
        }
        if entry.balance_before + entry.signed_amount() != entry.balance_after {
            return Err(ReplayError::Unbalanced {
                sequence: entry.sequence,
            });
        }

        running = entry.balance_after;
        if running < Decimal::ZERO {
            return Err(ReplayError::NegativeBalance {
                sequence: entry.sequence,
            });
        }
    }

    Ok(running)
}
