//! Core types for the facility wallet and transaction ledger.
//!
//! This crate has no I/O. It provides:
//!
//! - **Identifiers**: `FacilityId`, `WalletId`, `LedgerEntryId`, `TopUpId`
//! - **Money**: `Amount`, a validated positive decimal with two fractional digits
//! - **Wallets**: `Wallet` and the posting rules that keep its balance non-negative
//! - **Ledger**: `LedgerEntry`, `Posting`, `LedgerQuery`, and `replay`
//! - **Top-ups**: `TopUp` and its state machine
//! - **Pricing**: `AnalysisType`, `PricingConfig`, `Price`
//!
//! # Ledger invariant
//!
//! Folding a facility's completed entries in sequence order, starting from
//! zero, reproduces its wallet balance exactly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod ledger;
pub mod money;
pub mod pricing;
pub mod topup;
pub mod wallet;

pub use error::{Result, WalletError};
pub use ids::{FacilityId, IdError, LedgerEntryId, TopUpId, WalletId};
pub use ledger::{
    replay, CreditKind, EntryStatus, EntryType, LedgerEntry, LedgerQuery, Metadata,
    MetadataValue, Posting, ReplayError, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use money::{Amount, MONEY_SCALE};
pub use pricing::{AnalysisType, Price, PriceDefaults, PriceSource, PricingConfig};
pub use topup::{generate_reference, TopUp, TopUpStatus, TopUpTransition};
pub use wallet::Wallet;
