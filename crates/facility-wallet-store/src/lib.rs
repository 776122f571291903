//! Storage layer for the facility wallet.
//!
//! Every balance mutation runs as one database transaction that holds an
//! exclusive lock on the facility's wallet record, applies the change through
//! [`Wallet::post`], and writes the wallet together with its new ledger entry.
//! Either both become visible or neither does.
//!
//! # Backends
//!
//! - [`RocksStore`]: embedded `RocksDB` `TransactionDB` with pessimistic row
//!   locks (`get_for_update`). Blocking work runs on the tokio blocking pool.
//! - [`PgStore`]: PostgreSQL with `SELECT ... FOR UPDATE`.
//!
//! # Example
//!
//! ```no_run
//! use facility_wallet_core::{Amount, CreditKind, FacilityId, Posting};
//! use facility_wallet_store::{RocksStore, Store};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RocksStore::open("/tmp/facility-wallet-db")?;
//! let facility = FacilityId::generate();
//!
//! store.ensure_wallet(facility, "GHS").await?;
//! let amount = Amount::from_minor_units(10_000)?;
//! let entry = store
//!     .post(facility, Posting::credit(CreditKind::Adjustment, amount, "opening balance"))
//!     .await?;
//! assert_eq!(entry.sequence, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod postgres;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use facility_wallet_core::{
    AnalysisType, Amount, FacilityId, LedgerEntry, LedgerQuery, Posting, PricingConfig, TopUp,
    TopUpId, TopUpTransition, Wallet,
};

/// Description written on ledger entries created by a top-up settlement.
pub const TOP_UP_DESCRIPTION: &str = "Wallet top-up";

/// Outcome of settling a top-up.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// The top-up moved to `verified` and the wallet was credited.
    Credited {
        /// The verified top-up.
        top_up: TopUp,
        /// The `topup` ledger entry.
        entry: LedgerEntry,
    },
    /// Another caller settled it first; nothing was written.
    AlreadyVerified(TopUp),
}

impl Settlement {
    /// The top-up after settlement.
    #[must_use]
    pub fn top_up(&self) -> &TopUp {
        match self {
            Self::Credited { top_up, .. } | Self::AlreadyVerified(top_up) => top_up,
        }
    }

    /// Consume the settlement, returning the top-up.
    #[must_use]
    pub fn into_top_up(self) -> TopUp {
        match self {
            Self::Credited { top_up, .. } | Self::AlreadyVerified(top_up) => top_up,
        }
    }
}

/// The storage trait defining all database operations.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Wallet Operations
    // =========================================================================

    /// Get the facility's wallet, creating an empty one if absent.
    ///
    /// Concurrent calls for the same facility create exactly one wallet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn ensure_wallet(&self, facility_id: FacilityId, currency: &str) -> Result<Wallet>;

    /// Get a wallet without locking or creating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_wallet(&self, facility_id: FacilityId) -> Result<Option<Wallet>>;

    /// Apply a posting to the facility's wallet and append its ledger entry,
    /// atomically and under the wallet lock.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the wallet doesn't exist.
    /// - `StoreError::Domain` with `InsufficientBalance` if a deduction exceeds the balance.
    /// - `StoreError::Conflict` if the wallet lock could not be acquired in time.
    async fn post(&self, facility_id: FacilityId, posting: Posting) -> Result<LedgerEntry>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// List a facility's ledger entries, newest first.
    ///
    /// The query is expected to be validated already.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_entries(
        &self,
        facility_id: FacilityId,
        query: &LedgerQuery,
    ) -> Result<Vec<LedgerEntry>>;

    /// All of a facility's ledger entries in sequence order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn ledger_history(&self, facility_id: FacilityId) -> Result<Vec<LedgerEntry>>;

    // =========================================================================
    // Top-up Operations
    // =========================================================================

    /// Insert a new top-up and register its gateway reference.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the reference is already taken.
    async fn insert_top_up(&self, top_up: &TopUp) -> Result<()>;

    /// Get a top-up by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_top_up(&self, top_up_id: TopUpId) -> Result<Option<TopUp>>;

    /// Resolve any reference ever issued for a top-up.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_top_up_by_reference(&self, reference: &str) -> Result<Option<TopUp>>;

    /// List a facility's top-ups, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_top_ups(
        &self,
        facility_id: FacilityId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TopUp>>;

    /// Apply a transition to a top-up under its lock.
    ///
    /// A `Reissue` also registers the new reference; earlier references keep
    /// resolving to the same top-up.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the top-up doesn't exist.
    /// - `StoreError::Domain` with `AlreadyTerminal` if the transition is not allowed.
    /// - `StoreError::Conflict` if a reissued reference is already taken.
    async fn transition_top_up(
        &self,
        top_up_id: TopUpId,
        transition: TopUpTransition,
    ) -> Result<TopUp>;

    /// Mark a pending top-up verified and credit its wallet with the confirmed
    /// amount, in one transaction.
    ///
    /// The top-up is re-read under its lock. If it is already verified nothing
    /// is written and [`Settlement::AlreadyVerified`] is returned.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the top-up doesn't exist.
    /// - `StoreError::Domain` with `AlreadyTerminal` if it is failed or cancelled.
    async fn settle_top_up(&self, top_up_id: TopUpId, amount: Amount) -> Result<Settlement>;

    // =========================================================================
    // Pricing Operations
    // =========================================================================

    /// Insert or replace the price of an analysis type.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_pricing(&self, config: &PricingConfig) -> Result<()>;

    /// Get the stored price of an analysis type, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_pricing(&self, analysis_type: AnalysisType) -> Result<Option<PricingConfig>>;

    /// All stored prices.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_pricing(&self) -> Result<Vec<PricingConfig>>;
}

/// Build the ledger posting for a top-up settlement.
fn settlement_posting(top_up: &TopUp, amount: Amount) -> Posting {
    let mut metadata = facility_wallet_core::Metadata::new();
    metadata.insert(
        "gateway_reference".to_string(),
        top_up.gateway_reference.clone().into(),
    );
    Posting::credit(facility_wallet_core::CreditKind::Topup, amount, TOP_UP_DESCRIPTION)
        .with_reference(Some(top_up.id.to_string()))
        .with_metadata(metadata)
}
