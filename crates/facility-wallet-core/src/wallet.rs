//! Facility wallet.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};
use crate::ids::{FacilityId, LedgerEntryId, WalletId};
use crate::ledger::{EntryStatus, EntryType, LedgerEntry, Posting};

/// The prepaid balance of one facility.
///
/// Stores mutate a wallet only through [`Wallet::post`], while holding the
/// exclusive lock on the wallet record, and persist the returned entry in the
/// same transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet id.
    pub id: WalletId,

    /// Owning facility (unique).
    pub facility_id: FacilityId,

    /// Current balance. Never negative.
    pub balance: Decimal,

    /// ISO 4217 currency code.
    pub currency: String,

    /// Number of ledger entries appended so far.
    pub entry_count: u64,

    /// When the wallet was created.
    pub created_at: DateTime<Utc>,

    /// When the wallet was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// A new, empty wallet.
    #[must_use]
    pub fn new(facility_id: FacilityId, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WalletId::generate(),
            facility_id,
            balance: Decimal::ZERO,
            currency: currency.into(),
            entry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the balance covers `amount`.
    #[must_use]
    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Apply a posting and return the ledger entry that records it.
    ///
    /// On error the wallet is left untouched.
    ///
    /// # Errors
    ///
    /// - [`WalletError::InsufficientBalance`] if a deduction exceeds the balance.
    /// - [`WalletError::Validation`] if a credit would overflow.
    pub fn post(&mut self, posting: Posting, now: DateTime<Utc>) -> Result<LedgerEntry> {
        let amount = posting.amount.value();
        let balance_before = self.balance;

        let balance_after = match posting.entry_type {
            EntryType::Deduction => {
                if !self.can_cover(amount) {
                    return Err(WalletError::InsufficientBalance {
                        balance: balance_before,
                        required: amount,
                    });
                }
                balance_before - amount
            }
            EntryType::Topup | EntryType::Refund | EntryType::Adjustment => balance_before
                .checked_add(amount)
                .ok_or_else(|| WalletError::Validation("balance overflow".into()))?,
        };

        let sequence = self.entry_count + 1;
        self.balance = balance_after;
        self.entry_count = sequence;
        self.updated_at = now;

        Ok(LedgerEntry {
            id: LedgerEntryId::generate(),
            facility_id: self.facility_id,
            sequence,
            entry_type: posting.entry_type,
            amount,
            balance_before,
            balance_after,
            description: posting.description,
            reference_id: posting.reference_id,
            status: EntryStatus::Completed,
            metadata: posting.metadata,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CreditKind;
    use crate::money::Amount;
    use rust_decimal_macros::dec;

    #[test]
    fn new_wallet_is_empty() {
        let wallet = Wallet::new(FacilityId::generate(), "GHS");
        assert_eq!(wallet.balance, Decimal::ZERO);
        assert_eq!(wallet.entry_count, 0);
        assert_eq!(wallet.currency, "GHS");
    }

    #[test]
    fn debit_on_empty_wallet_is_rejected_without_change() {
        let mut wallet = Wallet::new(FacilityId::generate(), "GHS");
        let before = wallet.clone();

        let err = wallet
            .post(
                Posting::debit(Amount::new(dec!(10)).unwrap(), "analysis"),
                Utc::now(),
            )
            .unwrap_err();

        assert_eq!(
            err,
            WalletError::InsufficientBalance {
                balance: dec!(0),
                required: dec!(10)
            }
        );
        assert_eq!(wallet, before);
    }

    #[test]
    fn credit_then_debit_records_balances() {
        let mut wallet = Wallet::new(FacilityId::generate(), "GHS");
        let now = Utc::now();

        let credit = wallet
            .post(
                Posting::credit(CreditKind::Topup, Amount::new(dec!(100)).unwrap(), "top-up")
                    .with_reference(Some("topup-1".into())),
                now,
            )
            .unwrap();
        assert_eq!(credit.sequence, 1);
        assert_eq!(credit.balance_before, dec!(0));
        assert_eq!(credit.balance_after, dec!(100));
        assert_eq!(credit.reference_id.as_deref(), Some("topup-1"));

        let debit = wallet
            .post(Posting::debit(Amount::new(dec!(100)).unwrap(), "analysis"), now)
            .unwrap();
        assert_eq!(debit.sequence, 2);
        assert_eq!(debit.entry_type, EntryType::Deduction);
        assert_eq!(debit.balance_after, dec!(0));
        assert_eq!(wallet.balance, dec!(0));
    }
}
