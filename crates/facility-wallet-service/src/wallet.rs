//! Wallet operations exposed to handlers.

use std::sync::Arc;

use facility_wallet_core::{
    replay, Amount, CreditKind, FacilityId, LedgerEntry, LedgerQuery, Metadata, Posting, Price,
    Result, Wallet, WalletError,
};
use facility_wallet_store::Store;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::pricing::PricingResolver;

/// Result of charging a facility for an analysis.
#[derive(Debug, Clone)]
pub struct AnalysisCharge {
    /// The price that was applied.
    pub price: Price,
    /// The deduction entry.
    pub entry: LedgerEntry,
}

/// Ledger replay report for one facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// The facility.
    pub facility_id: FacilityId,
    /// Stored wallet balance.
    pub balance: Decimal,
    /// Balance obtained by replaying the ledger, if the ledger is coherent.
    pub replayed_balance: Option<Decimal>,
    /// Number of ledger entries.
    pub entries: usize,
    /// Whether the stored and replayed balances agree.
    pub consistent: bool,
    /// The first ledger inconsistency, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

/// Balance, debit, credit and history operations for facility wallets.
#[derive(Clone)]
pub struct WalletService {
    store: Arc<dyn Store>,
    pricing: PricingResolver,
    currency: String,
}

impl WalletService {
    /// Create the service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, pricing: PricingResolver, currency: impl Into<String>) -> Self {
        Self {
            store,
            pricing,
            currency: currency.into(),
        }
    }

    /// The wallet currency.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Get the facility's wallet, creating an empty one on first access.
    pub async fn ensure_wallet(&self, facility_id: FacilityId) -> Result<Wallet> {
        Ok(self.store.ensure_wallet(facility_id, &self.currency).await?)
    }

    /// Current balance. A facility without a wallet has a zero balance.
    pub async fn get_balance(&self, facility_id: FacilityId) -> Result<Decimal> {
        Ok(self
            .store
            .get_wallet(facility_id)
            .await?
            .map_or(Decimal::ZERO, |wallet| wallet.balance))
    }

    /// Debit the wallet and record a `deduction` entry.
    pub async fn debit(
        &self,
        facility_id: FacilityId,
        amount: Amount,
        description: &str,
        reference_id: Option<String>,
        metadata: Metadata,
    ) -> Result<LedgerEntry> {
        self.ensure_wallet(facility_id).await?;

        let posting = Posting::debit(amount, description)
            .with_reference(reference_id)
            .with_metadata(metadata);

        match self.store.post(facility_id, posting).await {
            Ok(entry) => {
                tracing::info!(
                    facility_id = %facility_id,
                    amount = %amount,
                    balance_after = %entry.balance_after,
                    sequence = %entry.sequence,
                    "Wallet debited"
                );
                Ok(entry)
            }
            Err(e) => {
                let err = WalletError::from(e);
                if let WalletError::InsufficientBalance { balance, required } = &err {
                    tracing::info!(
                        facility_id = %facility_id,
                        balance = %balance,
                        required = %required,
                        "Debit refused: insufficient balance"
                    );
                }
                Err(err)
            }
        }
    }

    /// Credit the wallet with a `topup`, `refund` or `adjustment` entry.
    pub async fn credit(
        &self,
        facility_id: FacilityId,
        kind: CreditKind,
        amount: Amount,
        description: &str,
        reference_id: Option<String>,
        metadata: Metadata,
    ) -> Result<LedgerEntry> {
        self.ensure_wallet(facility_id).await?;

        let posting = Posting::credit(kind, amount, description)
            .with_reference(reference_id)
            .with_metadata(metadata);
        let entry = self.store.post(facility_id, posting).await?;

        tracing::info!(
            facility_id = %facility_id,
            entry_type = %entry.entry_type.as_str(),
            amount = %amount,
            balance_after = %entry.balance_after,
            sequence = %entry.sequence,
            "Wallet credited"
        );

        Ok(entry)
    }

    /// Ledger entries, newest first.
    pub async fn list_entries(
        &self,
        facility_id: FacilityId,
        query: LedgerQuery,
    ) -> Result<Vec<LedgerEntry>> {
        let query = query.validated()?;
        Ok(self.store.list_entries(facility_id, &query).await?)
    }

    /// Charge the wallet the current price of an analysis.
    pub async fn charge_analysis(
        &self,
        facility_id: FacilityId,
        analysis_type: &str,
        analysis_id: Option<String>,
    ) -> Result<AnalysisCharge> {
        let price = self.pricing.get_price(analysis_type).await?;
        if !price.currency.eq_ignore_ascii_case(&self.currency) {
            return Err(WalletError::Validation(format!(
                "price currency {} does not match wallet currency {}",
                price.currency, self.currency
            )));
        }

        let amount = Amount::new(price.amount)?;
        let mut metadata = Metadata::new();
        metadata.insert(
            "analysis_type".to_string(),
            price.analysis_type.as_str().into(),
        );

        let description = format!("{} analysis", price.analysis_type);
        let entry = self
            .debit(facility_id, amount, &description, analysis_id, metadata)
            .await?;

        Ok(AnalysisCharge { price, entry })
    }

    /// Replay the ledger and compare it with the stored balance.
    pub async fn reconcile(&self, facility_id: FacilityId) -> Result<Reconciliation> {
        let wallet = self
            .store
            .get_wallet(facility_id)
            .await?
            .ok_or_else(|| WalletError::not_found("wallet", facility_id))?;
        let history = self.store.ledger_history(facility_id).await?;

        let (replayed_balance, problem) = match replay(&history) {
            Ok(balance) => (Some(balance), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let consistent = replayed_balance == Some(wallet.balance)
            && u64::try_from(history.len()).is_ok_and(|n| n == wallet.entry_count);

        if consistent {
            tracing::debug!(facility_id = %facility_id, "Ledger reconciles");
        } else {
            tracing::warn!(
                facility_id = %facility_id,
                balance = %wallet.balance,
                replayed = ?replayed_balance,
                problem = ?problem,
                "Ledger does not reconcile with wallet balance"
            );
        }

        Ok(Reconciliation {
            facility_id,
            balance: wallet.balance,
            replayed_balance,
            entries: history.len(),
            consistent,
            problem,
        })
    }
}
