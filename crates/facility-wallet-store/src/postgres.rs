//! PostgreSQL storage implementation.
//!
//! Mutations run in one transaction that takes `SELECT ... FOR UPDATE` row
//! locks in the same order as the `RocksDB` backend (top-up, then wallet).
//! Row locks under the default READ COMMITTED isolation are enough: every
//! check that guards a write is made on a locked row.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use facility_wallet_core::{
    AnalysisType, Amount, FacilityId, LedgerEntry, LedgerQuery, Metadata, Posting, PricingConfig,
    TopUp, TopUpId, TopUpStatus, TopUpTransition, Wallet, WalletId,
};

use crate::error::{Result, StoreError};
use crate::{settlement_posting, Settlement, Store};

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout_ms: u64,
}

// =============================================================================
// Rows
// =============================================================================

fn decode<T: FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| StoreError::Serialization(format!("invalid {what}: {value}")))
}

fn to_i64(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::Serialization(format!("{what} out of range")))
}

fn to_usize_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[derive(FromRow)]
struct WalletRow {
    id: Uuid,
    facility_id: Uuid,
    balance: Decimal,
    currency: String,
    entry_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = StoreError;

    fn try_from(row: WalletRow) -> Result<Self> {
        Ok(Self {
            id: WalletId::from_uuid(row.id),
            facility_id: FacilityId::from_uuid(row.facility_id),
            balance: row.balance,
            currency: row.currency,
            entry_count: u64::try_from(row.entry_count)
                .map_err(|_| StoreError::Serialization("negative entry count".into()))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct LedgerRow {
    id: String,
    facility_id: Uuid,
    sequence: i64,
    entry_type: String,
    amount: Decimal,
    balance_before: Decimal,
    balance_after: Decimal,
    description: String,
    reference_id: Option<String>,
    status: String,
    metadata: Json<Metadata>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: LedgerRow) -> Result<Self> {
        Ok(Self {
            id: decode(&row.id, "ledger entry id")?,
            facility_id: FacilityId::from_uuid(row.facility_id),
            sequence: u64::try_from(row.sequence)
                .map_err(|_| StoreError::Serialization("negative sequence".into()))?,
            entry_type: decode(&row.entry_type, "entry type")?,
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            description: row.description,
            reference_id: row.reference_id,
            status: decode(&row.status, "entry status")?,
            metadata: row.metadata.0,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct TopUpRow {
    id: String,
    facility_id: Uuid,
    amount_requested: Decimal,
    amount_received: Option<Decimal>,
    currency: String,
    payer_email: String,
    status: String,
    gateway_reference: String,
    attempts: i32,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    verified_at: Option<DateTime<Utc>>,
}

impl TryFrom<TopUpRow> for TopUp {
    type Error = StoreError;

    fn try_from(row: TopUpRow) -> Result<Self> {
        Ok(Self {
            id: decode(&row.id, "top-up id")?,
            facility_id: FacilityId::from_uuid(row.facility_id),
            amount_requested: row.amount_requested,
            amount_received: row.amount_received,
            currency: row.currency,
            payer_email: row.payer_email,
            status: decode(&row.status, "top-up status")?,
            gateway_reference: row.gateway_reference,
            attempts: u32::try_from(row.attempts)
                .map_err(|_| StoreError::Serialization("negative attempts".into()))?,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            verified_at: row.verified_at,
        })
    }
}

#[derive(FromRow)]
struct PricingRow {
    analysis_type: String,
    price_per_analysis: Decimal,
    currency: String,
    active: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PricingRow> for PricingConfig {
    type Error = StoreError;

    fn try_from(row: PricingRow) -> Result<Self> {
        Ok(Self {
            analysis_type: decode(&row.analysis_type, "analysis type")?,
            price_per_analysis: row.price_per_analysis,
            currency: row.currency,
            active: row.active,
            updated_at: row.updated_at,
        })
    }
}

const WALLET_COLUMNS: &str =
    "id, facility_id, balance, currency, entry_count, created_at, updated_at";
const LEDGER_COLUMNS: &str = "id, facility_id, sequence, entry_type, amount, balance_before, \
     balance_after, description, reference_id, status, metadata, created_at";
const TOP_UP_COLUMNS: &str = "id, facility_id, amount_requested, amount_received, currency, \
     payer_email, status, gateway_reference, attempts, failure_reason, created_at, updated_at, \
     verified_at";

// =============================================================================
// Connection-level helpers
// =============================================================================

async fn insert_wallet_if_absent(conn: &mut PgConnection, wallet: &Wallet) -> Result<()> {
    sqlx::query(
        "INSERT INTO wallets (id, facility_id, balance, currency, entry_count, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (facility_id) DO NOTHING",
    )
    .bind(wallet.id.as_uuid())
    .bind(wallet.facility_id.as_uuid())
    .bind(wallet.balance)
    .bind(&wallet.currency)
    .bind(to_i64(wallet.entry_count, "entry count")?)
    .bind(wallet.created_at)
    .bind(wallet.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn lock_wallet(conn: &mut PgConnection, facility_id: FacilityId) -> Result<Option<Wallet>> {
    sqlx::query_as::<_, WalletRow>(&format!(
        "SELECT {WALLET_COLUMNS} FROM wallets WHERE facility_id = $1 FOR UPDATE"
    ))
    .bind(facility_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?
    .map(Wallet::try_from)
    .transpose()
}

async fn write_posting(conn: &mut PgConnection, wallet: &Wallet, entry: &LedgerEntry) -> Result<()> {
    sqlx::query(
        "UPDATE wallets SET balance = $2, entry_count = $3, updated_at = $4 WHERE facility_id = $1",
    )
    .bind(wallet.facility_id.as_uuid())
    .bind(wallet.balance)
    .bind(to_i64(wallet.entry_count, "entry count")?)
    .bind(wallet.updated_at)
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "INSERT INTO ledger_entries ({LEDGER_COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
    ))
    .bind(entry.id.to_string())
    .bind(entry.facility_id.as_uuid())
    .bind(to_i64(entry.sequence, "sequence")?)
    .bind(entry.entry_type.as_str())
    .bind(entry.amount)
    .bind(entry.balance_before)
    .bind(entry.balance_after)
    .bind(&entry.description)
    .bind(entry.reference_id.as_deref())
    .bind(entry.status.as_str())
    .bind(Json(&entry.metadata))
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn lock_top_up(conn: &mut PgConnection, top_up_id: TopUpId) -> Result<TopUp> {
    sqlx::query_as::<_, TopUpRow>(&format!(
        "SELECT {TOP_UP_COLUMNS} FROM top_ups WHERE id = $1 FOR UPDATE"
    ))
    .bind(top_up_id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::not_found("top-up", top_up_id))
    .and_then(TopUp::try_from)
}

async fn update_top_up(conn: &mut PgConnection, top_up: &TopUp) -> Result<()> {
    sqlx::query(
        "UPDATE top_ups SET amount_received = $2, status = $3, gateway_reference = $4,
             attempts = $5, failure_reason = $6, updated_at = $7, verified_at = $8
         WHERE id = $1",
    )
    .bind(top_up.id.to_string())
    .bind(top_up.amount_received)
    .bind(top_up.status.as_str())
    .bind(&top_up.gateway_reference)
    .bind(i32::try_from(top_up.attempts).unwrap_or(i32::MAX))
    .bind(top_up.failure_reason.as_deref())
    .bind(top_up.updated_at)
    .bind(top_up.verified_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_reference(conn: &mut PgConnection, reference: &str, top_up_id: TopUpId) -> Result<()> {
    sqlx::query("INSERT INTO top_up_references (reference, top_up_id) VALUES ($1, $2)")
        .bind(reference)
        .bind(top_up_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// =============================================================================
// Store
// =============================================================================

impl PgStore {
    /// Connect to PostgreSQL.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be created.
    pub async fn connect(database_url: &str, lock_timeout_ms: u64) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;
        Ok(Self::from_pool(pool, lock_timeout_ms))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            pool,
            lock_timeout_ms,
        }
    }

    /// Apply the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Begin a transaction with the configured lock timeout.
    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms);
        sqlx::query(&statement).execute(&mut *tx).await?;
        Ok(tx)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ensure_wallet(&self, facility_id: FacilityId, currency: &str) -> Result<Wallet> {
        if let Some(wallet) = self.get_wallet(facility_id).await? {
            return Ok(wallet);
        }

        let mut conn = self.pool.acquire().await?;
        insert_wallet_if_absent(&mut conn, &Wallet::new(facility_id, currency)).await?;

        let wallet = self
            .get_wallet(facility_id)
            .await?
            .ok_or_else(|| StoreError::not_found("wallet", facility_id))?;
        debug!(facility_id = %facility_id, "Ensured wallet");
        Ok(wallet)
    }

    async fn get_wallet(&self, facility_id: FacilityId) -> Result<Option<Wallet>> {
        sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE facility_id = $1"
        ))
        .bind(facility_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Wallet::try_from)
        .transpose()
    }

    async fn post(&self, facility_id: FacilityId, posting: Posting) -> Result<LedgerEntry> {
        let mut tx = self.begin().await?;

        let mut wallet = lock_wallet(&mut tx, facility_id)
            .await?
            .ok_or_else(|| StoreError::not_found("wallet", facility_id))?;
        let entry = wallet.post(posting, Utc::now())?;
        write_posting(&mut tx, &wallet, &entry).await?;

        tx.commit().await?;
        Ok(entry)
    }

    async fn list_entries(
        &self,
        facility_id: FacilityId,
        query: &LedgerQuery,
    ) -> Result<Vec<LedgerEntry>> {
        sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries
             WHERE facility_id = $1
               AND ($2::timestamptz IS NULL OR created_at >= $2)
               AND ($3::timestamptz IS NULL OR created_at <= $3)
             ORDER BY sequence DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(facility_id.as_uuid())
        .bind(query.from)
        .bind(query.to)
        .bind(to_usize_i64(query.limit))
        .bind(to_usize_i64(query.offset))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(LedgerEntry::try_from)
        .collect()
    }

    async fn ledger_history(&self, facility_id: FacilityId) -> Result<Vec<LedgerEntry>> {
        sqlx::query_as::<_, LedgerRow>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE facility_id = $1 ORDER BY sequence"
        ))
        .bind(facility_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(LedgerEntry::try_from)
        .collect()
    }

    async fn insert_top_up(&self, top_up: &TopUp) -> Result<()> {
        let mut tx = self.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO top_ups ({TOP_UP_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(top_up.id.to_string())
        .bind(top_up.facility_id.as_uuid())
        .bind(top_up.amount_requested)
        .bind(top_up.amount_received)
        .bind(&top_up.currency)
        .bind(&top_up.payer_email)
        .bind(top_up.status.as_str())
        .bind(&top_up.gateway_reference)
        .bind(i32::try_from(top_up.attempts).unwrap_or(i32::MAX))
        .bind(top_up.failure_reason.as_deref())
        .bind(top_up.created_at)
        .bind(top_up.updated_at)
        .bind(top_up.verified_at)
        .execute(&mut *tx)
        .await?;
        insert_reference(&mut tx, &top_up.gateway_reference, top_up.id).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_top_up(&self, top_up_id: TopUpId) -> Result<Option<TopUp>> {
        sqlx::query_as::<_, TopUpRow>(&format!(
            "SELECT {TOP_UP_COLUMNS} FROM top_ups WHERE id = $1"
        ))
        .bind(top_up_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .map(TopUp::try_from)
        .transpose()
    }

    async fn find_top_up_by_reference(&self, reference: &str) -> Result<Option<TopUp>> {
        let top_up_id: Option<String> =
            sqlx::query_scalar("SELECT top_up_id FROM top_up_references WHERE reference = $1")
                .bind(reference)
                .fetch_optional(&self.pool)
                .await?;

        match top_up_id {
            Some(id) => self.get_top_up(decode(&id, "top-up id")?).await,
            None => Ok(None),
        }
    }

    async fn list_top_ups(
        &self,
        facility_id: FacilityId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TopUp>> {
        sqlx::query_as::<_, TopUpRow>(&format!(
            "SELECT {TOP_UP_COLUMNS} FROM top_ups
             WHERE facility_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(facility_id.as_uuid())
        .bind(to_usize_i64(limit))
        .bind(to_usize_i64(offset))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TopUp::try_from)
        .collect()
    }

    async fn transition_top_up(
        &self,
        top_up_id: TopUpId,
        transition: TopUpTransition,
    ) -> Result<TopUp> {
        let mut tx = self.begin().await?;
        let mut top_up = lock_top_up(&mut tx, top_up_id).await?;

        if let TopUpTransition::Reissue { reference } = &transition {
            insert_reference(&mut tx, reference, top_up_id).await?;
        }

        let name = transition.name();
        top_up.apply(transition, Utc::now())?;
        update_top_up(&mut tx, &top_up).await?;

        tx.commit().await?;
        debug!(top_up_id = %top_up_id, transition = name, status = %top_up.status, "Applied top-up transition");
        Ok(top_up)
    }

    async fn settle_top_up(&self, top_up_id: TopUpId, amount: Amount) -> Result<Settlement> {
        let mut tx = self.begin().await?;

        let mut top_up = lock_top_up(&mut tx, top_up_id).await?;
        if top_up.status == TopUpStatus::Verified {
            return Ok(Settlement::AlreadyVerified(top_up));
        }

        let now = Utc::now();
        top_up.mark_verified(amount, now)?;

        insert_wallet_if_absent(&mut tx, &Wallet::new(top_up.facility_id, top_up.currency.clone()))
            .await?;
        let mut wallet = lock_wallet(&mut tx, top_up.facility_id)
            .await?
            .ok_or_else(|| StoreError::not_found("wallet", top_up.facility_id))?;
        let entry = wallet.post(settlement_posting(&top_up, amount), now)?;

        write_posting(&mut tx, &wallet, &entry).await?;
        update_top_up(&mut tx, &top_up).await?;

        tx.commit().await?;
        Ok(Settlement::Credited { top_up, entry })
    }

    async fn put_pricing(&self, config: &PricingConfig) -> Result<()> {
        sqlx::query(
            "INSERT INTO pricing_config (analysis_type, price_per_analysis, currency, active, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (analysis_type) DO UPDATE SET
                 price_per_analysis = EXCLUDED.price_per_analysis,
                 currency = EXCLUDED.currency,
                 active = EXCLUDED.active,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(config.analysis_type.as_str())
        .bind(config.price_per_analysis)
        .bind(&config.currency)
        .bind(config.active)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_pricing(&self, analysis_type: AnalysisType) -> Result<Option<PricingConfig>> {
        sqlx::query_as::<_, PricingRow>(
            "SELECT analysis_type, price_per_analysis, currency, active, updated_at
             FROM pricing_config WHERE analysis_type = $1",
        )
        .bind(analysis_type.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(PricingConfig::try_from)
        .transpose()
    }

    async fn list_pricing(&self) -> Result<Vec<PricingConfig>> {
        sqlx::query_as::<_, PricingRow>(
            "SELECT analysis_type, price_per_analysis, currency, active, updated_at
             FROM pricing_config ORDER BY analysis_type",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PricingConfig::try_from)
        .collect()
    }
}
