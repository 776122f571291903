//! `RocksDB` storage implementation.
//!
//! Uses a pessimistic `TransactionDB`: every read-modify-write locks the keys it
//! reads with `get_for_update`, so concurrent mutations of one wallet serialize
//! while different wallets never contend. `RocksDB` calls block, so each
//! operation runs on the tokio blocking pool.

use std::path::Path;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, ErrorKind, IteratorMode, MultiThreaded,
    Options, Transaction, TransactionDB, TransactionDBOptions,
};
use tracing::{debug, info};

use facility_wallet_core::{
    AnalysisType, Amount, FacilityId, LedgerEntry, LedgerQuery, Posting, PricingConfig, TopUp,
    TopUpId, TopUpStatus, TopUpTransition, Wallet,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{settlement_posting, Settlement, Store};

/// Default time to wait for a row lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT_MS: i64 = 2_000;

type Txn<'db> = Transaction<'db, TransactionDB<MultiThreaded>>;

/// RocksDB-backed storage implementation.
#[derive(Clone)]
pub struct RocksStore {
    inner: Arc<Inner>,
}

struct Inner {
    db: TransactionDB<MultiThreaded>,
    #[cfg(test)]
    fail_ledger_writes: AtomicBool,
}

fn db_err(err: rocksdb::Error) -> StoreError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::Busy | ErrorKind::TryAgain => {
            StoreError::Conflict(err.to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}

/// Serialize a value using CBOR.
fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a value from CBOR.
fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Read a key and take an exclusive lock on it until the transaction ends.
fn locked_get<T: serde::de::DeserializeOwned>(
    txn: &Txn<'_>,
    cf: &Arc<BoundColumnFamily<'_>>,
    key: &[u8],
) -> Result<Option<T>> {
    txn.get_for_update_cf(cf, key, true)
        .map_err(db_err)?
        .map(|data| deserialize(&data))
        .transpose()
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_lock_timeout(path, DEFAULT_LOCK_TIMEOUT_MS)
    }

    /// Open with an explicit row lock timeout in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open_with_lock_timeout<P: AsRef<Path>>(path: P, lock_timeout_ms: i64) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let mut txn_opts = TransactionDBOptions::default();
        txn_opts.set_txn_lock_timeout(lock_timeout_ms);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = TransactionDB::open_cf_descriptors(&opts, &txn_opts, path, cf_descriptors)
            .map_err(db_err)?;

        Ok(Self {
            inner: Arc::new(Inner {
                db,
                #[cfg(test)]
                fail_ledger_writes: AtomicBool::new(false),
            }),
        })
    }

    /// Run a blocking storage operation on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| StoreError::Database(format!("storage task failed: {e}")))?
    }

    #[cfg(test)]
    fn fail_ledger_writes(&self, fail: bool) {
        self.inner.fail_ledger_writes.store(fail, Ordering::SeqCst);
    }
}

impl Inner {
    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Unlocked point read.
    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(db_err)?
            .map(|data| deserialize(&data))
            .transpose()
    }

    /// Stage a wallet update and its ledger entry in `txn`.
    fn write_posting(&self, txn: &Txn<'_>, wallet: &Wallet, entry: &LedgerEntry) -> Result<()> {
        let cf_wallets = self.cf(cf::WALLETS)?;
        let cf_ledger = self.cf(cf::LEDGER)?;

        txn.put_cf(
            &cf_wallets,
            keys::wallet_key(&wallet.facility_id),
            serialize(wallet)?,
        )
        .map_err(db_err)?;

        #[cfg(test)]
        if self.fail_ledger_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected ledger write failure".into()));
        }

        txn.put_cf(
            &cf_ledger,
            keys::ledger_key(&entry.facility_id, entry.sequence),
            serialize(entry)?,
        )
        .map_err(db_err)
    }

    // =========================================================================
    // Wallets and ledger
    // =========================================================================

    fn ensure_wallet(&self, facility_id: FacilityId, currency: &str) -> Result<Wallet> {
        let key = keys::wallet_key(&facility_id);
        if let Some(wallet) = self.get(cf::WALLETS, &key)? {
            return Ok(wallet);
        }

        let cf_wallets = self.cf(cf::WALLETS)?;
        let txn = self.db.transaction();
        // Someone may have created it between the read and the lock.
        if let Some(wallet) = locked_get(&txn, &cf_wallets, &key)? {
            return Ok(wallet);
        }

        let wallet = Wallet::new(facility_id, currency);
        txn.put_cf(&cf_wallets, &key, serialize(&wallet)?)
            .map_err(db_err)?;
        txn.commit().map_err(db_err)?;

        info!(facility_id = %facility_id, currency = %wallet.currency, "Created wallet");
        Ok(wallet)
    }

    fn post(&self, facility_id: FacilityId, posting: Posting) -> Result<LedgerEntry> {
        let cf_wallets = self.cf(cf::WALLETS)?;
        let txn = self.db.transaction();

        let mut wallet: Wallet = locked_get(&txn, &cf_wallets, &keys::wallet_key(&facility_id))?
            .ok_or_else(|| StoreError::not_found("wallet", facility_id))?;

        let entry = wallet.post(posting, Utc::now())?;
        self.write_posting(&txn, &wallet, &entry)?;
        txn.commit().map_err(db_err)?;

        Ok(entry)
    }

    fn list_entries(&self, facility_id: FacilityId, query: &LedgerQuery) -> Result<Vec<LedgerEntry>> {
        let cf_ledger = self.cf(cf::LEDGER)?;
        let prefix = keys::facility_prefix(&facility_id);
        let upper = keys::facility_upper_bound(&facility_id);

        let mut entries = Vec::new();
        let mut skipped = 0;

        // Reverse scan from the end of the facility's key range: newest first.
        let iter = self
            .db
            .iterator_cf(&cf_ledger, IteratorMode::From(&upper, Direction::Reverse));
        for item in iter {
            let (key, value) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) {
                break;
            }

            let entry: LedgerEntry = deserialize(&value)?;
            if !query.matches(&entry) {
                continue;
            }
            if skipped < query.offset {
                skipped += 1;
                continue;
            }

            entries.push(entry);
            if entries.len() >= query.limit {
                break;
            }
        }

        Ok(entries)
    }

    fn ledger_history(&self, facility_id: FacilityId) -> Result<Vec<LedgerEntry>> {
        let cf_ledger = self.cf(cf::LEDGER)?;
        let prefix = keys::facility_prefix(&facility_id);

        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf_ledger, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(deserialize(&value)?);
        }

        Ok(entries)
    }

    // =========================================================================
    // Top-ups
    // =========================================================================

    fn insert_top_up(&self, top_up: &TopUp) -> Result<()> {
        let cf_top_ups = self.cf(cf::TOP_UPS)?;
        let cf_refs = self.cf(cf::TOP_UP_REFERENCES)?;
        let cf_by_facility = self.cf(cf::TOP_UPS_BY_FACILITY)?;

        let ref_key = keys::reference_key(&top_up.gateway_reference);
        let txn = self.db.transaction();

        if txn
            .get_for_update_cf(&cf_refs, &ref_key, true)
            .map_err(db_err)?
            .is_some()
        {
            return Err(StoreError::Conflict(format!(
                "gateway reference already issued: {}",
                top_up.gateway_reference
            )));
        }

        txn.put_cf(&cf_top_ups, keys::top_up_key(&top_up.id), serialize(top_up)?)
            .map_err(db_err)?;
        txn.put_cf(&cf_refs, &ref_key, top_up.id.to_bytes())
            .map_err(db_err)?;
        txn.put_cf(
            &cf_by_facility,
            keys::facility_top_up_key(&top_up.facility_id, &top_up.id),
            b"",
        )
        .map_err(db_err)?;
        txn.commit().map_err(db_err)
    }

    fn get_top_up(&self, top_up_id: TopUpId) -> Result<Option<TopUp>> {
        self.get(cf::TOP_UPS, &keys::top_up_key(&top_up_id))
    }

    fn find_top_up_by_reference(&self, reference: &str) -> Result<Option<TopUp>> {
        let cf_refs = self.cf(cf::TOP_UP_REFERENCES)?;
        let Some(value) = self
            .db
            .get_cf(&cf_refs, keys::reference_key(reference))
            .map_err(db_err)?
        else {
            return Ok(None);
        };

        let top_up_id = keys::top_up_id_from_value(&value).ok_or_else(|| {
            StoreError::Serialization(format!("malformed reference index value for {reference}"))
        })?;
        self.get_top_up(top_up_id)
    }

    fn list_top_ups(&self, facility_id: FacilityId, limit: usize, offset: usize) -> Result<Vec<TopUp>> {
        let cf_by_facility = self.cf(cf::TOP_UPS_BY_FACILITY)?;
        let prefix = keys::facility_prefix(&facility_id);
        let upper = keys::facility_upper_bound(&facility_id);

        let mut top_ups = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf_by_facility, IteratorMode::From(&upper, Direction::Reverse));
        for item in iter.skip(offset) {
            let (key, _) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) || top_ups.len() >= limit {
                break;
            }

            let top_up_id = keys::top_up_id_from_index_key(&key)
                .ok_or_else(|| StoreError::Serialization("malformed top-up index key".into()))?;
            if let Some(top_up) = self.get_top_up(top_up_id)? {
                top_ups.push(top_up);
            }
        }

        Ok(top_ups)
    }

    fn transition_top_up(&self, top_up_id: TopUpId, transition: TopUpTransition) -> Result<TopUp> {
        let cf_top_ups = self.cf(cf::TOP_UPS)?;
        let key = keys::top_up_key(&top_up_id);
        let txn = self.db.transaction();

        let mut top_up: TopUp = locked_get(&txn, &cf_top_ups, &key)?
            .ok_or_else(|| StoreError::not_found("top-up", top_up_id))?;

        if let TopUpTransition::Reissue { reference } = &transition {
            let cf_refs = self.cf(cf::TOP_UP_REFERENCES)?;
            let ref_key = keys::reference_key(reference);
            if txn
                .get_for_update_cf(&cf_refs, &ref_key, true)
                .map_err(db_err)?
                .is_some()
            {
                return Err(StoreError::Conflict(format!(
                    "gateway reference already issued: {reference}"
                )));
            }
            txn.put_cf(&cf_refs, &ref_key, top_up_id.to_bytes())
                .map_err(db_err)?;
        }

        let name = transition.name();
        top_up.apply(transition, Utc::now())?;
        txn.put_cf(&cf_top_ups, &key, serialize(&top_up)?)
            .map_err(db_err)?;
        txn.commit().map_err(db_err)?;

        debug!(top_up_id = %top_up_id, transition = name, status = %top_up.status, "Applied top-up transition");
        Ok(top_up)
    }

    fn settle_top_up(&self, top_up_id: TopUpId, amount: Amount) -> Result<Settlement> {
        let cf_top_ups = self.cf(cf::TOP_UPS)?;
        let cf_wallets = self.cf(cf::WALLETS)?;
        let key = keys::top_up_key(&top_up_id);
        let txn = self.db.transaction();

        // Lock order: top-up, then wallet.
        let mut top_up: TopUp = locked_get(&txn, &cf_top_ups, &key)?
            .ok_or_else(|| StoreError::not_found("top-up", top_up_id))?;
        if top_up.status == TopUpStatus::Verified {
            return Ok(Settlement::AlreadyVerified(top_up));
        }

        let now = Utc::now();
        top_up.mark_verified(amount, now)?;

        let wallet_key = keys::wallet_key(&top_up.facility_id);
        let mut wallet = locked_get(&txn, &cf_wallets, &wallet_key)?
            .unwrap_or_else(|| Wallet::new(top_up.facility_id, top_up.currency.clone()));
        let entry = wallet.post(settlement_posting(&top_up, amount), now)?;

        self.write_posting(&txn, &wallet, &entry)?;
        txn.put_cf(&cf_top_ups, &key, serialize(&top_up)?)
            .map_err(db_err)?;
        txn.commit().map_err(db_err)?;

        Ok(Settlement::Credited { top_up, entry })
    }

    // =========================================================================
    // Pricing
    // =========================================================================

    fn put_pricing(&self, config: &PricingConfig) -> Result<()> {
        let cf_pricing = self.cf(cf::PRICING)?;
        self.db
            .put_cf(&cf_pricing, keys::pricing_key(config.analysis_type), serialize(config)?)
            .map_err(db_err)
    }

    fn get_pricing(&self, analysis_type: AnalysisType) -> Result<Option<PricingConfig>> {
        self.get(cf::PRICING, &keys::pricing_key(analysis_type))
    }

    fn list_pricing(&self) -> Result<Vec<PricingConfig>> {
        let cf_pricing = self.cf(cf::PRICING)?;
        self.db
            .iterator_cf(&cf_pricing, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(db_err)?;
                deserialize(&value)
            })
            .collect()
    }
}

#[async_trait]
impl Store for RocksStore {
    async fn ensure_wallet(&self, facility_id: FacilityId, currency: &str) -> Result<Wallet> {
        let currency = currency.to_string();
        self.run(move |inner| inner.ensure_wallet(facility_id, &currency))
            .await
    }

    async fn get_wallet(&self, facility_id: FacilityId) -> Result<Option<Wallet>> {
        self.run(move |inner| inner.get(cf::WALLETS, &keys::wallet_key(&facility_id)))
            .await
    }

    async fn post(&self, facility_id: FacilityId, posting: Posting) -> Result<LedgerEntry> {
        self.run(move |inner| inner.post(facility_id, posting)).await
    }

    async fn list_entries(
        &self,
        facility_id: FacilityId,
        query: &LedgerQuery,
    ) -> Result<Vec<LedgerEntry>> {
        let query = query.clone();
        self.run(move |inner| inner.list_entries(facility_id, &query))
            .await
    }

    async fn ledger_history(&self, facility_id: FacilityId) -> Result<Vec<LedgerEntry>> {
        self.run(move |inner| inner.ledger_history(facility_id)).await
    }

    async fn insert_top_up(&self, top_up: &TopUp) -> Result<()> {
        let top_up = top_up.clone();
        self.run(move |inner| inner.insert_top_up(&top_up)).await
    }

    async fn get_top_up(&self, top_up_id: TopUpId) -> Result<Option<TopUp>> {
        self.run(move |inner| inner.get_top_up(top_up_id)).await
    }

    async fn find_top_up_by_reference(&self, reference: &str) -> Result<Option<TopUp>> {
        let reference = reference.to_string();
        self.run(move |inner| inner.find_top_up_by_reference(&reference))
            .await
    }

    async fn list_top_ups(
        &self,
        facility_id: FacilityId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TopUp>> {
        self.run(move |inner| inner.list_top_ups(facility_id, limit, offset))
            .await
    }

    async fn transition_top_up(
        &self,
        top_up_id: TopUpId,
        transition: TopUpTransition,
    ) -> Result<TopUp> {
        self.run(move |inner| inner.transition_top_up(top_up_id, transition))
            .await
    }

    async fn settle_top_up(&self, top_up_id: TopUpId, amount: Amount) -> Result<Settlement> {
        self.run(move |inner| inner.settle_top_up(top_up_id, amount))
            .await
    }

    async fn put_pricing(&self, config: &PricingConfig) -> Result<()> {
        let config = config.clone();
        self.run(move |inner| inner.put_pricing(&config)).await
    }

    async fn get_pricing(&self, analysis_type: AnalysisType) -> Result<Option<PricingConfig>> {
        self.run(move |inner| inner.get_pricing(analysis_type)).await
    }

    async fn list_pricing(&self) -> Result<Vec<PricingConfig>> {
        self.run(Inner::list_pricing).await
    }
}
