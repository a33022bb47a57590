//! `RocksDB` storage implementation.
//!
//! Values are CBOR-encoded. `RocksDB` has no native conditional write, so
//! every read-check-write sequence (CAS, lazy account creation, counter
//! increments, journal status flips, outbox claims) runs under a store-level
//! write mutex; readers go straight to the database. This keeps the
//! linearization contract of [`Store`] for a single-process deployment,
//! which is the unit this engine targets.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use guild_economy_core::{
    BalanceAccount, CoinTransaction, ExpTransaction, ExperienceAccount, FollowUp, RewardCategory,
    TransactionId, TxStatus, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{CasOutcome, Store};

/// `RocksDB`-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_cbor<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_cbor<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let data = Self::serialize(value)?;
        self.db
            .put_cf(&cf, key, data)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Collect all index keys under a user prefix, oldest first.
    fn user_index_keys(&self, cf_name: &str, user_id: &UserId) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let prefix = keys::user_transactions_prefix(user_id);
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut all_keys = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }
        Ok(all_keys)
    }

    fn scan_accounts<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            accounts.push(Self::deserialize(&value)?);
        }
        Ok(accounts)
    }

    fn counter_value(&self, key: &[u8]) -> Result<i64> {
        let cf = self.cf(cf::DAILY_COUNTERS)?;
        let value = self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(value.map_or(0, |bytes| {
            let mut buf = [0u8; 8];
            if bytes.len() == 8 {
                buf.copy_from_slice(&bytes);
            }
            i64::from_be_bytes(buf)
        }))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Balance Accounts
    // =========================================================================

    fn balance_account(&self, user_id: &UserId) -> Result<Option<BalanceAccount>> {
        self.get_cbor(cf::BALANCE_ACCOUNTS, &keys::account_key(user_id))
    }

    fn create_balance_account_if_absent(
        &self,
        account: BalanceAccount,
    ) -> Result<BalanceAccount> {
        let _guard = self.lock_writes();
        if let Some(existing) = self.balance_account(&account.user_id)? {
            return Ok(existing);
        }
        self.put_cbor(
            cf::BALANCE_ACCOUNTS,
            &keys::account_key(&account.user_id),
            &account,
        )?;
        Ok(account)
    }

    fn cas_balance_account(
        &self,
        updated: &BalanceAccount,
        expected_version: u64,
    ) -> Result<CasOutcome> {
        let _guard = self.lock_writes();
        let current = self
            .balance_account(&updated.user_id)?
            .ok_or(StoreError::NotFound)?;
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict);
        }
        self.put_cbor(
            cf::BALANCE_ACCOUNTS,
            &keys::account_key(&updated.user_id),
            updated,
        )?;
        Ok(CasOutcome::Applied)
    }

    // =========================================================================
    // Experience Accounts
    // =========================================================================

    fn experience_account(&self, user_id: &UserId) -> Result<Option<ExperienceAccount>> {
        self.get_cbor(cf::EXPERIENCE_ACCOUNTS, &keys::account_key(user_id))
    }

    fn create_experience_account_if_absent(
        &self,
        account: ExperienceAccount,
    ) -> Result<ExperienceAccount> {
        let _guard = self.lock_writes();
        if let Some(existing) = self.experience_account(&account.user_id)? {
            return Ok(existing);
        }
        self.put_cbor(
            cf::EXPERIENCE_ACCOUNTS,
            &keys::account_key(&account.user_id),
            &account,
        )?;
        Ok(account)
    }

    fn cas_experience_account(
        &self,
        updated: &ExperienceAccount,
        expected_version: u64,
    ) -> Result<CasOutcome> {
        let _guard = self.lock_writes();
        let current = self
            .experience_account(&updated.user_id)?
            .ok_or(StoreError::NotFound)?;
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict);
        }
        self.put_cbor(
            cf::EXPERIENCE_ACCOUNTS,
            &keys::account_key(&updated.user_id),
            updated,
        )?;
        Ok(CasOutcome::Applied)
    }

    // =========================================================================
    // Coin Journal
    // =========================================================================

    fn append_coin_transaction(&self, transaction: &CoinTransaction) -> Result<()> {
        let cf_tx = self.cf(cf::COIN_TRANSACTIONS)?;
        let cf_index = self.cf(cf::COIN_TX_BY_USER)?;

        let value = Self::serialize(transaction)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_tx, keys::transaction_key(&transaction.id), &value);
        for user in [transaction.from_user, transaction.to_user]
            .into_iter()
            .flatten()
        {
            batch.put_cf(&cf_index, keys::user_transaction_key(&user, &transaction.id), []);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn finish_coin_transaction(
        &self,
        id: &TransactionId,
        status: TxStatus,
        balance_after: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.lock_writes();
        let mut transaction: CoinTransaction = self
            .get_cbor(cf::COIN_TRANSACTIONS, &keys::transaction_key(id))?
            .ok_or(StoreError::NotFound)?;
        transaction.status = status;
        transaction.balance_after = balance_after;
        transaction.finished_at = Some(finished_at);
        self.put_cbor(cf::COIN_TRANSACTIONS, &keys::transaction_key(id), &transaction)
    }

    fn coin_transaction(&self, id: &TransactionId) -> Result<Option<CoinTransaction>> {
        self.get_cbor(cf::COIN_TRANSACTIONS, &keys::transaction_key(id))
    }

    fn coin_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CoinTransaction>> {
        let mut index_keys = self.user_index_keys(cf::COIN_TX_BY_USER, user_id)?;
        index_keys.reverse(); // newest first

        let mut transactions = Vec::new();
        for key in index_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }
            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            if let Some(tx) = self.coin_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }

    fn successful_grant_exists(
        &self,
        business_type: &str,
        business_id: i64,
        user_id: &UserId,
        day: Option<NaiveDate>,
    ) -> Result<bool> {
        for key in self.user_index_keys(cf::COIN_TX_BY_USER, user_id)? {
            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            let Some(tx) = self.coin_transaction(&tx_id)? else {
                continue;
            };
            let matches = tx.status == TxStatus::Success
                && tx.to_user.as_ref() == Some(user_id)
                && tx.business.as_ref().is_some_and(|b| {
                    b.business_type == business_type && b.business_id == business_id
                })
                && day.map_or(true, |d| tx.created_at.date_naive() == d);
            if matches {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn successful_grant_total(
        &self,
        user_id: &UserId,
        category: &str,
        business_types: &[&str],
        day: NaiveDate,
    ) -> Result<i64> {
        let mut total = 0_i64;
        for key in self.user_index_keys(cf::COIN_TX_BY_USER, user_id)? {
            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            let Some(tx) = self.coin_transaction(&tx_id)? else {
                continue;
            };
            let matches = tx.status == TxStatus::Success
                && tx.to_user.as_ref() == Some(user_id)
                && tx.category == category
                && tx.business.as_ref().is_some_and(|b| {
                    business_types.contains(&b.business_type.as_str())
                })
                && tx.created_at.date_naive() == day;
            if matches {
                total += tx.amount;
            }
        }
        Ok(total)
    }

    // =========================================================================
    // Experience Journal
    // =========================================================================

    fn append_exp_transaction(&self, transaction: &ExpTransaction) -> Result<()> {
        let cf_tx = self.cf(cf::EXP_TRANSACTIONS)?;
        let cf_index = self.cf(cf::EXP_TX_BY_USER)?;

        let value = Self::serialize(transaction)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_tx, keys::transaction_key(&transaction.id), &value);
        batch.put_cf(
            &cf_index,
            keys::user_transaction_key(&transaction.user_id, &transaction.id),
            [],
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn exp_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ExpTransaction>> {
        let mut index_keys = self.user_index_keys(cf::EXP_TX_BY_USER, user_id)?;
        index_keys.reverse();

        let mut transactions = Vec::new();
        for key in index_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }
            let tx_id = keys::extract_transaction_id_from_user_key(&key);
            if let Some(tx) =
                self.get_cbor::<ExpTransaction>(cf::EXP_TRANSACTIONS, &keys::transaction_key(&tx_id))?
            {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }

    // =========================================================================
    // Daily Counters
    // =========================================================================

    fn daily_amount(
        &self,
        user_id: &UserId,
        day: NaiveDate,
        category: RewardCategory,
    ) -> Result<i64> {
        self.counter_value(&keys::daily_counter_key(user_id, day, category))
    }

    fn daily_total(&self, user_id: &UserId, day: NaiveDate) -> Result<i64> {
        let cf = self.cf(cf::DAILY_COUNTERS)?;
        let prefix = keys::daily_counter_prefix(user_id, day);
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut total = 0_i64;
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let mut buf = [0u8; 8];
            if value.len() == 8 {
                buf.copy_from_slice(&value);
            }
            total += i64::from_be_bytes(buf);
        }
        Ok(total)
    }

    fn add_daily_amount(
        &self,
        user_id: &UserId,
        day: NaiveDate,
        category: RewardCategory,
        amount: i64,
    ) -> Result<()> {
        let _guard = self.lock_writes();
        let key = keys::daily_counter_key(user_id, day, category);
        let next = self.counter_value(&key)? + amount;
        let cf = self.cf(cf::DAILY_COUNTERS)?;
        self.db
            .put_cf(&cf, key, next.to_be_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // =========================================================================
    // Follow-up Outbox
    // =========================================================================

    fn enqueue_follow_up(&self, item: &FollowUp) -> Result<()> {
        self.put_cbor(cf::OUTBOX, &keys::outbox_key(&item.id), item)
    }

    fn claim_follow_ups(&self, limit: usize) -> Result<Vec<FollowUp>> {
        let _guard = self.lock_writes();
        let cf = self.cf(cf::OUTBOX)?;

        let mut claimed = Vec::new();
        let mut batch = WriteBatch::default();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            if claimed.len() >= limit {
                break;
            }
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            claimed.push(Self::deserialize::<FollowUp>(&value)?);
            batch.delete_cf(&cf, key);
        }
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(claimed)
    }

    fn requeue_follow_up(&self, item: &FollowUp) -> Result<()> {
        let mut requeued = item.clone();
        requeued.attempts += 1;
        self.put_cbor(cf::OUTBOX, &keys::outbox_key(&requeued.id), &requeued)
    }

    fn follow_up_count(&self) -> Result<usize> {
        let cf = self.cf(cf::OUTBOX)?;
        let mut count = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item.map_err(|e| StoreError::Database(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }

    // =========================================================================
    // Leaderboard Scans
    // =========================================================================

    fn top_by_total_exp(&self, offset: usize, limit: usize) -> Result<Vec<ExperienceAccount>> {
        let mut accounts: Vec<ExperienceAccount> = self.scan_accounts(cf::EXPERIENCE_ACCOUNTS)?;
        accounts.sort_by(|a, b| b.total_exp.cmp(&a.total_exp).then(a.user_id.cmp(&b.user_id)));
        Ok(accounts.into_iter().skip(offset).take(limit).collect())
    }

    fn top_by_balance(&self, offset: usize, limit: usize) -> Result<Vec<BalanceAccount>> {
        let mut accounts: Vec<BalanceAccount> = self.scan_accounts(cf::BALANCE_ACCOUNTS)?;
        accounts.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.user_id.cmp(&b.user_id)));
        Ok(accounts.into_iter().skip(offset).take(limit).collect())
    }

    fn experience_account_count(&self) -> Result<usize> {
        Ok(self.scan_accounts::<ExperienceAccount>(cf::EXPERIENCE_ACCOUNTS)?.len())
    }

    fn balance_account_count(&self) -> Result<usize> {
        Ok(self.scan_accounts::<BalanceAccount>(cf::BALANCE_ACCOUNTS)?.len())
    }

    fn experience_rank(&self, user_id: &UserId) -> Result<Option<usize>> {
        let ranked = self.top_by_total_exp(0, usize::MAX)?;
        Ok(ranked.iter().position(|a| a.user_id == *user_id).map(|p| p + 1))
    }

    fn balance_rank(&self, user_id: &UserId) -> Result<Option<usize>> {
        let ranked = self.top_by_balance(0, usize::MAX)?;
        Ok(ranked.iter().position(|a| a.user_id == *user_id).map(|p| p + 1))
    }
}
