//! In-memory storage implementation.
//!
//! The default backend and the test double. All state lives in maps behind
//! a single `RwLock`; conditional writes do their version check under the
//! write lock, which linearizes CAS per account row.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};

use guild_economy_core::{
    BalanceAccount, CoinTransaction, ExpTransaction, ExperienceAccount, FollowUp, RewardCategory,
    TransactionId, TxStatus, UserId,
};

use crate::error::{Result, StoreError};
use crate::{CasOutcome, Store};

#[derive(Default)]
struct Inner {
    balances: HashMap<UserId, BalanceAccount>,
    experiences: HashMap<UserId, ExperienceAccount>,
    coin_txs: HashMap<TransactionId, CoinTransaction>,
    coin_index: HashMap<UserId, Vec<TransactionId>>,
    exp_txs: HashMap<TransactionId, ExpTransaction>,
    exp_index: HashMap<UserId, Vec<TransactionId>>,
    daily: HashMap<(UserId, NaiveDate, RewardCategory), i64>,
    outbox: VecDeque<FollowUp>,
}

/// In-memory `Store` implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        // Every write leaves the maps consistent, so a poisoned lock is
        // still safe to recover.
        self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn page<T: Clone>(ids: &[TransactionId], lookup: impl Fn(&TransactionId) -> Option<T>, limit: usize, offset: usize) -> Vec<T> {
    ids.iter()
        .rev()
        .skip(offset)
        .take(limit)
        .filter_map(|id| lookup(id))
        .collect()
}

impl Store for MemoryStore {
    // =========================================================================
    // Balance Accounts
    // =========================================================================

    fn balance_account(&self, user_id: &UserId) -> Result<Option<BalanceAccount>> {
        Ok(self.read().balances.get(user_id).cloned())
    }

    fn create_balance_account_if_absent(
        &self,
        account: BalanceAccount,
    ) -> Result<BalanceAccount> {
        let mut inner = self.write();
        let stored = inner
            .balances
            .entry(account.user_id)
            .or_insert(account)
            .clone();
        Ok(stored)
    }

    fn cas_balance_account(
        &self,
        updated: &BalanceAccount,
        expected_version: u64,
    ) -> Result<CasOutcome> {
        let mut inner = self.write();
        let Some(current) = inner.balances.get_mut(&updated.user_id) else {
            return Err(StoreError::NotFound);
        };
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict);
        }
        *current = updated.clone();
        Ok(CasOutcome::Applied)
    }

    // =========================================================================
    // Experience Accounts
    // =========================================================================

    fn experience_account(&self, user_id: &UserId) -> Result<Option<ExperienceAccount>> {
        Ok(self.read().experiences.get(user_id).cloned())
    }

    fn create_experience_account_if_absent(
        &self,
        account: ExperienceAccount,
    ) -> Result<ExperienceAccount> {
        let mut inner = self.write();
        let stored = inner
            .experiences
            .entry(account.user_id)
            .or_insert(account)
            .clone();
        Ok(stored)
    }

    fn cas_experience_account(
        &self,
        updated: &ExperienceAccount,
        expected_version: u64,
    ) -> Result<CasOutcome> {
        let mut inner = self.write();
        let Some(current) = inner.experiences.get_mut(&updated.user_id) else {
            return Err(StoreError::NotFound);
        };
        if current.version != expected_version {
            return Ok(CasOutcome::Conflict);
        }
        *current = updated.clone();
        Ok(CasOutcome::Applied)
    }

    // =========================================================================
    // Coin Journal
    // =========================================================================

    fn append_coin_transaction(&self, transaction: &CoinTransaction) -> Result<()> {
        let mut inner = self.write();
        for user in [transaction.from_user, transaction.to_user]
            .into_iter()
            .flatten()
        {
            let index = inner.coin_index.entry(user).or_default();
            if !index.contains(&transaction.id) {
                index.push(transaction.id);
            }
        }
        inner.coin_txs.insert(transaction.id, transaction.clone());
        Ok(())
    }

    fn finish_coin_transaction(
        &self,
        id: &TransactionId,
        status: TxStatus,
        balance_after: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.write();
        let tx = inner.coin_txs.get_mut(id).ok_or(StoreError::NotFound)?;
        tx.status = status;
        tx.balance_after = balance_after;
        tx.finished_at = Some(finished_at);
        Ok(())
    }

    fn coin_transaction(&self, id: &TransactionId) -> Result<Option<CoinTransaction>> {
        Ok(self.read().coin_txs.get(id).cloned())
    }

    fn coin_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CoinTransaction>> {
        let inner = self.read();
        let Some(ids) = inner.coin_index.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(page(ids, |id| inner.coin_txs.get(id).cloned(), limit, offset))
    }

    fn successful_grant_exists(
        &self,
        business_type: &str,
        business_id: i64,
        user_id: &UserId,
        day: Option<NaiveDate>,
    ) -> Result<bool> {
        let inner = self.read();
        let Some(ids) = inner.coin_index.get(user_id) else {
            return Ok(false);
        };
        let exists = ids.iter().rev().filter_map(|id| inner.coin_txs.get(id)).any(|tx| {
            tx.status == TxStatus::Success
                && tx.to_user.as_ref() == Some(user_id)
                && tx.business.as_ref().is_some_and(|b| {
                    b.business_type == business_type && b.business_id == business_id
                })
                && day.map_or(true, |d| tx.created_at.date_naive() == d)
        });
        Ok(exists)
    }

    fn successful_grant_total(
        &self,
        user_id: &UserId,
        category: &str,
        business_types: &[&str],
        day: NaiveDate,
    ) -> Result<i64> {
        let inner = self.read();
        let Some(ids) = inner.coin_index.get(user_id) else {
            return Ok(0);
        };
        let total = ids
            .iter()
            .filter_map(|id| inner.coin_txs.get(id))
            .filter(|tx| {
                tx.status == TxStatus::Success
                    && tx.to_user.as_ref() == Some(user_id)
                    && tx.category == category
                    && tx.business.as_ref().is_some_and(|b| {
                        business_types.contains(&b.business_type.as_str())
                    })
                    && tx.created_at.date_naive() == day
            })
            .map(|tx| tx.amount)
            .sum();
        Ok(total)
    }

    // =========================================================================
    // Experience Journal
    // =========================================================================

    fn append_exp_transaction(&self, transaction: &ExpTransaction) -> Result<()> {
        let mut inner = self.write();
        inner
            .exp_index
            .entry(transaction.user_id)
            .or_default()
            .push(transaction.id);
        inner.exp_txs.insert(transaction.id, transaction.clone());
        Ok(())
    }

    fn exp_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ExpTransaction>> {
        let inner = self.read();
        let Some(ids) = inner.exp_index.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(page(ids, |id| inner.exp_txs.get(id).cloned(), limit, offset))
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
        Ok(self
            .read()
            .daily
            .get(&(*user_id, day, category))
            .copied()
            .unwrap_or(0))
    }

    fn daily_total(&self, user_id: &UserId, day: NaiveDate) -> Result<i64> {
        let inner = self.read();
        Ok(RewardCategory::all()
            .iter()
            .filter_map(|c| inner.daily.get(&(*user_id, day, *c)))
            .sum())
    }

    fn add_daily_amount(
        &self,
        user_id: &UserId,
        day: NaiveDate,
        category: RewardCategory,
        amount: i64,
    ) -> Result<()> {
        *self.write().daily.entry((*user_id, day, category)).or_insert(0) += amount;
        Ok(())
    }

    // =========================================================================
    // Follow-up Outbox
    // =========================================================================

    fn enqueue_follow_up(&self, item: &FollowUp) -> Result<()> {
        self.write().outbox.push_back(item.clone());
        Ok(())
    }

    fn claim_follow_ups(&self, limit: usize) -> Result<Vec<FollowUp>> {
        let mut inner = self.write();
        let take = limit.min(inner.outbox.len());
        Ok(inner.outbox.drain(..take).collect())
    }

    fn requeue_follow_up(&self, item: &FollowUp) -> Result<()> {
        let mut requeued = item.clone();
        requeued.attempts += 1;
        self.write().outbox.push_back(requeued);
        Ok(())
    }

    fn follow_up_count(&self) -> Result<usize> {
        Ok(self.read().outbox.len())
    }

    // =========================================================================
    // Leaderboard Scans
    // =========================================================================

    fn top_by_total_exp(&self, offset: usize, limit: usize) -> Result<Vec<ExperienceAccount>> {
        let inner = self.read();
        let mut accounts: Vec<_> = inner.experiences.values().cloned().collect();
        accounts.sort_by(|a, b| b.total_exp.cmp(&a.total_exp).then(a.user_id.cmp(&b.user_id)));
        Ok(accounts.into_iter().skip(offset).take(limit).collect())
    }

    fn top_by_balance(&self, offset: usize, limit: usize) -> Result<Vec<BalanceAccount>> {
        let inner = self.read();
        let mut accounts: Vec<_> = inner.balances.values().cloned().collect();
        accounts.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.user_id.cmp(&b.user_id)));
        Ok(accounts.into_iter().skip(offset).take(limit).collect())
    }

    fn experience_account_count(&self) -> Result<usize> {
        Ok(self.read().experiences.len())
    }

    fn balance_account_count(&self) -> Result<usize> {
        Ok(self.read().balances.len())
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
