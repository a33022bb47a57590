//! Coin balance ledger.
//!
//! Every mutation follows the same shape: read the account, append a
//! `Pending` journal row, write the new account state conditionally on the
//! version observed at read time, then flip the row to `Success`. A losing
//! write flips its row to `Failed` and reports a conflict; the retry
//! executor restarts the whole cycle on fresh state. No partial account
//! state is ever visible — the account row either moved wholesale or not
//! at all.

use std::sync::Arc;

use futures::FutureExt;

use guild_economy_core::{
    BalanceAccount, BalanceView, BusinessRef, CoinTransaction, EconomyError, IdSource, Result,
    TransactionId, TxStatus, UserId,
};
use guild_economy_store::{CasOutcome, Store};

use crate::clock::Clock;
use crate::retry::{run_with_retry, Attempt, RetryPolicy};

/// Orchestrates coin grants, admin adjustments, and transfers.
#[derive(Clone)]
pub struct BalanceLedger {
    store: Arc<dyn Store>,
    ids: Arc<dyn IdSource>,
    clock: Arc<dyn Clock>,
}

impl BalanceLedger {
    /// Create a ledger over the given collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, ids: Arc<dyn IdSource>, clock: Arc<dyn Clock>) -> Self {
        Self { store, ids, clock }
    }

    /// Grant coins to a user.
    ///
    /// # Errors
    ///
    /// - `Validation` if `amount <= 0` or `category` is blank.
    /// - `Conflict` if the version race persisted through the retry budget.
    /// - `Storage` on infrastructure failure.
    pub async fn grant_coin(
        &self,
        user_id: UserId,
        amount: i64,
        category: &str,
        business: Option<BusinessRef>,
        note: Option<&str>,
    ) -> Result<TransactionId> {
        if amount <= 0 {
            return Err(EconomyError::Validation(format!(
                "grant amount must be positive, got {amount}"
            )));
        }
        if category.trim().is_empty() {
            return Err(EconomyError::Validation("category must not be empty".into()));
        }

        let transaction_id = run_with_retry(RetryPolicy::COIN, "coin grant", |_| {
            self.try_grant(user_id, amount, category, business.as_ref(), note).boxed()
        })
        .await?;

        tracing::info!(
            user_id = %user_id,
            amount,
            category,
            transaction_id = %transaction_id,
            "coin grant succeeded"
        );
        Ok(transaction_id)
    }

    /// Adjust a user's balance by a signed delta (admin operation).
    ///
    /// # Errors
    ///
    /// - `Validation` if `delta == 0` or `reason` is blank.
    /// - `InsufficientBalance` if a debit exceeds the spendable balance; no
    ///   write is attempted.
    /// - `Conflict` after the retry budget, `Storage` on infrastructure
    ///   failure.
    pub async fn admin_adjust(
        &self,
        user_id: UserId,
        delta: i64,
        reason: &str,
        operator: UserId,
    ) -> Result<TransactionId> {
        if delta == 0 {
            return Err(EconomyError::Validation("adjustment delta must be non-zero".into()));
        }
        if reason.trim().is_empty() {
            return Err(EconomyError::Validation("adjustment reason must not be empty".into()));
        }

        let transaction_id = run_with_retry(RetryPolicy::COIN, "admin balance adjustment", |_| {
            self.try_admin_adjust(user_id, delta, reason, operator).boxed()
        })
        .await?;

        tracing::info!(
            user_id = %user_id,
            delta,
            operator = %operator,
            transaction_id = %transaction_id,
            "admin balance adjustment succeeded"
        );
        Ok(transaction_id)
    }

    /// Move coins between two users.
    ///
    /// The payer and payee rows are two independent conditional writes; if
    /// the payee write keeps losing after the payer already committed, the
    /// journal row ends `Failed` with the debit applied — an auditable
    /// partial application, reconciled out of band.
    ///
    /// # Errors
    ///
    /// - `Validation` for self-transfer or non-positive amount.
    /// - `InsufficientBalance` if the payer cannot cover the amount.
    /// - `Conflict` after the retry budget, `Storage` on infrastructure
    ///   failure.
    pub async fn transfer(
        &self,
        from_user: UserId,
        to_user: UserId,
        amount: i64,
        note: Option<&str>,
    ) -> Result<TransactionId> {
        if from_user == to_user {
            return Err(EconomyError::Validation("cannot transfer to yourself".into()));
        }
        if amount <= 0 {
            return Err(EconomyError::Validation(format!(
                "transfer amount must be positive, got {amount}"
            )));
        }

        let transaction_id = run_with_retry(RetryPolicy::COIN, "transfer", |_| {
            self.try_transfer(from_user, to_user, amount, note).boxed()
        })
        .await?;

        tracing::info!(
            from_user = %from_user,
            to_user = %to_user,
            amount,
            transaction_id = %transaction_id,
            "transfer succeeded"
        );
        Ok(transaction_id)
    }

    /// Read a user's balance, initializing the account on first access.
    ///
    /// Does not participate in the compare-and-swap path; the view may be
    /// slightly stale under concurrent writers.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn balance(&self, user_id: UserId) -> Result<BalanceView> {
        let account = self.ensure_account(user_id)?;
        Ok(BalanceView::from(&account))
    }

    /// List a user's coin journal, newest first. `limit` is clamped to 100.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn transactions(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CoinTransaction>> {
        Ok(self
            .store
            .coin_transactions_by_user(&user_id, limit.min(100), offset)?)
    }

    /// Get the account row, creating a zeroed one if absent.
    pub(crate) fn ensure_account(&self, user_id: UserId) -> Result<BalanceAccount> {
        if let Some(account) = self.store.balance_account(&user_id)? {
            return Ok(account);
        }
        tracing::info!(user_id = %user_id, "initializing balance account");
        Ok(self
            .store
            .create_balance_account_if_absent(BalanceAccount::new(user_id, self.clock.now()))?)
    }

    /// One grant attempt: pending row, guarded write, terminal flip.
    async fn try_grant(
        &self,
        user_id: UserId,
        amount: i64,
        category: &str,
        business: Option<&BusinessRef>,
        note: Option<&str>,
    ) -> Result<Attempt<TransactionId>> {
        let account = self.ensure_account(user_id)?;
        let now = self.clock.now();

        let transaction = CoinTransaction::grant(
            self.ids.next_transaction_id(),
            user_id,
            amount,
            category,
            business.cloned(),
            account.balance,
            note.map(str::to_owned),
            now,
        );
        self.store.append_coin_transaction(&transaction)?;

        let mut updated = account.clone();
        updated.balance += amount;
        updated.total_earned += amount;
        updated.version += 1;
        updated.audit.touch(now);

        self.commit(transaction.id, &updated, account.version, account.balance)
    }

    /// One admin-adjustment attempt.
    async fn try_admin_adjust(
        &self,
        user_id: UserId,
        delta: i64,
        reason: &str,
        operator: UserId,
    ) -> Result<Attempt<TransactionId>> {
        let account = self.ensure_account(user_id)?;
        let now = self.clock.now();

        if delta < 0 && !account.has_sufficient_balance(-delta) {
            return Err(EconomyError::InsufficientBalance {
                balance: account.balance,
                required: -delta,
            });
        }

        let id = self.ids.next_transaction_id();
        let transaction = if delta > 0 {
            CoinTransaction::grant(
                id,
                user_id,
                delta,
                "ADMIN_ADJUST",
                None,
                account.balance,
                Some(reason.to_owned()),
                now,
            )
        } else {
            CoinTransaction::deduction(
                id,
                user_id,
                -delta,
                "ADMIN_ADJUST",
                None,
                account.balance,
                Some(reason.to_owned()),
                now,
            )
        }
        .with_operator(operator);
        self.store.append_coin_transaction(&transaction)?;

        let mut updated = account.clone();
        updated.balance += delta;
        if delta > 0 {
            updated.total_earned += delta;
        } else {
            updated.total_spent += -delta;
        }
        updated.version += 1;
        updated.audit.touch(now);

        self.commit(transaction.id, &updated, account.version, account.balance)
    }

    /// One transfer attempt.
    async fn try_transfer(
        &self,
        from_user: UserId,
        to_user: UserId,
        amount: i64,
        note: Option<&str>,
    ) -> Result<Attempt<TransactionId>> {
        let payer = self.ensure_account(from_user)?;
        let now = self.clock.now();

        if !payer.has_sufficient_balance(amount) {
            return Err(EconomyError::InsufficientBalance {
                balance: payer.balance,
                required: amount,
            });
        }

        let transaction = CoinTransaction::transfer(
            self.ids.next_transaction_id(),
            from_user,
            to_user,
            amount,
            payer.balance,
            note.map(str::to_owned),
            now,
        );
        self.store.append_coin_transaction(&transaction)?;

        let mut debited = payer.clone();
        debited.balance -= amount;
        debited.total_spent += amount;
        debited.total_transferred_out += amount;
        debited.version += 1;
        debited.audit.touch(now);

        if self.store.cas_balance_account(&debited, payer.version)? == CasOutcome::Conflict {
            self.store.finish_coin_transaction(
                &transaction.id,
                TxStatus::Failed,
                payer.balance,
                self.clock.now(),
            )?;
            return Ok(Attempt::Conflict);
        }

        // The payer side committed; the credit commutes, so it gets its own
        // short re-read loop instead of unwinding the debit.
        for _ in 0..RetryPolicy::COIN.max_attempts {
            let payee = self.ensure_account(to_user)?;
            let mut credited = payee.clone();
            credited.balance += amount;
            credited.total_earned += amount;
            credited.total_transferred_in += amount;
            credited.version += 1;
            credited.audit.touch(self.clock.now());

            if self.store.cas_balance_account(&credited, payee.version)?.is_applied() {
                self.store.finish_coin_transaction(
                    &transaction.id,
                    TxStatus::Success,
                    debited.balance,
                    self.clock.now(),
                )?;
                return Ok(Attempt::Done(transaction.id));
            }
        }

        // Partial application: debit committed, credit did not. The failed
        // journal row is the audit trail.
        tracing::error!(
            from_user = %from_user,
            to_user = %to_user,
            amount,
            transaction_id = %transaction.id,
            "transfer credit kept losing its version race after debit committed"
        );
        self.store.finish_coin_transaction(
            &transaction.id,
            TxStatus::Failed,
            debited.balance,
            self.clock.now(),
        )?;
        Err(EconomyError::Conflict {
            attempts: RetryPolicy::COIN.max_attempts,
        })
    }

    /// Apply the guarded account write and resolve the journal row.
    fn commit(
        &self,
        transaction_id: TransactionId,
        updated: &BalanceAccount,
        expected_version: u64,
        balance_before: i64,
    ) -> Result<Attempt<TransactionId>> {
        match self.store.cas_balance_account(updated, expected_version)? {
            CasOutcome::Applied => {
                self.store.finish_coin_transaction(
                    &transaction_id,
                    TxStatus::Success,
                    updated.balance,
                    self.clock.now(),
                )?;
                Ok(Attempt::Done(transaction_id))
            }
            CasOutcome::Conflict => {
                self.store.finish_coin_transaction(
                    &transaction_id,
                    TxStatus::Failed,
                    balance_before,
                    self.clock.now(),
                )?;
                Ok(Attempt::Conflict)
            }
        }
    }
}
