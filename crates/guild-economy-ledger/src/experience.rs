//! Experience ledger with level progression.
//!
//! Grants re-read the account on every attempt, recompute the level from
//! the threshold table, and write conditionally on the version observed at
//! read time. The journal row is appended only after the write commits, so
//! a `(level, total_exp)` pair at rest always agrees with the table.
//!
//! Expected rejections — frozen account, daily cap, exhausted retries —
//! come back as `Ok(false)`, not errors; callers treat "not granted" as a
//! normal outcome.

use std::sync::Arc;

use futures::FutureExt;

use guild_economy_core::{
    BusinessRef, EconomyError, ExpTransaction, ExperienceAccount, ExperienceView, FollowUp,
    FollowUpKind, IdSource, LevelTable, Result, RewardCategory, UserId,
};
use guild_economy_store::{CasOutcome, Store};

use crate::clock::Clock;
use crate::limiter::DailyLimiter;
use crate::retry::{run_with_retry, Attempt, RetryPolicy};

/// Orchestrates experience grants, freezes, and admin adjustments.
#[derive(Clone)]
pub struct ExperienceLedger {
    store: Arc<dyn Store>,
    ids: Arc<dyn IdSource>,
    clock: Arc<dyn Clock>,
    table: Arc<LevelTable>,
    limiter: DailyLimiter,
}

impl ExperienceLedger {
    /// Create a ledger over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        ids: Arc<dyn IdSource>,
        clock: Arc<dyn Clock>,
        table: Arc<LevelTable>,
    ) -> Self {
        let limiter = DailyLimiter::new(store.clone());
        Self {
            store,
            ids,
            clock,
            table,
            limiter,
        }
    }

    /// The threshold table this ledger levels against.
    #[must_use]
    pub fn table(&self) -> &LevelTable {
        &self.table
    }

    /// Grant experience to a user.
    ///
    /// Returns `Ok(true)` when the grant committed; `Ok(false)` when it was
    /// rejected by validation, a frozen account, a daily cap, or a version
    /// race that outlasted the retry budget. A level crossing enqueues
    /// detached follow-ups (coin bonus, notification) that never block or
    /// fail the grant.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures.
    pub async fn grant_experience(
        &self,
        user_id: UserId,
        amount: i64,
        exp_type: &str,
        category: RewardCategory,
        business: Option<BusinessRef>,
        note: Option<&str>,
    ) -> Result<bool> {
        if amount <= 0 {
            tracing::warn!(user_id = %user_id, amount, "experience grant rejected: non-positive amount");
            return Ok(false);
        }
        if exp_type.trim().is_empty() {
            tracing::warn!(user_id = %user_id, "experience grant rejected: empty type");
            return Ok(false);
        }

        let outcome = run_with_retry(RetryPolicy::EXPERIENCE, "experience grant", |_| {
            self.try_grant(user_id, amount, exp_type, category, business.as_ref(), note)
                .boxed()
        })
        .await;

        match outcome {
            Ok(()) => {
                tracing::info!(
                    user_id = %user_id,
                    amount,
                    exp_type,
                    "experience grant succeeded"
                );
                Ok(true)
            }
            Err(err) if err.is_business_rejection() => {
                tracing::debug!(user_id = %user_id, amount, exp_type, %err, "experience grant rejected");
                Ok(false)
            }
            Err(EconomyError::Conflict { attempts }) => {
                tracing::error!(
                    user_id = %user_id,
                    amount,
                    exp_type,
                    attempts,
                    "experience grant abandoned after persistent conflicts"
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Adjust experience by a signed delta (admin operation). Negative
    /// deltas are penalties; the total floors at zero and the level is
    /// recomputed through the same table as grants.
    ///
    /// # Errors
    ///
    /// - `Validation` if `delta == 0` or `reason` is blank.
    /// - `Conflict` after the retry budget, `Storage` on infrastructure
    ///   failure.
    pub async fn admin_adjust(
        &self,
        user_id: UserId,
        delta: i64,
        reason: &str,
        operator: UserId,
    ) -> Result<bool> {
        if delta == 0 {
            return Err(EconomyError::Validation("adjustment delta must be non-zero".into()));
        }
        if reason.trim().is_empty() {
            return Err(EconomyError::Validation("adjustment reason must not be empty".into()));
        }

        run_with_retry(RetryPolicy::EXPERIENCE, "admin experience adjustment", |_| {
            self.try_admin_adjust(user_id, delta, reason, operator).boxed()
        })
        .await?;

        tracing::info!(
            user_id = %user_id,
            delta,
            operator = %operator,
            "admin experience adjustment succeeded"
        );
        Ok(true)
    }

    /// Freeze experience gain for a user, optionally until an instant.
    ///
    /// # Errors
    ///
    /// `Conflict` after the retry budget, `Storage` on infrastructure
    /// failure.
    pub async fn freeze(
        &self,
        user_id: UserId,
        until: Option<chrono::DateTime<chrono::Utc>>,
        reason: &str,
    ) -> Result<()> {
        run_with_retry(RetryPolicy::EXPERIENCE, "experience freeze", |_| {
            self.try_set_frozen(user_id, true, until).boxed()
        })
        .await?;
        tracing::info!(user_id = %user_id, ?until, reason, "experience frozen");
        Ok(())
    }

    /// Lift a freeze.
    ///
    /// # Errors
    ///
    /// `Conflict` after the retry budget, `Storage` on infrastructure
    /// failure.
    pub async fn unfreeze(&self, user_id: UserId) -> Result<()> {
        run_with_retry(RetryPolicy::EXPERIENCE, "experience unfreeze", |_| {
            self.try_set_frozen(user_id, false, None).boxed()
        })
        .await?;
        tracing::info!(user_id = %user_id, "experience unfrozen");
        Ok(())
    }

    /// Read a user's experience standing, initializing the account on
    /// first access.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn experience(&self, user_id: UserId) -> Result<ExperienceView> {
        let account = self.ensure_account(user_id)?;
        Ok(ExperienceView::project(&account, &self.table, self.clock.now()))
    }

    /// Preview the standing an experience total maps to, without touching
    /// any account.
    #[must_use]
    pub fn preview(&self, total_exp: i64) -> guild_economy_core::LevelStanding {
        self.table.locate(total_exp)
    }

    /// List a user's experience journal, newest first. `limit` is clamped
    /// to 100.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn transactions(
        &self,
        user_id: UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ExpTransaction>> {
        Ok(self
            .store
            .exp_transactions_by_user(&user_id, limit.min(100), offset)?)
    }

    fn ensure_account(&self, user_id: UserId) -> Result<ExperienceAccount> {
        if let Some(account) = self.store.experience_account(&user_id)? {
            return Ok(account);
        }
        tracing::info!(user_id = %user_id, "initializing experience account");
        Ok(self
            .store
            .create_experience_account_if_absent(ExperienceAccount::new(user_id, self.clock.now()))?)
    }

    /// One grant attempt: read, validate, guarded write, journal, counter.
    async fn try_grant(
        &self,
        user_id: UserId,
        amount: i64,
        exp_type: &str,
        category: RewardCategory,
        business: Option<&BusinessRef>,
        note: Option<&str>,
    ) -> Result<Attempt<()>> {
        let account = self.ensure_account(user_id)?;
        let now = self.clock.now();
        let today = self.clock.today();

        if account.is_frozen(now) {
            return Err(EconomyError::AccountFrozen {
                user_id: user_id.to_string(),
            });
        }

        // Re-checked on every attempt so a cap filled by a racing grant is
        // seen before this one commits.
        self.limiter.check(&user_id, category, amount, today)?;

        let new_total = account.total_exp + amount;
        let mut updated = account.clone();
        updated.apply_total(new_total, &self.table, now);
        updated.version += 1;

        if self.store.cas_experience_account(&updated, account.version)? == CasOutcome::Conflict {
            return Ok(Attempt::Conflict);
        }

        let transaction = ExpTransaction {
            id: self.ids.next_transaction_id(),
            user_id,
            amount,
            exp_type: exp_type.to_owned(),
            business: business.cloned(),
            exp_before: account.total_exp,
            exp_after: new_total,
            level_before: account.level,
            level_after: updated.level,
            note: note.map(str::to_owned),
            created_date: today,
            created_at: now,
        };
        if let Err(err) = self.store.append_exp_transaction(&transaction) {
            // The account write already committed; a missing journal row is
            // an audit gap, not a reason to unwind the grant.
            tracing::warn!(user_id = %user_id, %err, "failed to append experience journal row");
        }

        if let Err(err) = self.limiter.record(&user_id, category, amount, today) {
            tracing::warn!(user_id = %user_id, %err, "failed to bump daily counter");
        }

        if updated.level > account.level {
            self.enqueue_level_up(user_id, account.level, updated.level, now);
        }

        Ok(Attempt::Done(()))
    }

    /// One admin-adjustment attempt. Skips the freeze check and the
    /// limiter; moderation actions are not farmable.
    async fn try_admin_adjust(
        &self,
        user_id: UserId,
        delta: i64,
        reason: &str,
        operator: UserId,
    ) -> Result<Attempt<()>> {
        let account = self.ensure_account(user_id)?;
        let now = self.clock.now();
        let today = self.clock.today();

        let new_total = (account.total_exp + delta).max(0);
        let mut updated = account.clone();
        updated.apply_total(new_total, &self.table, now);
        updated.version += 1;

        if self.store.cas_experience_account(&updated, account.version)? == CasOutcome::Conflict {
            return Ok(Attempt::Conflict);
        }

        let transaction = ExpTransaction {
            id: self.ids.next_transaction_id(),
            user_id,
            amount: new_total - account.total_exp,
            exp_type: if delta > 0 { "ADMIN_ADJUST" } else { "PENALTY" }.to_owned(),
            business: None,
            exp_before: account.total_exp,
            exp_after: new_total,
            level_before: account.level,
            level_after: updated.level,
            note: Some(format!("operator {operator}: {reason}")),
            created_date: today,
            created_at: now,
        };
        if let Err(err) = self.store.append_exp_transaction(&transaction) {
            tracing::warn!(user_id = %user_id, %err, "failed to append experience journal row");
        }

        if updated.level > account.level {
            self.enqueue_level_up(user_id, account.level, updated.level, now);
        }

        Ok(Attempt::Done(()))
    }

    /// One freeze-flag attempt.
    async fn try_set_frozen(
        &self,
        user_id: UserId,
        frozen: bool,
        until: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Attempt<()>> {
        let account = self.ensure_account(user_id)?;
        let now = self.clock.now();

        let mut updated = account.clone();
        updated.frozen = frozen;
        updated.frozen_until = until;
        updated.version += 1;
        updated.audit.touch(now);

        match self.store.cas_experience_account(&updated, account.version)? {
            CasOutcome::Applied => Ok(Attempt::Done(())),
            CasOutcome::Conflict => Ok(Attempt::Conflict),
        }
    }

    /// Queue the detached level-up effects. Never fails the grant.
    fn enqueue_level_up(&self, user_id: UserId, from_level: u32, to_level: u32, now: chrono::DateTime<chrono::Utc>) {
        let bonus = FollowUp::new(
            self.ids.next_transaction_id(),
            FollowUpKind::LevelUpBonus {
                user_id,
                new_level: to_level,
            },
            now,
        );
        let notice = FollowUp::new(
            self.ids.next_transaction_id(),
            FollowUpKind::LevelUpNotice {
                user_id,
                from_level,
                to_level,
            },
            now,
        );
        for item in [bonus, notice] {
            if let Err(err) = self.store.enqueue_follow_up(&item) {
                tracing::warn!(user_id = %user_id, %err, "failed to enqueue level-up follow-up");
            }
        }
        tracing::info!(
            user_id = %user_id,
            from_level,
            to_level,
            "level up detected, follow-ups queued"
        );
    }
}
