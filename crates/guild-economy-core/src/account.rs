//! Account records for coin balances and experience.
//!
//! Both account kinds carry a monotonic `version` counter; every successful
//! mutation bumps it by exactly one, and conditional writes are guarded on
//! the version observed at read time. Accounts are created lazily on first
//! access and never hard-deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::level::{LevelStanding, LevelTable};
use crate::UserId;

/// Shared audit fields embedded in every durable record.
///
/// A plain value type rather than a base class; records compose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audit {
    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Audit {
    /// Create audit fields with both timestamps set to `now`.
    #[must_use]
    pub const fn at(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a mutation at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// A user's coin balance account.
///
/// `balance` is in the smallest currency unit and never goes negative.
/// Lifetime totals only ever grow; they let audit reconcile the journal
/// against the account without replaying it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceAccount {
    /// The account owner.
    pub user_id: UserId,

    /// Spendable balance in the smallest currency unit.
    pub balance: i64,

    /// Balance held back from spending (escrow, pending orders).
    pub frozen_balance: i64,

    /// Lifetime coins earned (grants, rewards, transfers in excluded).
    pub total_earned: i64,

    /// Lifetime coins spent or deducted.
    pub total_spent: i64,

    /// Lifetime coins received through transfers.
    pub total_transferred_in: i64,

    /// Lifetime coins sent through transfers.
    pub total_transferred_out: i64,

    /// Optimistic-concurrency version; +1 per successful mutation.
    pub version: u64,

    /// Audit timestamps.
    pub audit: Audit,
}

impl BalanceAccount {
    /// Create a new zeroed account.
    #[must_use]
    pub const fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: 0,
            frozen_balance: 0,
            total_earned: 0,
            total_spent: 0,
            total_transferred_in: 0,
            total_transferred_out: 0,
            version: 0,
            audit: Audit::at(now),
        }
    }

    /// Check whether `amount` can be deducted without going negative.
    #[must_use]
    pub const fn has_sufficient_balance(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

/// A user's experience account.
///
/// `(level, level_exp)` is always the result of locating `total_exp` in the
/// level table; no record exists at rest with an inconsistent pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceAccount {
    /// The account owner.
    pub user_id: UserId,

    /// Current level.
    pub level: u32,

    /// Experience accumulated within the current level.
    pub level_exp: i64,

    /// Cumulative experience across all levels.
    pub total_exp: i64,

    /// When experience gain is frozen (moderation action).
    pub frozen: bool,

    /// If set, the freeze lapses at this instant.
    pub frozen_until: Option<DateTime<Utc>>,

    /// When the account last leveled up.
    pub level_up_at: Option<DateTime<Utc>>,

    /// Optimistic-concurrency version; +1 per successful mutation.
    pub version: u64,

    /// Audit timestamps.
    pub audit: Audit,
}

impl ExperienceAccount {
    /// Create a new level-0 account.
    #[must_use]
    pub const fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            level: 0,
            level_exp: 0,
            total_exp: 0,
            frozen: false,
            frozen_until: None,
            level_up_at: None,
            version: 0,
            audit: Audit::at(now),
        }
    }

    /// Whether the account is frozen at `now`.
    ///
    /// A freeze with `frozen_until` in the past has lapsed.
    #[must_use]
    pub fn is_frozen(&self, now: DateTime<Utc>) -> bool {
        self.frozen && self.frozen_until.map_or(true, |until| until > now)
    }

    /// Apply a new total, recomputing `(level, level_exp)` from the table.
    pub fn apply_total(&mut self, total_exp: i64, table: &LevelTable, now: DateTime<Utc>) {
        let LevelStanding { level, level_exp } = table.locate(total_exp);
        if level > self.level {
            self.level_up_at = Some(now);
        }
        self.level = level;
        self.level_exp = level_exp;
        self.total_exp = total_exp;
        self.audit.touch(now);
    }
}

/// Read-only snapshot of a balance account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceView {
    /// The account owner.
    pub user_id: UserId,
    /// Spendable balance.
    pub available: i64,
    /// Frozen balance.
    pub frozen: i64,
    /// Lifetime coins earned.
    pub total_earned: i64,
    /// Lifetime coins spent.
    pub total_spent: i64,
    /// Lifetime coins received through transfers.
    pub total_transferred_in: i64,
    /// Lifetime coins sent through transfers.
    pub total_transferred_out: i64,
    /// Version at read time; may be stale under concurrent writers.
    pub version: u64,
}

impl From<&BalanceAccount> for BalanceView {
    fn from(account: &BalanceAccount) -> Self {
        Self {
            user_id: account.user_id,
            available: account.balance,
            frozen: account.frozen_balance,
            total_earned: account.total_earned,
            total_spent: account.total_spent,
            total_transferred_in: account.total_transferred_in,
            total_transferred_out: account.total_transferred_out,
            version: account.version,
        }
    }
}

/// Read-only snapshot of an experience account, with progress toward the
/// next level precomputed for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceView {
    /// The account owner.
    pub user_id: UserId,
    /// Current level.
    pub level: u32,
    /// Experience within the current level.
    pub level_exp: i64,
    /// Cumulative experience.
    pub total_exp: i64,
    /// Experience still needed to reach the next level; 0 at the top tier.
    pub exp_to_next: i64,
    /// Fraction of the current tier completed, in `0.0..=1.0`.
    pub progress_to_next: f64,
    /// Whether grants are currently frozen.
    pub frozen: bool,
}

impl ExperienceView {
    /// Build a view from an account and the level table.
    #[must_use]
    pub fn project(account: &ExperienceAccount, table: &LevelTable, now: DateTime<Utc>) -> Self {
        let (exp_to_next, progress_to_next) = table.progress(account.total_exp);
        Self {
            user_id: account.user_id,
            level: account.level,
            level_exp: account.level_exp,
            total_exp: account.total_exp,
            exp_to_next,
            progress_to_next,
            frozen: account.is_frozen(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_balance_account_is_zeroed() {
        let account = BalanceAccount::new(UserId::generate(), Utc::now());
        assert_eq!(account.balance, 0);
        assert_eq!(account.total_earned, 0);
        assert_eq!(account.version, 0);
    }

    #[test]
    fn sufficient_balance_boundary() {
        let mut account = BalanceAccount::new(UserId::generate(), Utc::now());
        account.balance = 30;
        assert!(account.has_sufficient_balance(30));
        assert!(!account.has_sufficient_balance(31));
    }

    #[test]
    fn lapsed_freeze_is_not_frozen() {
        let now = Utc::now();
        let mut account = ExperienceAccount::new(UserId::generate(), now);
        account.frozen = true;
        account.frozen_until = Some(now - chrono::Duration::hours(1));
        assert!(!account.is_frozen(now));

        account.frozen_until = Some(now + chrono::Duration::hours(1));
        assert!(account.is_frozen(now));

        // No expiry: frozen indefinitely.
        account.frozen_until = None;
        assert!(account.is_frozen(now));
    }

    #[test]
    fn apply_total_recomputes_level() {
        let table = LevelTable::standard();
        let now = Utc::now();
        let mut account = ExperienceAccount::new(UserId::generate(), now);

        account.apply_total(99, &table, now);
        assert_eq!(account.level, 0);
        assert_eq!(account.level_exp, 99);
        assert!(account.level_up_at.is_none());

        account.apply_total(101, &table, now);
        assert_eq!(account.level, 1);
        assert_eq!(account.level_exp, 1);
        assert!(account.level_up_at.is_some());
    }
}
