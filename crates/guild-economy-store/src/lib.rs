//! Storage layer for the guild economy engine.
//!
//! This crate defines the [`Store`] trait — durable key-value storage with
//! compare-and-swap account writes, an append-only journal, per-day abuse
//! counters, and the follow-up outbox — plus two implementations:
//!
//! - [`MemoryStore`]: `RwLock`-guarded maps; the default backend and the
//!   test double.
//! - `RocksStore` (feature `rocksdb-backend`): persistent column families
//!   with CBOR-encoded values.
//!
//! # Compare-and-swap contract
//!
//! Account rows carry a version counter. A conditional write succeeds only
//! if the stored version still equals the version the caller read; a losing
//! write returns [`CasOutcome::Conflict`] and changes nothing. Conflict is a
//! data fact, not an error — the ledger's retry loop decides what to do
//! with it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, NaiveDate, Utc};
use guild_economy_core::{
    BalanceAccount, CoinTransaction, ExpTransaction, ExperienceAccount, FollowUp, RewardCategory,
    TransactionId, TxStatus, UserId,
};

/// Outcome of a conditional (version-guarded) account write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The guard held and the write committed.
    Applied,

    /// The stored version no longer matched; nothing was written.
    Conflict,
}

impl CasOutcome {
    /// Whether the write committed.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// The storage trait defining all database operations.
///
/// Implementations must linearize conditional writes per account row: two
/// racing writers guarded on the same version must never both observe
/// [`CasOutcome::Applied`].
pub trait Store: Send + Sync {
    // =========================================================================
    // Balance Accounts
    // =========================================================================

    /// Get a balance account by user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn balance_account(&self, user_id: &UserId) -> Result<Option<BalanceAccount>>;

    /// Insert a balance account unless one already exists.
    ///
    /// Returns the stored record — the freshly inserted one, or the existing
    /// row when a concurrent initializer won the race.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_balance_account_if_absent(&self, account: BalanceAccount)
        -> Result<BalanceAccount>;

    /// Conditionally replace a balance account.
    ///
    /// The write commits only if the stored version equals
    /// `expected_version`; `updated.version` must already be the successor
    /// value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or no row exists.
    fn cas_balance_account(
        &self,
        updated: &BalanceAccount,
        expected_version: u64,
    ) -> Result<CasOutcome>;

    // =========================================================================
    // Experience Accounts
    // =========================================================================

    /// Get an experience account by user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn experience_account(&self, user_id: &UserId) -> Result<Option<ExperienceAccount>>;

    /// Insert an experience account unless one already exists.
    ///
    /// Same race contract as [`Store::create_balance_account_if_absent`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_experience_account_if_absent(
        &self,
        account: ExperienceAccount,
    ) -> Result<ExperienceAccount>;

    /// Conditionally replace an experience account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or no row exists.
    fn cas_experience_account(
        &self,
        updated: &ExperienceAccount,
        expected_version: u64,
    ) -> Result<CasOutcome>;

    // =========================================================================
    // Coin Journal
    // =========================================================================

    /// Append a coin journal record (also maintains the per-user index).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn append_coin_transaction(&self, transaction: &CoinTransaction) -> Result<()>;

    /// Move a coin journal record to a terminal status.
    ///
    /// `balance_after` records the post-write balance for `Success`; pass
    /// the pre-write balance for `Failed`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the record does not exist.
    fn finish_coin_transaction(
        &self,
        id: &TransactionId,
        status: TxStatus,
        balance_after: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Get a coin journal record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn coin_transaction(&self, id: &TransactionId) -> Result<Option<CoinTransaction>>;

    /// List a user's coin journal records, newest first.
    ///
    /// A user's page includes records where they are either side of the
    /// movement.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn coin_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CoinTransaction>>;

    /// Check for a prior successful grant matching the idempotency key.
    ///
    /// With `day` set, only records created on that day count.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn successful_grant_exists(
        &self,
        business_type: &str,
        business_id: i64,
        user_id: &UserId,
        day: Option<NaiveDate>,
    ) -> Result<bool>;

    /// Sum of successful grants to a user on a given day, filtered by
    /// category and business-type set. Used for journal-backed daily caps.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn successful_grant_total(
        &self,
        user_id: &UserId,
        category: &str,
        business_types: &[&str],
        day: NaiveDate,
    ) -> Result<i64>;

    // =========================================================================
    // Experience Journal
    // =========================================================================

    /// Append an experience journal record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn append_exp_transaction(&self, transaction: &ExpTransaction) -> Result<()>;

    /// List a user's experience journal records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn exp_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ExpTransaction>>;

    // =========================================================================
    // Daily Counters
    // =========================================================================

    /// Accumulated amount for `(user, day, category)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn daily_amount(
        &self,
        user_id: &UserId,
        day: NaiveDate,
        category: RewardCategory,
    ) -> Result<i64>;

    /// Accumulated amount for `(user, day)` across all categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn daily_total(&self, user_id: &UserId, day: NaiveDate) -> Result<i64>;

    /// Add to the counter for `(user, day, category)`.
    ///
    /// Best-effort: racing increments may interleave with reads; daily caps
    /// are soft limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn add_daily_amount(
        &self,
        user_id: &UserId,
        day: NaiveDate,
        category: RewardCategory,
        amount: i64,
    ) -> Result<()>;

    // =========================================================================
    // Follow-up Outbox
    // =========================================================================

    /// Enqueue a follow-up work item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn enqueue_follow_up(&self, item: &FollowUp) -> Result<()>;

    /// Remove and return up to `limit` items in enqueue order.
    ///
    /// The consumer re-enqueues failed items via
    /// [`Store::requeue_follow_up`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn claim_follow_ups(&self, limit: usize) -> Result<Vec<FollowUp>>;

    /// Put a failed item back with its attempt count bumped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn requeue_follow_up(&self, item: &FollowUp) -> Result<()>;

    /// Number of items currently queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn follow_up_count(&self) -> Result<usize>;

    // =========================================================================
    // Leaderboard Scans
    // =========================================================================

    /// Experience accounts ordered by total experience descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn top_by_total_exp(&self, offset: usize, limit: usize) -> Result<Vec<ExperienceAccount>>;

    /// Balance accounts ordered by spendable balance descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn top_by_balance(&self, offset: usize, limit: usize) -> Result<Vec<BalanceAccount>>;

    /// Total number of experience accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn experience_account_count(&self) -> Result<usize>;

    /// Total number of balance accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn balance_account_count(&self) -> Result<usize>;

    /// 1-based rank of a user by total experience, if the account exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn experience_rank(&self, user_id: &UserId) -> Result<Option<usize>>;

    /// 1-based rank of a user by balance, if the account exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn balance_rank(&self, user_id: &UserId) -> Result<Option<usize>>;
}
