//! Journal records for coin and experience mutations.
//!
//! The journal is append-only: every mutation attempt creates a record, and
//! a record never changes again once it reaches a terminal status. Coin
//! records are born `Pending` and flipped to `Success` only after the
//! guarded account write commits; a losing attempt flips its own record to
//! `Failed` and the retry loop starts a fresh one. Experience records are
//! appended after the account write and are terminal from birth.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// Lifecycle status of a coin journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Created, account write not yet attempted or not yet decided.
    Pending,

    /// The guarded account write committed.
    Success,

    /// The attempt lost its version race or hit an unrecoverable error.
    Failed,
}

impl TxStatus {
    /// Whether the record has reached a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Reference to the business event that caused a grant.
///
/// `(business_type, business_id)` together with the user and an optional day
/// form the idempotency key that suppresses duplicate reward application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRef {
    /// Business event kind, e.g. `POST_LIKE` or `LEVEL_UP`.
    pub business_type: String,

    /// Identifier of the business entity (post id, comment id, level).
    pub business_id: i64,
}

impl BusinessRef {
    /// Create a business reference.
    #[must_use]
    pub fn new(business_type: impl Into<String>, business_id: i64) -> Self {
        Self {
            business_type: business_type.into(),
            business_id,
        }
    }
}

/// One coin mutation attempt and its outcome.
///
/// `from_user`/`to_user` carry direction: a system grant has no `from_user`,
/// a deduction has no `to_user`, a transfer has both. `amount` is always
/// positive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinTransaction {
    /// Unique id (ULID, time-ordered).
    pub id: TransactionId,

    /// Paying side; `None` when the system is the source.
    pub from_user: Option<UserId>,

    /// Receiving side; `None` when the system is the sink (deductions).
    pub to_user: Option<UserId>,

    /// Amount moved, always positive.
    pub amount: i64,

    /// Category tag, e.g. `LIKE_REWARD`, `ADMIN_ADJUST`, `TRANSFER`.
    pub category: String,

    /// Lifecycle status.
    pub status: TxStatus,

    /// Business event reference for idempotency and audit.
    pub business: Option<BusinessRef>,

    /// Subject account balance before the write.
    pub balance_before: i64,

    /// Subject account balance after the write; equals `balance_before`
    /// until the record turns `Success`.
    pub balance_after: i64,

    /// Free-form note for operators.
    pub note: Option<String>,

    /// The admin who initiated the mutation, for admin adjustments.
    pub operator: Option<UserId>,

    /// When the attempt started.
    pub created_at: DateTime<Utc>,

    /// When the record reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl CoinTransaction {
    /// Create a pending system-grant record.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn grant(
        id: TransactionId,
        to_user: UserId,
        amount: i64,
        category: impl Into<String>,
        business: Option<BusinessRef>,
        balance_before: i64,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            from_user: None,
            to_user: Some(to_user),
            amount,
            category: category.into(),
            status: TxStatus::Pending,
            business,
            balance_before,
            balance_after: balance_before,
            note,
            operator: None,
            created_at: now,
            finished_at: None,
        }
    }

    /// Create a pending deduction record (admin debit).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn deduction(
        id: TransactionId,
        from_user: UserId,
        amount: i64,
        category: impl Into<String>,
        business: Option<BusinessRef>,
        balance_before: i64,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            from_user: Some(from_user),
            to_user: None,
            amount,
            category: category.into(),
            status: TxStatus::Pending,
            business,
            balance_before,
            balance_after: balance_before,
            note,
            operator: None,
            created_at: now,
            finished_at: None,
        }
    }

    /// Create a pending transfer record between two users.
    #[must_use]
    pub fn transfer(
        id: TransactionId,
        from_user: UserId,
        to_user: UserId,
        amount: i64,
        balance_before: i64,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            from_user: Some(from_user),
            to_user: Some(to_user),
            amount,
            category: "TRANSFER".to_string(),
            status: TxStatus::Pending,
            business: None,
            balance_before,
            balance_after: balance_before,
            note,
            operator: None,
            created_at: now,
            finished_at: None,
        }
    }

    /// Attach the admin who initiated the mutation.
    #[must_use]
    pub fn with_operator(mut self, operator: UserId) -> Self {
        self.operator = Some(operator);
        self
    }

    /// The user whose account this record mutates: the receiver for grants
    /// and transfers, the payer for deductions.
    #[must_use]
    pub fn subject_user(&self) -> Option<UserId> {
        self.to_user.or(self.from_user)
    }
}

/// One experience mutation, appended after the account write commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpTransaction {
    /// Unique id (ULID, time-ordered).
    pub id: TransactionId,

    /// The account owner.
    pub user_id: UserId,

    /// Signed experience delta; negative only for admin penalties.
    pub amount: i64,

    /// Experience category, e.g. `POST_CREATE`, `RECEIVE_LIKE`.
    pub exp_type: String,

    /// Business event reference.
    pub business: Option<BusinessRef>,

    /// Total experience before the write.
    pub exp_before: i64,

    /// Total experience after the write.
    pub exp_after: i64,

    /// Level before the write.
    pub level_before: u32,

    /// Level after the write.
    pub level_after: u32,

    /// Free-form note.
    pub note: Option<String>,

    /// Grant day, used by daily caps and per-day history queries.
    pub created_date: NaiveDate,

    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

impl ExpTransaction {
    /// Whether this record crossed a level boundary upward.
    #[must_use]
    pub const fn leveled_up(&self) -> bool {
        self.level_after > self.level_before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{IdSource, UlidSource};

    #[test]
    fn grant_record_starts_pending() {
        let user = UserId::generate();
        let now = Utc::now();
        let tx = CoinTransaction::grant(
            UlidSource.next_transaction_id(),
            user,
            100,
            "EARN",
            None,
            0,
            None,
            now,
        );
        assert_eq!(tx.status, TxStatus::Pending);
        assert!(!tx.status.is_terminal());
        assert_eq!(tx.subject_user(), Some(user));
        assert_eq!(tx.balance_after, tx.balance_before);
    }

    #[test]
    fn deduction_subject_is_payer() {
        let user = UserId::generate();
        let tx = CoinTransaction::deduction(
            UlidSource.next_transaction_id(),
            user,
            50,
            "ADMIN_ADJUST",
            None,
            80,
            Some("penalty".into()),
            Utc::now(),
        );
        assert_eq!(tx.subject_user(), Some(user));
        assert!(tx.to_user.is_none());
    }

    #[test]
    fn terminal_statuses() {
        assert!(TxStatus::Success.is_terminal());
        assert!(TxStatus::Failed.is_terminal());
        assert!(!TxStatus::Pending.is_terminal());
    }

    #[test]
    fn exp_record_level_up_flag() {
        let now = Utc::now();
        let tx = ExpTransaction {
            id: UlidSource.next_transaction_id(),
            user_id: UserId::generate(),
            amount: 2,
            exp_type: "RECEIVE_LIKE".into(),
            business: None,
            exp_before: 99,
            exp_after: 101,
            level_before: 0,
            level_after: 1,
            note: None,
            created_date: now.date_naive(),
            created_at: now,
        };
        assert!(tx.leveled_up());
    }
}
