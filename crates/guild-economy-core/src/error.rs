//! Error types for the economy engine.

use crate::ids::IdError;

/// Result type for economy operations.
pub type Result<T> = std::result::Result<T, EconomyError>;

/// Errors that can occur in economy operations.
///
/// Business-rule rejections (`InsufficientBalance`, `DailyLimitExceeded`,
/// `DuplicateReward`, `AccountFrozen`) are expected outcomes and are never
/// retried. `Conflict` appears only after the retry budget is exhausted —
/// within the budget a version race is a data fact handled by the retry
/// loop, not an error.
#[derive(Debug, thiserror::Error)]
pub enum EconomyError {
    /// Malformed input (non-positive amount, empty category).
    #[error("validation error: {0}")]
    Validation(String),

    /// The guarded write kept losing its version race.
    #[error("concurrency conflict persisted after {attempts} attempts")]
    Conflict {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// A debit would push the balance negative.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current spendable balance.
        balance: i64,
        /// Amount the operation needed.
        required: i64,
    },

    /// A daily anti-abuse cap would be exceeded.
    #[error("daily limit exceeded for {category}: cap={cap}")]
    DailyLimitExceeded {
        /// The capped category (or "total" for the aggregate cap).
        category: String,
        /// The ceiling that would be crossed.
        cap: i64,
    },

    /// The idempotency guard found a prior matching grant.
    #[error("reward already granted: {business_type}#{business_id}")]
    DuplicateReward {
        /// Business event kind.
        business_type: String,
        /// Business entity id.
        business_id: i64,
    },

    /// The experience account is frozen.
    #[error("experience account frozen: {user_id}")]
    AccountFrozen {
        /// The frozen account's owner.
        user_id: String,
    },

    /// A referenced record does not exist. Accounts initialize lazily and
    /// never produce this; it is reserved for malformed references.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EconomyError {
    /// Whether the error is an expected business rejection rather than an
    /// infrastructure fault.
    #[must_use]
    pub const fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InsufficientBalance { .. }
                | Self::DailyLimitExceeded { .. }
                | Self::DuplicateReward { .. }
                | Self::AccountFrozen { .. }
        )
    }
}
