//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Balance account rows, keyed by `user_id`.
    pub const BALANCE_ACCOUNTS: &str = "balance_accounts";

    /// Experience account rows, keyed by `user_id`.
    pub const EXPERIENCE_ACCOUNTS: &str = "experience_accounts";

    /// Coin journal records, keyed by `transaction_id` (ULID).
    pub const COIN_TRANSACTIONS: &str = "coin_transactions";

    /// Index: coin journal by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const COIN_TX_BY_USER: &str = "coin_tx_by_user";

    /// Experience journal records, keyed by `transaction_id` (ULID).
    pub const EXP_TRANSACTIONS: &str = "exp_transactions";

    /// Index: experience journal by user, keyed by `user_id || transaction_id`.
    pub const EXP_TX_BY_USER: &str = "exp_tx_by_user";

    /// Daily abuse counters, keyed by `user_id || iso_date || category`.
    pub const DAILY_COUNTERS: &str = "daily_counters";

    /// Follow-up outbox, keyed by item id (ULID, so FIFO in key order).
    pub const OUTBOX: &str = "outbox";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::BALANCE_ACCOUNTS,
        cf::EXPERIENCE_ACCOUNTS,
        cf::COIN_TRANSACTIONS,
        cf::COIN_TX_BY_USER,
        cf::EXP_TRANSACTIONS,
        cf::EXP_TX_BY_USER,
        cf::DAILY_COUNTERS,
        cf::OUTBOX,
    ]
}
