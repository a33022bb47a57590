//! Key encoding utilities for `RocksDB`.
//!
//! Composite index keys concatenate the 16-byte user UUID with the 16-byte
//! transaction ULID; ULID time-ordering makes per-user ranges chronological.

use chrono::NaiveDate;

use guild_economy_core::{RewardCategory, TransactionId, UserId};

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a journal key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all journal entries for a user.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the transaction ID from a user-transaction index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_transaction_id_from_user_key(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Create a daily counter key.
///
/// Format: `user_id (16 bytes) || iso_date (10 bytes) || category`.
#[must_use]
pub fn daily_counter_key(user_id: &UserId, day: NaiveDate, category: RewardCategory) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + 10 + 10);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(day.format("%Y-%m-%d").to_string().as_bytes());
    key.extend_from_slice(category.as_str().as_bytes());
    key
}

/// Create a prefix for iterating a user's counters for one day.
#[must_use]
pub fn daily_counter_prefix(user_id: &UserId, day: NaiveDate) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + 10);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(day.format("%Y-%m-%d").to_string().as_bytes());
    key
}

/// Create an outbox key from the item id.
#[must_use]
pub fn outbox_key(id: &TransactionId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use guild_economy_core::ids::{IdSource, UlidSource};

    #[test]
    fn account_key_length() {
        let user_id = UserId::generate();
        assert_eq!(account_key(&user_id).len(), 16);
    }

    #[test]
    fn user_transaction_key_format() {
        let user_id = UserId::generate();
        let tx_id = UlidSource.next_transaction_id();
        let key = user_transaction_key(&user_id, &tx_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(&key[16..], tx_id.to_bytes());
    }

    #[test]
    fn extract_transaction_id_roundtrip() {
        let user_id = UserId::generate();
        let tx_id = UlidSource.next_transaction_id();
        let key = user_transaction_key(&user_id, &tx_id);

        assert_eq!(extract_transaction_id_from_user_key(&key), tx_id);
    }

    #[test]
    fn daily_counter_key_is_prefixed_by_day() {
        let user_id = UserId::generate();
        let day = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let key = daily_counter_key(&user_id, day, RewardCategory::Like);
        let prefix = daily_counter_prefix(&user_id, day);

        assert!(key.starts_with(&prefix));
        assert!(key.ends_with(b"like"));
    }
}
