//! Idempotency guard over the coin journal.
//!
//! A reward is identified by `(business_type, business_id, user, day?)`.
//! Only `Success` journal rows count — a failed or still-pending attempt
//! does not block a re-grant.

use std::sync::Arc;

use chrono::NaiveDate;

use guild_economy_core::{EconomyError, Result, UserId};
use guild_economy_store::Store;

/// Detects rewards that were already applied.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn Store>,
}

impl IdempotencyGuard {
    /// Create a guard over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Whether a matching successful grant already exists. With `day` set,
    /// the key is scoped to that day (daily-repeatable rewards); without it
    /// the key is forever (one-shot rewards).
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn already_granted(
        &self,
        business_type: &str,
        business_id: i64,
        user_id: &UserId,
        day: Option<NaiveDate>,
    ) -> Result<bool> {
        let exists =
            self.store
                .successful_grant_exists(business_type, business_id, user_id, day)?;
        if exists {
            tracing::debug!(
                business_type,
                business_id,
                user_id = %user_id,
                "reward already granted, skipping"
            );
        }
        Ok(exists)
    }

    /// Like [`Self::already_granted`], but a hit comes back as
    /// [`EconomyError::DuplicateReward`] so call sites can `?` through and
    /// map the rejection at one place.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateReward` on a hit, or a storage error.
    pub fn ensure_not_granted(
        &self,
        business_type: &str,
        business_id: i64,
        user_id: &UserId,
        day: Option<NaiveDate>,
    ) -> Result<()> {
        if self.already_granted(business_type, business_id, user_id, day)? {
            return Err(EconomyError::DuplicateReward {
                business_type: business_type.to_owned(),
                business_id,
            });
        }
        Ok(())
    }
}
