//! Daily anti-abuse limiter.
//!
//! Caps are soft: the check reads the counter, the ledger increments it only
//! after its compare-and-swap commits, and nothing makes the pair atomic.
//! Races can therefore undercount slightly; the retry loop re-validates on
//! every attempt, which bounds the drift.

use std::sync::Arc;

use chrono::NaiveDate;

use guild_economy_core::reward::DAILY_EXP_GLOBAL_CAP;
use guild_economy_core::{EconomyError, Result, RewardCategory, UserId};
use guild_economy_store::Store;

/// Checks and records per-user daily experience accumulation.
#[derive(Clone)]
pub struct DailyLimiter {
    store: Arc<dyn Store>,
}

impl DailyLimiter {
    /// Create a limiter over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Check whether granting `amount` in `category` stays within today's
    /// caps. Reaching a cap exactly is allowed; crossing it is not.
    ///
    /// # Errors
    ///
    /// Returns `DailyLimitExceeded` when the per-category or global cap
    /// would be crossed, or a storage error.
    pub fn check(
        &self,
        user_id: &UserId,
        category: RewardCategory,
        amount: i64,
        day: NaiveDate,
    ) -> Result<()> {
        let category_cap = category.daily_exp_cap();
        let category_used = self.store.daily_amount(user_id, day, category)?;
        if category_used + amount > category_cap {
            tracing::debug!(
                user_id = %user_id,
                category = %category,
                used = category_used,
                amount,
                cap = category_cap,
                "daily category cap would be crossed"
            );
            return Err(EconomyError::DailyLimitExceeded {
                category: category.to_string(),
                cap: category_cap,
            });
        }

        let total_used = self.store.daily_total(user_id, day)?;
        if total_used + amount > DAILY_EXP_GLOBAL_CAP {
            tracing::debug!(
                user_id = %user_id,
                used = total_used,
                amount,
                cap = DAILY_EXP_GLOBAL_CAP,
                "daily global cap would be crossed"
            );
            return Err(EconomyError::DailyLimitExceeded {
                category: "total".to_string(),
                cap: DAILY_EXP_GLOBAL_CAP,
            });
        }

        Ok(())
    }

    /// Record a committed grant against today's counters.
    ///
    /// # Errors
    ///
    /// Returns a storage error; callers log and continue, since the grant
    /// already committed.
    pub fn record(
        &self,
        user_id: &UserId,
        category: RewardCategory,
        amount: i64,
        day: NaiveDate,
    ) -> Result<()> {
        self.store.add_daily_amount(user_id, day, category, amount)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use guild_economy_store::MemoryStore;

    fn limiter() -> (DailyLimiter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (DailyLimiter::new(store.clone()), store)
    }

    #[test]
    fn exact_cap_allowed_one_more_rejected() {
        let (limiter, _store) = limiter();
        let user = UserId::generate();
        let day = Utc::now().date_naive();
        let cap = RewardCategory::Like.daily_exp_cap();

        limiter.check(&user, RewardCategory::Like, cap, day).unwrap();
        limiter.record(&user, RewardCategory::Like, cap, day).unwrap();

        let rejected = limiter.check(&user, RewardCategory::Like, 1, day);
        assert!(matches!(
            rejected,
            Err(EconomyError::DailyLimitExceeded { cap: c, .. }) if c == cap
        ));
    }

    #[test]
    fn global_cap_spans_categories() {
        let (limiter, _store) = limiter();
        let user = UserId::generate();
        let day = Utc::now().date_naive();

        // 280 of the 300 global budget used, with headroom left in both
        // the comment and like categories.
        limiter.record(&user, RewardCategory::Post, 200, day).unwrap();
        limiter.record(&user, RewardCategory::Comment, 80, day).unwrap();

        // Exactly reaching the global cap is allowed.
        limiter.check(&user, RewardCategory::Comment, 20, day).unwrap();

        // Crossing it is rejected even though the like category is empty.
        let rejected = limiter.check(&user, RewardCategory::Like, 21, day);
        assert!(matches!(
            rejected,
            Err(EconomyError::DailyLimitExceeded { category, .. }) if category == "total"
        ));
    }

    #[test]
    fn caps_reset_on_the_next_day() {
        let (limiter, _store) = limiter();
        let user = UserId::generate();
        let day = Utc::now().date_naive();
        let cap = RewardCategory::Login.daily_exp_cap();

        limiter.record(&user, RewardCategory::Login, cap, day).unwrap();
        assert!(limiter.check(&user, RewardCategory::Login, 1, day).is_err());

        let tomorrow = day.succ_opt().unwrap();
        limiter.check(&user, RewardCategory::Login, 1, tomorrow).unwrap();
    }
}
