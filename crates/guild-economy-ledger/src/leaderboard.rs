//! Leaderboard queries over account rows.
//!
//! Rankings are computed from the live account rows, not a materialized
//! board; pages may shift between calls as grants land.

use std::sync::Arc;

use guild_economy_core::{Result, UserId};
use guild_economy_store::Store;

/// Maximum page size.
const MAX_PAGE_SIZE: usize = 100;

/// Default page size when the caller asks for zero.
const DEFAULT_PAGE_SIZE: usize = 50;

/// One ranked row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    /// The ranked user.
    pub user_id: UserId,

    /// The ranking value: total experience or coin balance.
    pub value: i64,

    /// Current level, for experience boards.
    pub level: Option<u32>,

    /// 1-based rank.
    pub rank: usize,
}

/// One page of a leaderboard.
#[derive(Debug, Clone)]
pub struct LeaderboardPage {
    /// Ranked entries, best first.
    pub entries: Vec<LeaderboardEntry>,

    /// 1-based page index.
    pub page_index: usize,

    /// Requested page size after clamping.
    pub page_size: usize,

    /// Total ranked accounts.
    pub total: usize,
}

/// Read-only ranking queries.
#[derive(Clone)]
pub struct Leaderboard {
    store: Arc<dyn Store>,
}

impl Leaderboard {
    /// Create leaderboard queries over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Page of users ranked by total experience.
    ///
    /// `page_index` is 1-based; `page_size` is clamped to `1..=100`.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn experience_page(&self, page_index: usize, page_size: usize) -> Result<LeaderboardPage> {
        let (page_index, page_size, offset) = clamp_page(page_index, page_size);
        let accounts = self.store.top_by_total_exp(offset, page_size)?;
        let total = self.store.experience_account_count()?;

        let entries = accounts
            .into_iter()
            .enumerate()
            .map(|(i, account)| LeaderboardEntry {
                user_id: account.user_id,
                value: account.total_exp,
                level: Some(account.level),
                rank: offset + i + 1,
            })
            .collect();

        Ok(LeaderboardPage {
            entries,
            page_index,
            page_size,
            total,
        })
    }

    /// Page of users ranked by coin balance.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn balance_page(&self, page_index: usize, page_size: usize) -> Result<LeaderboardPage> {
        let (page_index, page_size, offset) = clamp_page(page_index, page_size);
        let accounts = self.store.top_by_balance(offset, page_size)?;
        let total = self.store.balance_account_count()?;

        let entries = accounts
            .into_iter()
            .enumerate()
            .map(|(i, account)| LeaderboardEntry {
                user_id: account.user_id,
                value: account.balance,
                level: None,
                rank: offset + i + 1,
            })
            .collect();

        Ok(LeaderboardPage {
            entries,
            page_index,
            page_size,
            total,
        })
    }

    /// A user's 1-based rank by total experience, if they have an account.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn experience_rank(&self, user_id: UserId) -> Result<Option<usize>> {
        Ok(self.store.experience_rank(&user_id)?)
    }

    /// A user's 1-based rank by coin balance, if they have an account.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn balance_rank(&self, user_id: UserId) -> Result<Option<usize>> {
        Ok(self.store.balance_rank(&user_id)?)
    }
}

fn clamp_page(page_index: usize, page_size: usize) -> (usize, usize, usize) {
    let page_index = page_index.max(1);
    let page_size = if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size.min(MAX_PAGE_SIZE)
    };
    let offset = (page_index - 1) * page_size;
    (page_index, page_size, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_clamping() {
        assert_eq!(clamp_page(0, 0), (1, 50, 0));
        assert_eq!(clamp_page(1, 500), (1, 100, 0));
        assert_eq!(clamp_page(3, 20), (3, 20, 40));
    }
}
