//! Reward amounts, categories, and daily anti-abuse caps.
//!
//! Amounts and caps are fixed constants. Caps are soft ceilings meant to
//! blunt automated farming, not financial guarantees; the limiter that
//! enforces them tolerates small undercounts under races.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Coin reward amounts
// ============================================================================

/// Coins granted to an author whose post or comment is liked.
pub const LIKE_REWARD_AUTHOR: i64 = 2;

/// Coins granted to the liker for the interaction.
pub const LIKE_REWARD_LIKER: i64 = 1;

/// Daily ceiling on liker-side like rewards, in coins.
pub const DAILY_LIKE_COIN_CAP: i64 = 50;

/// Coins granted for posting a comment.
pub const COMMENT_REWARD: i64 = 1;

/// Coins granted when a comment receives a reply.
pub const COMMENT_REPLY_REWARD: i64 = 1;

/// Base coins for a comment promoted to god-comment.
pub const GOD_COMMENT_BASE: i64 = 8;

/// Extra coins per like on a god-comment.
pub const GOD_COMMENT_LIKE_BONUS: i64 = 5;

/// Weekly retention coins for a god-comment that keeps its slot.
pub const GOD_COMMENT_RETENTION: i64 = 15;

/// Base coins for the first comment under a post (the "sofa").
pub const SOFA_BASE: i64 = 5;

/// Extra coins per like on a sofa comment.
pub const SOFA_LIKE_BONUS: i64 = 3;

/// Weekly retention coins for a sofa comment.
pub const SOFA_RETENTION: i64 = 10;

/// Coins granted per level on level-up: `new_level * this`.
pub const LEVEL_UP_BONUS_PER_LEVEL: i64 = 10;

// ============================================================================
// Experience reward amounts
// ============================================================================

/// Experience for publishing a post.
pub const EXP_POST_CREATE: i64 = 20;

/// One-time bonus for the first post.
pub const EXP_FIRST_POST: i64 = 30;

/// Experience for publishing a comment.
pub const EXP_COMMENT_CREATE: i64 = 5;

/// One-time bonus for the first comment.
pub const EXP_FIRST_COMMENT: i64 = 10;

/// Experience for receiving a like.
pub const EXP_RECEIVE_LIKE: i64 = 2;

/// Experience for giving a like.
pub const EXP_GIVE_LIKE: i64 = 1;

// ============================================================================
// Daily experience caps
// ============================================================================

/// Aggregate daily experience ceiling across all categories. Tighter than
/// the sum of the per-category caps, so grinding every category still hits
/// a wall.
pub const DAILY_EXP_GLOBAL_CAP: i64 = 300;

/// Daily counter categories.
///
/// Counters are keyed `(user, day, category)`; keying on the day gives an
/// implicit midnight reset with no sweeper job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardCategory {
    /// Posting activity.
    Post,
    /// Commenting activity.
    Comment,
    /// Likes, given or received.
    Like,
    /// God-comment and sofa awards.
    Highlight,
    /// Daily and streak login rewards.
    Login,
}

impl RewardCategory {
    /// Daily experience ceiling for this category.
    #[must_use]
    pub const fn daily_exp_cap(self) -> i64 {
        match self {
            Self::Post => 200,
            Self::Comment => 100,
            Self::Like => 50,
            Self::Highlight => 100,
            Self::Login => 20,
        }
    }

    /// All categories, for iteration.
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::Post,
            Self::Comment,
            Self::Like,
            Self::Highlight,
            Self::Login,
        ]
    }

    /// Stable short name used in storage keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
            Self::Like => "like",
            Self::Highlight => "highlight",
            Self::Login => "login",
        }
    }
}

impl fmt::Display for RewardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_caps_are_positive_and_below_global() {
        for category in RewardCategory::all() {
            let cap = category.daily_exp_cap();
            assert!(cap > 0);
            assert!(cap <= DAILY_EXP_GLOBAL_CAP);
        }
    }

    #[test]
    fn category_key_names_are_distinct() {
        let names: std::collections::HashSet<_> =
            RewardCategory::all().iter().map(|c| c.as_str()).collect();
        assert_eq!(names.len(), RewardCategory::all().len());
    }
}
