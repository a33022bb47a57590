//! Follow-up work items for detached side effects.
//!
//! A grant that crosses a level boundary enqueues follow-ups instead of
//! spawning anonymous background tasks: the queue survives the triggering
//! call, a consumer processes items with its own retry budget, and delivery
//! is at-least-once. Follow-up failure is invisible to the grant that
//! enqueued it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// A queued follow-up work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUp {
    /// Unique id; doubles as the dedup key for the bonus grant.
    pub id: TransactionId,

    /// What to do.
    pub kind: FollowUpKind,

    /// Processing attempts so far.
    pub attempts: u32,

    /// When the item was enqueued.
    pub created_at: DateTime<Utc>,
}

impl FollowUp {
    /// Create a fresh, unattempted item.
    #[must_use]
    pub const fn new(id: TransactionId, kind: FollowUpKind, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            attempts: 0,
            created_at: now,
        }
    }
}

/// The kinds of detached work the engine schedules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FollowUpKind {
    /// Grant the level-up coin bonus for reaching `new_level`.
    LevelUpBonus {
        /// The user who leveled up.
        user_id: UserId,
        /// The level reached.
        new_level: u32,
    },

    /// Tell the notification side-channel about a level change.
    LevelUpNotice {
        /// The user who leveled up.
        user_id: UserId,
        /// Level before the grant.
        from_level: u32,
        /// Level after the grant.
        to_level: u32,
    },
}
