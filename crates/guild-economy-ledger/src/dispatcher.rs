//! Reward dispatch for platform events.
//!
//! Entry points coordinate the cross-cutting concerns the ledgers do not
//! own: the idempotency guard runs first, daily caps are enforced by the
//! ledgers themselves, and level-up side effects ride the outbox. Expected
//! business outcomes (already granted, cap reached) come back as variants
//! of [`RewardOutcome`], never as errors.

use std::sync::Arc;

use guild_economy_core::reward::{
    COMMENT_REPLY_REWARD, COMMENT_REWARD, DAILY_LIKE_COIN_CAP, EXP_COMMENT_CREATE,
    EXP_FIRST_COMMENT, EXP_FIRST_POST, EXP_GIVE_LIKE, EXP_POST_CREATE, EXP_RECEIVE_LIKE,
    GOD_COMMENT_BASE, GOD_COMMENT_LIKE_BONUS, GOD_COMMENT_RETENTION, LIKE_REWARD_AUTHOR,
    LIKE_REWARD_LIKER, SOFA_BASE, SOFA_LIKE_BONUS, SOFA_RETENTION,
};
use guild_economy_core::{
    BusinessRef, EconomyError, Result, RewardCategory, TransactionId, UserId,
};
use guild_economy_store::Store;

use crate::balance::BalanceLedger;
use crate::clock::Clock;
use crate::experience::ExperienceLedger;
use crate::idempotency::IdempotencyGuard;

/// Outcome of a reward dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardOutcome {
    /// The reward (or part of it) was applied.
    Granted {
        /// Coins credited across all parties.
        coins: i64,
        /// Experience credited across all parties.
        exp: i64,
        /// The primary coin journal id, when coins moved.
        coin_tx: Option<TransactionId>,
    },

    /// The idempotency guard found a prior grant; nothing was applied.
    AlreadyGranted,

    /// Nothing was applied — cap reached, account frozen, or the grant
    /// lost its version race past the retry budget.
    Skipped,
}

/// Which highlight slot a comment won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighlightKind {
    /// Editor-promoted "god comment".
    GodComment,
    /// First comment under a post.
    Sofa,
}

impl HighlightKind {
    fn business_type(self) -> &'static str {
        match self {
            Self::GodComment => "GOD_COMMENT",
            Self::Sofa => "SOFA",
        }
    }

    fn base_reward(self) -> i64 {
        match self {
            Self::GodComment => GOD_COMMENT_BASE,
            Self::Sofa => SOFA_BASE,
        }
    }

    fn like_bonus(self) -> i64 {
        match self {
            Self::GodComment => GOD_COMMENT_LIKE_BONUS,
            Self::Sofa => SOFA_LIKE_BONUS,
        }
    }

    fn retention_reward(self) -> i64 {
        match self {
            Self::GodComment => GOD_COMMENT_RETENTION,
            Self::Sofa => SOFA_RETENTION,
        }
    }
}

/// Top-level reward entry point for platform events.
#[derive(Clone)]
pub struct RewardDispatcher {
    balance: Arc<BalanceLedger>,
    experience: Arc<ExperienceLedger>,
    guard: IdempotencyGuard,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl RewardDispatcher {
    /// Create a dispatcher over the two ledgers.
    #[must_use]
    pub fn new(
        balance: Arc<BalanceLedger>,
        experience: Arc<ExperienceLedger>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let guard = IdempotencyGuard::new(store.clone());
        Self {
            balance,
            experience,
            guard,
            store,
            clock,
        }
    }

    /// Reward for publishing a post. Experience only.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures.
    pub async fn post_created(
        &self,
        post_id: i64,
        author: UserId,
        first_post: bool,
    ) -> Result<RewardOutcome> {
        let business = BusinessRef::new("POST_CREATE", post_id);
        let mut exp = 0;

        if self
            .experience
            .grant_experience(
                author,
                EXP_POST_CREATE,
                "POST_CREATE",
                RewardCategory::Post,
                Some(business),
                Some("published a post"),
            )
            .await?
        {
            exp += EXP_POST_CREATE;
        }

        if first_post
            && self
                .experience
                .grant_experience(
                    author,
                    EXP_FIRST_POST,
                    "FIRST_POST",
                    RewardCategory::Post,
                    Some(BusinessRef::new("FIRST_POST", post_id)),
                    Some("first post bonus"),
                )
                .await?
        {
            exp += EXP_FIRST_POST;
        }

        Ok(if exp > 0 {
            RewardOutcome::Granted {
                coins: 0,
                exp,
                coin_tx: None,
            }
        } else {
            RewardOutcome::Skipped
        })
    }

    /// Reward for publishing a comment: one coin plus experience.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures.
    pub async fn comment_posted(
        &self,
        comment_id: i64,
        author: UserId,
        first_comment: bool,
    ) -> Result<RewardOutcome> {
        let mut coins = 0;
        let mut exp = 0;

        let coin_tx = match self
            .balance
            .grant_coin(
                author,
                COMMENT_REWARD,
                "COMMENT_REWARD",
                Some(BusinessRef::new("COMMENT_POST", comment_id)),
                Some("posted a comment"),
            )
            .await
        {
            Ok(id) => {
                coins += COMMENT_REWARD;
                Some(id)
            }
            Err(err) if Self::is_soft(&err) => None,
            Err(err) => return Err(err),
        };

        if self
            .experience
            .grant_experience(
                author,
                EXP_COMMENT_CREATE,
                "COMMENT_CREATE",
                RewardCategory::Comment,
                Some(BusinessRef::new("COMMENT_POST", comment_id)),
                Some("posted a comment"),
            )
            .await?
        {
            exp += EXP_COMMENT_CREATE;
        }

        if first_comment
            && self
                .experience
                .grant_experience(
                    author,
                    EXP_FIRST_COMMENT,
                    "FIRST_COMMENT",
                    RewardCategory::Comment,
                    Some(BusinessRef::new("FIRST_COMMENT", comment_id)),
                    Some("first comment bonus"),
                )
                .await?
        {
            exp += EXP_FIRST_COMMENT;
        }

        Ok(if coins > 0 || exp > 0 {
            RewardOutcome::Granted { coins, exp, coin_tx }
        } else {
            RewardOutcome::Skipped
        })
    }

    /// Reward when a comment receives a reply: one coin to the parent
    /// author, at most once per comment per day.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures.
    pub async fn comment_replied(
        &self,
        parent_comment_id: i64,
        parent_author: UserId,
    ) -> Result<RewardOutcome> {
        let today = self.clock.today();
        if let Err(err) = self.guard.ensure_not_granted(
            "COMMENT_REPLY",
            parent_comment_id,
            &parent_author,
            Some(today),
        ) {
            return Self::duplicate_or_err(err);
        }

        match self
            .balance
            .grant_coin(
                parent_author,
                COMMENT_REPLY_REWARD,
                "COMMENT_REWARD",
                Some(BusinessRef::new("COMMENT_REPLY", parent_comment_id)),
                Some("comment received a reply"),
            )
            .await
        {
            Ok(id) => Ok(RewardOutcome::Granted {
                coins: COMMENT_REPLY_REWARD,
                exp: 0,
                coin_tx: Some(id),
            }),
            Err(err) if Self::is_soft(&err) => Ok(RewardOutcome::Skipped),
            Err(err) => Err(err),
        }
    }

    /// Reward for a post being liked.
    ///
    /// The author side is idempotent per `(post, author, day)`. The liker
    /// side is capped by the daily like-coin ceiling and never blocks the
    /// author's reward.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures.
    pub async fn post_liked(
        &self,
        post_id: i64,
        author: UserId,
        liker: UserId,
    ) -> Result<RewardOutcome> {
        self.liked("POST_LIKE", "POST_LIKE_ACTION", "Post", post_id, author, liker)
            .await
    }

    /// Reward for a comment being liked. Same shape as [`Self::post_liked`].
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures.
    pub async fn comment_liked(
        &self,
        comment_id: i64,
        author: UserId,
        liker: UserId,
    ) -> Result<RewardOutcome> {
        self.liked(
            "COMMENT_LIKE",
            "COMMENT_LIKE_ACTION",
            "Comment",
            comment_id,
            author,
            liker,
        )
        .await
    }

    /// Award a highlight slot (god-comment or sofa): base coins plus a
    /// per-like bonus, once per `(kind, comment, author)`.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures.
    pub async fn highlight_awarded(
        &self,
        kind: HighlightKind,
        comment_id: i64,
        author: UserId,
        like_count: i64,
    ) -> Result<RewardOutcome> {
        if like_count < 0 {
            return Err(EconomyError::Validation(format!(
                "like count must not be negative, got {like_count}"
            )));
        }
        if let Err(err) =
            self.guard
                .ensure_not_granted(kind.business_type(), comment_id, &author, None)
        {
            return Self::duplicate_or_err(err);
        }

        let total = kind.base_reward() + like_count * kind.like_bonus();
        let coin_tx = self
            .balance
            .grant_coin(
                author,
                total,
                "HIGHLIGHT_REWARD",
                Some(BusinessRef::new(kind.business_type(), comment_id)),
                Some("highlight award"),
            )
            .await?;

        let exp_granted = self
            .experience
            .grant_experience(
                author,
                EXP_RECEIVE_LIKE,
                "HIGHLIGHT",
                RewardCategory::Highlight,
                Some(BusinessRef::new(kind.business_type(), comment_id)),
                Some("highlight award"),
            )
            .await?;

        Ok(RewardOutcome::Granted {
            coins: total,
            exp: if exp_granted { EXP_RECEIVE_LIKE } else { 0 },
            coin_tx: Some(coin_tx),
        })
    }

    /// Weekly retention reward for a highlight that kept its slot, weeks
    /// 1 through 3, each paid once.
    ///
    /// # Errors
    ///
    /// - `Validation` if `week` is outside `1..=3`.
    /// - Otherwise errors only for infrastructure failures.
    pub async fn retention_reward(
        &self,
        kind: HighlightKind,
        highlight_id: i64,
        user_id: UserId,
        week: u8,
    ) -> Result<RewardOutcome> {
        if !(1..=3).contains(&week) {
            return Err(EconomyError::Validation(format!(
                "retention week must be 1..=3, got {week}"
            )));
        }

        let business_type = format!("{}_RETENTION_W{week}", kind.business_type());
        if let Err(err) =
            self.guard
                .ensure_not_granted(&business_type, highlight_id, &user_id, None)
        {
            return Self::duplicate_or_err(err);
        }

        let amount = kind.retention_reward();
        let coin_tx = self
            .balance
            .grant_coin(
                user_id,
                amount,
                "HIGHLIGHT_REWARD",
                Some(BusinessRef::new(business_type, highlight_id)),
                Some("highlight retention reward"),
            )
            .await?;

        Ok(RewardOutcome::Granted {
            coins: amount,
            exp: 0,
            coin_tx: Some(coin_tx),
        })
    }

    /// Shared like-reward flow for posts and comments.
    async fn liked(
        &self,
        author_business: &'static str,
        liker_business: &'static str,
        exp_business: &'static str,
        entity_id: i64,
        author: UserId,
        liker: UserId,
    ) -> Result<RewardOutcome> {
        let today = self.clock.today();

        // One author reward per entity per day, across all likers.
        if let Err(err) =
            self.guard
                .ensure_not_granted(author_business, entity_id, &author, Some(today))
        {
            return Self::duplicate_or_err(err);
        }

        let mut coins = 0;
        let mut exp = 0;

        let coin_tx = match self
            .balance
            .grant_coin(
                author,
                LIKE_REWARD_AUTHOR,
                "LIKE_REWARD",
                Some(BusinessRef::new(author_business, entity_id)),
                Some("received a like"),
            )
            .await
        {
            Ok(id) => id,
            Err(err) if Self::is_soft(&err) => return Ok(RewardOutcome::Skipped),
            Err(err) => return Err(err),
        };
        coins += LIKE_REWARD_AUTHOR;

        // Liker-side coin, capped per day from the journal.
        if self.liker_cap_reached(&liker, today)? {
            tracing::debug!(liker = %liker, "daily like-coin cap reached, skipping liker reward");
        } else {
            match self
                .balance
                .grant_coin(
                    liker,
                    LIKE_REWARD_LIKER,
                    "LIKE_REWARD",
                    Some(BusinessRef::new(liker_business, entity_id)),
                    Some("liked content"),
                )
                .await
            {
                Ok(_) => coins += LIKE_REWARD_LIKER,
                Err(err) if Self::is_soft(&err) => {}
                Err(err) => return Err(err),
            }
        }

        if self
            .experience
            .grant_experience(
                author,
                EXP_RECEIVE_LIKE,
                "RECEIVE_LIKE",
                RewardCategory::Like,
                Some(BusinessRef::new(exp_business, entity_id)),
                Some("received a like"),
            )
            .await?
        {
            exp += EXP_RECEIVE_LIKE;
        }

        if self
            .experience
            .grant_experience(
                liker,
                EXP_GIVE_LIKE,
                "GIVE_LIKE",
                RewardCategory::Like,
                Some(BusinessRef::new(exp_business, entity_id)),
                Some("liked content"),
            )
            .await?
        {
            exp += EXP_GIVE_LIKE;
        }

        Ok(RewardOutcome::Granted {
            coins,
            exp,
            coin_tx: Some(coin_tx),
        })
    }

    /// Whether the liker already earned today's like-coin budget.
    fn liker_cap_reached(&self, liker: &UserId, today: chrono::NaiveDate) -> Result<bool> {
        let earned = self.store.successful_grant_total(
            liker,
            "LIKE_REWARD",
            &["POST_LIKE_ACTION", "COMMENT_LIKE_ACTION"],
            today,
        )?;
        Ok(earned >= DAILY_LIKE_COIN_CAP)
    }

    /// Business rejections that degrade a dispatch to a partial or skipped
    /// outcome instead of failing it.
    fn is_soft(err: &EconomyError) -> bool {
        err.is_business_rejection() || matches!(err, EconomyError::Conflict { .. })
    }

    /// A duplicate is a no-op success from the caller's perspective; any
    /// other guard failure is a real error.
    fn duplicate_or_err(err: EconomyError) -> Result<RewardOutcome> {
        match err {
            EconomyError::DuplicateReward { .. } => Ok(RewardOutcome::AlreadyGranted),
            other => Err(other),
        }
    }
}
