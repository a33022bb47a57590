//! Consumer for queued follow-up work.
//!
//! Level-up effects are enqueued by the experience ledger and processed
//! here, detached from the grant that triggered them. Delivery is
//! at-least-once: a failed item goes back on the queue with its attempt
//! count bumped, up to a cap; the bonus grant itself is deduplicated by
//! the idempotency guard, so redelivery cannot double-pay.

use std::sync::Arc;
use std::time::Duration;

use guild_economy_core::reward::LEVEL_UP_BONUS_PER_LEVEL;
use guild_economy_core::{BusinessRef, FollowUp, FollowUpKind, Result};
use guild_economy_store::Store;

use crate::balance::BalanceLedger;
use crate::idempotency::IdempotencyGuard;
use crate::notify::Notifier;

/// Attempts before a follow-up is dropped with an error log.
pub const MAX_FOLLOW_UP_ATTEMPTS: u32 = 5;

/// Items processed per polling cycle.
const BATCH_SIZE: usize = 32;

/// Processes queued follow-up items.
#[derive(Clone)]
pub struct OutboxWorker {
    store: Arc<dyn Store>,
    balance: Arc<BalanceLedger>,
    notifier: Arc<dyn Notifier>,
    guard: IdempotencyGuard,
}

impl OutboxWorker {
    /// Create a worker over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        balance: Arc<BalanceLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let guard = IdempotencyGuard::new(store.clone());
        Self {
            store,
            balance,
            notifier,
            guard,
        }
    }

    /// Process up to `limit` queued items now. Returns the number of items
    /// that completed.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the claim itself; per-item failures are
    /// logged and requeued, never surfaced.
    pub async fn drain(&self, limit: usize) -> Result<usize> {
        let items = self.store.claim_follow_ups(limit)?;
        let mut completed = 0;

        for item in items {
            match self.process(&item).await {
                Ok(()) => completed += 1,
                Err(err) => {
                    if item.attempts + 1 >= MAX_FOLLOW_UP_ATTEMPTS {
                        tracing::error!(
                            item_id = %item.id,
                            attempts = item.attempts + 1,
                            %err,
                            "dropping follow-up after repeated failures"
                        );
                    } else {
                        tracing::warn!(
                            item_id = %item.id,
                            attempts = item.attempts + 1,
                            %err,
                            "follow-up failed, requeueing"
                        );
                        self.store.requeue_follow_up(&item)?;
                    }
                }
            }
        }

        Ok(completed)
    }

    /// Poll the queue forever. Claim errors are logged and the loop keeps
    /// going; storage being briefly down must not kill the consumer.
    pub async fn run(&self, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.drain(BATCH_SIZE).await {
                tracing::error!(%err, "outbox drain failed");
            }
        }
    }

    async fn process(&self, item: &FollowUp) -> Result<()> {
        match item.kind {
            FollowUpKind::LevelUpBonus { user_id, new_level } => {
                // Redelivery guard: one bonus per (user, level), ever.
                if self
                    .guard
                    .already_granted("LEVEL_UP", i64::from(new_level), &user_id, None)?
                {
                    return Ok(());
                }

                let bonus = i64::from(new_level) * LEVEL_UP_BONUS_PER_LEVEL;
                self.balance
                    .grant_coin(
                        user_id,
                        bonus,
                        "LEVEL_UP_BONUS",
                        Some(BusinessRef::new("LEVEL_UP", i64::from(new_level))),
                        Some("level-up bonus"),
                    )
                    .await?;
                Ok(())
            }
            FollowUpKind::LevelUpNotice {
                user_id,
                from_level,
                to_level,
            } => {
                self.notifier.level_up(user_id, from_level, to_level).await;
                Ok(())
            }
        }
    }
}
