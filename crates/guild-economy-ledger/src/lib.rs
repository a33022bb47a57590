//! Coin and experience ledgers for the guild virtual economy.
//!
//! Concurrency safety comes from optimistic concurrency control alone: no
//! lock guards an account row. Every mutation reads the row, computes the
//! successor state, and writes conditionally on the version it read; a
//! losing writer discards its work and the [`retry`] executor restarts the
//! whole cycle with jittered backoff. Detached side effects (level-up
//! bonus, notification) ride the follow-up outbox with at-least-once
//! delivery.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use guild_economy_ledger::Economy;
//! use guild_economy_store::MemoryStore;
//!
//! # async fn demo() -> guild_economy_core::Result<()> {
//! let economy = Economy::new(Arc::new(MemoryStore::new()));
//! let user = guild_economy_core::UserId::generate();
//!
//! let tx = economy.balance.grant_coin(user, 100, "EARN", None, None).await?;
//! let view = economy.balance.balance(user)?;
//! assert_eq!(view.available, 100);
//! # let _ = tx;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod clock;
pub mod dispatcher;
pub mod experience;
pub mod idempotency;
pub mod leaderboard;
pub mod limiter;
pub mod notify;
pub mod outbox;
pub mod retry;

pub use balance::BalanceLedger;
pub use clock::{Clock, FixedClock, SystemClock};
pub use dispatcher::{HighlightKind, RewardDispatcher, RewardOutcome};
pub use experience::ExperienceLedger;
pub use idempotency::IdempotencyGuard;
pub use leaderboard::{Leaderboard, LeaderboardEntry, LeaderboardPage};
pub use limiter::DailyLimiter;
pub use notify::{LogNotifier, Notifier};
pub use outbox::{OutboxWorker, MAX_FOLLOW_UP_ATTEMPTS};
pub use retry::{Attempt, RetryPolicy};

use std::sync::Arc;

use guild_economy_core::{IdSource, LevelTable, UlidSource};
use guild_economy_store::Store;

/// Fully wired economy engine: both ledgers, the dispatcher, the outbox
/// worker, and leaderboard queries over one store.
#[derive(Clone)]
pub struct Economy {
    /// The coin ledger.
    pub balance: Arc<BalanceLedger>,

    /// The experience ledger.
    pub experience: Arc<ExperienceLedger>,

    /// Reward entry points for platform events.
    pub dispatcher: RewardDispatcher,

    /// Consumer for detached follow-up effects.
    pub outbox: Arc<OutboxWorker>,

    /// Ranking queries.
    pub leaderboard: Leaderboard,
}

impl Economy {
    /// Wire an engine with defaults: the standard level table, the system
    /// clock, ULID transaction ids, and a log-only notifier.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_parts(
            store,
            Arc::new(LevelTable::standard()),
            Arc::new(SystemClock),
            Arc::new(UlidSource),
            Arc::new(LogNotifier),
        )
    }

    /// Wire an engine with explicit collaborators.
    #[must_use]
    pub fn with_parts(
        store: Arc<dyn Store>,
        table: Arc<LevelTable>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let balance = Arc::new(BalanceLedger::new(store.clone(), ids.clone(), clock.clone()));
        let experience = Arc::new(ExperienceLedger::new(
            store.clone(),
            ids,
            clock.clone(),
            table,
        ));
        let dispatcher = RewardDispatcher::new(
            balance.clone(),
            experience.clone(),
            store.clone(),
            clock,
        );
        let outbox = Arc::new(OutboxWorker::new(store.clone(), balance.clone(), notifier));
        let leaderboard = Leaderboard::new(store);

        Self {
            balance,
            experience,
            dispatcher,
            outbox,
            leaderboard,
        }
    }
}
