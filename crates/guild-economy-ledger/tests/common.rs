//! Shared test harness: an engine over the in-memory store with a pinned
//! clock and a recording notifier.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use guild_economy_core::{LevelTable, UlidSource, UserId};
use guild_economy_ledger::{Economy, FixedClock, Notifier};
use guild_economy_store::MemoryStore;

/// Notifier that records every level-up announcement.
#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<(UserId, u32, u32)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn level_up(&self, user_id: UserId, from_level: u32, to_level: u32) {
        self.notices
            .lock()
            .unwrap()
            .push((user_id, from_level, to_level));
    }
}

pub struct Harness {
    pub economy: Economy,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Engine wired over a fresh in-memory store, pinned to a fixed instant.
pub fn harness() -> Harness {
    // Surface engine logs in test output when RUST_LOG is set.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at(
        Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap(),
    ));
    let notifier = Arc::new(RecordingNotifier::default());

    let economy = Economy::with_parts(
        store.clone(),
        Arc::new(LevelTable::standard()),
        clock.clone(),
        Arc::new(UlidSource),
        notifier.clone(),
    );

    Harness {
        economy,
        store,
        clock,
        notifier,
    }
}
