//! Notification side-channel seam.
//!
//! Transport and templating live outside this engine; the ledger only needs
//! somewhere to announce level changes. The default implementation logs.

use async_trait::async_trait;

use guild_economy_core::UserId;

/// Receiver for level-change announcements.
///
/// Calls are fire-and-forget from the engine's perspective: errors are the
/// implementation's problem and must not surface into grant paths.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// A user moved from `from_level` to `to_level`.
    async fn level_up(&self, user_id: UserId, from_level: u32, to_level: u32);
}

/// Notifier that only writes a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn level_up(&self, user_id: UserId, from_level: u32, to_level: u32) {
        tracing::info!(
            user_id = %user_id,
            from_level,
            to_level,
            "level up"
        );
    }
}
