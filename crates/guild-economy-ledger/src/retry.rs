//! Retry execution for optimistic-concurrency conflicts.
//!
//! A losing compare-and-swap is reported as [`Attempt::Conflict`] — data,
//! not an exception — and only that outcome is retried. Every other error
//! propagates immediately. Each retry re-runs the whole closure, so a fresh
//! attempt always starts from freshly read state.

use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;

use guild_economy_core::{EconomyError, Result};

/// Outcome of one mutation attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The attempt committed.
    Done(T),

    /// The guarded write lost its version race; the cycle may be retried.
    Conflict,
}

/// Retry budget for an operation: attempt cap plus capped exponential
/// backoff. The sleep before attempt `n + 1` is drawn uniformly from
/// `0 ..= min(base_delay * 2^(n-1), max_delay)`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Base backoff delay.
    pub base_delay: Duration,

    /// Ceiling on any single backoff delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Budget for coin grants. Contention on a single balance row is rare.
    pub const COIN: Self = Self {
        max_attempts: 3,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(400),
    };

    /// Budget for experience grants. Popular posts funnel many likes into
    /// one author's account, so the budget is deeper and the cap higher.
    pub const EXPERIENCE: Self = Self {
        max_attempts: 6,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(1000),
    };

    /// Ceiling for the backoff after `attempt` (1-based) conflicts.
    #[must_use]
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let scaled = self.base_delay.saturating_mul(1_u32 << exp);
        scaled.min(self.max_delay)
    }
}

/// Run `op` under `policy`, retrying on [`Attempt::Conflict`].
///
/// `what` labels the operation in logs. The closure receives the 1-based
/// attempt number.
///
/// # Errors
///
/// Returns `EconomyError::Conflict` after the budget is exhausted, or
/// whatever non-conflict error the closure produced.
pub async fn run_with_retry<'a, T>(
    policy: RetryPolicy,
    what: &'static str,
    mut op: impl FnMut(u32) -> BoxFuture<'a, Result<Attempt<T>>> + Send + 'a,
) -> Result<T> {
    for attempt in 1..=policy.max_attempts {
        match op(attempt).await? {
            Attempt::Done(value) => return Ok(value),
            Attempt::Conflict => {
                if attempt == policy.max_attempts {
                    break;
                }
                let ceiling = policy.backoff_ceiling(attempt);
                let delay = jitter(ceiling);
                tracing::warn!(
                    operation = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "version conflict, backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    tracing::error!(
        operation = what,
        attempts = policy.max_attempts,
        "version conflict persisted through the retry budget"
    );
    Err(EconomyError::Conflict {
        attempts: policy.max_attempts,
    })
}

/// Draw a uniform delay in `0 ..= ceiling`.
fn jitter(ceiling: Duration) -> Duration {
    let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
    if ceiling_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_ceiling_doubles_then_caps() {
        let policy = RetryPolicy::EXPERIENCE;
        assert_eq!(policy.backoff_ceiling(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_ceiling(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_ceiling(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_ceiling(5), Duration::from_millis(1000));
        assert_eq!(policy.backoff_ceiling(6), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn first_attempt_success_needs_no_retry() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(RetryPolicy::COIN, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Attempt::Done(7)) }.boxed()
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn conflicts_retry_until_the_budget_runs_out() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = run_with_retry(RetryPolicy::COIN, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Attempt::Conflict) }.boxed()
        })
        .await;
        assert!(matches!(result, Err(EconomyError::Conflict { attempts: 3 })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_then_success_returns_value() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(RetryPolicy::EXPERIENCE, "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Ok(Attempt::Conflict)
                } else {
                    Ok(Attempt::Done(attempt))
                }
            }
            .boxed()
        })
        .await
        .unwrap();
        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_conflict_errors_propagate_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = run_with_retry(RetryPolicy::COIN, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(EconomyError::Validation("bad input".into())) }.boxed()
        })
        .await;
        assert!(matches!(result, Err(EconomyError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
