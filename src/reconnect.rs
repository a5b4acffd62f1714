//! Reconnect supervision with bounded exponential backoff.
//!
//! Shared by both transports: the caller supplies a `factory` that makes
//! one connection attempt and a status callback for progress reporting.
//! Backoff sleeps are cut into short slices so cancellation is honored
//! promptly at every suspension point; a cancelled supervisor never
//! reports `Connected`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Sleep slice between cancellation polls.
const CANCEL_POLL: Duration = Duration::from_millis(250);

/// Cooperative cancellation flag shared across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress of one supervision run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReconnectStatus {
    /// Attempt `n` (1-based) is starting.
    Attempting(u32),
    Connected,
    /// All attempts exhausted.
    Failed,
    Cancelled,
}

/// Backoff schedule: `min(base · 2^(n−1), cap)` for attempt `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(16),
        }
    }
}

impl BackoffPolicy {
    /// Sleep before retrying after failed attempt `n` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.cap)
    }
}

#[derive(Debug, Error)]
pub enum ReconnectError<E> {
    #[error("retries exhausted after {attempts} attempts")]
    Exhausted { attempts: u32, last: E },
    #[error("cancelled")]
    Cancelled,
}

/// Run connection attempts under the backoff policy until one succeeds,
/// the budget is exhausted, or the token is cancelled.
///
/// Each call starts a fresh schedule at attempt 1, so a success followed
/// by a later disconnection re-enters here with the counter reset.
pub fn supervise<T, E: std::fmt::Display>(
    policy: &BackoffPolicy,
    cancel: &CancelToken,
    mut factory: impl FnMut() -> Result<T, E>,
    mut on_status: impl FnMut(ReconnectStatus),
) -> Result<T, ReconnectError<E>> {
    let mut last_err: Option<E> = None;

    for attempt in 1..=policy.max_retries.max(1) {
        if cancel.is_cancelled() {
            on_status(ReconnectStatus::Cancelled);
            return Err(ReconnectError::Cancelled);
        }

        on_status(ReconnectStatus::Attempting(attempt));
        match factory() {
            Ok(conn) => {
                if cancel.is_cancelled() {
                    on_status(ReconnectStatus::Cancelled);
                    return Err(ReconnectError::Cancelled);
                }
                info!(attempt, "connected");
                on_status(ReconnectStatus::Connected);
                return Ok(conn);
            }
            Err(e) => {
                warn!(attempt, error = %e, "connection attempt failed");
                last_err = Some(e);
            }
        }

        if attempt < policy.max_retries {
            let delay = policy.delay(attempt);
            debug!(attempt, ?delay, "backing off");
            if !sleep_cancellable(delay, cancel) {
                on_status(ReconnectStatus::Cancelled);
                return Err(ReconnectError::Cancelled);
            }
        }
    }

    on_status(ReconnectStatus::Failed);
    Err(ReconnectError::Exhausted {
        attempts: policy.max_retries.max(1),
        last: last_err.expect("at least one attempt ran"),
    })
}

/// Sleep `total`, polling the token each slice. Returns `false` if
/// cancelled before the full duration elapsed.
fn sleep_cancellable(total: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(CANCEL_POLL));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(16),
        }
    }

    #[test]
    fn schedule_doubles_and_caps() {
        let policy = BackoffPolicy::default();
        let secs: Vec<u64> = (1..=7).map(|n| policy.delay(n).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 16, 16]);
    }

    #[test]
    fn succeeds_after_failures() {
        let mut attempts = 0;
        let mut statuses = Vec::new();
        let result = supervise(
            &fast_policy(5),
            &CancelToken::new(),
            || {
                attempts += 1;
                if attempts < 3 { Err("nope") } else { Ok(attempts) }
            },
            |s| statuses.push(s),
        );
        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            statuses,
            vec![
                ReconnectStatus::Attempting(1),
                ReconnectStatus::Attempting(2),
                ReconnectStatus::Attempting(3),
                ReconnectStatus::Connected,
            ]
        );
    }

    #[test]
    fn exhaustion_reports_failed() {
        let mut statuses = Vec::new();
        let result: Result<(), _> = supervise(
            &fast_policy(2),
            &CancelToken::new(),
            || Err("still down"),
            |s| statuses.push(s),
        );
        assert!(matches!(
            result,
            Err(ReconnectError::Exhausted { attempts: 2, last: "still down" })
        ));
        assert_eq!(statuses.last(), Some(&ReconnectStatus::Failed));
    }

    #[test]
    fn cancelled_before_start_never_attempts() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut attempts = 0;
        let mut statuses = Vec::new();
        let result: Result<(), ReconnectError<&str>> = supervise(
            &fast_policy(5),
            &cancel,
            || {
                attempts += 1;
                Err("unreachable")
            },
            |s| statuses.push(s),
        );
        assert!(matches!(result, Err(ReconnectError::Cancelled)));
        assert_eq!(attempts, 0);
        assert_eq!(statuses, vec![ReconnectStatus::Cancelled]);
    }

    #[test]
    fn cancellation_during_backoff_stops_attempts() {
        let cancel = CancelToken::new();
        let cancel_after_first = cancel.clone();
        let mut attempts = 0;
        let result: Result<(), ReconnectError<&str>> = supervise(
            &BackoffPolicy {
                max_retries: 5,
                base: Duration::from_secs(60),
                cap: Duration::from_secs(60),
            },
            &cancel,
            || {
                attempts += 1;
                // Cancel while the supervisor sleeps off this failure.
                cancel_after_first.cancel();
                Err("down")
            },
            |_| {},
        );
        assert!(matches!(result, Err(ReconnectError::Cancelled)));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn success_after_cancellation_is_not_reported_connected() {
        let cancel = CancelToken::new();
        let inner = cancel.clone();
        let mut statuses = Vec::new();
        let result = supervise(
            &fast_policy(5),
            &cancel,
            || {
                inner.cancel();
                Ok::<_, &str>(42)
            },
            |s| statuses.push(s),
        );
        assert!(matches!(result, Err(ReconnectError::Cancelled)));
        assert!(!statuses.contains(&ReconnectStatus::Connected));
    }
}
