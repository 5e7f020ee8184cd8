//! Retry and backoff policies
//!
//! Two fixed policies, both injectable so tests can run without delays:
//! - [`RetryPolicy`]: bounded attempts with a fixed delay, used for connects
//! - [`ThrottlePolicy`]: extended sleep and bounded retry of one operation
//!   when the service reports throttling

use crate::error::{MigrationError, RemoteError};
use crate::port::{RemoteAccess, SiteSession};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Fixed-delay retry policy for connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl RetryPolicy {
    /// Create policy
    #[inline]
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Policy with no delay between attempts
    #[inline]
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay_ms: 0,
        }
    }

    /// Delay after the given failed attempt (1-based)
    #[inline]
    #[must_use]
    pub fn delay_for(&self, _attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 5_000,
        }
    }
}

/// Connect to `url`, retrying per `policy`
///
/// # Errors
/// Returns [`MigrationError::ConnectionFailed`] with the last remote error
/// once the attempt budget is spent.
pub async fn connect_with_retry(
    remote: &dyn RemoteAccess,
    url: &str,
    policy: &RetryPolicy,
) -> Result<Box<dyn SiteSession>, MigrationError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match remote.connect(url).await {
            Ok(session) => {
                tracing::debug!(url, attempt, "Connected");
                return Ok(session);
            }
            Err(e) if attempt < max_attempts => {
                tracing::warn!(url, attempt, max_attempts, "Connect failed: {}", e);
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
            Err(source) => {
                tracing::error!(url, attempts = attempt, "Giving up on connect: {}", source);
                return Err(MigrationError::ConnectionFailed {
                    url: url.to_string(),
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}

/// Backoff applied when the service throttles a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    /// Sleep before retrying a throttled call
    pub backoff: Duration,
    /// Retries of the same call before giving up
    pub max_retries: u32,
}

impl ThrottlePolicy {
    /// Create policy
    #[inline]
    #[must_use]
    pub fn new(backoff: Duration, max_retries: u32) -> Self {
        Self {
            backoff,
            max_retries,
        }
    }

    /// Run one remote operation, sleeping and retrying while it is throttled
    ///
    /// Non-throttling errors are returned on the first occurrence.
    ///
    /// # Errors
    /// The operation's own error, or the last throttling error once the
    /// retry bound is reached.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut retries = 0;
        loop {
            match op().await {
                Err(e) if e.is_throttling() && retries < self.max_retries => {
                    retries += 1;
                    tracing::warn!(
                        operation,
                        retry = retries,
                        backoff_ms = u64::try_from(self.backoff.as_millis()).unwrap_or(u64::MAX),
                        "Throttled by service, backing off"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                other => return other,
            }
        }
    }
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn throttle_retries_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = ThrottlePolicy::new(Duration::ZERO, 3);

        let result = policy
            .call("read_groups", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RemoteError::Throttled("429".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn throttle_gives_up_after_bound() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = ThrottlePolicy::new(Duration::ZERO, 2);

        let result: Result<(), _> = policy
            .call("read_groups", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::Throttled("429".into()))
            })
            .await;

        assert!(result.unwrap_err().is_throttling());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = ThrottlePolicy::new(Duration::ZERO, 5);

        let result: Result<(), _> = policy
            .call("read_groups", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RemoteError::AccessDenied("no".into()))
            })
            .await;

        assert!(matches!(result, Err(RemoteError::AccessDenied(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_connect_policy_is_three_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(RetryPolicy::immediate(3).delay_for(1), Duration::ZERO);
    }
}
