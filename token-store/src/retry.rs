//! Retry-with-backoff for store operations that fail with a transient
//! error kind (shard unavailable, timeout).
//!
//! `BackoffIterator` is a trait rather than a fixed schedule so a caller
//! that wants to share one backoff sequence across several logically
//! related store calls (as the refresh engine does across its locate and
//! mint stages) can hold it across `with_retry` invocations instead of
//! resetting on every call.

use crate::error::StoreError;
use std::future::Future;
use std::time::Duration;

pub trait BackoffIterator: Send {
    /// Return the delay before the next attempt, or `None` once the
    /// attempt budget is exhausted.
    fn next_delay(&mut self) -> Option<Duration>;
}

/// Exponential backoff starting at `base`, doubling each attempt, capped
/// at `max_attempts` total tries (including the first).
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    multiplier: u32,
    max_attempts: u32,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, multiplier: u32, max_attempts: u32) -> Self {
        Self {
            base,
            multiplier,
            max_attempts,
            attempt: 0,
        }
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempt
    }
}

impl Default for ExponentialBackoff {
    /// Base 50ms, doubling, capped at 8 attempts.
    fn default() -> Self {
        Self::new(Duration::from_millis(50), 2, 8)
    }
}

impl BackoffIterator for ExponentialBackoff {
    fn next_delay(&mut self) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.saturating_pow(self.attempt - 1);
        Some(self.base.saturating_mul(factor))
    }
}

/// Run `op` until it succeeds, returns a non-transient error, or `backoff`
/// runs out of delays. Sleeps between attempts using the delay the
/// backoff iterator hands back.
pub async fn with_retry<F, Fut, T>(mut backoff: impl BackoffIterator, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => match backoff.next_delay() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(50), 2, 4);
        assert_eq!(b.next_delay(), Some(Duration::from_millis(50)));
        assert_eq!(b.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(b.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(b.next_delay(), None);
    }

    #[tokio::test]
    async fn with_retry_gives_up_on_non_transient_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), StoreError> = with_retry(ExponentialBackoff::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::NotFound) }
        })
        .await;
        assert_eq!(result.unwrap_err(), StoreError::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(ExponentialBackoff::new(Duration::from_millis(1), 2, 8), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StoreError::ShardUnavailable)
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_exhausts_attempts_on_persistent_transient_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<(), StoreError> =
            with_retry(ExponentialBackoff::new(Duration::from_millis(1), 2, 3), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::ShardUnavailable) }
            })
            .await;
        assert_eq!(result.unwrap_err(), StoreError::ShardUnavailable);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
