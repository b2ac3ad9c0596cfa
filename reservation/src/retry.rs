use std::{future::Future, time::Duration};

use abi::{Actor, BookingConfig, Error, ReservationId, ReserveRequest};
use tokio::time::sleep;
use tracing::warn;

use crate::{BookingStore, ReservationManager, Rsvp};

/// Exponential backoff for operations aborted by a concurrent transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// attempts after the first one
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &BookingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.retry_base_delay_ms),
            ..Self::default()
        }
    }

    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.max_delay)
    }
}

/// Re-run `op` while it fails with a retryable error, up to the policy limit.
/// Every other error is returned at once.
pub async fn retry_on_conflict<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt = attempt + 1, ?delay, "transaction conflict, retrying");
                sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

impl<S: BookingStore> ReservationManager<S> {
    /// `reserve_hotel_room` re-run from the start on serialization conflicts,
    /// since the availability picture has changed.
    pub async fn reserve_with_retry(
        &self,
        actor: &Actor,
        request: ReserveRequest,
        policy: &RetryPolicy,
    ) -> Result<ReservationId, Error> {
        retry_on_conflict(policy, move || self.reserve_hotel_room(actor, request.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn delay_should_grow_then_cap() {
        let policy = RetryPolicy {
            max_delay: Duration::from_millis(300),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn conflicts_should_be_retried_until_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = retry_on_conflict(&fast_policy(3), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::TransactionConflict)
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_should_stop_at_the_limit() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), Error> = retry_on_conflict(&fast_policy(2), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::TransactionConflict)
        })
        .await;
        assert_eq!(result.unwrap_err(), Error::TransactionConflict);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_should_not_be_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), Error> = retry_on_conflict(&fast_policy(3), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::InvalidTime)
        })
        .await;
        assert_eq!(result.unwrap_err(), Error::InvalidTime);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
