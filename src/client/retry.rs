//! Bounded retry with exponential backoff, cancellable by the owner of the
//! fetch.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed `attempt` (1-based): base, 2 × base, 4 × base, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("{0}")]
    Aborted(E),
    #[error("Cancelled")]
    Cancelled,
}

/// Owner side of a cancellation signal. Dropping the handle cancels as well,
/// so a fetch never outlives the view that started it.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken(self.sender.subscribe())
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    pub async fn cancelled(&mut self) {
        // Err means the handle is gone, which counts as cancellation.
        let _ = self.0.wait_for(|cancelled| *cancelled).await;
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, runs
/// out of attempts or gets cancelled.
pub async fn retrying_fetch<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancelToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut cancel = cancel.clone();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() {
            return Err(RetryError::Aborted(err));
        }
        if attempt >= max_attempts {
            warn!(attempt, %err, "Giving up fetch");
            return Err(RetryError::Exhausted { attempts: attempt, last: err });
        }

        let delay = policy.delay_after(attempt);
        warn!(attempt, ?delay, %err, "Fetch failed, retrying");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            *self == TestError::Flaky
        }
    }

    fn failing_until(
        success_on: u32,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, TestError>> {
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(match call >= success_on {
                true => Ok(call),
                false => Err(TestError::Flaky),
            })
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=5)
            .map(|attempt| policy.delay_after(attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_backoff() {
        let handle = CancelHandle::new();
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = retrying_fetch(
            RetryPolicy::default(),
            &handle.token(),
            failing_until(3, calls.clone()),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(1 + 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let handle = CancelHandle::new();
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = retrying_fetch(
            RetryPolicy::default(),
            &handle.token(),
            failing_until(u32::MAX, calls.clone()),
        )
        .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 5,
                last: TestError::Flaky
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(1 + 2 + 4 + 8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_aborts_immediately() {
        let handle = CancelHandle::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, _> = retrying_fetch(RetryPolicy::default(), &handle.token(), || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(TestError::Fatal))
        })
        .await;

        assert_eq!(result, Err(RetryError::Aborted(TestError::Fatal)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let handle = CancelHandle::new();
        let token = handle.token();
        let calls = Arc::new(AtomicU32::new(0));

        let fetch = tokio::spawn({
            let calls = calls.clone();
            async move {
                retrying_fetch(RetryPolicy::default(), &token, failing_until(u32::MAX, calls)).await
            }
        });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.cancel();

        assert_eq!(fetch.await.unwrap(), Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_handle_cancels() {
        let handle = CancelHandle::new();
        let token = handle.token();
        drop(handle);
        assert!(token.is_cancelled());

        let result: Result<u32, RetryError<TestError>> =
            retrying_fetch(RetryPolicy::default(), &token, || std::future::ready(Ok(1))).await;
        assert_eq!(result, Err(RetryError::Cancelled));
    }
}
