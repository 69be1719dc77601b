use crate::error::FetchError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;
type RetryableFn = Arc<dyn Fn(&FetchError) -> bool + Send + Sync>;

/// Bounded retry: how many attempts, how long to wait between them, and
/// which failures deserve another go.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffFn,
    retryable: RetryableFn,
}

/// The last error of an operation the policy gave up on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaveUp {
    pub attempts: u32,
    pub error: FetchError,
    /// False when the policy stopped because the error was not retryable
    pub retryable: bool,
}

impl RetryPolicy {
    /// Exponential backoff from one second, retrying transient fetch errors
    #[cfg(test)]
    pub fn new(max_attempts: u32) -> Self {
        Self::exponential(max_attempts, Duration::from_secs(1))
    }

    /// `base`, `2 * base`, `4 * base`, ... between attempts
    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(move |attempt| base.saturating_mul(1 << attempt.saturating_sub(1).min(16))),
            retryable: Arc::new(FetchError::is_transient),
        }
    }

    #[cfg(test)]
    pub fn with_backoff(mut self, backoff: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    #[cfg(test)]
    pub fn with_retryable(
        mut self,
        retryable: impl Fn(&FetchError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retryable = Arc::new(retryable);
        self
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, GaveUp>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let retryable = (self.retryable)(&error);
                    if !retryable || attempt >= self.max_attempts {
                        return Err(GaveUp {
                            attempts: attempt,
                            error,
                            retryable,
                        });
                    }

                    let delay = self.backoff_for(attempt);
                    warn!(
                        "🔄 {} failed (attempt {}/{}): {}; retrying in {:?}",
                        label, attempt, self.max_attempts, error, delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts).with_backoff(|_| Duration::ZERO)
    }

    fn timeout() -> FetchError {
        FetchError::Timeout {
            url: "https://example.com".into(),
            timeout: Duration::from_millis(10),
        }
    }

    #[test]
    fn exponential_backoff_doubles() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(500));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = instant(0)
            .run("page 1", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(timeout()) }
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = instant(3)
            .run("page 2", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(timeout())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_bound() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = instant(3)
            .run("page 2", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(timeout()) }
            })
            .await;

        let gave_up = result.unwrap_err();
        assert_eq!(gave_up.attempts, 3);
        assert!(gave_up.retryable);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = instant(3)
            .run("seed", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::permanent("bad", "unparsable")) }
            })
            .await;

        let gave_up = result.unwrap_err();
        assert_eq!(gave_up.attempts, 1);
        assert!(!gave_up.retryable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_predicate_controls_retries() {
        let calls = AtomicU32::new(0);
        let policy = instant(5).with_retryable(|e| matches!(e, FetchError::Timeout { .. }));
        let result: Result<(), _> = policy
            .run("page", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::navigation("https://example.com", "reset")) }
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
