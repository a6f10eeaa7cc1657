//! Retry with exponential backoff around upstream calls.
//!
//! One primitive, [`RetryPolicy`], serves every caller. Members and the moderator
//! only differ in how many attempts they are allowed:
//!
//! | Caller    | Attempts | Delays between attempts |
//! |-----------|----------|-------------------------|
//! | Member    | 2        | 2s                      |
//! | Moderator | 5        | 2s, 4s, 8s, 16s         |
//!
//! Attempt 1 runs immediately. After transient attempt `k` fails, the wrapper sleeps
//! `base_delay × 2^(k−1)` before attempt `k + 1`. Permanent failures return at once.
//!
//! ```
//! use hatcouncil::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::moderator();
//! assert_eq!(policy.delay_after(1), Duration::from_secs(2));
//! assert_eq!(policy.delay_after(4), Duration::from_secs(16));
//! ```

use crate::error::CouncilError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
pub const MEMBER_MAX_ATTEMPTS: u32 = 2;
pub const MODERATOR_MAX_ATTEMPTS: u32 = 5;

/// Something that can wait. Injected so tests observe delays without sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

/// Successful result of a retried call.
#[derive(Debug, Clone)]
pub struct Retried<T> {
    pub value: T,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Final failure of a retried call.
#[derive(Debug, Clone)]
pub struct RetryFailure {
    pub error: CouncilError,
    /// Attempts made before giving up.
    pub attempts: u32,
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn member() -> Self {
        Self::new(MEMBER_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }

    pub fn moderator() -> Self {
        Self::new(MODERATOR_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay * 2u32.pow(exponent)
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. Only
    /// [`CouncilError::TransientUpstream`] is retried.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<Retried<T>, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CouncilError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("{}: succeeded on attempt {}", label, attempt);
                    }
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_after(attempt);
                    log::warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        label,
                        attempt,
                        self.max_attempts,
                        error,
                        delay
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    log::warn!(
                        "{}: giving up after attempt {}/{}: {}",
                        label,
                        attempt,
                        self.max_attempts,
                        error
                    );
                    return Err(RetryFailure {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::member();
        let delays: Vec<u64> = (1..=5).map(|a| policy.delay_after(a).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32]);
    }

    #[test]
    fn zero_attempts_is_clamped() {
        assert_eq!(RetryPolicy::new(0, DEFAULT_BASE_DELAY).max_attempts(), 1);
    }

    #[tokio::test]
    async fn exhausting_the_budget_sleeps_between_attempts_only() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let policy = RetryPolicy::moderator().with_sleeper(sleeper.clone());

        let result: Result<Retried<()>, RetryFailure> = policy
            .run("test", |_| async {
                Err(CouncilError::TransientUpstream("busy".into()))
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 5);
        assert_eq!(
            sleeper.delays(),
            vec![2, 4, 8, 16]
                .into_iter()
                .map(Duration::from_secs)
                .collect::<Vec<_>>()
        );
    }
}
