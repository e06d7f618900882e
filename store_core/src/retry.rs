//! Retry with exponential backoff
//!
//! Only errors whose code is in the policy's retryable set are retried; every
//! other error is returned from the attempt that raised it.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::context::OperationContext;
use crate::errors::{ErrorCode, RepositoryError};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero means a single attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub retryable_error_codes: HashSet<ErrorCode>,
    /// Fraction of each delay added at random, in `[0, 1]`
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            retryable_error_codes: ErrorCode::default_retryable().into_iter().collect(),
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retryable_codes(mut self, codes: impl IntoIterator<Item = ErrorCode>) -> Self {
        self.retryable_error_codes = codes.into_iter().collect();
        self
    }

    pub fn validate(&self) -> Result<(), RepositoryError> {
        if self.max_delay < self.initial_delay {
            return Err(RepositoryError::validation(format!(
                "retry max delay {:?} is shorter than the initial delay {:?}",
                self.max_delay, self.initial_delay
            )));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 0.0 {
            return Err(RepositoryError::validation(format!(
                "retry backoff factor must be positive, got {}",
                self.backoff_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(RepositoryError::validation(format!(
                "retry jitter must be within [0, 1], got {}",
                self.jitter
            )));
        }
        Ok(())
    }

    pub fn is_retryable(&self, error: &RepositoryError) -> bool {
        self.retryable_error_codes.contains(&error.code())
    }

    /// Delay before retry number `attempt + 1`:
    /// `min(initial * factor^attempt, max)`, without jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(scaled)
            .map(|delay| delay.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = delay.mul_f64(self.jitter * rand::rng().random_range(0.0..=1.0));
        delay + extra
    }
}

/// Runs an operation under an optional [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: Option<RetryPolicy>,
}

impl RetryExecutor {
    pub fn new(policy: Option<RetryPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> Option<&RetryPolicy> {
        self.policy.as_ref()
    }

    /// Backoff before the next attempt, or `None` when `error` is final
    pub fn backoff(&self, attempt: u32, error: &RepositoryError) -> Option<Duration> {
        let policy = self.policy.as_ref()?;
        if attempt >= policy.max_retries || !policy.is_retryable(error) {
            return None;
        }
        Some(policy.jittered(policy.delay_for_attempt(attempt)))
    }

    /// Log and wait out the backoff for a retryable failure; hands the
    /// error back when it is final.
    pub async fn wait_before_retry(
        &self,
        ctx: &OperationContext,
        attempt: u32,
        error: RepositoryError,
    ) -> Result<(), RepositoryError> {
        let Some(delay) = self.backoff(attempt, &error) else {
            return Err(error);
        };
        tracing::warn!(
            attempt = attempt + 1,
            max_retries = self.policy.as_ref().map_or(0, |p| p.max_retries),
            delay_ms = delay.as_millis() as u64,
            code = %error.code(),
            error = %error,
            "retrying after transient failure"
        );
        ctx.sleep(delay).await
    }

    /// Call `operation(attempt)` until it succeeds, fails with a final error
    /// or runs out of retries.
    pub async fn execute<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        mut operation: F,
    ) -> Result<T, RepositoryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    self.wait_before_retry(ctx, attempt, error).await?;
                    attempt += 1;
                }
            }
        }
    }
}
