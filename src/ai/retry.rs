//! Bounded retry with clamped exponential backoff.
//!
//! The policy is applied around a single fallible async operation,
//! for example opening a response stream:
//!
//! ```no_run
//! # async fn example(session: &gemini_chat::gemini::ChatSession) -> Result<(), gemini_chat::gemini::GeminiError> {
//! use gemini_chat::ai::retry::RetryPolicy;
//!
//! let policy = RetryPolicy::default();
//! let _stream = policy.run(|| session.stream_message("Hello")).await?;
//! # Ok(())
//! # }
//! ```
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Classifies an error for the purposes of retrying.
pub trait Retryable {
    /// Whether another attempt could plausibly succeed.
    fn is_retryable(&self) -> bool;

    /// Whether the failure was caused by rate limiting or an
    /// exhausted quota. Rate limited failures wait longer before the
    /// next attempt.
    fn is_rate_limited(&self) -> bool;
}

/// Matches the error text reported when a request is rate limited or
/// over quota.
pub fn is_rate_limit_signature(text: &str) -> bool {
    text.to_lowercase().contains("quota") || text.contains("429")
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts including the first one
    pub max_attempts: u32,
    pub multiplier: u32,
    /// Lower bound of each backoff wait, in units
    pub min_wait: u32,
    /// Upper bound of each backoff wait, in units
    pub max_wait: u32,
    /// Extra wait added when the failure was rate limited, in units
    pub rate_limit_penalty: u32,
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: 1,
            min_wait: 4,
            max_wait: 10,
            rate_limit_penalty: 5,
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    /// Backoff after the `attempt`th failure (1-based):
    /// `multiplier * 2^(attempt - 1)` clamped to `[min_wait, max_wait]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
        let units = (self.multiplier as u64)
            .saturating_mul(exp)
            .clamp(self.min_wait as u64, self.max_wait.max(self.min_wait) as u64);
        self.unit.saturating_mul(units as u32)
    }

    /// Total wait before the attempt following the `attempt`th failure.
    pub fn delay_after(&self, attempt: u32, rate_limited: bool) -> Duration {
        let backoff = self.backoff(attempt);
        if rate_limited {
            backoff + self.unit.saturating_mul(self.rate_limit_penalty)
        } else {
            backoff
        }
    }

    /// Run `op` until it succeeds, fails with an error that isn't
    /// retryable, or the attempts are used up. The last error is
    /// returned as is.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts || !err.is_retryable() {
                        return Err(err);
                    }
                    let delay = self.delay_after(attempt, err.is_rate_limited());
                    tracing::warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
