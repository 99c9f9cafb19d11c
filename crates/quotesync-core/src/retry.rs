//! Retry logic with classified failures and two backoff policies.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::{FetchError, FetchErrorKind};

/// Delay schedule between attempts. `attempt` is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * (attempt + 1)`, capped at `max`.
    Linear { base: Duration, max: Duration },
    /// `base * 2^attempt`, capped at `max`.
    Doubling { base: Duration, max: Duration },
}

impl Backoff {
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Linear { base, max } => base.saturating_mul(attempt.saturating_add(1)).min(max),
            Self::Doubling { base, max } => {
                let scale = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(scale).min(max)
            }
        }
    }
}

/// Configuration for the retry controller.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// The maximum number of retries to attempt.
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Backoff for network and timeout failures.
    pub transient_backoff: Backoff,
    /// Backoff for upstream API failures, where the vendor is answering but
    /// struggling and benefits from larger gaps.
    pub upstream_backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1_000), Duration::from_secs(30))
    }
}

impl RetryConfig {
    /// Linear backoff for transient errors and doubling backoff for upstream
    /// errors, both starting at `base_delay` and capped at `max_delay`.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            transient_backoff: Backoff::Linear {
                base: base_delay,
                max: max_delay,
            },
            upstream_backoff: Backoff::Doubling {
                base: base_delay,
                max: max_delay,
            },
        }
    }

    /// Disable retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry `attempt` (0-based) of a failure of `kind`, or
    /// `None` if the kind is never retried locally.
    pub fn delay_for(&self, kind: FetchErrorKind, attempt: u32) -> Option<Duration> {
        match kind {
            FetchErrorKind::Network | FetchErrorKind::Timeout => {
                Some(self.transient_backoff.delay(attempt))
            }
            FetchErrorKind::UpstreamApi => Some(self.upstream_backoff.delay(attempt)),
            FetchErrorKind::RateLimited | FetchErrorKind::Validation | FetchErrorKind::Unknown => {
                None
            }
        }
    }
}

/// Successful result of [`execute_with_retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// Number of retries it took to succeed.
    pub retry_count: u32,
}

/// Invoke `operation` until it succeeds, fails with a non-retryable
/// classification, or `max_retries` is exhausted.
///
/// The closure receives the 0-based attempt number. A terminal error records
/// how many retries were performed.
pub async fn execute_with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<RetryOutcome<T>, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    FetchError: From<E>,
{
    let mut attempt = 0_u32;
    loop {
        let error = match operation(attempt).await {
            Ok(value) => {
                return Ok(RetryOutcome {
                    value,
                    retry_count: attempt,
                })
            }
            Err(error) => FetchError::from(error),
        };

        let delay = match config.delay_for(error.kind(), attempt) {
            Some(delay) if attempt < config.max_retries => delay,
            _ => return Err(error.with_retries(attempt)),
        };

        warn!(
            kind = %error.kind(),
            attempt = attempt + 1,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            detail = error.detail(),
            "retrying failed fetch"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
