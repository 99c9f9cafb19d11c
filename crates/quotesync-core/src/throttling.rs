use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tracing::debug;

use crate::data_source::{DataSource, SourceError, SourceFuture};
use crate::Symbol;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Paces calls to a vendor against its published quota for the whole process.
///
/// When the quota is spent the call fails fast with a rate-limited
/// [`SourceError`] carrying the wait until the next cell frees up.
pub struct ThrottledSource<S> {
    inner: S,
    limiter: Arc<DirectRateLimiter>,
    clock: DefaultClock,
}

impl<S: DataSource> ThrottledSource<S> {
    pub fn new(inner: S, quota_window: Duration, quota_limit: u32) -> Self {
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            ))),
            clock: DefaultClock::default(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Takes one cell of quota, or returns how long until one is free.
    fn acquire(&self) -> Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }
}

impl<S: DataSource> DataSource for ThrottledSource<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a> {
        Box::pin(async move {
            if let Err(wait) = self.acquire() {
                debug!(
                    source = self.inner.name(),
                    symbol = %symbol,
                    wait_ms = wait.as_millis() as u64,
                    "vendor quota exhausted"
                );
                return Err(SourceError::rate_limited(
                    Some(wait),
                    format!("vendor quota exhausted for {}", self.inner.name()),
                ));
            }
            self.inner.fetch(symbol).await
        })
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SyntheticSource;
    use crate::data_source::SourceErrorKind;

    #[tokio::test]
    async fn fails_fast_once_quota_is_spent() {
        let source = ThrottledSource::new(SyntheticSource::new(), Duration::from_secs(60), 2);
        let symbol = Symbol::parse("AAPL").expect("valid symbol");

        assert!(source.fetch(&symbol).await.is_ok());
        assert!(source.fetch(&symbol).await.is_ok());

        let err = source.fetch(&symbol).await.expect_err("third call is throttled");
        assert_eq!(err.kind(), SourceErrorKind::RateLimited);
        let wait = err.retry_after().expect("wait time is reported");
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(30));
    }

    #[test]
    fn zero_limit_still_builds_a_quota() {
        let quota = quota_from_window(Duration::from_secs(1), 0);
        assert_eq!(quota.burst_size().get(), 1);
    }
}
