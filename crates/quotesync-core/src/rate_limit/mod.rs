//! Per-identity admission control against the backend budget.
//!
//! | Counter                | Precision      | Scope                         |
//! |------------------------|----------------|-------------------------------|
//! | [`WindowCounter`] impl | sliding window | shared by every process       |
//! | [`FixedWindowCounter`] | fixed buckets  | this process, used as fallback |
//!
//! [`RateLimiter`] asks the shared counter while its connectivity breaker is
//! closed and answers from the fallback otherwise. It never fails.

mod fallback;
mod store;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use fallback::FixedWindowCounter;
pub use store::{CounterFuture, MemoryCounterStore, StoreError, WindowCounter};

/// Which counter produced a [`RateDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterKind {
    Shared,
    Fallback,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: Duration,
    pub counter: CounterKind,
}

impl RateDecision {
    pub fn allow(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: Duration::ZERO,
            counter: CounterKind::Shared,
        }
    }

    pub fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after,
            counter: CounterKind::Shared,
        }
    }

    fn decided_by(self, counter: CounterKind) -> Self {
        Self { counter, ..self }
    }
}

/// Window and budget applied to every identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 5,
        }
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_ms)
        .unwrap_or(0)
}

/// Sliding-window limiter with a local fixed-window fallback.
pub struct RateLimiter {
    shared: Option<Arc<dyn WindowCounter>>,
    fallback: FixedWindowCounter,
    breaker: CircuitBreaker,
    store_timeout: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("shared", &self.shared.as_ref().map(|store| store.name().to_owned()))
            .field("breaker", &self.breaker.state())
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

impl RateLimiter {
    /// Limiter with no shared store; every decision comes from the fallback.
    pub fn local() -> Self {
        Self {
            shared: None,
            fallback: FixedWindowCounter::new(),
            breaker: CircuitBreaker::new("rate_limit_store", CircuitBreakerConfig::default()),
            store_timeout: Duration::ZERO,
        }
    }

    pub fn with_store(
        store: Arc<dyn WindowCounter>,
        store_timeout: Duration,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            shared: Some(store),
            fallback: FixedWindowCounter::new(),
            breaker: CircuitBreaker::new("rate_limit_store", breaker),
            store_timeout,
        }
    }

    pub async fn check_and_reserve(
        &self,
        identity: &str,
        window: Duration,
        max_requests: u32,
    ) -> RateDecision {
        self.check_and_reserve_at(identity, unix_now_ms(), window, max_requests)
            .await
    }

    /// Admission check at an explicit wall-clock time in milliseconds.
    pub async fn check_and_reserve_at(
        &self,
        identity: &str,
        now_ms: u64,
        window: Duration,
        max_requests: u32,
    ) -> RateDecision {
        let (counter, kind) = self.select();
        let result = self
            .ask(counter, kind, identity, now_ms, window, max_requests)
            .await;

        let decision = match (result, kind) {
            (Ok(decision), CounterKind::Shared) => {
                self.breaker.record_success();
                return decision.decided_by(CounterKind::Shared);
            }
            (Ok(decision), CounterKind::Fallback) => Ok(decision),
            (Err(err), CounterKind::Shared) => {
                warn!(
                    store = counter.name(),
                    identity,
                    error = %err,
                    "rate limit store failed, using local fallback"
                );
                self.breaker.record_failure();
                let fallback: &dyn WindowCounter = &self.fallback;
                self.ask(fallback, CounterKind::Fallback, identity, now_ms, window, max_requests)
                    .await
            }
            (Err(err), CounterKind::Fallback) => Err(err),
        };

        let decision = match decision {
            Ok(decision) => decision.decided_by(CounterKind::Fallback),
            Err(err) => {
                // Local counting cannot block traffic on its own failure.
                warn!(identity, error = %err, "local rate counter failed, admitting request");
                RateDecision::allow(0).decided_by(CounterKind::Fallback)
            }
        };
        debug!(
            identity,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "fallback rate decision"
        );
        decision
    }

    /// Counter the connectivity breaker selects for the next check.
    fn select(&self) -> (&dyn WindowCounter, CounterKind) {
        match self.shared.as_deref() {
            Some(store) if self.breaker.allow_request() => (store, CounterKind::Shared),
            _ => (&self.fallback as &dyn WindowCounter, CounterKind::Fallback),
        }
    }

    async fn ask(
        &self,
        counter: &dyn WindowCounter,
        kind: CounterKind,
        identity: &str,
        now_ms: u64,
        window: Duration,
        max_requests: u32,
    ) -> Result<RateDecision, StoreError> {
        let check = counter.check_and_reserve(identity, now_ms, window, max_requests);
        if kind == CounterKind::Fallback || self.store_timeout.is_zero() {
            return check.await;
        }
        tokio::time::timeout(self.store_timeout, check)
            .await
            .map_err(|_| StoreError::Timeout(self.store_timeout))?
    }

    pub fn has_shared_store(&self) -> bool {
        self.shared.is_some()
    }

    /// Connectivity state of the shared store.
    pub fn store_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Counter the next check will go to, barring a store failure.
    pub fn mode(&self) -> CounterKind {
        match (self.shared.is_some(), self.breaker.state()) {
            (true, CircuitState::Closed | CircuitState::HalfOpen) => CounterKind::Shared,
            _ => CounterKind::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    struct FlakyStore {
        inner: MemoryCounterStore,
        down: AtomicBool,
    }

    impl WindowCounter for FlakyStore {
        fn name(&self) -> &str {
            "flaky"
        }

        fn check_and_reserve<'a>(
            &'a self,
            identity: &'a str,
            now_ms: u64,
            window: Duration,
            max_requests: u32,
        ) -> CounterFuture<'a> {
            Box::pin(async move {
                if self.down.load(Ordering::SeqCst) {
                    return Err(StoreError::Unavailable("connection refused".to_owned()));
                }
                Ok(self.inner.reserve(identity, now_ms, window, max_requests))
            })
        }
    }

    struct HangingStore;

    impl WindowCounter for HangingStore {
        fn name(&self) -> &str {
            "hanging"
        }

        fn check_and_reserve<'a>(
            &'a self,
            _identity: &'a str,
            _now_ms: u64,
            _window: Duration,
            _max_requests: u32,
        ) -> CounterFuture<'a> {
            Box::pin(futures::future::pending())
        }
    }

    fn breaker(open_timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 1,
            open_timeout,
        }
    }

    #[tokio::test]
    async fn local_limiter_always_uses_fallback() {
        let limiter = RateLimiter::local();
        assert_eq!(limiter.mode(), CounterKind::Fallback);

        let decision = limiter.check_and_reserve_at("user", 0, WINDOW, 2).await;
        assert!(decision.allowed);
        assert_eq!(decision.counter, CounterKind::Fallback);
    }

    #[tokio::test]
    async fn fallback_counts_in_fixed_buckets_through_the_counter_trait() {
        let limiter = RateLimiter::local();

        for _ in 0..2 {
            assert!(limiter.check_and_reserve_at("user", 10_000, WINDOW, 2).await.allowed);
        }
        let denied = limiter.check_and_reserve_at("user", 15_000, WINDOW, 2).await;

        assert!(!denied.allowed);
        assert_eq!(denied.counter, CounterKind::Fallback);
        assert_eq!(denied.retry_after, Duration::from_millis(45_000));
        assert!(limiter.check_and_reserve_at("user", 60_000, WINDOW, 2).await.allowed);
    }

    #[tokio::test]
    async fn shared_store_decides_while_reachable() {
        let limiter = RateLimiter::with_store(
            Arc::new(MemoryCounterStore::new()),
            Duration::from_millis(250),
            breaker(Duration::from_secs(5)),
        );

        for _ in 0..5 {
            let decision = limiter.check_and_reserve_at("user", 1_000, WINDOW, 5).await;
            assert!(decision.allowed);
            assert_eq!(decision.counter, CounterKind::Shared);
        }
        let denied = limiter.check_and_reserve_at("user", 1_500, WINDOW, 5).await;
        assert!(!denied.allowed);
        assert!(denied.retry_after > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_opens_breaker_and_recovers() {
        let store = Arc::new(FlakyStore {
            inner: MemoryCounterStore::new(),
            down: AtomicBool::new(true),
        });
        let limiter = RateLimiter::with_store(
            store.clone(),
            Duration::from_millis(250),
            breaker(Duration::from_secs(5)),
        );

        let decision = limiter.check_and_reserve_at("user", 0, WINDOW, 5).await;
        assert!(decision.allowed);
        assert_eq!(decision.counter, CounterKind::Fallback);
        assert_eq!(limiter.store_state(), CircuitState::Open);

        store.down.store(false, Ordering::SeqCst);
        let still_open = limiter.check_and_reserve_at("user", 10, WINDOW, 5).await;
        assert_eq!(still_open.counter, CounterKind::Fallback);

        tokio::time::advance(Duration::from_secs(5)).await;
        let trial = limiter.check_and_reserve_at("user", 20, WINDOW, 5).await;
        assert_eq!(trial.counter, CounterKind::Shared);
        assert_eq!(limiter.store_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn store_timeout_counts_as_failure() {
        let limiter = RateLimiter::with_store(
            Arc::new(HangingStore),
            Duration::from_millis(250),
            breaker(Duration::from_secs(5)),
        );

        let decision = limiter.check_and_reserve_at("user", 0, WINDOW, 1).await;
        assert!(decision.allowed);
        assert_eq!(decision.counter, CounterKind::Fallback);
        assert_eq!(limiter.mode(), CounterKind::Fallback);
    }
}
