//! The fetch pipeline for one symbol:
//! deduplicate, read the cache, admit through the rate limiter, call the
//! source under a timeout with retries, then write the cache.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::config::{ConfigError, SyncConfig};
use crate::data_source::DataSource;
use crate::dedup::RequestDeduplicator;
use crate::rate_limit::{RateLimitConfig, RateLimiter, WindowCounter};
use crate::retry::{execute_with_retry, RetryConfig};
use crate::timer::TimerHandle;
use crate::{FetchError, Snapshot, Symbol};

/// Successful result of [`MarketDataSync::fetch`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome {
    pub snapshot: Arc<Snapshot>,
    /// Served from the cache without touching the source.
    pub from_cache: bool,
    /// Retries the source needed before it answered.
    pub retry_count: u32,
}

struct SyncInner {
    source: Arc<dyn DataSource>,
    cache: ResultCache,
    dedup: RequestDeduplicator<Symbol, FetchOutcome, FetchError>,
    limiter: RateLimiter,
    retry: RetryConfig,
    rate_limit: RateLimitConfig,
    request_timeout: Duration,
    identity: String,
}

/// Owns the cache, in-flight map, rate limiter and retry policy.
///
/// Cloning is cheap and every clone shares the same state. Independent
/// instances share nothing.
#[derive(Clone)]
pub struct MarketDataSync {
    inner: Arc<SyncInner>,
}

impl std::fmt::Debug for MarketDataSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataSync")
            .field("source", &self.inner.source.name())
            .field("identity", &self.inner.identity)
            .field("limiter", &self.inner.limiter)
            .finish_non_exhaustive()
    }
}

pub struct MarketDataSyncBuilder {
    source: Arc<dyn DataSource>,
    config: SyncConfig,
    counter_store: Option<Arc<dyn WindowCounter>>,
}

impl MarketDataSyncBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared rate-limit store. Without one every caller is counted locally.
    pub fn counter_store(mut self, store: Arc<dyn WindowCounter>) -> Self {
        self.counter_store = Some(store);
        self
    }

    pub fn build(self) -> Result<MarketDataSync, ConfigError> {
        self.config.validate()?;
        let config = self.config;

        let limiter = match self.counter_store {
            Some(store) => RateLimiter::with_store(store, config.store_timeout(), config.breaker()),
            None => RateLimiter::local(),
        };

        Ok(MarketDataSync {
            inner: Arc::new(SyncInner {
                source: self.source,
                cache: ResultCache::new(config.cache_ttl()),
                dedup: RequestDeduplicator::new(),
                limiter,
                retry: config.retry(),
                rate_limit: config.rate_limit(),
                request_timeout: config.request_timeout(),
                identity: config.identity,
            }),
        })
    }
}

impl MarketDataSync {
    pub fn builder(source: Arc<dyn DataSource>) -> MarketDataSyncBuilder {
        MarketDataSyncBuilder {
            source,
            config: SyncConfig::default(),
            counter_store: None,
        }
    }

    /// Fetch `symbol`, joining an identical fetch already in flight.
    pub async fn fetch(&self, symbol: &Symbol) -> Result<FetchOutcome, FetchError> {
        self.fetch_fresh_for(symbol, Duration::ZERO).await
    }

    /// Like [`fetch`](Self::fetch), but a cached snapshot only counts if it
    /// stays fresh for `horizon`. Periodic refreshes pass their interval so a
    /// tick never reuses an entry that expires before the next tick.
    pub async fn fetch_fresh_for(
        &self,
        symbol: &Symbol,
        horizon: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        let inner = Arc::clone(&self.inner);
        let key = symbol.clone();
        self.inner
            .dedup
            .execute(symbol.clone(), move || async move {
                inner.load(&key, horizon).await
            })
            .await
    }

    /// Validate raw user input, then [`fetch`](Self::fetch) it.
    pub async fn fetch_str(&self, input: &str) -> Result<FetchOutcome, FetchError> {
        let symbol = Symbol::parse(input)?;
        self.fetch(&symbol).await
    }

    pub async fn invalidate(&self, symbol: &Symbol) -> bool {
        self.inner.cache.invalidate(symbol).await
    }

    /// Start the periodic cache sweep.
    pub fn spawn_sweeper(&self) -> TimerHandle {
        self.inner.cache.spawn_sweeper()
    }

    pub fn cache(&self) -> &ResultCache {
        &self.inner.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn source_name(&self) -> &str {
        self.inner.source.name()
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    /// Symbols with a fetch in flight.
    pub fn pending_len(&self) -> usize {
        self.inner.dedup.pending_len()
    }
}

impl SyncInner {
    async fn load(
        &self,
        symbol: &Symbol,
        horizon: Duration,
    ) -> Result<FetchOutcome, FetchError> {
        if let Some(snapshot) = self.cache.get_fresh_for(symbol, horizon).await {
            debug!(symbol = %symbol, "cache hit");
            return Ok(FetchOutcome {
                snapshot,
                from_cache: true,
                retry_count: 0,
            });
        }

        let outcome = execute_with_retry(&self.retry, |_| self.attempt(symbol))
            .await
            .map_err(|err| {
                warn!(
                    symbol = %symbol,
                    code = err.code(),
                    retries = err.retries(),
                    detail = err.detail(),
                    "fetch failed"
                );
                err
            })?;

        let snapshot = Arc::new(outcome.value);
        self.cache.put(symbol.clone(), Arc::clone(&snapshot)).await;
        info!(
            symbol = %symbol,
            source = self.source.name(),
            price = snapshot.price,
            retries = outcome.retry_count,
            "snapshot refreshed"
        );

        Ok(FetchOutcome {
            snapshot,
            from_cache: false,
            retry_count: outcome.retry_count,
        })
    }

    async fn attempt(&self, symbol: &Symbol) -> Result<Snapshot, FetchError> {
        let decision = self
            .limiter
            .check_and_reserve(
                &self.identity,
                self.rate_limit.window,
                self.rate_limit.max_requests,
            )
            .await;
        if !decision.allowed {
            return Err(FetchError::rate_limited(
                decision.retry_after,
                format!(
                    "identity {} exhausted {} requests per {:?}",
                    self.identity, self.rate_limit.max_requests, self.rate_limit.window
                ),
            ));
        }

        let snapshot = tokio::time::timeout(self.request_timeout, self.source.fetch(symbol))
            .await
            .map_err(|_| {
                FetchError::timeout(format!(
                    "{} did not answer within {:?}",
                    self.source.name(),
                    self.request_timeout
                ))
            })??;

        if snapshot.symbol != *symbol {
            return Err(FetchError::upstream(format!(
                "{} returned a snapshot for {} when asked for {}",
                self.source.name(),
                snapshot.symbol,
                symbol
            )));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SyntheticSource;
    use crate::FetchErrorKind;

    fn sync_with(config: SyncConfig) -> (Arc<SyntheticSource>, MarketDataSync) {
        let source = Arc::new(SyntheticSource::new());
        let sync = MarketDataSync::builder(source.clone())
            .config(config)
            .build()
            .expect("valid config");
        (source, sync)
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let (source, sync) = sync_with(SyncConfig::default());
        let symbol = Symbol::parse("AAPL").expect("valid symbol");

        let first = sync.fetch(&symbol).await.expect("fetch");
        let second = sync.fetch(&symbol).await.expect("fetch");

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert!(Arc::ptr_eq(&first.snapshot, &second.snapshot));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn invalid_input_fails_validation() {
        let (source, sync) = sync_with(SyncConfig::default());
        let err = sync.fetch_str("not a symbol!").await.expect_err("invalid");
        assert_eq!(err.kind(), FetchErrorKind::Validation);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn budget_exhaustion_is_rate_limited_without_retry() {
        let config = SyncConfig {
            cache_ttl_ms: 0,
            rate_limit_max_requests: 1,
            ..SyncConfig::default()
        };
        let (source, sync) = sync_with(config);
        let symbol = Symbol::parse("MSFT").expect("valid symbol");

        sync.fetch(&symbol).await.expect("first fetch admitted");
        let err = sync.fetch(&symbol).await.expect_err("budget spent");

        assert_eq!(err.kind(), FetchErrorKind::RateLimited);
        assert_eq!(err.retries(), 0);
        assert!(err.retry_after().is_some_and(|wait| wait > Duration::ZERO));
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn build_rejects_invalid_config() {
        let result = MarketDataSync::builder(Arc::new(SyntheticSource::new()))
            .config(SyncConfig {
                request_timeout_ms: 0,
                ..SyncConfig::default()
            })
            .build();
        assert!(result.is_err());
    }
}
