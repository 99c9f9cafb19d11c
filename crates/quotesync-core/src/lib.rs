//! # quotesync core
//!
//! Market data synchronization and resilience for a UI that shows one ticker
//! at a time.
//!
//! ## Overview
//!
//! This crate decides *when* to fetch, *whether* a fetch is already running,
//! *how long* to trust a cached result, *how* to retry transient failures,
//! and *how* to throttle callers against a shared backend budget:
//!
//! - **Result cache** with per-entry TTL, lazy eviction and a periodic sweep
//! - **Request deduplication** so concurrent fetches of one symbol share one call
//! - **Retry/backoff** driven by a fixed failure taxonomy
//! - **Rate limiting** per caller identity over a shared sliding window, with
//!   a local fixed-window fallback when the shared store is unreachable
//! - **Fetch scheduling** with debounce, periodic refresh and deterministic
//!   cancellation
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | HTTP JSON and synthetic data sources |
//! | [`cache`] | TTL result cache |
//! | [`circuit_breaker`] | Connectivity flag for the shared counter store |
//! | [`config`] | Tunables from defaults, JSON file and environment |
//! | [`data_source`] | Data source trait and adapter error type |
//! | [`dedup`] | In-flight request coalescing |
//! | [`domain`] | Symbol, snapshot and timestamp types |
//! | [`error`] | Validation and fetch error taxonomy |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`loading`] | Per-operation loading state |
//! | [`rate_limit`] | Per-identity admission control |
//! | [`retry`] | Backoff policies and the retry loop |
//! | [`scheduler`] | Debounced, periodic fetching for the symbol in view |
//! | [`subscriber`] | Update notifications |
//! | [`sync`] | The fetch pipeline tying it all together |
//! | [`throttling`] | Vendor quota pacing |
//! | [`timer`] | Owned, cancellable timer tasks |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use quotesync_core::{MarketDataSync, SyncConfig, SyntheticSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sync = MarketDataSync::builder(Arc::new(SyntheticSource::new()))
//!         .config(SyncConfig::default())
//!         .build()?;
//!
//!     let outcome = sync.fetch_str("AAPL").await?;
//!     println!("AAPL price: ${:.2}", outcome.snapshot.price);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ FetchScheduler  │── debounce / refresh timers
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Deduplicator    │────▶│ Result Cache     │
//! └────────┬────────┘     └──────────────────┘
//!          ▼ miss
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Retry loop      │────▶│ Rate Limiter     │── shared store / fallback
//! └────────┬────────┘     └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Data Source     │────▶│ HTTP Client      │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Adapter failures are classified into a fixed taxonomy whose messages are
//! safe to show to end users:
//!
//! ```rust
//! use quotesync_core::{FetchError, FetchErrorKind};
//!
//! fn describe(error: &FetchError) -> String {
//!     match error.kind() {
//!         FetchErrorKind::RateLimited => error.user_message(),
//!         FetchErrorKind::Validation => String::from("check the symbol"),
//!         _ => error.to_string(),
//!     }
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod dedup;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod loading;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod subscriber;
pub mod sync;
pub mod throttling;
pub mod timer;

// Adapter implementations
pub use adapters::{HttpSnapshotSource, SyntheticSource};

// Caching and coalescing
pub use cache::ResultCache;
pub use dedup::RequestDeduplicator;

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Configuration
pub use config::{ConfigError, SyncConfig};

// Data source trait and types
pub use data_source::{DataSource, SourceError, SourceErrorKind, SourceFuture};

// Domain models
pub use domain::{HistoryPoint, Ratings, Snapshot, SnapshotBuilder, Symbol, UtcDateTime};

// Error types
pub use error::{FetchError, FetchErrorKind, ValidationError};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, ReqwestHttpClient,
};

// Loading state and notifications
pub use loading::{LoadingError, LoadingState};
pub use subscriber::{ChannelSubscriber, Subscriber, Update};

// Rate limiting
pub use rate_limit::{
    CounterFuture, CounterKind, FixedWindowCounter, MemoryCounterStore, RateDecision,
    RateLimitConfig, RateLimiter, StoreError, WindowCounter,
};

// Retry logic
pub use retry::{execute_with_retry, Backoff, RetryConfig, RetryOutcome};

// Scheduling and the pipeline
pub use scheduler::{FetchScheduler, Phase};
pub use sync::{FetchOutcome, MarketDataSync, MarketDataSyncBuilder};
pub use throttling::ThrottledSource;
pub use timer::TimerHandle;
