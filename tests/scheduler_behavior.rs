//! Behavior-driven tests for the fetch scheduler
//!
//! These tests verify what a UI sees while a user pages through symbols:
//! debouncing, periodic refresh and cancellation.

use std::sync::Arc;
use std::time::Duration;

use quotesync_core::{
    ChannelSubscriber, FetchErrorKind, FetchScheduler, MarketDataSync, Phase, SourceError,
    Symbol, SyncConfig, Update,
};
use quotesync_tests::{symbol, ScriptedSource, Step};
use tokio::sync::mpsc::UnboundedReceiver;

type Updates = UnboundedReceiver<(Symbol, Update)>;

const DEBOUNCE: Duration = Duration::from_millis(500);
const REFRESH: Duration = Duration::from_secs(60);

fn scheduler_for(source: Arc<ScriptedSource>, config: SyncConfig) -> (FetchScheduler, Updates) {
    let sync = MarketDataSync::builder(source)
        .config(config)
        .build()
        .expect("valid config");
    let (subscriber, updates) = ChannelSubscriber::channel();
    (
        FetchScheduler::new(sync, Arc::new(subscriber), DEBOUNCE, REFRESH),
        updates,
    )
}

fn config() -> SyncConfig {
    SyncConfig {
        cache_ttl_ms: 30_000,
        ..SyncConfig::default()
    }
}

fn drain(updates: &mut Updates) -> Vec<(Symbol, Update)> {
    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        seen.push(update);
    }
    seen
}

fn snapshots_for(seen: &[(Symbol, Update)], wanted: &Symbol) -> usize {
    seen.iter()
        .filter(|(symbol, update)| symbol == wanted && matches!(update, Update::Snapshot(_)))
        .count()
}

// =============================================================================
// Debounce
// =============================================================================

#[tokio::test(start_paused = true)]
async fn rapid_paging_only_fetches_the_symbol_the_user_settles_on() {
    // Given: A scheduler with a 500ms debounce
    let source = ScriptedSource::new();
    let (scheduler, mut updates) = scheduler_for(source.clone(), config());

    // When: The user swipes through A, B and C within 100ms
    scheduler.on_interest(symbol("A"));
    tokio::time::sleep(Duration::from_millis(40)).await;
    scheduler.on_interest(symbol("B"));
    tokio::time::sleep(Duration::from_millis(40)).await;
    scheduler.on_interest(symbol("C"));
    tokio::time::sleep(Duration::from_millis(600)).await;

    // Then: Only C was fetched and reported
    assert_eq!(source.called_symbols(), vec![symbol("C")]);
    assert_eq!(scheduler.active_symbol(), Some(symbol("C")));
    let seen = drain(&mut updates);
    assert!(seen.iter().all(|(s, _)| *s == symbol("C")));
    assert_eq!(snapshots_for(&seen, &symbol("C")), 1);
}

// =============================================================================
// Periodic refresh
// =============================================================================

#[tokio::test(start_paused = true)]
async fn active_symbol_is_refreshed_on_every_interval() {
    // Given: Interest in AAPL has settled
    let source = ScriptedSource::new();
    let (scheduler, mut updates) = scheduler_for(source.clone(), config());
    let aapl = symbol("AAPL");
    scheduler.on_interest(aapl.clone());

    // When: Two refresh intervals pass
    tokio::time::sleep(DEBOUNCE + REFRESH * 2 + Duration::from_millis(10)).await;

    // Then: The initial fetch and two refreshes reached the source
    assert_eq!(source.calls_for(&aapl), 3);
    assert_eq!(snapshots_for(&drain(&mut updates), &aapl), 3);

    // And: The loading state is settled and clean
    let state = scheduler.loading_state();
    assert!(!state.is_loading);
    assert!(state.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn refresh_reaches_the_source_when_ttl_equals_the_interval() {
    // Given: Default settings, where the cache TTL equals the refresh interval,
    // and a source that takes 200ms to answer
    let defaults = SyncConfig::default();
    assert_eq!(defaults.cache_ttl(), defaults.refresh_interval());
    let source = ScriptedSource::with_latency(Duration::from_millis(200));
    let (scheduler, mut updates) = scheduler_for(source.clone(), defaults);
    let aapl = symbol("AAPL");
    scheduler.on_interest(aapl.clone());

    // When: One refresh interval passes after the initial fetch
    tokio::time::sleep(DEBOUNCE + REFRESH + Duration::from_millis(500)).await;

    // Then: The refresh fetched from the source instead of the cache
    assert_eq!(source.calls_for(&aapl), 2);
    assert_eq!(snapshots_for(&drain(&mut updates), &aapl), 2);
}

#[tokio::test(start_paused = true)]
async fn updates_arrive_as_loading_then_snapshot_then_settled() {
    let source = ScriptedSource::new();
    let (scheduler, mut updates) = scheduler_for(source, config());
    let msft = symbol("MSFT");
    scheduler.on_interest(msft.clone());

    tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;

    let seen: Vec<Update> = drain(&mut updates).into_iter().map(|(_, u)| u).collect();
    assert_eq!(seen.len(), 3);
    assert!(matches!(&seen[0], Update::State(state) if state.is_loading));
    assert!(matches!(&seen[1], Update::Snapshot(snapshot) if snapshot.symbol == msft));
    assert!(matches!(&seen[2], Update::State(state) if !state.is_loading && state.error.is_none()));
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn disinterest_stops_periodic_refreshes() {
    // Given: AAPL is active and was fetched once
    let source = ScriptedSource::new();
    let (scheduler, _updates) = scheduler_for(source.clone(), config());
    scheduler.on_interest(symbol("AAPL"));
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(10)).await;
    assert_eq!(source.calls(), 1);

    // When: The user navigates away
    scheduler.on_disinterest();
    tokio::time::sleep(REFRESH * 3).await;

    // Then: No further fetch starts
    assert_eq!(source.calls(), 1);
    assert_eq!(scheduler.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn trailing_fetch_lands_in_cache_but_is_not_reported() {
    // Given: A slow fetch for AAPL is in flight
    let source = ScriptedSource::with_latency(Duration::from_secs(1));
    let (scheduler, mut updates) = scheduler_for(source.clone(), config());
    let aapl = symbol("AAPL");
    scheduler.on_interest(aapl.clone());
    tokio::time::sleep(DEBOUNCE + Duration::from_millis(100)).await;
    assert_eq!(source.calls(), 1);

    // When: Interest moves to MSFT before it completes
    scheduler.on_interest(symbol("MSFT"));
    tokio::time::sleep(Duration::from_secs(2)).await;

    // Then: The AAPL result was cached
    let cached = scheduler
        .sync()
        .fetch(&aapl)
        .await
        .expect("cached snapshot");
    assert!(cached.from_cache);

    // And: The subscriber never saw an AAPL snapshot
    assert_eq!(snapshots_for(&drain(&mut updates), &aapl), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_debounce_prevents_any_fetch() {
    let source = ScriptedSource::new();
    let (scheduler, _updates) = scheduler_for(source.clone(), config());

    scheduler.on_interest(symbol("AAPL"));
    scheduler.shutdown();
    tokio::time::sleep(DEBOUNCE * 4).await;

    assert_eq!(source.calls(), 0);
    scheduler.on_interest(symbol("MSFT"));
    assert_eq!(scheduler.phase(), Phase::ShutDown);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn terminal_failure_is_published_with_a_settled_loading_state() {
    // Given: A source that keeps failing with network errors and one retry allowed
    let failures = (0..2).map(|_| Step::Fail(SourceError::network("connection refused")));
    let source = ScriptedSource::scripted(failures);
    let config = SyncConfig {
        max_retries: 1,
        ..config()
    };
    let (scheduler, mut updates) = scheduler_for(source.clone(), config);

    // When: Interest settles and the fetch fails
    scheduler.on_interest(symbol("AAPL"));
    tokio::time::sleep(DEBOUNCE + Duration::from_secs(5)).await;

    // Then: The subscriber sees a settled error state
    let state = scheduler.loading_state();
    assert!(!state.is_loading);
    assert_eq!(state.retry_count, 1);
    let error = state.error.expect("error is recorded");
    assert_eq!(error.kind, FetchErrorKind::Network);
    assert!(!error.message.contains("refused"));

    let last = drain(&mut updates).pop().expect("updates were published");
    assert!(matches!(last.1, Update::State(ref s) if s.is_error()));
    assert_eq!(source.calls(), 2);
}
