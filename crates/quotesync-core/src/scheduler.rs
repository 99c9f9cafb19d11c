//! Debounced, periodically refreshed fetching for the one symbol in view.
//!
//! ```text
//! Idle ──on_interest──▶ Debouncing(S) ──debounce──▶ Active(S) ──refresh──▶ Active(S)
//!   ▲                        │                          │
//!   └──────── on_disinterest / shutdown ────────────────┘
//! ```
//!
//! Every interest change bumps a generation counter under the scheduler
//! lock. Timers and fetch tasks carry the generation they were started for
//! and do nothing once it is stale, so cancellation holds even for a timer
//! that already woke up.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::loading::LoadingState;
use crate::subscriber::{Subscriber, Update};
use crate::sync::{FetchOutcome, MarketDataSync};
use crate::timer::TimerHandle;
use crate::{FetchError, Symbol};

/// Where the scheduler is in its interest cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Debouncing(Symbol),
    Active(Symbol),
    ShutDown,
}

struct SchedulerState {
    generation: u64,
    phase: Phase,
    timer: Option<TimerHandle>,
    loading: LoadingState,
}

struct SchedulerInner {
    sync: MarketDataSync,
    subscriber: Arc<dyn Subscriber>,
    debounce: Duration,
    refresh_interval: Duration,
    state: Mutex<SchedulerState>,
}

/// Drives fetches for the symbol a user is currently looking at.
///
/// Must be used from within a Tokio runtime. Dropping the scheduler shuts it
/// down.
pub struct FetchScheduler {
    inner: Arc<SchedulerInner>,
}

impl FetchScheduler {
    pub fn new(
        sync: MarketDataSync,
        subscriber: Arc<dyn Subscriber>,
        debounce: Duration,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                sync,
                subscriber,
                debounce,
                refresh_interval,
                state: Mutex::new(SchedulerState {
                    generation: 0,
                    phase: Phase::Idle,
                    timer: None,
                    loading: LoadingState::idle(),
                }),
            }),
        }
    }

    /// Declare interest in `symbol`, superseding any previous interest.
    ///
    /// Existing timers are cancelled before the debounce timer is armed.
    pub fn on_interest(&self, symbol: Symbol) {
        let mut state = self.inner.lock();
        if state.phase == Phase::ShutDown {
            warn!(symbol = %symbol, "scheduler is shut down, ignoring interest");
            return;
        }

        let generation = state.supersede(Phase::Debouncing(symbol.clone()));
        debug!(symbol = %symbol, generation, "interest declared, debouncing");
        state.timer = Some(TimerHandle::spawn(run_timer(
            Arc::clone(&self.inner),
            symbol,
            generation,
        )));
    }

    /// Stop all timers. An in-flight fetch still completes into the cache
    /// but is not reported.
    pub fn on_disinterest(&self) {
        let mut state = self.inner.lock();
        if state.phase == Phase::ShutDown {
            return;
        }
        state.supersede(Phase::Idle);
        debug!("interest withdrawn");
    }

    /// Stop all timers for good. Later interest is ignored.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        if state.phase != Phase::ShutDown {
            state.supersede(Phase::ShutDown);
            info!("fetch scheduler shut down");
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase.clone()
    }

    /// Symbol whose debounce has elapsed and which is being refreshed.
    pub fn active_symbol(&self) -> Option<Symbol> {
        match &self.inner.lock().phase {
            Phase::Active(symbol) => Some(symbol.clone()),
            _ => None,
        }
    }

    pub fn loading_state(&self) -> LoadingState {
        self.inner.lock().loading.clone()
    }

    pub fn sync(&self) -> &MarketDataSync {
        &self.inner.sync
    }
}

impl Drop for FetchScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl SchedulerState {
    /// Invalidate everything started for the previous generation.
    fn supersede(&mut self, phase: Phase) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.phase = phase;
        self.loading = LoadingState::idle();
        self.generation
    }
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("scheduler mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Promote a debounced symbol to active if its generation still holds.
    fn activate(&self, symbol: &Symbol, generation: u64) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.phase = Phase::Active(symbol.clone());
        info!(symbol = %symbol, "symbol active");
        true
    }

    /// Start one fetch in its own task. Returns false once superseded.
    ///
    /// A cached snapshot is reused only if it stays fresh for `horizon`.
    fn start_fetch(
        self: &Arc<Self>,
        symbol: &Symbol,
        generation: u64,
        horizon: Duration,
    ) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            return false;
        }
        state.loading.begin();
        self.subscriber
            .on_update(symbol, Update::State(state.loading.clone()));
        drop(state);

        let inner = Arc::clone(self);
        let symbol = symbol.clone();
        tokio::spawn(async move {
            let result = inner.sync.fetch_fresh_for(&symbol, horizon).await;
            inner.finish_fetch(&symbol, generation, result);
        });
        true
    }

    fn finish_fetch(
        &self,
        symbol: &Symbol,
        generation: u64,
        result: Result<FetchOutcome, FetchError>,
    ) {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(symbol = %symbol, "discarding result for superseded interest");
            return;
        }

        match result {
            Ok(outcome) => {
                state.loading.succeed();
                self.subscriber
                    .on_update(symbol, Update::Snapshot(outcome.snapshot));
            }
            Err(err) => state.loading.fail(&err),
        }
        self.subscriber
            .on_update(symbol, Update::State(state.loading.clone()));
    }
}

async fn run_timer(inner: Arc<SchedulerInner>, symbol: Symbol, generation: u64) {
    tokio::time::sleep(inner.debounce).await;
    if !inner.activate(&symbol, generation)
        || !inner.start_fetch(&symbol, generation, Duration::ZERO)
    {
        return;
    }

    let period = inner.refresh_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if !inner.start_fetch(&symbol, generation, period) {
            return;
        }
    }
}
