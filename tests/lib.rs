//! Shared fakes for the quotesync behavior tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quotesync_core::{
    CounterFuture, DataSource, MemoryCounterStore, Snapshot, SourceError, SourceFuture,
    StoreError, Symbol, WindowCounter,
};

/// What the next call to a [`ScriptedSource`] does.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(SourceError),
    /// Never answers within any sane request timeout.
    Hang,
}

/// Data source that follows a script, then succeeds for every later call.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    latency: Duration,
    calls: Mutex<Vec<Symbol>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub fn called_symbols(&self) -> Vec<Symbol> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_for(&self, symbol: &Symbol) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|called| *called == symbol)
            .count()
    }
}

impl DataSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a> {
        Box::pin(async move {
            let call_number = {
                let mut calls = self.calls.lock().expect("calls lock");
                calls.push(symbol.clone());
                calls.len()
            };
            let step = self
                .steps
                .lock()
                .expect("steps lock")
                .pop_front()
                .unwrap_or(Step::Succeed);

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            match step {
                Step::Succeed => Snapshot::builder(symbol.clone(), 100.0 + call_number as f64)
                    .previous_close(100.0)
                    .build()
                    .map_err(|err| SourceError::malformed(err.to_string())),
                Step::Fail(err) => Err(err),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                    Err(SourceError::other("hung call woke up"))
                }
            }
        })
    }
}

/// Shared counter store that can be taken offline and slowed down.
#[derive(Debug, Default)]
pub struct UnreachableStore {
    inner: MemoryCounterStore,
    down: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl UnreachableStore {
    pub fn reachable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn offline() -> Arc<Self> {
        let store = Self::default();
        store.down.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.down.store(!reachable, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().expect("delay lock") = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WindowCounter for UnreachableStore {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn check_and_reserve<'a>(
        &'a self,
        identity: &'a str,
        now_ms: u64,
        window: Duration,
        max_requests: u32,
    ) -> CounterFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().expect("delay lock");
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable(String::from("connection refused")));
            }
            Ok(self.inner.reserve(identity, now_ms, window, max_requests))
        })
    }
}

pub fn symbol(input: &str) -> Symbol {
    Symbol::parse(input).expect("valid symbol")
}
