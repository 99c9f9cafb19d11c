use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use super::{duration_ms, RateDecision};

/// Failure of a rate-limit backing store.
///
/// Never surfaced to end users: the limiter answers from its local fallback
/// instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
    #[error("counter store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Boxed future returned by [`WindowCounter::check_and_reserve`].
pub type CounterFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RateDecision, StoreError>> + Send + 'a>>;

/// Atomic "purge, count, record" primitive over a per-identity window.
///
/// Implementations must make the whole check atomic with respect to every
/// other caller sharing `identity`, including callers in other processes
/// when the store is shared.
pub trait WindowCounter: Send + Sync {
    fn name(&self) -> &str;

    fn check_and_reserve<'a>(
        &'a self,
        identity: &'a str,
        now_ms: u64,
        window: Duration,
        max_requests: u32,
    ) -> CounterFuture<'a>;
}

/// Ordered request timestamps for one identity.
#[derive(Debug, Default)]
struct RateWindow {
    timestamps: VecDeque<u64>,
    expires_at_ms: u64,
}

impl RateWindow {
    fn purge(&mut self, now_ms: u64, window_ms: u64) {
        while let Some(&oldest) = self.timestamps.front() {
            if now_ms.saturating_sub(oldest) >= window_ms {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// In-process sliding-window counter store.
///
/// Each identity owns a [`RateWindow`] of admitted request timestamps. A
/// window key expires one window after its last admitted request, the way a
/// networked store would expire it.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RateWindow>> {
        self.windows.lock().unwrap_or_else(|poisoned| {
            warn!("counter store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Synchronous core of the sliding-window check.
    pub fn reserve(
        &self,
        identity: &str,
        now_ms: u64,
        window: Duration,
        max_requests: u32,
    ) -> RateDecision {
        let window_ms = duration_ms(window).max(1);
        let mut windows = self.lock();
        windows.retain(|_, entry| entry.expires_at_ms > now_ms);

        let entry = windows.entry(identity.to_owned()).or_default();
        entry.purge(now_ms, window_ms);

        let count = u32::try_from(entry.timestamps.len()).unwrap_or(u32::MAX);
        if count < max_requests {
            entry.timestamps.push_back(now_ms);
            entry.expires_at_ms = now_ms.saturating_add(window_ms);
            return RateDecision::allow(max_requests - count - 1);
        }

        let oldest = entry.timestamps.front().copied().unwrap_or(now_ms);
        let reopens_at = oldest.saturating_add(window_ms);
        RateDecision::deny(Duration::from_millis(reopens_at.saturating_sub(now_ms).max(1)))
    }

    /// Number of identities with a live window.
    pub fn tracked_identities(&self) -> usize {
        self.lock().len()
    }
}

impl WindowCounter for MemoryCounterStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn check_and_reserve<'a>(
        &'a self,
        identity: &'a str,
        now_ms: u64,
        window: Duration,
        max_requests: u32,
    ) -> CounterFuture<'a> {
        Box::pin(async move { Ok(self.reserve(identity, now_ms, window, max_requests)) })
    }
}
