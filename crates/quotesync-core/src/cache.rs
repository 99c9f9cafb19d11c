//! In-memory snapshot cache with per-entry TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::timer::TimerHandle;
use crate::{Snapshot, Symbol};

#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Arc<Snapshot>,
    timestamp: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) < self.ttl
    }

    fn is_abandoned(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) > self.ttl.saturating_mul(2)
    }
}

/// Thread-safe result cache keyed by symbol.
///
/// Reads are lazy-evicting: a stale entry is deleted on the read that finds
/// it. [`ResultCache::sweep`] drops entries older than twice the TTL for
/// symbols nobody reads anymore.
#[derive(Debug, Clone)]
pub struct ResultCache {
    entries: Arc<RwLock<HashMap<Symbol, CacheEntry>>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Create a disabled cache: every read misses and writes are dropped.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_disabled(&self) -> bool {
        self.ttl == Duration::ZERO
    }

    /// Return the cached snapshot if `now - timestamp < ttl`.
    ///
    /// A stale entry is removed and reported as a miss.
    pub async fn get(&self, symbol: &Symbol) -> Option<Arc<Snapshot>> {
        self.get_fresh_for(symbol, Duration::ZERO).await
    }

    /// Return the cached snapshot only if it will still be fresh `horizon`
    /// from now.
    ///
    /// An entry that is fresh now but expires within `horizon` is a miss and
    /// stays cached for plain reads. A stale entry is removed.
    pub async fn get_fresh_for(
        &self,
        symbol: &Symbol,
        horizon: Duration,
    ) -> Option<Arc<Snapshot>> {
        let now = Instant::now();
        let deadline = now + horizon;
        {
            let entries = self.entries.read().await;
            match entries.get(symbol) {
                None => return None,
                Some(entry) if entry.is_fresh(deadline) => {
                    return Some(Arc::clone(&entry.snapshot))
                }
                Some(entry) if entry.is_fresh(now) => return None,
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        // A put may have landed between the two locks.
        if let Some(entry) = entries.get(symbol) {
            if entry.is_fresh(deadline) {
                return Some(Arc::clone(&entry.snapshot));
            }
            if entry.is_fresh(now) {
                return None;
            }
            entries.remove(symbol);
            debug!(symbol = %symbol, "evicted stale cache entry");
        }
        None
    }

    /// Store `snapshot`, replacing any previous entry for the symbol.
    pub async fn put(&self, symbol: Symbol, snapshot: Arc<Snapshot>) {
        if self.is_disabled() {
            return;
        }

        let entry = CacheEntry {
            snapshot,
            timestamp: Instant::now(),
            ttl: self.ttl,
        };
        self.entries.write().await.insert(symbol, entry);
    }

    /// Drop the entry for `symbol`. Returns whether one existed.
    pub async fn invalidate(&self, symbol: &Symbol) -> bool {
        self.entries.write().await.remove(symbol).is_some()
    }

    /// Remove entries older than twice their TTL. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_abandoned(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "cache sweep");
        }
        removed
    }

    /// Run [`ResultCache::sweep`] every TTL until the handle is cancelled or dropped.
    ///
    /// A disabled cache has nothing to sweep; the returned handle is inert.
    pub fn spawn_sweeper(&self) -> TimerHandle {
        if self.is_disabled() {
            return TimerHandle::inert();
        }

        let cache = self.clone();
        TimerHandle::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + cache.ttl, cache.ttl);
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        })
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of entries, including stale ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
