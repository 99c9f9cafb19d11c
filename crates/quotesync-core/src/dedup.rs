//! Request coalescing: at most one in-flight operation per key.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct PendingRequest<T, E> {
    id: u64,
    future: SharedResult<T, E>,
}

type PendingMap<K, T, E> = Arc<Mutex<HashMap<K, PendingRequest<T, E>>>>;

/// Coalesces concurrent operations for the same key.
///
/// The first caller for a key starts the operation; every caller that
/// arrives while it is pending awaits the same shared future and receives a
/// clone of the same result, errors included. The entry is removed as the
/// operation settles, before any waiter observes the result.
pub struct RequestDeduplicator<K, T, E> {
    pending: PendingMap<K, T, E>,
    next_id: AtomicU64,
}

impl<K, T, E> Default for RequestDeduplicator<K, T, E> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K, T, E> RequestDeduplicator<K, T, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` for `key`, or join the one already in flight.
    pub async fn execute<F, Fut>(&self, key: K, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let shared = {
            let mut pending = lock(&self.pending);
            match pending.get(&key) {
                Some(existing) => {
                    debug!(key = ?key, "joining in-flight request");
                    existing.future.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let future =
                        settle_and_remove(Arc::clone(&self.pending), key.clone(), id, operation())
                            .boxed()
                            .shared();
                    pending.insert(
                        key,
                        PendingRequest {
                            id,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };

        shared.await
    }

    /// Number of keys with an operation in flight.
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }
}

async fn settle_and_remove<K, T, E, Fut>(
    pending: PendingMap<K, T, E>,
    key: K,
    id: u64,
    operation: Fut,
) -> Result<T, E>
where
    K: Eq + Hash,
    Fut: Future<Output = Result<T, E>>,
{
    let result = operation.await;
    let mut pending = lock(&pending);
    if pending.get(&key).is_some_and(|entry| entry.id == id) {
        pending.remove(&key);
    }
    result
}

fn lock<K, T, E>(
    pending: &Mutex<HashMap<K, PendingRequest<T, E>>>,
) -> MutexGuard<'_, HashMap<K, PendingRequest<T, E>>> {
    pending.lock().unwrap_or_else(|poisoned| {
        warn!("deduplicator mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}
