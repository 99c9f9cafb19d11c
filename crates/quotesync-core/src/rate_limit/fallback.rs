use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::warn;

use super::store::{CounterFuture, WindowCounter};
use super::{duration_ms, RateDecision};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    identity: String,
    window_ms: u64,
    bucket: u64,
}

impl BucketKey {
    fn closes_at(&self) -> u64 {
        self.bucket.saturating_add(1).saturating_mul(self.window_ms)
    }
}

/// Local fixed-window counter keyed by identity and window bucket.
///
/// Less precise than the sliding window (a burst straddling a bucket
/// boundary can admit up to twice `max_requests`) but it never depends on
/// anything outside the process.
#[derive(Debug, Default)]
pub struct FixedWindowCounter {
    buckets: Mutex<HashMap<BucketKey, u32>>,
}

impl FixedWindowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BucketKey, u32>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("fallback counter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn reserve(
        &self,
        identity: &str,
        now_ms: u64,
        window: Duration,
        max_requests: u32,
    ) -> RateDecision {
        let window_ms = duration_ms(window).max(1);
        let key = BucketKey {
            identity: identity.to_owned(),
            window_ms,
            bucket: now_ms / window_ms,
        };
        let closes_at = key.closes_at();

        let mut buckets = self.lock();
        buckets.retain(|bucket, _| bucket.closes_at() > now_ms);

        let count = buckets.entry(key).or_insert(0);
        if *count < max_requests {
            *count += 1;
            RateDecision::allow(max_requests - *count)
        } else {
            RateDecision::deny(Duration::from_millis(closes_at.saturating_sub(now_ms).max(1)))
        }
    }

    /// Number of live buckets across identities.
    pub fn live_buckets(&self) -> usize {
        self.lock().len()
    }
}

impl WindowCounter for FixedWindowCounter {
    fn name(&self) -> &str {
        "local-fixed-window"
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

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn counts_within_bucket_and_resets_at_boundary() {
        let counter = FixedWindowCounter::new();

        for expected_remaining in (0..3).rev() {
            let decision = counter.reserve("user-1", 10_000, WINDOW, 3);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = counter.reserve("user-1", 20_000, WINDOW, 3);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_millis(40_000));

        assert!(counter.reserve("user-1", 60_000, WINDOW, 3).allowed);
        assert_eq!(counter.live_buckets(), 1, "closed bucket is dropped");
    }

    #[test]
    fn boundary_burst_can_reach_twice_the_limit() {
        let counter = FixedWindowCounter::new();
        let mut admitted = 0;
        for t in [59_990, 59_995, 60_000, 60_005] {
            if counter.reserve("user-1", t, WINDOW, 2).allowed {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 4);
    }
}
