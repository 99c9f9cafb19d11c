use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::data_source::{DataSource, SourceError, SourceFuture};
use crate::{HistoryPoint, Ratings, Snapshot, Symbol, UtcDateTime};

const HISTORY_DAYS: i64 = 30;
const SECONDS_PER_DAY: i64 = 86_400;

/// Offline source producing plausible, per-symbol deterministic snapshots.
///
/// Prices and history depend only on the symbol, so repeated fetches agree
/// with each other apart from `fetched_at`.
#[derive(Debug, Default)]
pub struct SyntheticSource {
    latency: Option<Duration>,
    calls: AtomicU64,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch by `latency` to mimic a slow vendor.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Number of fetches served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn build(symbol: &Symbol) -> Result<Snapshot, SourceError> {
        let mut rng = fastrand::Rng::with_seed(symbol_seed(symbol));
        let price = round_cents(20.0 + rng.f64() * 480.0);
        let previous_close = round_cents(price * (1.0 + (rng.f64() - 0.5) * 0.04));

        let today = UtcDateTime::now().unix_timestamp() / SECONDS_PER_DAY * SECONDS_PER_DAY;
        let mut close = previous_close;
        let mut history = Vec::with_capacity(HISTORY_DAYS as usize);
        for day in (1..=HISTORY_DAYS).rev() {
            let ts = UtcDateTime::from_unix_timestamp(today - day * SECONDS_PER_DAY)
                .map_err(|err| SourceError::malformed(err.to_string()))?;
            history.push(
                HistoryPoint::new(ts, round_cents(close))
                    .map_err(|err| SourceError::malformed(err.to_string()))?,
            );
            close = (close * (1.0 + (rng.f64() - 0.5) * 0.03)).max(0.01);
        }

        Snapshot::builder(symbol.clone(), price)
            .name(format!("{symbol} Holdings"))
            .previous_close(previous_close)
            .market_cap((price * f64::from(rng.u32(10_000_000..2_000_000_000))).round())
            .history(history)
            .ratings(Ratings {
                buy: rng.u32(0..30),
                hold: rng.u32(0..20),
                sell: rng.u32(0..10),
            })
            .build()
            .map_err(|err| SourceError::malformed(err.to_string()))
    }
}

impl DataSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            Self::build(symbol)
        })
    }
}

// FNV-1a over the symbol bytes.
fn symbol_seed(symbol: &Symbol) -> u64 {
    symbol
        .as_str()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        })
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
