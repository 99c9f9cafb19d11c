//! Connectivity flag for a remote dependency.
//!
//! ```text
//! Closed ──failures ≥ threshold──▶ Open ──open_timeout──▶ HalfOpen
//!   ▲                                ▲                       │
//!   │                                └──── trial failed ─────┤
//!   └──────────────────── trial succeeded ───────────────────┘
//! ```

use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

/// Observable state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Dependency is healthy; calls go through.
    Closed,
    /// Dependency is failing; calls are short-circuited.
    Open,
    /// A single trial call is in flight or may be sent.
    HalfOpen,
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,
    /// Time spent open before a trial is allowed.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 1,
            open_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Circuit {
    Closed { failures: u32 },
    Open { since: Instant },
    /// `trial` is when the outstanding trial was let through, if any.
    HalfOpen { trial: Option<Instant> },
}

impl Circuit {
    const fn state(self) -> CircuitState {
        match self {
            Self::Closed { .. } => CircuitState::Closed,
            Self::Open { .. } => CircuitState::Open,
            Self::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Thread-safe breaker around one dependency.
///
/// The rate limiter consults it before touching the shared counter store and
/// answers from its local fallback while the circuit is open.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    circuit: Mutex<Circuit>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            circuit: Mutex::new(Circuit::Closed { failures: 0 }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(|poisoned| {
            warn!(breaker = self.name, "circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether the dependency should be called now.
    ///
    /// Half-open lets one trial through until its outcome is recorded. A
    /// trial whose caller vanished is replaced after another open timeout.
    pub fn allow_request(&self) -> bool {
        let mut circuit = self.lock();
        let now = Instant::now();
        match *circuit {
            Circuit::Closed { .. } => true,
            Circuit::Open { since } if now.duration_since(since) >= self.config.open_timeout => {
                info!(breaker = self.name, "trying dependency after open timeout");
                *circuit = Circuit::HalfOpen { trial: Some(now) };
                true
            }
            Circuit::Open { .. } => false,
            Circuit::HalfOpen { trial: Some(started) }
                if now.duration_since(started) < self.config.open_timeout =>
            {
                false
            }
            Circuit::HalfOpen { .. } => {
                *circuit = Circuit::HalfOpen { trial: Some(now) };
                true
            }
        }
    }

    pub fn record_success(&self) {
        let mut circuit = self.lock();
        if !matches!(*circuit, Circuit::Closed { .. }) {
            info!(breaker = self.name, "dependency reachable again, circuit closed");
        }
        *circuit = Circuit::Closed { failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut circuit = self.lock();
        let failures = match *circuit {
            Circuit::Closed { failures } => failures.saturating_add(1),
            Circuit::HalfOpen { .. } => self.config.failure_threshold,
            Circuit::Open { .. } => return,
        };

        if failures >= self.config.failure_threshold {
            warn!(
                breaker = self.name,
                failures,
                open_timeout_ms = self.config.open_timeout.as_millis() as u64,
                "circuit opened"
            );
            *circuit = Circuit::Open {
                since: Instant::now(),
            };
        } else {
            *circuit = Circuit::Closed { failures };
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state()
    }
}
