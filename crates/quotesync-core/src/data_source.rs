//! Data source trait and adapter error type.
//!
//! This module defines the adapter contract (`DataSource`) that every
//! provider implementation follows. The sync layer treats adapters as black
//! boxes with variable latency: it only sees a [`Snapshot`] or a
//! [`SourceError`], and classifies the latter before deciding to retry.
//!
//! # Example
//!
//! ```rust,ignore
//! use quotesync_core::{DataSource, SyntheticSource, Symbol};
//!
//! async fn print_price(source: &SyntheticSource) -> Result<(), Box<dyn std::error::Error>> {
//!     let snapshot = source.fetch(&Symbol::parse("AAPL")?).await?;
//!     println!("{}: ${:.2}", snapshot.symbol, snapshot.price);
//!     Ok(())
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::{Snapshot, Symbol};

/// Adapter-level error hint.
///
/// Adapters report what they know; `Other` means the adapter could not tell
/// and the sync layer falls back to message heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Network,
    Timeout,
    RateLimited,
    Upstream,
    Malformed,
    InvalidRequest,
    Other,
}

/// Structured adapter error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    status: Option<u16>,
    retry_after: Option<Duration>,
}

impl SourceError {
    fn with_kind(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::with_kind(SourceErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::with_kind(SourceErrorKind::Timeout, message)
    }

    pub fn rate_limited(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self {
            retry_after,
            ..Self::with_kind(SourceErrorKind::RateLimited, message)
        }
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::with_kind(SourceErrorKind::Upstream, message)
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::with_kind(SourceErrorKind::Malformed, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_kind(SourceErrorKind::InvalidRequest, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::with_kind(SourceErrorKind::Other, message)
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Network => "source.network",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Upstream => "source.upstream",
            SourceErrorKind::Malformed => "source.malformed",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Other => "source.other",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status}, {})", self.message, self.code()),
            None => write!(f, "{} ({})", self.message, self.code()),
        }
    }
}

impl std::error::Error for SourceError {}

/// Boxed future returned by [`DataSource::fetch`].
pub type SourceFuture<'a> = Pin<Box<dyn Future<Output = Result<Snapshot, SourceError>> + Send + 'a>>;

/// Source adapter contract.
///
/// Implementations must be `Send + Sync`: one adapter is shared by the
/// scheduler's fetch tasks and any direct callers of the sync pipeline.
pub trait DataSource: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &str;

    /// Fetch a normalized snapshot for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the provider is unreachable, slow,
    /// throttling, answering with an error status, or returning a payload
    /// that cannot be normalized.
    fn fetch<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a>;
}

impl<T: DataSource + ?Sized> DataSource for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch<'a>(&'a self, symbol: &'a Symbol) -> SourceFuture<'a> {
        (**self).fetch(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_and_code() {
        let error = SourceError::upstream(502, "bad gateway");
        assert_eq!(error.to_string(), "bad gateway (status 502, source.upstream)");
        assert_eq!(error.status(), Some(502));
    }

    #[test]
    fn rate_limited_keeps_retry_after() {
        let error = SourceError::rate_limited(Some(Duration::from_secs(3)), "slow down");
        assert_eq!(error.kind(), SourceErrorKind::RateLimited);
        assert_eq!(error.retry_after(), Some(Duration::from_secs(3)));
    }
}
