use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data_source::{SourceError, SourceErrorKind};

/// Validation and contract errors exposed by `quotesync-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("unix timestamp {seconds} is out of range")]
    TimestampOutOfRange { seconds: i64 },

    #[error("currency must be a 3-letter uppercase ISO code: '{value}'")]
    InvalidCurrency { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
}

/// Classification of a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Network,
    Timeout,
    RateLimited,
    UpstreamApi,
    Validation,
    Unknown,
}

impl FetchErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::UpstreamApi => "upstream_api",
            Self::Validation => "validation",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the retry controller may retry this class locally.
    ///
    /// Validation failures are caller bugs and rate limits are resolved by
    /// waiting for `retry_after`, so neither is retried here.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::UpstreamApi)
    }
}

impl Display for FetchErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error of the sync pipeline.
///
/// `Display` renders only the fixed, user-presentable message for the
/// classification. The upstream's raw text is kept in [`FetchError::detail`]
/// for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    retry_after: Option<Duration>,
    retries: u32,
    detail: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            retry_after: None,
            retries: 0,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, detail)
    }

    pub fn rate_limited(retry_after: Duration, detail: impl Into<String>) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(FetchErrorKind::RateLimited, detail)
        }
    }

    pub fn upstream(detail: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::UpstreamApi, detail)
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Validation, detail)
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Unknown, detail)
    }

    /// Classify an opaque adapter error.
    ///
    /// Structured kinds map directly. `Other` errors fall back to message
    /// heuristics, since scraping adapters often only surface text.
    pub fn classify(error: &SourceError) -> Self {
        let detail = error.to_string();
        match error.kind() {
            SourceErrorKind::Network => Self::network(detail),
            SourceErrorKind::Timeout => Self::timeout(detail),
            SourceErrorKind::RateLimited => Self::rate_limited(
                error.retry_after().unwrap_or(DEFAULT_UPSTREAM_RETRY_AFTER),
                detail,
            ),
            SourceErrorKind::Upstream | SourceErrorKind::Malformed => Self::upstream(detail),
            SourceErrorKind::InvalidRequest => Self::validation(detail),
            SourceErrorKind::Other => Self::classify_message(error.message(), detail),
        }
    }

    fn classify_message(message: &str, detail: String) -> Self {
        let lowered = message.to_ascii_lowercase();
        let mentions = |needles: &[&str]| needles.iter().any(|needle| lowered.contains(needle));

        if mentions(&["timed out", "timeout", "deadline"]) {
            Self::timeout(detail)
        } else if mentions(&["429", "rate limit", "too many requests"]) {
            Self::rate_limited(DEFAULT_UPSTREAM_RETRY_AFTER, detail)
        } else if mentions(&["connection", "network", "dns", "unreachable", "reset by peer"]) {
            Self::network(detail)
        } else if mentions(&["status", "invalid response", "unexpected token", "parse"]) {
            Self::upstream(detail)
        } else {
            Self::unknown(detail)
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Retries performed before this error became terminal.
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Internal detail for logs. Never shown to end users.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub(crate) fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Network => "fetch.network",
            FetchErrorKind::Timeout => "fetch.timeout",
            FetchErrorKind::RateLimited => "fetch.rate_limited",
            FetchErrorKind::UpstreamApi => "fetch.upstream_api",
            FetchErrorKind::Validation => "fetch.validation",
            FetchErrorKind::Unknown => "fetch.unknown",
        }
    }

    /// Fixed message for the classification, safe to show in a UI.
    pub fn user_message(&self) -> String {
        match self.kind {
            FetchErrorKind::Network => String::from(
                "Unable to reach the market data service. Check your connection and try again.",
            ),
            FetchErrorKind::Timeout => String::from(
                "The market data service took too long to respond. Please try again.",
            ),
            FetchErrorKind::RateLimited => {
                let wait = self.retry_after.unwrap_or(DEFAULT_UPSTREAM_RETRY_AFTER);
                let seconds = wait.as_millis().div_ceil(1000).max(1);
                format!("Too many requests. Please wait {seconds}s before trying again.")
            }
            FetchErrorKind::UpstreamApi => String::from(
                "The market data service returned an unexpected response. Please try again later.",
            ),
            FetchErrorKind::Validation => String::from("The requested symbol is not valid."),
            FetchErrorKind::Unknown => {
                String::from("Something went wrong while loading market data.")
            }
        }
    }
}

const DEFAULT_UPSTREAM_RETRY_AFTER: Duration = Duration::from_secs(60);

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl std::error::Error for FetchError {}

impl From<SourceError> for FetchError {
    fn from(value: SourceError) -> Self {
        Self::classify(&value)
    }
}

impl From<ValidationError> for FetchError {
    fn from(value: ValidationError) -> Self {
        Self::validation(value.to_string())
    }
}
