use serde::{Deserialize, Serialize};

use crate::{Symbol, UtcDateTime, ValidationError};

/// One close observation in a snapshot's price history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub ts: UtcDateTime,
    pub close: f64,
}

impl HistoryPoint {
    pub fn new(ts: UtcDateTime, close: f64) -> Result<Self, ValidationError> {
        validate_non_negative("history.close", close)?;
        Ok(Self { ts, close })
    }
}

/// Analyst recommendation counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ratings {
    pub buy: u32,
    pub hold: u32,
    pub sell: u32,
}

impl Ratings {
    pub const fn total(self) -> u32 {
        self.buy.saturating_add(self.hold).saturating_add(self.sell)
    }
}

/// Normalized market data reading for one symbol at one point in time.
///
/// Snapshots are immutable once built and are shared behind `Arc` by the
/// cache and every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: Symbol,
    pub name: Option<String>,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub currency: String,
    pub market_cap: Option<f64>,
    pub history: Vec<HistoryPoint>,
    pub ratings: Option<Ratings>,
    pub fetched_at: UtcDateTime,
}

impl Snapshot {
    pub fn builder(symbol: Symbol, price: f64) -> SnapshotBuilder {
        SnapshotBuilder {
            symbol,
            name: None,
            price,
            previous_close: None,
            currency: String::from("USD"),
            market_cap: None,
            history: Vec::new(),
            ratings: None,
            fetched_at: None,
        }
    }

    /// Most recent close in the history, if any.
    pub fn last_close(&self) -> Option<f64> {
        self.history.last().map(|point| point.close)
    }
}

/// Validating builder for [`Snapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    symbol: Symbol,
    name: Option<String>,
    price: f64,
    previous_close: Option<f64>,
    currency: String,
    market_cap: Option<f64>,
    history: Vec<HistoryPoint>,
    ratings: Option<Ratings>,
    fetched_at: Option<UtcDateTime>,
}

impl SnapshotBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Previous session close; drives `change` and `change_percent`.
    pub fn previous_close(mut self, previous_close: f64) -> Self {
        self.previous_close = Some(previous_close);
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn market_cap(mut self, market_cap: f64) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    pub fn history(mut self, history: Vec<HistoryPoint>) -> Self {
        self.history = history;
        self
    }

    pub fn ratings(mut self, ratings: Ratings) -> Self {
        self.ratings = Some(ratings);
        self
    }

    pub fn fetched_at(mut self, fetched_at: UtcDateTime) -> Self {
        self.fetched_at = Some(fetched_at);
        self
    }

    pub fn build(mut self) -> Result<Snapshot, ValidationError> {
        validate_non_negative("price", self.price)?;
        if let Some(previous_close) = self.previous_close {
            validate_non_negative("previous_close", previous_close)?;
        }
        if let Some(market_cap) = self.market_cap {
            validate_non_negative("market_cap", market_cap)?;
        }

        self.history.sort_by_key(|point| point.ts);

        let (change, change_percent) = match self.previous_close {
            Some(previous) if previous > 0.0 => {
                let change = self.price - previous;
                (change, change / previous * 100.0)
            }
            _ => (0.0, 0.0),
        };

        Ok(Snapshot {
            symbol: self.symbol,
            name: self.name,
            price: self.price,
            change,
            change_percent,
            currency: validate_currency_code(&self.currency)?,
            market_cap: self.market_cap,
            history: self.history,
            ratings: self.ratings,
            fetched_at: self.fetched_at.unwrap_or_else(UtcDateTime::now),
        })
    }
}

/// Validate and normalize currency to uppercase 3-letter code.
pub fn validate_currency_code(input: &str) -> Result<String, ValidationError> {
    let normalized = input.trim().to_ascii_uppercase();
    let is_valid = normalized.len() == 3 && normalized.chars().all(|ch| ch.is_ascii_alphabetic());

    if !is_valid {
        return Err(ValidationError::InvalidCurrency {
            value: input.to_owned(),
        });
    }

    Ok(normalized)
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
