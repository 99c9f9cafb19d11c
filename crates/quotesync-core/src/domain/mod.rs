//! # Domain Models
//!
//! Canonical domain types for quotesync market data.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated, upper-cased ticker symbol |
//! | [`Snapshot`] | Immutable market data reading for one symbol |
//! | [`HistoryPoint`] | One close observation in a snapshot's history |
//! | [`Ratings`] | Analyst buy/hold/sell counts |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! ## Validation
//!
//! Construction validates all invariants:
//!
//! ```rust
//! use quotesync_core::{Snapshot, Symbol, ValidationError};
//!
//! let symbol = Symbol::parse("aapl")?;
//! let snapshot = Snapshot::builder(symbol, 187.5).previous_close(185.0).build()?;
//! assert_eq!(snapshot.symbol.as_str(), "AAPL");
//! # Ok::<(), ValidationError>(())
//! ```

mod snapshot;
mod symbol;
mod timestamp;

pub use snapshot::{validate_currency_code, HistoryPoint, Ratings, Snapshot, SnapshotBuilder};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
