use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 10;

/// Normalized ticker symbol.
///
/// Accepts ASCII letters, digits and `.` (share classes such as `BRK.B`),
/// at most ten characters after trimming. Input is upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Validate raw user input and upper-case it.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = input.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if let Some((index, ch)) = normalized
            .chars()
            .enumerate()
            .find(|(_, ch)| !is_symbol_char(*ch))
        {
            return Err(ValidationError::SymbolInvalidChar { ch, index });
        }
        // Every accepted char is ASCII, so bytes equal chars here.
        if normalized.len() > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len: normalized.len(),
                max: MAX_SYMBOL_LEN,
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_symbol_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '.'
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_symbol() {
        let parsed = Symbol::parse(" aapl ").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "AAPL");
    }

    #[test]
    fn accepts_share_class_suffix_and_digits() {
        assert_eq!(Symbol::parse("brk.b").expect("valid").as_str(), "BRK.B");
        assert_eq!(Symbol::parse("0700.HK").expect("valid").as_str(), "0700.HK");
    }

    #[test]
    fn rejects_empty_symbol() {
        let err = Symbol::parse("   ").expect_err("must fail");
        assert_eq!(err, ValidationError::EmptySymbol);
    }

    #[test]
    fn rejects_symbol_longer_than_ten_chars() {
        assert!(Symbol::parse("ABCDEFGHIJ").is_ok());
        let err = Symbol::parse("ABCDEFGHIJK").expect_err("must fail");
        assert_eq!(err, ValidationError::SymbolTooLong { len: 11, max: 10 });
    }

    #[test]
    fn rejects_invalid_chars() {
        let err = Symbol::parse("BTC-USD").expect_err("must fail");
        assert_eq!(err, ValidationError::SymbolInvalidChar { ch: '-', index: 3 });
    }

    #[test]
    fn deserializes_through_validation() {
        let parsed: Symbol = serde_json::from_str("\"msft\"").expect("valid json symbol");
        assert_eq!(parsed.as_str(), "MSFT");
        assert!(serde_json::from_str::<Symbol>("\"A$B\"").is_err());
    }
}
