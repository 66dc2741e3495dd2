//! Value types shared by the importers, the accounting core and the reports

use chrono::{Datelike, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// A single trade line: positive quantity buys, negative quantity sells
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub time: NaiveDateTime,
    pub currency: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
}

impl Trade {
    pub fn year(&self) -> i32 {
        self.time.year()
    }
}

/// An amount of money tied to a year: dividends, withholding tax, fees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashEvent {
    pub currency: String,
    pub amount: Decimal,
    pub year: i32,
}

impl CashEvent {
    pub fn new(currency: impl Into<String>, amount: Decimal, year: i32) -> Self {
        Self {
            currency: currency.into(),
            amount,
            year,
        }
    }
}

/// Instrument classification used for dividend reporting
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Category {
    Equity,
    Other(String),
    #[default]
    Unknown,
}

impl Category {
    /// Map a broker asset category onto the reporting categories
    pub fn from_broker(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            return Category::Unknown;
        }

        let lower = value.to_lowercase();
        if lower.starts_with("stock") || lower.starts_with("equit") {
            Category::Equity
        } else {
            Category::Other(value.to_string())
        }
    }

    /// Dividends are reported for equities and for instruments not yet classified
    pub fn is_equity_like(&self) -> bool {
        matches!(self, Category::Equity | Category::Unknown)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Equity => write!(f, "Equity"),
            Category::Other(name) => write!(f, "{}", name),
            Category::Unknown => Ok(()),
        }
    }
}

/// Identity of a security: every symbol or alias it was seen under
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Instrument {
    pub symbols: Vec<String>,
    pub category: Category,
}

impl Instrument {
    pub fn new(symbols: Vec<String>, category: Category) -> Self {
        Self { symbols, category }
    }

    /// Country code used to bucket foreign income.
    ///
    /// Taken from the first two characters of the ISIN (11 characters once the
    /// check digit is dropped). Falls back to the first symbol when no ISIN is known.
    pub fn domicile(&self) -> String {
        if let Some(isin) = self.symbols.iter().find(|s| s.len() == 11) {
            return isin.chars().take(2).collect();
        }
        self.symbols.first().cloned().unwrap_or_default()
    }

    pub fn display_symbols(&self) -> String {
        self.symbols.join(", ")
    }
}

/// Everything imported for one instrument, ready for summarization
#[derive(Debug, Clone, Default)]
pub struct AssetImport {
    pub instrument: Instrument,
    pub trades: Vec<Trade>,
    pub dividends: Vec<CashEvent>,
    pub withholding_tax: Vec<CashEvent>,
}

impl AssetImport {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_broker() {
        assert_eq!(Category::from_broker("Stocks"), Category::Equity);
        assert_eq!(Category::from_broker("EQUITY"), Category::Equity);
        assert_eq!(Category::from_broker(""), Category::Unknown);
        assert_eq!(
            Category::from_broker("Bonds"),
            Category::Other("Bonds".to_string())
        );
        assert!(Category::Unknown.is_equity_like());
        assert!(!Category::Other("Bonds".to_string()).is_equity_like());
    }

    #[test]
    fn test_domicile_prefers_isin() {
        let instrument = Instrument::new(
            vec!["AAPL".to_string(), "US037833100".to_string()],
            Category::Equity,
        );
        assert_eq!(instrument.domicile(), "US");

        let no_isin = Instrument::new(vec!["VWRL".to_string()], Category::Equity);
        assert_eq!(no_isin.domicile(), "VWRL");
    }
}
