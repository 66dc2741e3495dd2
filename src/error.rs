//! Error handling for Taxfolio
//!
//! Typed errors for the accounting core and the rate provider, plus a
//! unified Result type using anyhow for context chaining at the edges.

use rust_decimal::Decimal;
use thiserror::Error;

/// Failures raised by the FIFO lot ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(
        "insufficient purchase history: selling {requested} units but only {available} available"
    )]
    InsufficientLots {
        requested: Decimal,
        available: Decimal,
    },

    #[error("sell quantity must be negative, got {0}")]
    NotASale(Decimal),
}

/// Failures raised while resolving exchange rates
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    #[error("no exchange rate for {currency} in {year}")]
    Missing { currency: String, year: i32 },

    #[error("failed fetching {currency} rate for {year}: {reason}")]
    Fetch {
        currency: String,
        year: i32,
        reason: String,
    },

    #[error("cannot get exchange rates for year {0}")]
    InvalidYear(i32),
}

/// Failure summarizing a single instrument
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummaryError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Rate(#[from] RateError),
}

/// Rejected statement input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),

    #[error("invalid time: {0:?}")]
    InvalidTime(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("negative price {0}")]
    NegativePrice(Decimal),
}

/// Result type alias for application-level operations
pub type Result<T> = anyhow::Result<T>;
