// Exchange rates - conversion into the reporting currency

pub mod hnb;

use anyhow::{Context, Result};
use itertools::Itertools;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, info};

use crate::error::RateError;

pub use hnb::HnbSource;

/// Conversion factor from a currency into the reporting currency for a year.
///
/// Implementations must be deterministic per (currency, year) and safe to
/// call from several threads.
pub trait Rater: Send + Sync {
    fn rate(&self, currency: &str, year: i32) -> Result<Decimal, RateError>;
}

/// A backend able to look up a single rate, typically over the network
pub trait RateSource: Send + Sync {
    fn fetch(&self, currency: &str, year: i32) -> Result<Decimal, RateError>;
}

/// Fixed rate table, loaded up front
#[derive(Debug, Clone, Default)]
pub struct StaticRates {
    reporting_currency: String,
    rates: HashMap<(String, i32), Decimal>,
}

impl StaticRates {
    pub fn new(reporting_currency: impl Into<String>) -> Self {
        Self {
            reporting_currency: reporting_currency.into(),
            rates: HashMap::new(),
        }
    }

    pub fn with_rate(mut self, currency: &str, year: i32, rate: Decimal) -> Self {
        self.insert(currency, year, rate);
        self
    }

    pub fn insert(&mut self, currency: &str, year: i32, rate: Decimal) {
        self.rates.insert((currency.to_uppercase(), year), rate);
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Load a `currency,year,rate` table
    pub fn from_csv<P: AsRef<Path>>(reporting_currency: &str, path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading exchange rates from {:?}", path);

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("Failed to open rates file {:?}", path))?;

        let mut rates = Self::new(reporting_currency);
        for (idx, record) in reader.records().enumerate() {
            let record = record.context("Failed to read rates record")?;
            let line = idx + 2;
            let currency = record
                .get(0)
                .filter(|c| !c.is_empty())
                .with_context(|| format!("Missing currency on line {}", line))?;
            let year = record
                .get(1)
                .and_then(|y| y.parse::<i32>().ok())
                .with_context(|| format!("Invalid year on line {}", line))?;
            let rate = record
                .get(2)
                .and_then(|r| Decimal::from_str(r).ok())
                .with_context(|| format!("Invalid rate on line {}", line))?;
            rates.insert(currency, year, rate);
        }

        debug!("Loaded {} exchange rates", rates.len());
        Ok(rates)
    }
}

impl Rater for StaticRates {
    fn rate(&self, currency: &str, year: i32) -> Result<Decimal, RateError> {
        if currency.eq_ignore_ascii_case(&self.reporting_currency) {
            return Ok(Decimal::ONE);
        }
        self.rates
            .get(&(currency.to_uppercase(), year))
            .copied()
            .ok_or_else(|| RateError::Missing {
                currency: currency.to_string(),
                year,
            })
    }
}

type RateCell = Arc<OnceLock<Result<Decimal, RateError>>>;

/// Memoising rate provider in front of a [`RateSource`].
///
/// Each (currency, year) pair is fetched at most once. Concurrent callers
/// asking for a pair that is being fetched block until the fetch completes.
pub struct CachedRates<S> {
    source: S,
    cells: Mutex<HashMap<(String, i32), RateCell>>,
}

impl<S: RateSource> CachedRates<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cells: Mutex::new(HashMap::new()),
        }
    }

    fn cell(&self, currency: &str, year: i32) -> RateCell {
        let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells
            .entry((currency.to_string(), year))
            .or_default()
            .clone()
    }

    /// Fetch every (currency, year) pair concurrently, at most one thread per
    /// available core at a time. Stops at the first failure.
    pub fn prefetch(&self, currencies: &[String], years: &[i32]) -> Result<(), RateError> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        self.prefetch_with(currencies, years, workers)
    }

    fn prefetch_with(
        &self,
        currencies: &[String],
        years: &[i32],
        workers: usize,
    ) -> Result<(), RateError> {
        let pairs: Vec<(&str, i32)> = currencies
            .iter()
            .cartesian_product(years)
            .map(|(c, y)| (c.as_str(), *y))
            .collect();
        info!("Prefetching {} exchange rates", pairs.len());

        for batch in pairs.chunks(workers.max(1)) {
            debug!("Fetching batch of {} rates", batch.len());
            std::thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|(currency, year)| scope.spawn(move || self.rate(currency, *year)))
                    .collect();

                handles.into_iter().try_for_each(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| {
                            Err(RateError::Fetch {
                                currency: String::new(),
                                year: 0,
                                reason: "rate fetch thread panicked".to_string(),
                            })
                        })
                        .map(|_| ())
                })
            })?;
        }
        Ok(())
    }
}

impl<S: RateSource> Rater for CachedRates<S> {
    fn rate(&self, currency: &str, year: i32) -> Result<Decimal, RateError> {
        let currency = currency.to_uppercase();
        let cell = self.cell(&currency, year);
        cell.get_or_init(|| self.source.fetch(&currency, year))
            .clone()
    }
}
