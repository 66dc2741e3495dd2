use chrono::{Datelike, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::cost_basis::{trade_asset, Holding, Sale};
use super::taxability::TaxPolicy;
use crate::error::{RateError, SummaryError};
use crate::fx::Rater;
use crate::models::{AssetImport, CashEvent, Instrument};

/// One instrument's results for one calendar year, in the reporting currency
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetYear {
    pub year: i32,
    /// Realized profit or loss from sales
    pub pl: Decimal,
    /// Part of `pl` realized within the taxable window
    pub taxable: Decimal,
    pub fees: Decimal,
    pub dividends: Decimal,
    pub withholding_tax: Decimal,
}

/// Yearly totals for one instrument, created lazily per year
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetSummary(BTreeMap<i32, AssetYear>);

impl AssetSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the entry for a year
    pub fn year(&mut self, year: i32) -> &mut AssetYear {
        self.0.entry(year).or_insert_with(|| AssetYear {
            year,
            ..Default::default()
        })
    }

    pub fn get(&self, year: i32) -> Option<&AssetYear> {
        self.0.get(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = &AssetYear> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Credit realized profit from a closed sale. Both legs use the sale year's rate.
    pub fn add_sale(
        &mut self,
        sale: &Sale,
        policy: &TaxPolicy,
        rater: &dyn Rater,
    ) -> Result<(), RateError> {
        let year = sale.time.year();
        let proceeds_rate = rater.rate(&sale.currency, year)?;
        let entry = self.year(year);

        for cost in &sale.basis {
            let cost_rate = rater.rate(&cost.currency, year)?;
            let profit =
                cost.quantity * (sale.price * proceeds_rate - cost.price * cost_rate);
            entry.pl += profit;
            if policy.is_taxable(cost.purchased, sale.time) {
                entry.taxable += profit;
            }
        }
        Ok(())
    }

    pub fn add_fee(&mut self, fee: &CashEvent, rater: &dyn Rater) -> Result<(), RateError> {
        let amount = convert(fee, rater)?;
        self.year(fee.year).fees += amount;
        Ok(())
    }

    pub fn add_dividend(&mut self, dividend: &CashEvent, rater: &dyn Rater) -> Result<(), RateError> {
        let amount = convert(dividend, rater)?;
        self.year(dividend.year).dividends += amount;
        Ok(())
    }

    pub fn add_withholding_tax(
        &mut self,
        tax: &CashEvent,
        rater: &dyn Rater,
    ) -> Result<(), RateError> {
        let amount = convert(tax, rater)?;
        self.year(tax.year).withholding_tax += amount;
        Ok(())
    }
}

/// Convert a cash event at its own year's rate
pub fn convert(event: &CashEvent, rater: &dyn Rater) -> Result<Decimal, RateError> {
    Ok(event.amount * rater.rate(&event.currency, event.year)?)
}

/// A summarized instrument
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub instrument: Instrument,
    pub first_purchase: Option<NaiveDateTime>,
    pub holdings: Vec<Holding>,
    /// Yearly summaries, ascending by year
    pub years: Vec<AssetYear>,
}

/// Summarize a single instrument: realized gains, fees, dividends, withholding tax
pub fn summarize_asset(
    import: &AssetImport,
    policy: &TaxPolicy,
    rater: &dyn Rater,
    now: NaiveDateTime,
) -> Result<Asset, SummaryError> {
    let traded = trade_asset(&import.trades)?;
    let mut summary = AssetSummary::new();

    for sale in &traded.sales {
        summary.add_sale(sale, policy, rater)?;
    }
    for fee in &traded.fees {
        summary.add_fee(fee, rater)?;
    }
    for dividend in &import.dividends {
        summary.add_dividend(dividend, rater)?;
    }
    for tax in &import.withholding_tax {
        summary.add_withholding_tax(tax, rater)?;
    }

    let holdings = traded.ledger.holdings(policy, rater, now)?;
    debug!(
        "Summarized {} over {} years, {} open lots",
        import.instrument.display_symbols(),
        summary.len(),
        holdings.len()
    );

    Ok(Asset {
        instrument: import.instrument.clone(),
        first_purchase: traded.first_trade,
        holdings,
        years: summary.years().cloned().collect(),
    })
}

/// An instrument whose trade history could not be matched
#[derive(Debug, Clone, PartialEq)]
pub struct AssetFailure {
    pub instrument: Instrument,
    pub error: SummaryError,
}

/// Summaries for every instrument plus the ones skipped for inconsistent history
#[derive(Debug, Clone, Default)]
pub struct SummaryReport {
    pub assets: Vec<Asset>,
    pub failures: Vec<AssetFailure>,
}

/// Summarize all instruments.
///
/// A ledger failure only skips the affected instrument; a missing exchange
/// rate aborts the whole run.
pub fn summarize_assets(
    imports: &[AssetImport],
    policy: &TaxPolicy,
    rater: &dyn Rater,
    now: NaiveDateTime,
) -> Result<SummaryReport, RateError> {
    let mut report = SummaryReport::default();

    for import in imports {
        match summarize_asset(import, policy, rater, now) {
            Ok(asset) => report.assets.push(asset),
            Err(SummaryError::Rate(e)) => return Err(e),
            Err(error @ SummaryError::Ledger(_)) => {
                warn!(
                    "Skipping {}: {}",
                    import.instrument.display_symbols(),
                    error
                );
                report.failures.push(AssetFailure {
                    instrument: import.instrument.clone(),
                    error,
                });
            }
        }
    }

    // Instruments without trades first, then by first purchase
    report.assets.sort_by_key(|a| a.first_purchase);
    Ok(report)
}
