use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::summary::{convert, Asset};
use crate::error::RateError;
use crate::fx::Rater;
use crate::models::CashEvent;

/// Income taxed at a foreign source in one year
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignIncome {
    pub source: String,
    pub received: Decimal,
    pub tax_paid: Decimal,
}

/// Portfolio-wide figures for one tax year
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxYear {
    pub year: i32,
    /// Taxable capital gains, never negative once the report is built
    pub pl: Decimal,
    /// Fees left after the deduction from `pl`
    pub fees: Decimal,
    /// Fees deducted from `pl`
    pub deducted: Decimal,
    pub dividends: Decimal,
    foreign_income: HashMap<String, ForeignIncome>,
}

impl TaxYear {
    fn new(year: i32) -> Self {
        Self {
            year,
            ..Default::default()
        }
    }

    /// Get or create the foreign income bucket for a source country
    fn income_source(&mut self, source: &str) -> &mut ForeignIncome {
        self.foreign_income
            .entry(source.to_string())
            .or_insert_with(|| ForeignIncome {
                source: source.to_string(),
                ..Default::default()
            })
    }

    /// Foreign income entries ordered by source code
    pub fn foreign_income(&self) -> Vec<&ForeignIncome> {
        let mut entries: Vec<&ForeignIncome> = self.foreign_income.values().collect();
        entries.sort_by(|a, b| a.source.cmp(&b.source));
        entries
    }

    /// Deduct fees from a positive profit, capped at the profit itself.
    /// A loss is reported as zero and not carried to other years.
    fn apply_deductible(&mut self) {
        if self.pl <= Decimal::ZERO {
            self.pl = Decimal::ZERO;
            return;
        }
        let deducted = self.pl.min(self.fees.abs());
        self.pl -= deducted;
        self.fees += deducted;
        self.deducted = deducted;
    }
}

/// Fee not tied to any instrument, already in the reporting currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearAmount {
    pub year: i32,
    pub amount: Decimal,
}

/// Convert portfolio fees at each fee's own year
pub fn convert_fees(fees: &[CashEvent], rater: &dyn Rater) -> Result<Vec<YearAmount>, RateError> {
    fees.iter()
        .map(|fee| {
            Ok(YearAmount {
                year: fee.year,
                amount: convert(fee, rater)?,
            })
        })
        .collect()
}

/// Yearly tax report over the whole portfolio
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxReport(BTreeMap<i32, TaxYear>);

impl TaxReport {
    fn year(&mut self, year: i32) -> &mut TaxYear {
        self.0.entry(year).or_insert_with(|| TaxYear::new(year))
    }

    pub fn get(&self, year: i32) -> Option<&TaxYear> {
        self.0.get(&year)
    }

    /// Years in ascending order
    pub fn years(&self) -> impl Iterator<Item = &TaxYear> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Fold every instrument's yearly summary and the portfolio fees into a tax report.
///
/// Dividends are only reported for equity-like instruments. When tax was
/// withheld on an instrument in a year, its dividends and the withheld tax go
/// to the foreign income bucket of the instrument's domicile instead.
pub fn build_tax_report(assets: &[Asset], portfolio_fees: &[YearAmount]) -> TaxReport {
    let mut report = TaxReport::default();

    for fee in portfolio_fees {
        report.year(fee.year).fees += fee.amount;
    }

    for asset in assets {
        let equity_like = asset.instrument.category.is_equity_like();

        for summary in &asset.years {
            let year = report.year(summary.year);
            year.pl += summary.taxable;
            year.fees += summary.fees;

            if summary.withholding_tax.is_zero() {
                if equity_like {
                    year.dividends += summary.dividends;
                }
                continue;
            }

            let source = year.income_source(&asset.instrument.domicile());
            if equity_like {
                source.received += summary.dividends;
            }
            source.tax_paid += summary.withholding_tax;
        }
    }

    for year in report.0.values_mut() {
        year.apply_deductible();
    }

    report
}
