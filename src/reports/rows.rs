//! Projection of summaries and the tax report into spreadsheet rows.
//!
//! Money is rounded to 2 decimal places, half away from zero, here and
//! nowhere else.

use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;

use crate::tax::{Asset, TaxReport};

pub const SUMMARY_SHEET: &str = "Summary";
pub const HOLDINGS_SHEET: &str = "Holdings";
pub const JOPPD_SHEET: &str = "JOPPD";
pub const INO_DOH_SHEET: &str = "INO-DOH";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    /// Amount in the reporting currency, already rounded to cents
    Money(Decimal),
    Number(Decimal),
    Integer(i64),
}

impl Cell {
    fn money(value: Decimal) -> Self {
        let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        // no "-0" in the output
        Cell::Money(if rounded.is_zero() { Decimal::ZERO } else { rounded })
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Money(n) | Cell::Number(n) => write!(f, "{}", n.normalize()),
            Cell::Integer(i) => write!(f, "{}", i),
        }
    }
}

pub type Row = Vec<Cell>;

/// A named table, header first
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: &'static str,
    pub rows: Vec<Row>,
}

impl Sheet {
    fn new(name: &'static str, header: &[&str]) -> Self {
        Self {
            name,
            rows: vec![header.iter().map(|h| Cell::from(*h)).collect()],
        }
    }

    /// Data rows, without the header
    pub fn body(&self) -> &[Row] {
        self.rows.get(1..).unwrap_or_default()
    }
}

/// Yearly results per instrument
pub fn summary_sheet(assets: &[Asset]) -> Sheet {
    let mut sheet = Sheet::new(
        SUMMARY_SHEET,
        &[
            "Asset",
            "Category",
            "Year",
            "Profit/Loss",
            "Taxable PL",
            "Fees",
            "Dividends",
            "Withholding Tax",
        ],
    );

    for asset in assets {
        for year in &asset.years {
            sheet.rows.push(vec![
                asset.instrument.display_symbols().into(),
                asset.instrument.category.to_string().into(),
                Cell::Integer(year.year.into()),
                Cell::money(year.pl),
                Cell::money(year.taxable),
                Cell::money(year.fees),
                Cell::money(year.dividends),
                Cell::money(year.withholding_tax),
            ]);
        }
    }
    sheet
}

/// Open lots per instrument
pub fn holdings_sheet(assets: &[Asset]) -> Sheet {
    let mut sheet = Sheet::new(
        HOLDINGS_SHEET,
        &[
            "Asset",
            "Category",
            "Purchased",
            "TaxableUntil",
            "Quantity",
            "Cost",
        ],
    );

    for asset in assets {
        for holding in &asset.holdings {
            sheet.rows.push(vec![
                asset.instrument.display_symbols().into(),
                asset.instrument.category.to_string().into(),
                holding.purchased.format(DATE_FORMAT).to_string().into(),
                holding
                    .taxable_until
                    .map(|t| t.format(DATE_FORMAT).to_string())
                    .unwrap_or_default()
                    .into(),
                Cell::Number(holding.quantity.normalize()),
                Cell::money(holding.cost),
            ]);
        }
    }
    sheet
}

/// Domestic tax figures per year
pub fn joppd_sheet(report: &TaxReport) -> Sheet {
    let mut sheet = Sheet::new(JOPPD_SHEET, &["Year", "Dividends", "Profit/Loss", "Fees"]);
    for year in report.years() {
        sheet.rows.push(vec![
            Cell::Integer(year.year.into()),
            Cell::money(year.dividends),
            Cell::money(year.pl),
            Cell::money(year.fees),
        ]);
    }
    sheet
}

/// Foreign income per year and source country
pub fn ino_doh_sheet(report: &TaxReport) -> Sheet {
    let mut sheet = Sheet::new(
        INO_DOH_SHEET,
        &["Year", "Income Source", "Received", "Withholding Tax"],
    );
    for year in report.years() {
        for income in year.foreign_income() {
            sheet.rows.push(vec![
                Cell::Integer(year.year.into()),
                income.source.as_str().into(),
                Cell::money(income.received),
                Cell::money(income.tax_paid),
            ]);
        }
    }
    sheet
}

/// All report sheets in output order
pub fn report_sheets(assets: &[Asset], report: &TaxReport) -> Vec<Sheet> {
    vec![
        summary_sheet(assets),
        holdings_sheet(assets),
        joppd_sheet(report),
        ino_doh_sheet(report),
    ]
}
