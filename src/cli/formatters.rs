//! Output formatting module for CLI display
//!
//! Terminal tables and JSON documents for the report, holdings and rate
//! commands. Calculation stays in the library; this only presents it.

use colored::Colorize;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::path::Path;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::tax::{Asset, AssetFailure, Assessment};

fn money(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        return "0.00".to_string();
    }
    format!("{:.2}", rounded)
}

fn signed(value: Decimal) -> String {
    let text = money(value);
    if value < Decimal::ZERO {
        text.red().to_string()
    } else if value > Decimal::ZERO {
        text.green().to_string()
    } else {
        text
    }
}

/// Format the yearly tax report for terminal output
pub fn format_report_table(assessment: &Assessment) -> String {
    if assessment.report.is_empty() {
        return format_empty_report();
    }

    #[derive(Tabled)]
    struct YearRow {
        #[tabled(rename = "Year")]
        year: i32,
        #[tabled(rename = "Dividends")]
        dividends: String,
        #[tabled(rename = "Taxable P/L")]
        pl: String,
        #[tabled(rename = "Fees")]
        fees: String,
        #[tabled(rename = "Deducted")]
        deducted: String,
    }

    #[derive(Tabled)]
    struct IncomeRow {
        #[tabled(rename = "Year")]
        year: i32,
        #[tabled(rename = "Source")]
        source: String,
        #[tabled(rename = "Received")]
        received: String,
        #[tabled(rename = "Withholding Tax")]
        tax_paid: String,
    }

    let mut output = format!("\n{} Tax Report (JOPPD)\n\n", "📊".cyan().bold());

    let years: Vec<YearRow> = assessment
        .report
        .years()
        .map(|y| YearRow {
            year: y.year,
            dividends: money(y.dividends),
            pl: signed(y.pl),
            fees: money(y.fees),
            deducted: money(y.deducted),
        })
        .collect();

    let mut table = Table::new(&years);
    table.with(Style::modern());
    table.modify(Columns::new(1..), Alignment::right());
    output.push_str(&table.to_string());

    let income: Vec<IncomeRow> = assessment
        .report
        .years()
        .flat_map(|y| {
            y.foreign_income().into_iter().map(move |fi| IncomeRow {
                year: y.year,
                source: fi.source.clone(),
                received: money(fi.received),
                tax_paid: money(fi.tax_paid),
            })
        })
        .collect();

    if !income.is_empty() {
        output.push_str(&format!("\n\n{} Foreign Income (INO-DOH)\n\n", "🌍".cyan().bold()));
        let mut table = Table::new(&income);
        table.with(Style::modern());
        table.modify(Columns::new(2..), Alignment::right());
        output.push_str(&table.to_string());
    }

    output.push('\n');
    output.push_str(&format_failures(&assessment.summary.failures));
    output
}

/// Format open lots per instrument
pub fn format_holdings_table(assets: &[Asset]) -> String {
    #[derive(Tabled)]
    struct HoldingRow {
        #[tabled(rename = "Asset")]
        asset: String,
        #[tabled(rename = "Purchased")]
        purchased: String,
        #[tabled(rename = "Taxable Until")]
        taxable_until: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Cost")]
        cost: String,
    }

    let rows: Vec<HoldingRow> = assets
        .iter()
        .flat_map(|a| {
            a.holdings.iter().map(move |h| HoldingRow {
                asset: a.instrument.display_symbols(),
                purchased: h.purchased.format("%Y-%m-%d").to_string(),
                taxable_until: h
                    .taxable_until
                    .map(|t| t.format("%Y-%m-%d").to_string().yellow().to_string())
                    .unwrap_or_else(|| "exempt".green().to_string()),
                quantity: h.quantity.normalize().to_string(),
                cost: money(h.cost),
            })
        })
        .collect();

    if rows.is_empty() {
        return format!("{} No open holdings\n", "ℹ".blue().bold());
    }

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.modify(Columns::new(3..), Alignment::right());
    format!(
        "\n{} Open Holdings\n\n{}\n",
        "📦".cyan().bold(),
        table
    )
}

/// Warn about instruments left out of the report
pub fn format_failures(failures: &[AssetFailure]) -> String {
    let mut output = String::new();
    for failure in failures {
        output.push_str(&format!(
            "{} Skipped {}: {}\n",
            "⚠".yellow().bold(),
            failure.instrument.display_symbols(),
            failure.error
        ));
    }
    output
}

pub fn format_written(path: &Path) -> String {
    format!("{} Report written to {}\n", "✓".green().bold(), path.display())
}

pub fn format_rate(currency: &str, year: i32, rate: Decimal) -> String {
    format!("{} {}: {}", currency.to_uppercase().bold(), year, rate.normalize())
}

/// Format empty report message
pub fn format_empty_report() -> String {
    format!(
        "{} No taxable events found\nPoint {} at a directory of Interactive Brokers statements\n",
        "ℹ".blue().bold(),
        "taxfolio report <dir>".bold()
    )
}

#[derive(Serialize)]
struct JsonYear {
    year: i32,
    dividends: String,
    profit_loss: String,
    fees: String,
    deducted: String,
    foreign_income: Vec<JsonForeignIncome>,
}

#[derive(Serialize)]
struct JsonForeignIncome {
    source: String,
    received: String,
    withholding_tax: String,
}

#[derive(Serialize)]
struct JsonFailure {
    asset: String,
    error: String,
}

#[derive(Serialize)]
struct JsonHolding {
    asset: String,
    purchased: String,
    taxable_until: Option<String>,
    quantity: String,
    cost: String,
}

fn to_json(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// Format the yearly tax report as JSON
pub fn format_report_json(assessment: &Assessment, written: Option<&Path>) -> String {
    #[derive(Serialize)]
    struct JsonReport {
        years: Vec<JsonYear>,
        skipped: Vec<JsonFailure>,
        output: Option<String>,
    }

    let years = assessment
        .report
        .years()
        .map(|y| JsonYear {
            year: y.year,
            dividends: money(y.dividends),
            profit_loss: money(y.pl),
            fees: money(y.fees),
            deducted: money(y.deducted),
            foreign_income: y
                .foreign_income()
                .into_iter()
                .map(|fi| JsonForeignIncome {
                    source: fi.source.clone(),
                    received: money(fi.received),
                    withholding_tax: money(fi.tax_paid),
                })
                .collect(),
        })
        .collect();

    let skipped = assessment
        .summary
        .failures
        .iter()
        .map(|f| JsonFailure {
            asset: f.instrument.display_symbols(),
            error: f.error.to_string(),
        })
        .collect();

    to_json(&JsonReport {
        years,
        skipped,
        output: written.map(|p| p.display().to_string()),
    })
}

/// Format open lots as JSON
pub fn format_holdings_json(assets: &[Asset]) -> String {
    let holdings: Vec<JsonHolding> = assets
        .iter()
        .flat_map(|a| {
            a.holdings.iter().map(move |h| JsonHolding {
                asset: a.instrument.display_symbols(),
                purchased: h.purchased.format("%Y-%m-%d").to_string(),
                taxable_until: h.taxable_until.map(|t| t.format("%Y-%m-%d").to_string()),
                quantity: h.quantity.normalize().to_string(),
                cost: money(h.cost),
            })
        })
        .collect();
    to_json(&holdings)
}

pub fn format_rate_json(currency: &str, year: i32, rate: Decimal) -> String {
    to_json(&serde_json::json!({
        "currency": currency.to_uppercase(),
        "year": year,
        "rate": rate.normalize().to_string(),
    }))
}
