use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use super::amounts::{
    format_isin, parse_amount, parse_statement_time, symbol_from_description, year_from_date,
};
use super::{Statement, StatementEvent};
use crate::error::ImportError;
use crate::models::{CashEvent, Category, Trade};

const INSTRUMENT_INFO: &str = "Financial Instrument Information";
const TRADES: &str = "Trades";
const DIVIDENDS: &str = "Dividends";
const WITHHOLDING_TAX: &str = "Withholding Tax";
const FEES: &str = "Fees";

const SECTIONS: [&str; 5] = [INSTRUMENT_INFO, TRADES, DIVIDENDS, WITHHOLDING_TAX, FEES];

/// Parse an Interactive Brokers activity statement exported as CSV
pub fn parse_ibkr_statement<P: AsRef<Path>>(file_path: P) -> Result<Statement> {
    let path = file_path.as_ref();
    info!("Parsing IBKR statement: {:?}", path);

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open statement {:?}", path))?;
    let events = parse_ibkr_reader(file)?;

    info!("Read {} events from {:?}", events.len(), path);
    Ok(Statement {
        path: path.to_path_buf(),
        events,
    })
}

/// Parse statement rows from any reader.
///
/// The statement is a concatenation of sections. Every row starts with the
/// section name; a `Header` row gives the column names for the `Data` rows
/// that follow it.
pub fn parse_ibkr_reader<R: Read>(reader: R) -> Result<Vec<StatementEvent>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut header: Option<StringRecord> = None;
    let mut events = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable line {}: {}", line, e);
                continue;
            }
        };

        let section = record.get(0).unwrap_or_default().to_string();
        if !SECTIONS.contains(&section.as_str()) {
            continue;
        }

        if record.get(1) == Some("Header") {
            header = Some(record);
            continue;
        }
        if record.get(1) != Some("Data") {
            continue;
        }

        let Some(fields) = header.as_ref().and_then(|h| map_row(h, &record)) else {
            debug!("Line {} does not match its section header", line);
            continue;
        };

        match parse_row(&section, &fields) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => warn!("Skipping {} line {}: {}", section, line, e),
        }
    }

    Ok(events)
}

/// Pair data fields with the current section header
fn map_row<'a>(
    header: &'a StringRecord,
    record: &'a StringRecord,
) -> Option<HashMap<&'a str, &'a str>> {
    if header.get(0) != record.get(0) || header.len() != record.len() {
        return None;
    }
    Some(
        header
            .iter()
            .zip(record.iter())
            .skip(2)
            .map(|(h, v)| (h.trim(), v.trim()))
            .collect(),
    )
}

fn field<'a>(fields: &HashMap<&str, &'a str>, name: &str) -> &'a str {
    fields.get(name).copied().unwrap_or_default()
}

fn parse_row(
    section: &str,
    fields: &HashMap<&str, &str>,
) -> Result<Option<StatementEvent>, ImportError> {
    match section {
        INSTRUMENT_INFO => Ok(instrument_event(fields)),
        TRADES => trade_event(fields),
        DIVIDENDS => cash_event(fields).map(|e| {
            e.map(|(symbol, event)| StatementEvent::Dividend { symbol, event })
        }),
        WITHHOLDING_TAX => cash_event(fields).map(|e| {
            e.map(|(symbol, event)| StatementEvent::WithholdingTax { symbol, event })
        }),
        FEES => fee_event(fields),
        _ => Ok(None),
    }
}

fn instrument_event(fields: &HashMap<&str, &str>) -> Option<StatementEvent> {
    let mut symbols: Vec<String> = field(fields, "Symbol")
        .split(',')
        .map(|s| s.replace(' ', ""))
        .filter(|s| !s.is_empty())
        .collect();

    let isin = format_isin(field(fields, "Security ID"));
    if !isin.is_empty() {
        symbols.push(isin);
    }

    if symbols.is_empty() {
        return None;
    }

    Some(StatementEvent::Instrument {
        symbols,
        category: Category::from_broker(field(fields, "Asset Category")),
    })
}

fn trade_event(fields: &HashMap<&str, &str>) -> Result<Option<StatementEvent>, ImportError> {
    let time = field(fields, "Date/Time");
    let symbol = field(fields, "Symbol");
    if time.is_empty() || symbol.is_empty() || field(fields, "Asset Category") == "Forex" {
        return Ok(None);
    }
    if fields
        .get("DataDiscriminator")
        .is_some_and(|d| !d.eq_ignore_ascii_case("Order"))
    {
        return Ok(None);
    }

    let currency = field(fields, "Currency");
    if currency.is_empty() {
        return Err(ImportError::MissingField("Currency"));
    }

    let price = parse_amount(field(fields, "T. Price"))?;
    if price < Decimal::ZERO {
        return Err(ImportError::NegativePrice(price));
    }

    Ok(Some(StatementEvent::Trade {
        symbol: symbol.to_string(),
        trade: Trade {
            time: parse_statement_time(time)?,
            currency: currency.to_string(),
            quantity: parse_amount(field(fields, "Quantity"))?,
            price,
            fee: parse_amount(field(fields, "Comm/Fee"))?,
        },
    }))
}

/// Dividend or withholding tax line, keyed by the symbol in its description
fn cash_event(fields: &HashMap<&str, &str>) -> Result<Option<(String, CashEvent)>, ImportError> {
    let date = field(fields, "Date");
    if date.is_empty() {
        return Ok(None);
    }
    let Some(symbol) = symbol_from_description(field(fields, "Description")) else {
        return Ok(None);
    };
    let year = year_from_date(date).ok_or_else(|| ImportError::InvalidTime(date.to_string()))?;
    let amount = parse_amount(field(fields, "Amount"))?;

    Ok(Some((
        symbol,
        CashEvent::new(field(fields, "Currency"), amount, year),
    )))
}

fn fee_event(fields: &HashMap<&str, &str>) -> Result<Option<StatementEvent>, ImportError> {
    let date = field(fields, "Date");
    if date.is_empty() {
        return Ok(None);
    }
    let year = year_from_date(date).ok_or_else(|| ImportError::InvalidTime(date.to_string()))?;
    let amount = parse_amount(field(fields, "Amount"))?;

    Ok(Some(StatementEvent::Fee(CashEvent::new(
        field(fields, "Currency"),
        amount,
        year,
    ))))
}
