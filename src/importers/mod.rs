// Import module - broker statements into per-instrument imports

pub mod amounts;
pub mod ibkr;

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::models::{AssetImport, CashEvent, Category, Instrument, Trade};

pub use ibkr::parse_ibkr_statement;

/// Events read from one statement file, in file order
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub path: PathBuf,
    pub events: Vec<StatementEvent>,
}

/// A single statement line relevant to taxation
#[derive(Debug, Clone, PartialEq)]
pub enum StatementEvent {
    /// Every symbol an instrument is known by, including its ISIN
    Instrument {
        symbols: Vec<String>,
        category: Category,
    },
    Trade {
        symbol: String,
        trade: Trade,
    },
    Dividend {
        symbol: String,
        event: CashEvent,
    },
    WithholdingTax {
        symbol: String,
        event: CashEvent,
    },
    /// Portfolio fee not tied to an instrument, e.g. a data subscription
    Fee(CashEvent),
}

/// Accumulated imports across statements.
///
/// Instruments seen under several symbols (ticker renames, ISIN) are merged
/// into one record as soon as a statement links the aliases.
#[derive(Debug, Default)]
pub struct ImportResults {
    assets: Vec<Option<AssetImport>>,
    by_symbol: HashMap<String, usize>,
    fees: Vec<CashEvent>,
    currencies: BTreeSet<String>,
    years: BTreeSet<i32>,
}

impl ImportResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, statement: Statement) {
        debug!(
            "Applying {} events from {:?}",
            statement.events.len(),
            statement.path
        );
        for event in statement.events {
            match event {
                StatementEvent::Instrument { symbols, category } => {
                    self.add_instrument_info(&symbols, category)
                }
                StatementEvent::Trade { symbol, trade } => self.add_trade(&symbol, trade),
                StatementEvent::Dividend { symbol, event } => self.add_dividend(&symbol, event),
                StatementEvent::WithholdingTax { symbol, event } => {
                    self.add_withholding_tax(&symbol, event)
                }
                StatementEvent::Fee(event) => self.add_fee(event),
            }
        }
    }

    /// Link symbols to one instrument and set its category if still unknown
    pub fn add_instrument_info(&mut self, symbols: &[String], category: Category) {
        let Some(idx) = self.by_symbols(symbols) else {
            return;
        };
        if let Some(asset) = self.assets[idx].as_mut() {
            if asset.instrument.category == Category::Unknown {
                asset.instrument.category = category;
            }
        }
    }

    pub fn add_trade(&mut self, symbol: &str, trade: Trade) {
        if trade.currency.is_empty() || trade.quantity.is_zero() {
            return;
        }
        let Some(asset) = self.asset_mut(symbol) else {
            return;
        };
        let (currency, year) = (trade.currency.clone(), trade.year());
        asset.trades.push(trade);
        self.track(currency, year);
    }

    pub fn add_dividend(&mut self, symbol: &str, event: CashEvent) {
        if event.currency.is_empty() || event.amount.is_zero() {
            return;
        }
        let Some(asset) = self.asset_mut(symbol) else {
            return;
        };
        let (currency, year) = (event.currency.clone(), event.year);
        asset.dividends.push(event);
        self.track(currency, year);
    }

    pub fn add_withholding_tax(&mut self, symbol: &str, event: CashEvent) {
        if event.currency.is_empty() || event.amount.is_zero() {
            return;
        }
        let Some(asset) = self.asset_mut(symbol) else {
            return;
        };
        let (currency, year) = (event.currency.clone(), event.year);
        asset.withholding_tax.push(event);
        self.track(currency, year);
    }

    pub fn add_fee(&mut self, event: CashEvent) {
        if event.currency.is_empty() || event.amount.is_zero() {
            return;
        }
        self.track(event.currency.clone(), event.year);
        self.fees.push(event);
    }

    /// Currencies seen in any event, sorted
    pub fn currencies(&self) -> Vec<String> {
        self.currencies.iter().cloned().collect()
    }

    /// Years seen in any event, ascending
    pub fn years(&self) -> Vec<i32> {
        self.years.iter().copied().collect()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.iter().flatten().count()
    }

    /// Instruments in the order they were first seen, and the portfolio fees
    pub fn into_parts(self) -> (Vec<AssetImport>, Vec<CashEvent>) {
        (self.assets.into_iter().flatten().collect(), self.fees)
    }

    fn track(&mut self, currency: String, year: i32) {
        self.currencies.insert(currency);
        self.years.insert(year);
    }

    fn asset_mut(&mut self, symbol: &str) -> Option<&mut AssetImport> {
        if symbol.is_empty() {
            return None;
        }
        let idx = self.by_symbols(&[symbol.to_string()])?;
        self.assets[idx].as_mut()
    }

    /// Find or create the instrument behind a set of symbols.
    ///
    /// Every record reached through one of the symbols is merged into the
    /// first one found, which then owns all symbols.
    fn by_symbols(&mut self, symbols: &[String]) -> Option<usize> {
        let mut matched: Vec<usize> = Vec::new();
        for symbol in symbols {
            if let Some(&idx) = self.by_symbol.get(symbol) {
                if !matched.contains(&idx) {
                    matched.push(idx);
                }
            }
        }

        let target = match matched.first() {
            Some(&idx) => idx,
            None => {
                let first = symbols.first()?;
                debug!("New instrument {}", first);
                self.assets.push(Some(AssetImport::new(Instrument::new(
                    Vec::new(),
                    Category::Unknown,
                ))));
                self.assets.len() - 1
            }
        };

        let merged: Vec<AssetImport> = matched
            .iter()
            .skip(1)
            .filter_map(|&idx| self.assets[idx].take())
            .collect();

        let asset = self.assets[target].as_mut()?;
        for other in merged {
            debug!(
                "Merging {} into {}",
                other.instrument.display_symbols(),
                asset.instrument.display_symbols()
            );
            merge_asset(other, asset);
        }
        for symbol in symbols {
            if !asset.instrument.symbols.contains(symbol) {
                asset.instrument.symbols.push(symbol.clone());
            }
        }

        for symbol in &asset.instrument.symbols {
            self.by_symbol.insert(symbol.clone(), target);
        }
        Some(target)
    }
}

fn merge_asset(source: AssetImport, target: &mut AssetImport) {
    for symbol in source.instrument.symbols {
        if !target.instrument.symbols.contains(&symbol) {
            target.instrument.symbols.push(symbol);
        }
    }
    if target.instrument.category == Category::Unknown {
        target.instrument.category = source.instrument.category;
    }
    target.trades.extend(source.trades);
    target.dividends.extend(source.dividends);
    target.withholding_tax.extend(source.withholding_tax);
}

/// Find every `.csv` file under `dir`, skipping hidden directories
pub fn find_statement_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_csv_files(dir.as_ref(), &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_csv_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read directory {:?}", dir))?;

    for entry in entries {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));

        if path.is_dir() {
            if !hidden {
                collect_csv_files(&path, files)?;
            }
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        {
            files.push(path);
        }
    }
    Ok(())
}

/// Parse statement files concurrently and merge them in the given order.
///
/// A file that fails to parse is logged and left out.
pub async fn import_statements(files: Vec<PathBuf>) -> Result<ImportResults> {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut join_set = JoinSet::new();

    info!("Importing {} statement files", files.len());
    for (idx, path) in files.into_iter().enumerate() {
        let permit = semaphore.clone().acquire_owned().await?;
        join_set.spawn_blocking(move || {
            let _permit = permit;
            let result = parse_ibkr_statement(&path);
            (idx, path, result)
        });
    }

    let mut statements = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((idx, _, Ok(statement))) => statements.push((idx, statement)),
            Ok((_, path, Err(err))) => warn!("Skipping {:?}: {:#}", path, err),
            Err(err) => warn!("Statement import task failed: {}", err),
        }
    }
    statements.sort_by_key(|(idx, _)| *idx);

    let mut results = ImportResults::new();
    for (_, statement) in statements {
        results.apply(statement);
    }
    info!(
        "Imported {} instruments, {} currencies",
        results.asset_count(),
        results.currencies.len()
    );
    Ok(results)
}

/// Import every statement found under `dir`
pub async fn import_directory<P: AsRef<Path>>(dir: P) -> Result<ImportResults> {
    let files = find_statement_files(dir)?;
    if files.is_empty() {
        warn!("No statement files found");
    }
    import_statements(files).await
}
