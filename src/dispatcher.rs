//! Command dispatcher that routes parsed CLI commands to their handlers.
//!
//! Statement import runs on the async runtime; everything touching exchange
//! rates runs on a blocking thread since the HNB client is synchronous.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::formatters;
use crate::cli::{Cli, Commands};
use crate::config::{Config, OutputFormat, RateSourceKind};
use crate::fx::{CachedRates, HnbSource, Rater, StaticRates};
use crate::importers::{import_directory, ImportResults};
use crate::reports::{open_writer, report_sheets, write_sheets};
use crate::tax::{assess, Assessment};

/// Route a parsed command line to its handler
pub async fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let json = cli.json;

    match cli.command {
        Commands::Report {
            dir,
            rates,
            format,
            output,
            now,
        } => {
            let options = ReportOptions {
                format: format.unwrap_or(config.output.format),
                output: output.unwrap_or_else(|| config.output.path.clone()),
                now: parse_now(now.as_deref())?,
            };
            dispatch_report(&dir, rates, options, config, json).await
        }
        Commands::Holdings { dir, rates, now } => {
            let now = parse_now(now.as_deref())?;
            dispatch_holdings(&dir, rates, now, config, json).await
        }
        Commands::Rate {
            currency,
            year,
            rates,
        } => dispatch_rate(currency, year, rates, config, json).await,
    }
}

struct ReportOptions {
    format: OutputFormat,
    output: PathBuf,
    now: NaiveDateTime,
}

async fn dispatch_report(
    dir: &Path,
    rates: Option<PathBuf>,
    options: ReportOptions,
    config: Config,
    json: bool,
) -> Result<()> {
    let results = import_directory(dir).await?;

    let (assessment, written) = tokio::task::spawn_blocking(move || -> Result<_> {
        let assessment = assess_imports(results, rates, &config, options.now)?;

        let sheets = report_sheets(&assessment.summary.assets, &assessment.report);
        let mut writer = open_writer(options.format, &options.output)?;
        let written = write_sheets(writer.as_mut(), &sheets)?;
        Ok((assessment, written))
    })
    .await??;

    if json {
        println!("{}", formatters::format_report_json(&assessment, Some(&written)));
    } else {
        print!("{}", formatters::format_report_table(&assessment));
        print!("{}", formatters::format_written(&written));
    }
    Ok(())
}

async fn dispatch_holdings(
    dir: &Path,
    rates: Option<PathBuf>,
    now: NaiveDateTime,
    config: Config,
    json: bool,
) -> Result<()> {
    let results = import_directory(dir).await?;
    let assessment =
        tokio::task::spawn_blocking(move || assess_imports(results, rates, &config, now))
            .await??;

    if json {
        println!("{}", formatters::format_holdings_json(&assessment.summary.assets));
    } else {
        print!("{}", formatters::format_holdings_table(&assessment.summary.assets));
        print!("{}", formatters::format_failures(&assessment.summary.failures));
    }
    Ok(())
}

async fn dispatch_rate(
    currency: String,
    year: i32,
    rates: Option<PathBuf>,
    config: Config,
    json: bool,
) -> Result<()> {
    let (currency, rate) = tokio::task::spawn_blocking(move || -> Result<_> {
        let rater = build_rater(rates.as_deref(), &config)?;
        let rate = rater.rate(&currency, year)?;
        Ok((currency, rate))
    })
    .await??;

    if json {
        println!("{}", formatters::format_rate_json(&currency, year, rate));
    } else {
        println!("{}", formatters::format_rate(&currency, year, rate));
    }
    Ok(())
}

/// Resolve rates for everything imported and run the tax pipeline
fn assess_imports(
    results: ImportResults,
    rates: Option<PathBuf>,
    config: &Config,
    now: NaiveDateTime,
) -> Result<Assessment> {
    let rater = build_rater(rates.as_deref(), config)?;
    if let Some(cached) = rater.as_prefetch() {
        cached
            .prefetch(&results.currencies(), &results.years())
            .context("Failed to fetch exchange rates")?;
    }

    let (imports, fees) = results.into_parts();
    let policy = config.taxation.policy();
    let assessment = assess(&imports, &fees, &policy, rater.as_rater(), now)
        .context("Cannot build the tax report")?;
    Ok(assessment)
}

/// Rate provider chosen from the command line and configuration
enum RateProvider {
    Table(StaticRates),
    Hnb(CachedRates<HnbSource>),
}

impl RateProvider {
    fn as_rater(&self) -> &dyn Rater {
        match self {
            RateProvider::Table(rates) => rates,
            RateProvider::Hnb(rates) => rates,
        }
    }

    fn as_prefetch(&self) -> Option<&CachedRates<HnbSource>> {
        match self {
            RateProvider::Table(_) => None,
            RateProvider::Hnb(rates) => Some(rates),
        }
    }

    fn rate(&self, currency: &str, year: i32) -> Result<rust_decimal::Decimal> {
        Ok(self.as_rater().rate(currency, year)?)
    }
}

fn build_rater(rates: Option<&Path>, config: &Config) -> Result<RateProvider> {
    let table = rates.or(match config.rates.source {
        RateSourceKind::File => config.rates.file.as_deref(),
        RateSourceKind::Hnb => None,
    });

    match table {
        Some(path) => Ok(RateProvider::Table(StaticRates::from_csv(
            &config.reporting_currency,
            path,
        )?)),
        None => {
            info!("Using HNB exchange rates");
            Ok(RateProvider::Hnb(CachedRates::new(HnbSource::new(
                config.rates.retries,
            ))))
        }
    }
}

/// Evaluation time for holdings: the given date at midnight, or the local clock
fn parse_now(value: Option<&str>) -> Result<NaiveDateTime> {
    match value {
        Some(date) => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date {:?}, expected YYYY-MM-DD", date))?;
            Ok(date.and_time(chrono::NaiveTime::MIN))
        }
        None => Ok(Local::now().naive_local()),
    }
}
