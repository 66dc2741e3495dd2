use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::OutputFormat;

pub mod formatters;

#[derive(Parser)]
#[command(name = "taxfolio")]
#[command(
    version,
    about = "Capital gains and dividend tax reports from brokerage statements"
)]
#[command(
    long_about = "Reads Interactive Brokers activity statements, matches sales against purchases first-in-first-out, converts everything into the reporting currency and produces yearly tax figures (JOPPD and INO-DOH tables) plus per-instrument summaries and open holdings."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Configuration file (defaults to <config dir>/taxfolio/config.toml)
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the tax report from every statement in a directory
    Report {
        /// Directory searched recursively for statement CSV files
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Exchange rate table (currency,year,rate) instead of the HNB service
        #[arg(long)]
        rates: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Output workbook (xlsx) or directory (csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Evaluate open holdings as of this date (YYYY-MM-DD)
        #[arg(long)]
        now: Option<String>,
    },

    /// Show open lots and how long each stays taxable
    Holdings {
        /// Directory searched recursively for statement CSV files
        #[arg(default_value = ".")]
        dir: PathBuf,

        /// Exchange rate table (currency,year,rate) instead of the HNB service
        #[arg(long)]
        rates: Option<PathBuf>,

        /// Evaluate open holdings as of this date (YYYY-MM-DD)
        #[arg(long)]
        now: Option<String>,
    },

    /// Print the conversion factor of a currency for a year
    Rate {
        /// Currency code, e.g. USD
        currency: String,

        /// Calendar year
        year: i32,

        /// Exchange rate table (currency,year,rate) instead of the HNB service
        #[arg(long)]
        rates: Option<PathBuf>,
    },
}
