//! Configuration file support
//!
//! Settings are read from `--config <path>` when given, otherwise from
//! `<config home>/taxfolio/config.toml` if it exists. Every key is optional.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::tax::{Boundary, TaxPolicy};

const CONFIG_DIR: &str = "taxfolio";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Currency amounts are converted into when rates come from a file
    pub reporting_currency: String,
    pub taxation: TaxationConfig,
    pub rates: RatesConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reporting_currency: "EUR".to_string(),
            taxation: TaxationConfig::default(),
            rates: RatesConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaxationConfig {
    pub regime_start: NaiveDate,
    pub holding_months: u32,
    pub boundary: Boundary,
}

impl Default for TaxationConfig {
    fn default() -> Self {
        let policy = TaxPolicy::default();
        Self {
            regime_start: policy.regime_start,
            holding_months: policy.holding_months,
            boundary: policy.boundary,
        }
    }
}

impl TaxationConfig {
    pub fn policy(&self) -> TaxPolicy {
        TaxPolicy {
            regime_start: self.regime_start,
            holding_months: self.holding_months,
            boundary: self.boundary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSourceKind {
    #[default]
    Hnb,
    File,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RatesConfig {
    pub source: RateSourceKind,
    /// `currency,year,rate` table, required when `source = "file"`
    pub file: Option<PathBuf>,
    pub retries: u32,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            source: RateSourceKind::Hnb,
            file: None,
            retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Xlsx,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Workbook file stem for xlsx, directory for csv
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Xlsx,
            path: PathBuf::from("Tax Report"),
        }
    }
}

impl Config {
    /// Load configuration from an explicit path or the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No configuration file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        info!("Loading configuration from {:?}", path);
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.validate()?;
        config.reporting_currency = config.reporting_currency.to_uppercase();
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.reporting_currency.trim().is_empty() {
            bail!("reporting_currency must not be empty");
        }
        if self.taxation.holding_months == 0 {
            bail!("taxation.holding_months must be positive");
        }
        if self.rates.source == RateSourceKind::File && self.rates.file.is_none() {
            bail!("rates.file is required when rates.source = \"file\"");
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dir_spec::config_home().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
