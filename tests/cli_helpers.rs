#![allow(dead_code)]

use anyhow::{bail, Result};
use assert_cmd::cargo;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Activity statement covering a long-held sale, a taxable sale, a dividend
/// with withholding tax, a portfolio fee and a sale with no purchase history.
pub const STATEMENT: &str = "\
Statement,Header,Field Name,Field Value
Statement,Data,Title,Activity Statement
Trades,Header,DataDiscriminator,Asset Category,Currency,Symbol,Date/Time,Quantity,T. Price,Comm/Fee
Trades,Data,Order,Stocks,USD,AAPL,\"2020-01-01, 10:00:00\",10,100,-1
Trades,Data,Order,Stocks,USD,MSFT,\"2022-03-01, 15:30:00\",10,200,-2
Trades,Data,Order,Stocks,USD,BAD,\"2023-01-05, 11:00:00\",-5,10,0
Trades,Data,Order,Stocks,USD,MSFT,\"2023-02-01, 15:30:00\",-4,250,-2
Trades,Data,Order,Stocks,USD,AAPL,\"2023-06-01, 10:00:00\",-10,150,-1
Dividends,Header,Currency,Date,Description,Amount
Dividends,Data,USD,2023-05-10,MSFT(US5949181045) Cash Dividend USD 2.00 per Share (Ordinary Dividend),20
Withholding Tax,Header,Currency,Date,Description,Amount,Code
Withholding Tax,Data,USD,2023-05-10,MSFT(US5949181045) Cash Dividend USD 2.00 per Share - US Tax,-3,
Fees,Header,Subtitle,Currency,Date,Description,Amount
Fees,Data,Other Fees,USD,2023-03-03,Market data subscription,-10
Financial Instrument Information,Header,Asset Category,Symbol,Description,Conid,Security ID,Listing Exch,Multiplier,Type,Code
Financial Instrument Information,Data,Stocks,AAPL,APPLE INC,265598,US0378331005,NASDAQ,1,COMMON,
Financial Instrument Information,Data,Stocks,MSFT,MICROSOFT CORP,272093,US5949181045,NASDAQ,1,COMMON,
";

pub const RATES: &str = "\
currency,year,rate
USD,2020,0.9
USD,2022,0.9
USD,2023,0.9
";

/// Temp home with a statements directory and a rates table
pub struct Workspace {
    pub home: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let home = TempDir::new()?;
        let statements = home.path().join("statements");
        std::fs::create_dir_all(&statements)?;
        std::fs::write(statements.join("2023.csv"), STATEMENT)?;
        std::fs::write(home.path().join("rates.csv"), RATES)?;
        Ok(Self { home })
    }

    pub fn path(&self) -> &Path {
        self.home.path()
    }

    pub fn statements(&self) -> PathBuf {
        self.path().join("statements")
    }

    pub fn rates(&self) -> PathBuf {
        self.path().join("rates.csv")
    }

    pub fn base_cmd(&self) -> Command {
        let mut cmd = Command::new(cargo::cargo_bin!("taxfolio"));
        cmd.env("HOME", self.path());
        cmd.env("XDG_CONFIG_HOME", self.path().join(".config"));
        cmd.env("RUST_LOG", "warn");
        cmd.arg("--no-color");
        cmd
    }

    pub fn run_cmd(&self, args: &[&str]) -> Result<Output> {
        let mut cmd = self.base_cmd();
        cmd.args(args);
        let output = cmd.output()?;
        if !output.status.success() {
            bail!(
                "command failed: {:?}\nstdout: {}\nstderr: {}",
                args,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(output)
    }

    pub fn run_cmd_json(&self, args: &[&str]) -> Result<Value> {
        let mut with_json = vec!["--json"];
        with_json.extend_from_slice(args);
        let output = self.run_cmd(&with_json)?;
        let stdout = String::from_utf8(output.stdout)?;
        Ok(serde_json::from_str(&stdout)?)
    }
}
