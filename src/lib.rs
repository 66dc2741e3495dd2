//! Taxfolio - capital gains and dividend tax reports from brokerage statements
//!
//! Sales are matched against purchases first-in-first-out, gains realized
//! within the holding period are taxable, and everything is converted into
//! the reporting currency at yearly exchange rates before being folded into
//! the yearly tax report.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fx;
pub mod importers;
pub mod models;
pub mod reports;
pub mod tax;
