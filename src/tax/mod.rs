// Tax module - FIFO cost basis, holding-period rule, yearly summaries and the tax report

pub mod cost_basis;
pub mod report;
pub mod summary;
pub mod taxability;

use chrono::NaiveDateTime;
use tracing::info;

use crate::error::RateError;
use crate::fx::Rater;
use crate::models::{AssetImport, CashEvent};

pub use cost_basis::{trade_asset, CostFragment, FifoLedger, Holding, Lot, Sale, TradedAsset};
pub use report::{build_tax_report, convert_fees, ForeignIncome, TaxReport, TaxYear, YearAmount};
pub use summary::{summarize_asset, summarize_assets, Asset, AssetFailure, AssetYear, SummaryReport};
pub use taxability::{Boundary, TaxPolicy};

/// Per-instrument summaries together with the portfolio tax report
#[derive(Debug, Clone)]
pub struct Assessment {
    pub summary: SummaryReport,
    pub report: TaxReport,
}

/// Summarize every instrument and fold the results into the yearly tax report.
///
/// Instruments with an inconsistent trade history end up in
/// `summary.failures` and are left out of the report.
pub fn assess(
    imports: &[AssetImport],
    portfolio_fees: &[CashEvent],
    policy: &TaxPolicy,
    rater: &dyn Rater,
    now: NaiveDateTime,
) -> Result<Assessment, RateError> {
    let summary = summarize_assets(imports, policy, rater, now)?;
    let fees = convert_fees(portfolio_fees, rater)?;
    let report = build_tax_report(&summary.assets, &fees);

    info!(
        "Assessed {} instruments over {} tax years ({} skipped)",
        summary.assets.len(),
        report.len(),
        summary.failures.len()
    );
    Ok(Assessment { summary, report })
}
