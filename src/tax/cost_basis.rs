use chrono::{Datelike, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::debug;

use super::taxability::TaxPolicy;
use crate::error::{LedgerError, RateError};
use crate::fx::Rater;
use crate::models::{CashEvent, Trade};

/// An open purchase still available for matching against later sales
#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    pub purchased: NaiveDateTime,
    pub currency: String,
    pub price: Decimal,
    pub remaining: Decimal,
}

/// Portion of a lot consumed by a sale
#[derive(Debug, Clone, PartialEq)]
pub struct CostFragment {
    pub purchased: NaiveDateTime,
    pub currency: String,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// A closed sale with the lots it was matched against
#[derive(Debug, Clone, PartialEq)]
pub struct Sale {
    pub time: NaiveDateTime,
    pub currency: String,
    pub price: Decimal,
    pub basis: Vec<CostFragment>,
}

impl Sale {
    pub fn quantity(&self) -> Decimal {
        self.basis.iter().map(|c| c.quantity).sum()
    }
}

/// An open lot valued in the reporting currency
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub purchased: NaiveDateTime,
    /// None once the taxable window has elapsed
    pub taxable_until: Option<NaiveDateTime>,
    pub cost: Decimal,
    pub quantity: Decimal,
}

/// First-in-first-out lot queue for a single instrument
#[derive(Debug, Clone, Default)]
pub struct FifoLedger {
    lots: VecDeque<Lot>,
}

impl FifoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a purchase to the tail of the queue
    pub fn buy(&mut self, trade: &Trade) {
        self.lots.push_back(Lot {
            purchased: trade.time,
            currency: trade.currency.clone(),
            price: trade.price,
            remaining: trade.quantity.abs(),
        });
    }

    /// Consume `quantity` (negative) units from the oldest lots.
    ///
    /// Returns the cost fragments making up the sale. When the queue runs dry
    /// before the sale is covered, every lot is consumed and no fragments are
    /// returned.
    pub fn sell(&mut self, quantity: Decimal) -> Result<Vec<CostFragment>, LedgerError> {
        if quantity > Decimal::ZERO {
            return Err(LedgerError::NotASale(quantity));
        }

        let requested = quantity.abs();
        let mut outstanding = requested;
        let mut fragments = Vec::new();

        while outstanding > Decimal::ZERO {
            let Some(lot) = self.lots.front_mut() else {
                let available = requested - outstanding;
                return Err(LedgerError::InsufficientLots {
                    requested,
                    available,
                });
            };

            let take = lot.remaining.min(outstanding);
            fragments.push(CostFragment {
                purchased: lot.purchased,
                currency: lot.currency.clone(),
                price: lot.price,
                quantity: take,
            });
            lot.remaining -= take;
            outstanding -= take;

            if lot.remaining.is_zero() {
                self.lots.pop_front();
            }
        }

        Ok(fragments)
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.lots.iter().map(|l| l.remaining).sum()
    }

    /// Open lots ordered by purchase time, valued at each purchase year's rate
    pub fn holdings(
        &self,
        policy: &TaxPolicy,
        rater: &dyn Rater,
        now: NaiveDateTime,
    ) -> Result<Vec<Holding>, RateError> {
        let mut holdings = self
            .lots
            .iter()
            .map(|lot| {
                let rate = rater.rate(&lot.currency, lot.purchased.year())?;
                Ok(Holding {
                    purchased: lot.purchased,
                    taxable_until: policy.taxable_until(lot.purchased, now),
                    cost: lot.remaining * lot.price * rate,
                    quantity: lot.remaining,
                })
            })
            .collect::<Result<Vec<_>, RateError>>()?;

        holdings.sort_by_key(|h| h.purchased);
        Ok(holdings)
    }
}

/// Outcome of replaying an instrument's trades through the ledger
#[derive(Debug, Clone, Default)]
pub struct TradedAsset {
    pub sales: Vec<Sale>,
    /// Trade commissions, one per trade with a non-zero fee
    pub fees: Vec<CashEvent>,
    pub ledger: FifoLedger,
    pub first_trade: Option<NaiveDateTime>,
}

/// Replay trades in time order, matching every sale against earlier purchases.
///
/// Trades need not be sorted; ties keep their input order.
pub fn trade_asset(trades: &[Trade]) -> Result<TradedAsset, LedgerError> {
    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by_key(|t| t.time);

    let mut traded = TradedAsset {
        first_trade: ordered.first().map(|t| t.time),
        ..Default::default()
    };

    for trade in ordered {
        if !trade.fee.is_zero() {
            traded
                .fees
                .push(CashEvent::new(trade.currency.clone(), trade.fee, trade.year()));
        }

        if trade.quantity > Decimal::ZERO {
            traded.ledger.buy(trade);
            continue;
        }

        if trade.quantity.is_zero() {
            debug!("Ignoring zero quantity trade on {}", trade.time);
            continue;
        }

        let basis = traded.ledger.sell(trade.quantity)?;
        traded.sales.push(Sale {
            time: trade.time,
            currency: trade.currency.clone(),
            price: trade.price,
            basis,
        });
    }

    Ok(traded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::StaticRates;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn trade(time: NaiveDateTime, quantity: Decimal, price: Decimal, fee: Decimal) -> Trade {
        Trade {
            time,
            currency: "USD".to_string(),
            quantity,
            price,
            fee,
        }
    }

    fn ledger_with(lots: &[(NaiveDateTime, Decimal, Decimal)]) -> FifoLedger {
        let mut ledger = FifoLedger::new();
        for (time, qty, price) in lots {
            ledger.buy(&trade(*time, *qty, *price, Decimal::ZERO));
        }
        ledger
    }

    fn quantities(fragments: &[CostFragment]) -> Vec<Decimal> {
        fragments.iter().map(|c| c.quantity).collect()
    }

    #[test]
    fn test_sell_from_empty_ledger_is_insufficient() {
        let mut ledger = FifoLedger::new();
        let result = ledger.sell(dec!(-1));
        assert_eq!(
            result,
            Err(LedgerError::InsufficientLots {
                requested: dec!(1),
                available: dec!(0),
            })
        );
    }

    #[test]
    fn test_sell_exact_lot_removes_it() {
        let mut ledger = ledger_with(&[(at(2020, 1, 1), dec!(20), dec!(10))]);
        let fragments = ledger.sell(dec!(-20)).unwrap();
        assert_eq!(quantities(&fragments), vec![dec!(20)]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_sell_partial_lot_keeps_remainder() {
        let mut ledger = ledger_with(&[(at(2020, 1, 1), dec!(20), dec!(10))]);
        let fragments = ledger.sell(dec!(-5)).unwrap();
        assert_eq!(quantities(&fragments), vec![dec!(5)]);
        assert_eq!(ledger.remaining_quantity(), dec!(15));
    }

    #[test]
    fn test_sell_spans_lots_in_purchase_order() {
        let mut ledger = ledger_with(&[
            (at(2020, 1, 1), dec!(20), dec!(10)),
            (at(2020, 2, 1), dec!(10), dec!(12)),
            (at(2020, 3, 1), dec!(10), dec!(14)),
        ]);

        let fragments = ledger.sell(dec!(-25)).unwrap();
        assert_eq!(quantities(&fragments), vec![dec!(20), dec!(5)]);
        assert_eq!(fragments[0].purchased, at(2020, 1, 1));
        assert_eq!(fragments[0].price, dec!(10));
        assert_eq!(fragments[1].purchased, at(2020, 2, 1));
        assert_eq!(fragments[1].price, dec!(12));

        let next = ledger.sell(dec!(-10)).unwrap();
        assert_eq!(quantities(&next), vec![dec!(5), dec!(5)]);
        assert_eq!(next[0].purchased, at(2020, 2, 1));
        assert_eq!(next[1].purchased, at(2020, 3, 1));
        assert_eq!(ledger.remaining_quantity(), dec!(5));
    }

    #[test]
    fn test_sell_conserves_quantity() {
        let mut ledger = ledger_with(&[
            (at(2021, 1, 1), dec!(3.5), dec!(10)),
            (at(2021, 2, 1), dec!(1.25), dec!(11)),
            (at(2021, 3, 1), dec!(7), dec!(9)),
        ]);

        for sale in [dec!(-0.5), dec!(-4), dec!(-2.25), dec!(-1)] {
            let before = ledger.remaining_quantity();
            let fragments = ledger.sell(sale).unwrap();
            let sold: Decimal = fragments.iter().map(|c| c.quantity).sum();
            assert_eq!(sold, sale.abs());
            assert_eq!(ledger.remaining_quantity(), before - sale.abs());
        }
    }

    #[test]
    fn test_sell_zero_is_noop() {
        let mut ledger = ledger_with(&[(at(2020, 1, 1), dec!(20), dec!(10))]);
        let fragments = ledger.sell(Decimal::ZERO).unwrap();
        assert!(fragments.is_empty());
        assert_eq!(ledger.remaining_quantity(), dec!(20));
        assert_eq!(ledger.lots().count(), 1);
    }

    #[test]
    fn test_oversell_consumes_everything_and_fails() {
        let mut ledger = ledger_with(&[
            (at(2020, 1, 1), dec!(20), dec!(10)),
            (at(2020, 2, 1), dec!(10), dec!(12)),
        ]);

        let result = ledger.sell(dec!(-45));
        assert_eq!(
            result,
            Err(LedgerError::InsufficientLots {
                requested: dec!(45),
                available: dec!(30),
            })
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_positive_sell_is_rejected() {
        let mut ledger = ledger_with(&[(at(2020, 1, 1), dec!(20), dec!(10))]);
        assert_eq!(ledger.sell(dec!(5)), Err(LedgerError::NotASale(dec!(5))));
        assert_eq!(ledger.remaining_quantity(), dec!(20));
    }

    #[test]
    fn test_trade_asset_sorts_before_matching() {
        let trades = vec![
            trade(at(2021, 6, 1), dec!(-15), dec!(20), dec!(-1)),
            trade(at(2021, 2, 1), dec!(10), dec!(12), dec!(-1)),
            trade(at(2021, 1, 1), dec!(10), dec!(10), dec!(-1)),
        ];

        let traded = trade_asset(&trades).unwrap();
        assert_eq!(traded.first_trade, Some(at(2021, 1, 1)));
        assert_eq!(traded.sales.len(), 1);

        let sale = &traded.sales[0];
        assert_eq!(sale.quantity(), dec!(15));
        assert_eq!(sale.basis[0].price, dec!(10));
        assert_eq!(sale.basis[1].price, dec!(12));
        assert_eq!(traded.ledger.remaining_quantity(), dec!(5));
        assert_eq!(traded.fees.len(), 3);
    }

    #[test]
    fn test_trade_asset_skips_zero_fees_and_zero_quantities() {
        let trades = vec![
            trade(at(2021, 1, 1), dec!(10), dec!(10), Decimal::ZERO),
            trade(at(2021, 2, 1), Decimal::ZERO, dec!(10), dec!(-2)),
            trade(at(2021, 3, 1), dec!(-5), dec!(11), Decimal::ZERO),
        ];

        let traded = trade_asset(&trades).unwrap();
        assert_eq!(traded.fees, vec![CashEvent::new("USD", dec!(-2), 2021)]);
        assert_eq!(traded.sales.len(), 1);
        assert_eq!(traded.ledger.remaining_quantity(), dec!(5));
    }

    #[test]
    fn test_trade_asset_surfaces_missing_history() {
        let trades = vec![
            trade(at(2021, 1, 1), dec!(5), dec!(10), Decimal::ZERO),
            trade(at(2021, 3, 1), dec!(-8), dec!(11), Decimal::ZERO),
        ];

        let err = trade_asset(&trades).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientLots { .. }));
    }

    #[test]
    fn test_holdings_are_valued_at_purchase_year() {
        let ledger = ledger_with(&[
            (at(2023, 5, 1), dec!(2), dec!(100)),
            (at(2020, 1, 1), dec!(1), dec!(50)),
        ]);
        let rates = StaticRates::new("EUR")
            .with_rate("USD", 2020, dec!(0.8))
            .with_rate("USD", 2023, dec!(0.9));

        let holdings = ledger
            .holdings(&TaxPolicy::default(), &rates, at(2024, 1, 1))
            .unwrap();

        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].purchased, at(2020, 1, 1));
        assert_eq!(holdings[0].cost, dec!(40));
        assert_eq!(holdings[0].taxable_until, None);
        assert_eq!(holdings[1].cost, dec!(180));
        assert_eq!(holdings[1].taxable_until, Some(at(2025, 5, 1)));
    }
}
