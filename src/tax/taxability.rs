use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime};
use serde::Deserialize;

/// How a sale falling exactly on the taxable deadline is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// A sale at the deadline is still taxable (not taxable only strictly after it)
    #[default]
    Inclusive,
    /// Only sales strictly before the deadline are taxable
    Exclusive,
}

/// Capital gains holding-period rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxPolicy {
    /// Purchases before this date are outside the regime and never taxable
    pub regime_start: NaiveDate,
    /// Holding period after which a gain is exempt
    pub holding_months: u32,
    pub boundary: Boundary,
}

impl Default for TaxPolicy {
    fn default() -> Self {
        Self {
            regime_start: NaiveDate::from_ymd_opt(2016, 1, 1).unwrap_or_default(),
            holding_months: 24,
            boundary: Boundary::Inclusive,
        }
    }
}

impl TaxPolicy {
    fn regime_start(&self) -> NaiveDateTime {
        self.regime_start.and_hms_opt(0, 0, 0).unwrap_or_default()
    }

    /// Date after which a gain on a lot bought at `purchased` is no longer taxable.
    ///
    /// Purchases made before the regime start get the purchase time itself,
    /// i.e. a deadline that has already passed.
    ///
    /// A day missing from the target month rolls over into the next one, so
    /// a purchase on Feb 29 has its deadline on Mar 1.
    pub fn taxable_deadline(&self, purchased: NaiveDateTime) -> NaiveDateTime {
        if purchased < self.regime_start() {
            return purchased;
        }
        let date = purchased.date();
        date.with_day(1)
            .and_then(|first| first.checked_add_months(Months::new(self.holding_months)))
            .and_then(|first| first.checked_add_days(Days::new(u64::from(date.day0()))))
            .map(|deadline| deadline.and_time(purchased.time()))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Whether selling a lot bought at `purchased` on `sold` yields a taxable gain
    pub fn is_taxable(&self, purchased: NaiveDateTime, sold: NaiveDateTime) -> bool {
        if purchased < self.regime_start() {
            return false;
        }
        let deadline = self.taxable_deadline(purchased);
        match self.boundary {
            Boundary::Inclusive => sold <= deadline,
            Boundary::Exclusive => sold < deadline,
        }
    }

    /// Deadline for an open lot, or None when it has already elapsed at `now`
    pub fn taxable_until(
        &self,
        purchased: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        let deadline = self.taxable_deadline(purchased);
        (deadline >= now && purchased >= self.regime_start()).then_some(deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_deadline_is_two_years_after_purchase() {
        let policy = TaxPolicy::default();
        assert_eq!(policy.taxable_deadline(at(2020, 1, 1)), at(2022, 1, 1));
        assert_eq!(policy.taxable_deadline(at(2016, 1, 2)), at(2018, 1, 2));
    }

    #[test]
    fn test_purchase_before_regime_is_never_taxable() {
        let policy = TaxPolicy::default();
        let purchased = at(2015, 12, 31);
        assert_eq!(policy.taxable_deadline(purchased), purchased);
        assert!(!policy.is_taxable(purchased, purchased));
        assert!(!policy.is_taxable(purchased, at(2016, 1, 1)));
        assert!(!policy.is_taxable(purchased, at(2017, 6, 1)));
    }

    #[test]
    fn test_boundary_around_deadline() {
        let policy = TaxPolicy::default();
        let purchased = at(2016, 1, 2);

        assert!(policy.is_taxable(purchased, at(2018, 1, 1)));
        assert!(!policy.is_taxable(purchased, at(2018, 1, 3)));
    }

    #[test]
    fn test_boundary_policy_at_exact_deadline() {
        let purchased = at(2020, 3, 15);
        let deadline = at(2022, 3, 15);

        let inclusive = TaxPolicy::default();
        assert!(inclusive.is_taxable(purchased, deadline));

        let exclusive = TaxPolicy {
            boundary: Boundary::Exclusive,
            ..TaxPolicy::default()
        };
        assert!(!exclusive.is_taxable(purchased, deadline));
    }

    #[test]
    fn test_leap_day_purchase_rolls_into_march() {
        let policy = TaxPolicy::default();
        let purchased = at(2020, 2, 29);
        assert_eq!(policy.taxable_deadline(purchased), at(2022, 3, 1));

        assert!(policy.is_taxable(purchased, at(2022, 2, 28)));
        assert!(policy.is_taxable(purchased, at(2022, 3, 1)));
        assert!(!policy.is_taxable(purchased, at(2022, 3, 2)));
    }

    #[test]
    fn test_month_end_overflow_keeps_time_of_day() {
        let policy = TaxPolicy {
            holding_months: 1,
            ..TaxPolicy::default()
        };
        let purchased = NaiveDate::from_ymd_opt(2023, 1, 31)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap();
        let expected = NaiveDate::from_ymd_opt(2023, 3, 3)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap();
        assert_eq!(policy.taxable_deadline(purchased), expected);
    }

    #[test]
    fn test_taxable_until_hides_elapsed_deadlines() {
        let policy = TaxPolicy::default();
        let now = at(2024, 6, 1);

        assert_eq!(policy.taxable_until(at(2023, 1, 1), now), Some(at(2025, 1, 1)));
        assert_eq!(policy.taxable_until(at(2021, 1, 1), now), None);
        assert_eq!(policy.taxable_until(at(2015, 1, 1), now), None);
    }
}
