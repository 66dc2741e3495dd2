//! Croatian National Bank (HNB) exchange rate list.
//!
//! Rates are taken on December 31st of the requested year, or today for the
//! current year. The reporting currency is HRK up to 2022 and EUR from 2023.

use chrono::{Datelike, Local, NaiveDate};
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::RateSource;
use crate::error::RateError;
use crate::importers::amounts::parse_localized_amount;

const HNB_API: &str = "https://api.hnb.hr";
/// First year reported in EUR
const EUR_ADOPTION_YEAR: i32 = 2023;

#[derive(Debug, Deserialize)]
struct HnbRate {
    valuta: String,
    srednji_tecaj: String,
    #[serde(default)]
    jedinica: Option<u32>,
}

/// Currency the tax report is expressed in for a given year
pub fn base_currency(year: i32) -> &'static str {
    if year < EUR_ADOPTION_YEAR {
        "HRK"
    } else {
        "EUR"
    }
}

pub struct HnbSource {
    client: Client,
    retries: u32,
    today: NaiveDate,
}

impl HnbSource {
    pub fn new(retries: u32) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            retries: retries.max(1),
            today: Local::now().date_naive(),
        }
    }

    fn request(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client.get(url).send()?.error_for_status()?.text()
    }
}

impl RateSource for HnbSource {
    fn fetch(&self, currency: &str, year: i32) -> Result<Decimal, RateError> {
        if year <= 1900 {
            return Err(RateError::InvalidYear(year));
        }
        if currency.eq_ignore_ascii_case(base_currency(year)) {
            return Ok(Decimal::ONE);
        }

        let url = rates_url(currency, year, self.today);
        let mut last_error = String::new();
        for attempt in 1..=self.retries {
            debug!("Fetching {} rate for {} (attempt {})", currency, year, attempt);
            match self.request(&url) {
                Ok(body) => return parse_rates(&body, currency, year),
                Err(e) => {
                    warn!("HNB request failed: {}", e);
                    last_error = e.to_string();
                    if attempt < self.retries {
                        std::thread::sleep(Duration::from_secs(1));
                    }
                }
            }
        }

        Err(RateError::Fetch {
            currency: currency.to_string(),
            year,
            reason: last_error,
        })
    }
}

/// Build the rate list URL for the last day of `year`
pub fn rates_url(currency: &str, year: i32, today: NaiveDate) -> String {
    let api = if year < EUR_ADOPTION_YEAR {
        "tecajn/v2"
    } else {
        "tecajn-eur/v3"
    };
    let date = if year == today.year() {
        today
    } else {
        NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(today)
    };

    format!(
        "{}/{}?datum-primjene={}&valuta={}",
        HNB_API,
        api,
        date.format("%Y-%m-%d"),
        currency.to_uppercase()
    )
}

/// Turn an HNB response into a factor converting `currency` into the base currency.
///
/// Before EUR adoption the list quotes HRK per `jedinica` units of currency.
/// The EUR list quotes units of currency per one EUR.
pub fn parse_rates(body: &str, currency: &str, year: i32) -> Result<Decimal, RateError> {
    let fetch_error = |reason: String| RateError::Fetch {
        currency: currency.to_string(),
        year,
        reason,
    };

    let rates: Vec<HnbRate> =
        serde_json::from_str(body).map_err(|e| fetch_error(format!("invalid response: {}", e)))?;

    let entry = rates
        .iter()
        .find(|r| r.valuta.eq_ignore_ascii_case(currency))
        .ok_or_else(|| RateError::Missing {
            currency: currency.to_string(),
            year,
        })?;

    let quoted = parse_localized_amount(&entry.srednji_tecaj)
        .map_err(|e| fetch_error(e.to_string()))?;
    if quoted.is_zero() {
        return Err(fetch_error("zero rate quoted".to_string()));
    }

    if year < EUR_ADOPTION_YEAR {
        let units = Decimal::from(entry.jedinica.unwrap_or(1).max(1));
        Ok(quoted / units)
    } else {
        Ok(Decimal::ONE / quoted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn test_rates_url_per_era() {
        assert_eq!(
            rates_url("usd", 2021, today()),
            "https://api.hnb.hr/tecajn/v2?datum-primjene=2021-12-31&valuta=USD"
        );
        assert_eq!(
            rates_url("USD", 2023, today()),
            "https://api.hnb.hr/tecajn-eur/v3?datum-primjene=2023-12-31&valuta=USD"
        );
        assert_eq!(
            rates_url("USD", 2024, today()),
            "https://api.hnb.hr/tecajn-eur/v3?datum-primjene=2024-05-10&valuta=USD"
        );
    }

    #[test]
    fn test_parse_hrk_rates_per_unit() {
        let body = r#"[
            {"valuta":"USD","srednji_tecaj":"6,643548","jedinica":1},
            {"valuta":"JPY","srednji_tecaj":"5,770000","jedinica":100}
        ]"#;
        assert_eq!(parse_rates(body, "USD", 2021).unwrap(), dec!(6.643548));
        assert_eq!(parse_rates(body, "JPY", 2021).unwrap(), dec!(0.0577));
    }

    #[test]
    fn test_parse_eur_rates_are_inverted() {
        let body = r#"[{"valuta":"USD","srednji_tecaj":"1,250000"}]"#;
        assert_eq!(parse_rates(body, "USD", 2023).unwrap(), dec!(0.8));
    }

    #[test]
    fn test_parse_missing_currency() {
        let body = r#"[{"valuta":"GBP","srednji_tecaj":"0,86"}]"#;
        assert!(matches!(
            parse_rates(body, "USD", 2023),
            Err(RateError::Missing { .. })
        ));
        assert!(matches!(
            parse_rates("not json", "USD", 2023),
            Err(RateError::Fetch { .. })
        ));
    }

    #[test]
    fn test_base_currency_switch() {
        assert_eq!(base_currency(2022), "HRK");
        assert_eq!(base_currency(2023), "EUR");
    }
}
