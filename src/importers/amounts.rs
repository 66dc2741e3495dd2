//! Field parsing helpers shared by the statement readers

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::ImportError;

// Spaces, currency symbols and ISO currency codes around a number
static DECORATION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\s+|[$€£¥]|\b[A-Z]{3}\b").ok());

/// Drop decoration, leaving digits, separators and the sign.
/// Anything else makes the field invalid.
fn numeric_chars(s: &str) -> Result<String, ImportError> {
    let stripped: String = match DECORATION.as_ref() {
        Some(re) => re.replace_all(s, "").into_owned(),
        None => s.chars().filter(|c| !c.is_whitespace()).collect(),
    };
    if stripped
        .chars()
        .all(|c| c.is_ascii_digit() || ".,-".contains(c))
    {
        Ok(stripped)
    } else {
        Err(ImportError::InvalidAmount(s.to_string()))
    }
}

/// Parse a statement amount: `,` groups thousands, `.` is the decimal point.
///
/// Empty fields are zero.
pub fn parse_amount(s: &str) -> Result<Decimal, ImportError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let cleaned = numeric_chars(trimmed)?.replace(',', "");
    Decimal::from_str(&cleaned).map_err(|_| ImportError::InvalidAmount(s.to_string()))
}

/// Parse an amount where the last `.` or `,` is the decimal separator and any
/// earlier one groups thousands, e.g. `1.234,56` or `6,643548`.
pub fn parse_localized_amount(s: &str) -> Result<Decimal, ImportError> {
    let cleaned = numeric_chars(s.trim())?;
    if cleaned.is_empty() {
        return Err(ImportError::InvalidAmount(s.to_string()));
    }

    let normalized = match cleaned.rfind(['.', ',']) {
        Some(idx) => {
            let (int_part, frac_part) = cleaned.split_at(idx);
            let int_part: String = int_part.chars().filter(|c| *c != '.' && *c != ',').collect();
            format!("{}.{}", int_part, &frac_part[1..])
        }
        None => cleaned,
    };

    Decimal::from_str(&normalized).map_err(|_| ImportError::InvalidAmount(s.to_string()))
}

/// Parse a statement timestamp such as `2023-06-01, 10:15:00`
pub fn parse_statement_time(s: &str) -> Result<NaiveDateTime, ImportError> {
    let joined = s.replace(',', "");
    NaiveDateTime::parse_from_str(joined.trim(), "%Y-%m-%d %H:%M:%S")
        .map_err(|_| ImportError::InvalidTime(s.to_string()))
}

/// Year from a `YYYY-MM-DD` date field
pub fn year_from_date(s: &str) -> Option<i32> {
    s.trim().get(..4)?.parse().ok()
}

/// Normalise a security id into an 11 character ISIN without check digit.
///
/// 9-10 character ids are US CUSIP-style ids and get the `US` prefix.
pub fn format_isin(security_id: &str) -> String {
    let id = security_id.trim();
    match id.len() {
        9 | 10 => format!("US{}", id),
        12 => id.get(..11).unwrap_or(id).to_string(),
        _ => id.to_string(),
    }
}

/// Symbol from a dividend description such as `AAPL(US0378331005) Cash Dividend`
pub fn symbol_from_description(description: &str) -> Option<String> {
    let idx = description.find('(')?;
    let symbol: String = description[..idx].chars().filter(|c| !c.is_whitespace()).collect();
    (!symbol.is_empty()).then_some(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,250.50").unwrap(), dec!(1250.50));
        assert_eq!(parse_amount("-10").unwrap(), dec!(-10));
        assert_eq!(parse_amount(" -0.35 ").unwrap(), dec!(-0.35));
        assert_eq!(parse_amount("").unwrap(), Decimal::ZERO);
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_parse_amount_strips_currency_decoration() {
        assert_eq!(parse_amount("USD 1,250.50").unwrap(), dec!(1250.50));
        assert_eq!(parse_amount("$12.5").unwrap(), dec!(12.5));
        assert_eq!(parse_amount("-€ 3").unwrap(), dec!(-3));
    }

    #[test]
    fn test_parse_amount_rejects_garbage_inside_numbers() {
        assert_eq!(
            parse_amount("12abc34"),
            Err(ImportError::InvalidAmount("12abc34".to_string()))
        );
        assert!(parse_amount("1e3").is_err());
        assert!(parse_amount("12ABC34").is_err());
        assert!(parse_amount("1_000").is_err());
        assert!(parse_localized_amount("7,06x4").is_err());
    }

    #[test]
    fn test_parse_localized_amount() {
        assert_eq!(parse_localized_amount("6,643548").unwrap(), dec!(6.643548));
        assert_eq!(parse_localized_amount("1.234,56").unwrap(), dec!(1234.56));
        assert_eq!(parse_localized_amount("1,234.56").unwrap(), dec!(1234.56));
        assert_eq!(parse_localized_amount("-7").unwrap(), dec!(-7));
        assert_eq!(parse_localized_amount("1 234,56 HRK").unwrap(), dec!(1234.56));
        assert!(parse_localized_amount("").is_err());
    }

    #[test]
    fn test_parse_statement_time() {
        let expected = NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap();
        assert_eq!(parse_statement_time("2023-06-01, 10:15:00").unwrap(), expected);
        assert!(parse_statement_time("01/06/2023").is_err());
    }

    #[test]
    fn test_format_isin() {
        assert_eq!(format_isin("037833100"), "US037833100");
        assert_eq!(format_isin("IE00B3RBWM25"), "IE00B3RBWM2");
        assert_eq!(format_isin("IE00B3RBWM2"), "IE00B3RBWM2");
        assert_eq!(format_isin(""), "");
    }

    #[test]
    fn test_symbol_from_description() {
        assert_eq!(
            symbol_from_description("VWRL(IE00B3RBWM25) Cash Dividend USD 0.5"),
            Some("VWRL".to_string())
        );
        assert_eq!(symbol_from_description("Cash Dividend"), None);
        assert_eq!(symbol_from_description(" (X)"), None);
    }

    #[test]
    fn test_year_from_date() {
        assert_eq!(year_from_date("2023-04-05"), Some(2023));
        assert_eq!(year_from_date("20"), None);
    }
}
