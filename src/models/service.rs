//! Service model
//!
//! Prices are exact decimals with two places. They are stored as integer
//! minor units (kopecks) so that both database drivers handle them the same.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Largest accepted price: 10 digits with 2 decimal places
const MAX_PRICE_CENTS: i64 = 9_999_999_999;

/// A service offered by the barbershop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub duration_minutes: i64,
    pub is_popular: bool,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validated service fields for create and update
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInput {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub duration_minutes: i64,
    pub is_popular: bool,
    pub image: Option<String>,
}

/// Price parsing failure, worded for form error output
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    #[error("Введите корректную стоимость (например: 1500.00)")]
    Invalid,
    #[error("Стоимость не может быть отрицательной")]
    Negative,
    #[error("Стоимость не может содержать более 2 знаков после запятой")]
    TooManyDecimals,
    #[error("Стоимость не может содержать более 10 цифр")]
    TooManyDigits,
}

/// Parse a user-entered price. A comma is accepted as the decimal separator.
pub fn parse_price(raw: &str) -> Result<Decimal, PriceError> {
    let normalized = raw.trim().replace(' ', "").replace(',', ".");
    let price = Decimal::from_str(&normalized).map_err(|_| PriceError::Invalid)?;

    if price.is_sign_negative() && !price.is_zero() {
        return Err(PriceError::Negative);
    }
    if price.scale() > 2 {
        return Err(PriceError::TooManyDecimals);
    }
    match price_to_cents(price) {
        Some(cents) if cents <= MAX_PRICE_CENTS => Ok(price),
        _ => Err(PriceError::TooManyDigits),
    }
}

/// Convert a price to integer minor units
pub fn price_to_cents(price: Decimal) -> Option<i64> {
    (price.round_dp(2) * Decimal::from(100)).to_i64()
}

/// Convert stored minor units back to a price
pub fn price_from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_price_accepts_common_inputs() {
        assert_eq!(parse_price("1500").unwrap(), Decimal::new(1500, 0));
        assert_eq!(parse_price("1500.50").unwrap(), Decimal::new(150050, 2));
        assert_eq!(parse_price(" 1 500,5 ").unwrap(), Decimal::new(15005, 1));
    }

    #[test]
    fn test_parse_price_rejects_bad_inputs() {
        assert_eq!(parse_price("abc"), Err(PriceError::Invalid));
        assert_eq!(parse_price(""), Err(PriceError::Invalid));
        assert_eq!(parse_price("-10"), Err(PriceError::Negative));
        assert_eq!(parse_price("10.005"), Err(PriceError::TooManyDecimals));
        assert_eq!(parse_price("100000000"), Err(PriceError::TooManyDigits));
        assert!(parse_price("99999999.99").is_ok());
    }

    #[test]
    fn test_cents_conversion() {
        assert_eq!(price_to_cents(Decimal::new(150050, 2)), Some(150050));
        assert_eq!(price_from_cents(150050), Decimal::new(150050, 2));
    }

    proptest! {
        #[test]
        fn stored_cents_survive_conversion(cents in 0i64..MAX_PRICE_CENTS) {
            prop_assert_eq!(price_to_cents(price_from_cents(cents)), Some(cents));
        }
    }
}
