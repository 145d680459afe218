//! Custom Tera filters

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tera::{Result, Value};

use crate::models::rating_stars;

/// Register every custom filter on a Tera instance
pub fn register(tera: &mut tera::Tera) {
    tera.register_filter("format_price", format_price);
    tera.register_filter("stars", stars);
    tera.register_filter("to_range", to_range);
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        _ => None,
    }
}

/// Group digits of a whole number in threes with spaces
pub fn group_thousands(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    if amount < 0 {
        grouped.insert(0, '-');
    }
    grouped
}

/// `{{ service.price | format_price }}` → `1 500 ₽`
///
/// Rounds to whole rubles. Values that are not numbers pass through.
pub fn format_price(value: &Value, args: &HashMap<String, Value>) -> Result<Value> {
    let currency = args.get("currency").and_then(Value::as_str).unwrap_or("₽");
    let Some(amount) = as_decimal(value).and_then(|d| d.round().to_i64()) else {
        return Ok(value.clone());
    };
    Ok(Value::String(format!("{} {}", group_thousands(amount), currency)))
}

/// `{{ master.avg_rating | stars }}` → star string for the rating
pub fn stars(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let rating = as_decimal(value).and_then(|d| d.to_f64()).unwrap_or(0.0);
    Ok(Value::String(rating_stars(rating).to_string()))
}

/// `{% for i in review.rating | to_range %}` → `[0, 1, ..]`
pub fn to_range(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let count = as_decimal(value).and_then(|d| d.trunc().to_i64()).unwrap_or(0).max(0);
    Ok(Value::Array((0..count).map(Value::from).collect()))
}
