use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

const MAX_SCALE: u32 = 28;

/// Parses a plain or scientific decimal literal, ignoring surrounding whitespace.
pub fn parse_decimal(value: &str) -> Option<Decimal> {
    let value = value.trim();
    if !is_decimal_literal(value) {
        return None;
    }
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
}

/// `[+-]digits[.digits][(e|E)[+-]digits]`, with at least one mantissa digit.
fn is_decimal_literal(value: &str) -> bool {
    let (mantissa, exponent) = match value.find(|c: char| c == 'e' || c == 'E') {
        Some(i) => (&value[..i], Some(&value[i + 1..])),
        None => (value, None),
    };

    let mantissa = mantissa.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(mantissa);
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if int.len() + frac.len() == 0 || !digits(int) || !digits(frac) {
        return false;
    }

    match exponent {
        Some(exponent) => {
            let exponent = exponent.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(exponent);
            !exponent.is_empty() && digits(exponent)
        }
        None => true,
    }
}

/// `a + b`, `None` when the sum overflows or had to be rounded.
pub fn exact_add(a: Decimal, b: Decimal) -> Option<Decimal> {
    let sum = a.checked_add(b)?;
    (sum.is_zero() || sum.scale() == a.scale().max(b.scale())).then_some(sum)
}

/// `a - b`, `None` when the difference overflows or had to be rounded.
pub fn exact_sub(a: Decimal, b: Decimal) -> Option<Decimal> {
    exact_add(a, -b)
}

/// `a * b`, `None` when the product overflows or needs more than 28 decimal places.
pub fn exact_mul(a: Decimal, b: Decimal) -> Option<Decimal> {
    if a.scale() + b.scale() > MAX_SCALE {
        return None;
    }
    let product = a.checked_mul(b)?;
    (product.is_zero() || product.scale() == a.scale() + b.scale()).then_some(product)
}

/// Reads a decimal out of a JSON number or string. Other JSON types yield `None`.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => parse_decimal(&number.to_string()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// A JSON value counts as blank when it is null or an empty/whitespace string.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
