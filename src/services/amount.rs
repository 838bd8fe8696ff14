//! Exact conversion between raw on-chain integers and decimal display values.
//!
//! The display string is built with integer/string arithmetic only, so it is
//! exact for every `U256`. The `Decimal` approximations are bounded by
//! `rust_decimal`: at most 28 significant digits and an absolute value of at
//! most 79 228 162 514 264 337 593 543 950 335. Fractional digits past that
//! precision are rounded; values past that range, and non-zero values that
//! would round to zero, yield `None`.

use crate::models::BalanceItem;
use ethers::types::U256;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Renders `raw / 10^decimals` without trailing zeros or a bare decimal point.
pub fn format_units(raw: U256, decimals: u32) -> String {
    if raw.is_zero() {
        return "0".to_string();
    }

    let digits = raw.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals + 1 - digits.len()), digits)
    } else {
        digits
    };
    let split = padded.len() - decimals;
    let (integer, fraction) = padded.split_at(split);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{}.{}", integer, fraction)
    }
}

/// Bounded-precision view of a decimal string; `None` when out of range.
pub fn approximate(value: &str) -> Option<Decimal> {
    let approx = Decimal::from_str(value).ok()?;
    let non_zero = value.bytes().any(|b| matches!(b, b'1'..=b'9'));
    if approx.is_zero() && non_zero {
        return None;
    }
    Some(approx)
}

/// Builds the balance block of a response.
pub fn format_balance(raw: U256, decimals: u32) -> BalanceItem {
    if raw.is_zero() {
        return BalanceItem {
            wei_string: "0".to_string(),
            wei_decimal: Some(Decimal::ZERO),
            pow_string: "0".to_string(),
            pow_decimal: Some(Decimal::ZERO),
        };
    }

    let wei_string = raw.to_string();
    let pow_string = format_units(raw, decimals);

    BalanceItem {
        wei_decimal: approximate(&wei_string),
        pow_decimal: approximate(&pow_string),
        wei_string,
        pow_string,
    }
}
