//! Currency-scale amounts
//!
//! Ledger amounts are `rust_decimal::Decimal` values held at two decimal places.
//! SQLite stores them as INTEGER cents so sums stay exact in SQL as well.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{Error, Result};

/// Number of fractional digits kept for every amount
pub const CURRENCY_SCALE: u32 = 2;

/// Round an amount to currency scale, halves away from zero
pub fn normalize(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_SCALE);
    rounded
}

/// Validate that an amount is strictly positive and return it at currency scale
pub fn require_positive(amount: Decimal) -> Result<Decimal> {
    let amount = normalize(amount);
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidData(format!(
            "Amount must be greater than zero (got {})",
            amount
        )));
    }
    to_cents(amount)?;
    Ok(amount)
}

/// Parse user input such as "12.5", "$12.50" or "1,200.00"
pub fn parse_amount(input: &str) -> Result<Decimal> {
    let cleaned: String = input
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();

    cleaned
        .parse::<Decimal>()
        .map(normalize)
        .map_err(|_| Error::InvalidData(format!("Invalid amount: {}", input)))
}

/// Convert an amount to integer cents for storage
pub fn to_cents(amount: Decimal) -> Result<i64> {
    normalize(amount)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| Error::InvalidData(format!("Amount out of range: {}", amount)))
}

/// Convert stored integer cents back to an amount
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, CURRENCY_SCALE)
}

/// Best-effort conversion of an extractor's JSON number into an amount
pub fn from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64_retain(value)
        .map(normalize)
        .filter(|amount| to_cents(*amount).is_ok())
}
