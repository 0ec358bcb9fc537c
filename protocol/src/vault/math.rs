//! Full-width `floor(a * b / c)`.
//!
//! Share conversions multiply two 18-decimal quantities, which overflows
//! `u128` long before balances get interesting (100 tokens × 100 tokens is
//! already 10^40). The product of two `u128`s always fits a [`U256`], so it
//! is formed there and divided back down; only a quotient that itself
//! exceeds `u128` is reported as overflow.

use primitive_types::U256;

use crate::types::Amount;

/// Returns `floor(a * b / c)`, or `None` if `c == 0` or the quotient does not
/// fit in 128 bits.
pub fn mul_div_floor(a: Amount, b: Amount, c: Amount) -> Option<Amount> {
    if c == 0 {
        return None;
    }
    let product = U256::from(a).checked_mul(U256::from(b))?;
    Amount::try_from(product / U256::from(c)).ok()
}
