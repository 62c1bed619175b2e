//! # Exchange-Rate Math
//!
//! Amount/share conversions for exchange-rate pools. A pool never stores
//! per-account values; it stores shares, and the value of a share moves as
//! interest and fees accrue to the pool. Every conversion takes an explicit
//! rounding direction so each call site states which side the dust favors.

use crate::constants::PRECISION;
use crate::errors::{CoreResult, UmbraCoreError};

/// Rounding mode for division operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Serialize, serde::Deserialize))]
pub enum Rounding {
    /// Round down (towards zero)
    Down,
    /// Round up (away from zero)
    Up,
}

/// Multiply two u64 values and divide by a third with specified rounding
pub fn mul_div_u64(a: u64, b: u64, denominator: u64, rounding: Rounding) -> CoreResult<u64> {
    if denominator == 0 {
        return Err(UmbraCoreError::DivisionByZero);
    }

    let product = (a as u128) * (b as u128);
    let quotient = product / (denominator as u128);
    let remainder = product % (denominator as u128);

    let mut result = quotient;
    if rounding == Rounding::Up && remainder > 0 {
        result = result
            .checked_add(1)
            .ok_or(UmbraCoreError::MulDivOverflow)?;
    }

    result
        .try_into()
        .map_err(|_| UmbraCoreError::MulDivOverflow)
}

/// Shares corresponding to `amount` in a pool holding `total_value` against
/// `share_supply` outstanding shares.
///
/// An empty supply converts 1:1 (first deposit defines the rate). Pool
/// mutations pick the rounding that favors the pool: mint rounds down, burn
/// for a requested amount rounds up.
pub fn shares_for_amount(
    amount: u64,
    total_value: u64,
    share_supply: u64,
    rounding: Rounding,
) -> CoreResult<u64> {
    if share_supply == 0 {
        return Ok(amount);
    }
    mul_div_u64(amount, share_supply, total_value, rounding)
}

/// Value of `share` shares at the pool's current exchange rate
pub fn amount_for_shares(
    share: u64,
    total_value: u64,
    share_supply: u64,
    rounding: Rounding,
) -> CoreResult<u64> {
    if share_supply == 0 {
        return Ok(0);
    }
    mul_div_u64(share, total_value, share_supply, rounding)
}

/// Fee on `amount` at a `PRECISION`-scaled `rate`, always rounded up
pub fn ceil_fee(amount: u64, rate: u64) -> CoreResult<u64> {
    mul_div_u64(amount, rate, PRECISION, Rounding::Up)
}
