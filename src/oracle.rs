//! # Value Normalization
//!
//! Converts market-asset amounts to a common volume and back. Shadow is the
//! protocol's unit of account, so shadow amounts already are volumes; only
//! asset legs go through the oracle. Price sourcing is the host's problem,
//! which is why this is the crate's one trait seam.

use std::collections::HashMap;

use crate::constants::PRECISION;
use crate::errors::{CoreResult, UmbraCoreError};
use crate::math::{mul_div_u64, Rounding};
use crate::types::MarketId;

/// Converts between a market's native amounts and normalized volume.
///
/// Implementations must be monotonic in both directions; the rounding
/// direction of each conversion is the implementation's to own.
pub trait ValueOracle {
    /// Normalized volume of `amount` units of the market's asset
    fn to_volume(&self, market: MarketId, amount: u64) -> CoreResult<u64>;

    /// Native amount corresponding to `volume`
    fn to_amount(&self, market: MarketId, volume: u64) -> CoreResult<u64>;
}

/// Fixed `PRECISION`-scaled price per market. Intended for hosts with their
/// own price plumbing and for tests.
#[derive(Debug, Clone, Default)]
pub struct FixedPriceOracle {
    prices: HashMap<MarketId, u64>,
}

impl FixedPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the volume value of one asset unit. A zero price is rejected: it
    /// would make `to_amount` divide by zero and collateral worthless.
    pub fn set_price(&mut self, market: MarketId, price: u64) -> CoreResult<()> {
        if price == 0 {
            return Err(UmbraCoreError::InvalidPrice);
        }
        self.prices.insert(market, price);
        Ok(())
    }

    pub fn price(&self, market: MarketId) -> CoreResult<u64> {
        self.prices
            .get(&market)
            .copied()
            .ok_or(UmbraCoreError::PriceUnavailable)
    }
}

impl ValueOracle for FixedPriceOracle {
    fn to_volume(&self, market: MarketId, amount: u64) -> CoreResult<u64> {
        let price = self.price(market)?;
        mul_div_u64(amount, price, PRECISION, Rounding::Down)
    }

    fn to_amount(&self, market: MarketId, volume: u64) -> CoreResult<u64> {
        let price = self.price(market)?;
        mul_div_u64(volume, PRECISION, price, Rounding::Down)
    }
}
