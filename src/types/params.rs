//! # Risk Parameters
//!
//! Per-market LTV/LT pairs plus the shadow-side pair shared by every market.
//! All values are `PRECISION`-scaled fractions; validation runs at
//! registration regardless of where the numbers came from.

use crate::constants::{MAX_LT, MAX_LTV};
use crate::errors::{CoreResult, UmbraCoreError};
use crate::types::ids::MarketId;

#[cfg(feature = "client")]
use serde::{Deserialize, Serialize};

/// Immutable risk limits of one collateral class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub struct MarketParams {
    /// Fraction of deposited value immediately borrowable
    pub ltv: u64,
    /// Fraction of deposited value at which the position becomes liquidatable
    pub lt: u64,
}

impl MarketParams {
    pub const fn new(ltv: u64, lt: u64) -> Self {
        Self { ltv, lt }
    }

    /// Requires 0 < LTV <= LT <= 100%
    pub fn validate(&self) -> CoreResult<()> {
        if self.ltv == 0 || self.ltv > self.lt || self.ltv > MAX_LTV || self.lt > MAX_LT {
            return Err(UmbraCoreError::InvalidRiskParams);
        }
        Ok(())
    }
}

/// Risk limits for every listed market plus the shadow side.
///
/// Markets are kept in registration order; the set is small enough that
/// linear lookup beats carrying a map, and the order is what the rebalancer's
/// greedy allocation iterates.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub struct RiskConfig {
    shadow: MarketParams,
    markets: Vec<(MarketId, MarketParams)>,
}

impl RiskConfig {
    pub fn new(shadow: MarketParams) -> CoreResult<Self> {
        shadow.validate()?;
        Ok(Self {
            shadow,
            markets: Vec::new(),
        })
    }

    /// Build a config from (market, params) entries in listing order
    pub fn from_entries(
        shadow: MarketParams,
        entries: impl IntoIterator<Item = (MarketId, MarketParams)>,
    ) -> CoreResult<Self> {
        let mut config = Self::new(shadow)?;
        for (market, params) in entries {
            config.insert_market(market, params)?;
        }
        Ok(config)
    }

    /// Register risk limits for a market; re-listing is rejected
    pub fn insert_market(&mut self, market: MarketId, params: MarketParams) -> CoreResult<()> {
        params.validate()?;
        if self.markets.iter().any(|(m, _)| *m == market) {
            return Err(UmbraCoreError::DuplicateMarket);
        }
        self.markets.push((market, params));
        Ok(())
    }

    pub fn params(&self, market: MarketId) -> CoreResult<&MarketParams> {
        self.markets
            .iter()
            .find(|(m, _)| *m == market)
            .map(|(_, p)| p)
            .ok_or(UmbraCoreError::InvalidMarket)
    }

    pub fn ltv(&self, market: MarketId) -> CoreResult<u64> {
        Ok(self.params(market)?.ltv)
    }

    pub fn lt(&self, market: MarketId) -> CoreResult<u64> {
        Ok(self.params(market)?.lt)
    }

    pub fn ltv_shadow(&self) -> u64 {
        self.shadow.ltv
    }

    pub fn lt_shadow(&self) -> u64 {
        self.shadow.lt
    }

    /// Listed markets in registration order
    pub fn listed_markets(&self) -> impl Iterator<Item = MarketId> + '_ {
        self.markets.iter().map(|(m, _)| *m)
    }
}
