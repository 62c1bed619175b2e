//! # Rebalance Plans
//!
//! The planner's output: four shadow-denominated operation lists in schedule
//! order plus the strategy that produced them. Plans are inert data; applying
//! one is the executor's job, and an applied plan is reported back to the
//! caller inside the outcome structs.

use crate::types::MarketId;

#[cfg(feature = "client")]
use serde::{Deserialize, Serialize};

/// One scheduled movement of shadow value against a market's pools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub struct PlannedOp {
    pub market: MarketId,
    pub amount: u64,
}

impl PlannedOp {
    pub const fn new(market: MarketId, amount: u64) -> Self {
        Self { market, amount }
    }
}

/// Which path the optimizer took for a borrow request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub enum RebalanceStrategy {
    /// The direct borrow was already within limits; nothing scheduled
    DirectBorrow,
    /// Spare collateral covered the shortfall; deposits/withdrawals only
    PureRebalance,
    /// Borrowed against other collateral, then rebalanced every market
    EscalatedFull,
    /// Borrowed against other collateral, deposited into the requested
    /// market only
    EscalatedTarget,
}

/// Scheduled operations of one borrow-with-rebalance call.
///
/// Execution order is fixed: borrows, withdrawals, repayments, deposits.
/// The first two feed the caller's released balance, the last two spend it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub struct RebalancePlan {
    pub strategy: RebalanceStrategy,
    /// Shadow borrows against asset collateral (AssetToShadow debt)
    pub borrows: Vec<PlannedOp>,
    /// Shadow collateral withdrawals (ShadowToAsset side)
    pub withdrawals: Vec<PlannedOp>,
    /// Shadow debt repayments (AssetToShadow side)
    pub repayments: Vec<PlannedOp>,
    /// Shadow collateral deposits (ShadowToAsset side)
    pub deposits: Vec<PlannedOp>,
}

impl RebalancePlan {
    pub fn new(strategy: RebalanceStrategy) -> Self {
        Self {
            strategy,
            borrows: Vec::new(),
            withdrawals: Vec::new(),
            repayments: Vec::new(),
            deposits: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.borrows.is_empty()
            && self.withdrawals.is_empty()
            && self.repayments.is_empty()
            && self.deposits.is_empty()
    }

    pub fn borrows_total(&self) -> u128 {
        Self::total(&self.borrows)
    }

    pub fn withdrawals_total(&self) -> u128 {
        Self::total(&self.withdrawals)
    }

    pub fn repayments_total(&self) -> u128 {
        Self::total(&self.repayments)
    }

    pub fn deposits_total(&self) -> u128 {
        Self::total(&self.deposits)
    }

    fn total(ops: &[PlannedOp]) -> u128 {
        ops.iter().map(|op| op.amount as u128).sum()
    }
}

/// Result of a borrow-with-rebalance call
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub struct RebalanceOutcome {
    pub strategy: RebalanceStrategy,
    /// Asset amount of the requested market handed to the caller
    pub borrowed: u64,
    /// Shadow left over from the released balance after all scheduled
    /// repayments and deposits, returned to the caller
    pub residual_shadow: u64,
    /// The plan as executed
    pub plan: RebalancePlan,
}

/// Result of an aggregate shadow repay
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub struct RepayOutcome {
    /// Shadow actually taken from the caller
    pub repaid: u64,
    /// Portion of the requested amount not consumed
    pub residual: u64,
    /// Per-market amounts repaid, in position order
    pub per_market: Vec<(MarketId, u64)>,
}
