//! # Position Types
//!
//! Every account holds up to two positions per market, one per domain. The
//! domains mirror each other: what one side deposits as collateral, the other
//! side borrows.

#[cfg(feature = "client")]
use serde::{Deserialize, Serialize};

/// The two mirrored collateral/debt domains of a market.
///
/// `AssetToShadow` posts the market's asset as collateral and borrows shadow;
/// `ShadowToAsset` posts shadow as collateral and borrows the market's asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub enum PositionDomain {
    AssetToShadow,
    ShadowToAsset,
}

impl PositionDomain {
    /// The domain on the other side of the same market
    pub fn opposite(&self) -> Self {
        match self {
            PositionDomain::AssetToShadow => PositionDomain::ShadowToAsset,
            PositionDomain::ShadowToAsset => PositionDomain::AssetToShadow,
        }
    }
}

/// Deposit class within a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub enum DepositMode {
    /// Earns interest and backs pool lending
    Normal,
    /// Pure collateral: never lent out, exchange rate pinned at 1:1
    CollateralOnly,
}

impl DepositMode {
    pub fn is_collateral_only(&self) -> bool {
        matches!(self, DepositMode::CollateralOnly)
    }
}

/// How much of a deposit position to withdraw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub enum WithdrawKind {
    /// Withdraw exactly this amount, burning shares rounded up
    Amount(u64),
    /// Burn the full share balance, paying its value rounded down
    All,
}

/// Share balances of one account in one market and domain.
///
/// Positions are created lazily on first deposit or borrow and persist at
/// zero; all balances are shares of the owning pool, never raw amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(Serialize, Deserialize))]
pub struct Position {
    pub normal_deposit_share: u64,
    pub collateral_only_deposit_share: u64,
    pub borrowed_share: u64,
}

impl Position {
    /// Deposit share balance for the given mode
    pub fn deposited_share(&self, mode: DepositMode) -> u64 {
        match mode {
            DepositMode::Normal => self.normal_deposit_share,
            DepositMode::CollateralOnly => self.collateral_only_deposit_share,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normal_deposit_share == 0
            && self.collateral_only_deposit_share == 0
            && self.borrowed_share == 0
    }
}
