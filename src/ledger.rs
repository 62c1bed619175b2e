//! # Position Ledger
//!
//! Per-account share records, keyed by (account, market, domain). The ledger
//! never stores value amounts; a position's worth is always derived from the
//! owning pool's exchange rate at read time.
//!
//! Market order is remembered per account: the first operation touching a
//! market appends it once, and rebalancing walks markets in that order. A
//! position drained to zero keeps its slot and its place in the order.

use std::collections::HashMap;

use crate::errors::{CoreResult, UmbraCoreError};
use crate::math::{safe_add_u64, safe_sub_u64};
use crate::types::{AccountId, DepositMode, MarketId, Position, PositionDomain};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionLedger {
    positions: HashMap<(AccountId, MarketId, PositionDomain), Position>,
    /// Markets each account has touched, in first-touch order
    market_order: HashMap<AccountId, Vec<MarketId>>,
    /// Rebalance opt-out flags, independent of any position
    protected: HashMap<(AccountId, MarketId), bool>,
}

impl PositionLedger {
    // ========================================================================
    // Views
    // ========================================================================

    pub fn deposited_share(
        &self,
        domain: PositionDomain,
        market: MarketId,
        account: AccountId,
        mode: DepositMode,
    ) -> u64 {
        self.position(domain, market, account).deposited_share(mode)
    }

    pub fn borrowed_share(
        &self,
        domain: PositionDomain,
        market: MarketId,
        account: AccountId,
    ) -> u64 {
        self.position(domain, market, account).borrowed_share
    }

    pub fn is_protected(&self, market: MarketId, account: AccountId) -> bool {
        self.protected.get(&(account, market)).copied().unwrap_or(false)
    }

    pub fn position(
        &self,
        domain: PositionDomain,
        market: MarketId,
        account: AccountId,
    ) -> Position {
        self.positions
            .get(&(account, market, domain))
            .copied()
            .unwrap_or_default()
    }

    /// Markets the account has ever touched, in first-touch order
    pub fn markets_of(&self, account: AccountId) -> &[MarketId] {
        self.market_order
            .get(&account)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn add_deposited_share(
        &mut self,
        domain: PositionDomain,
        market: MarketId,
        account: AccountId,
        mode: DepositMode,
        share: u64,
    ) -> CoreResult<()> {
        self.touch(account, market);
        let position = self.entry(domain, market, account);
        match mode {
            DepositMode::Normal => {
                position.normal_deposit_share = safe_add_u64(position.normal_deposit_share, share)?;
            }
            DepositMode::CollateralOnly => {
                position.collateral_only_deposit_share =
                    safe_add_u64(position.collateral_only_deposit_share, share)?;
            }
        }
        Ok(())
    }

    pub fn sub_deposited_share(
        &mut self,
        domain: PositionDomain,
        market: MarketId,
        account: AccountId,
        mode: DepositMode,
        share: u64,
    ) -> CoreResult<()> {
        let position = self.entry(domain, market, account);
        let held = position.deposited_share(mode);
        if share > held {
            return Err(UmbraCoreError::ExceedsDeposited);
        }
        match mode {
            DepositMode::Normal => position.normal_deposit_share = held - share,
            DepositMode::CollateralOnly => position.collateral_only_deposit_share = held - share,
        }
        Ok(())
    }

    pub fn add_borrowed_share(
        &mut self,
        domain: PositionDomain,
        market: MarketId,
        account: AccountId,
        share: u64,
    ) -> CoreResult<()> {
        self.touch(account, market);
        let position = self.entry(domain, market, account);
        position.borrowed_share = safe_add_u64(position.borrowed_share, share)?;
        Ok(())
    }

    pub fn sub_borrowed_share(
        &mut self,
        domain: PositionDomain,
        market: MarketId,
        account: AccountId,
        share: u64,
    ) -> CoreResult<()> {
        let position = self.entry(domain, market, account);
        position.borrowed_share = safe_sub_u64(position.borrowed_share, share)?;
        Ok(())
    }

    pub fn set_protected(&mut self, account: AccountId, market: MarketId, on: bool) {
        self.protected.insert((account, market), on);
    }

    fn entry(
        &mut self,
        domain: PositionDomain,
        market: MarketId,
        account: AccountId,
    ) -> &mut Position {
        self.positions
            .entry((account, market, domain))
            .or_default()
    }

    fn touch(&mut self, account: AccountId, market: MarketId) {
        let order = self.market_order.entry(account).or_default();
        if !order.contains(&market) {
            order.push(market);
        }
    }
}
