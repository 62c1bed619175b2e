//! # Protocol Store
//!
//! Top-level state: one pool pair and one risk entry per listed market, the
//! shared position ledger, and the backstop pool with its share token. Every
//! entry point that touches both a pool and the ledger lives here so the two
//! always move together.
//!
//! The store exposes deposits, withdrawals, repayments, protection flags, and
//! interest accrual directly. Borrowing shadow goes through
//! [`crate::rebalance::borrow_with_rebalance`]; there is no raw borrow entry
//! point.

use std::collections::HashMap;

use crate::backstop::{BackstopPool, ShareToken};
use crate::constants::DEFAULT_PROTOCOL_FEE_RATE;
use crate::errors::{CoreResult, UmbraCoreError};
use crate::ledger::PositionLedger;
use crate::math::{safe_add_u64, safe_sub_u64, Rounding};
use crate::pool::ExchangePool;
use crate::types::{
    AccountId, DepositMode, MarketId, MarketParams, PositionDomain, RiskConfig, WithdrawKind,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolStore {
    owner: AccountId,
    treasury: AccountId,
    asset_pools: HashMap<MarketId, ExchangePool>,
    shadow_pools: HashMap<MarketId, ExchangePool>,
    ledger: PositionLedger,
    risk: RiskConfig,
    backstop: BackstopPool,
    backstop_shares: ShareToken,
}

impl ProtocolStore {
    pub fn new(
        owner: AccountId,
        treasury: AccountId,
        shadow_params: MarketParams,
    ) -> CoreResult<Self> {
        Ok(Self {
            owner,
            treasury,
            asset_pools: HashMap::new(),
            shadow_pools: HashMap::new(),
            ledger: PositionLedger::default(),
            risk: RiskConfig::new(shadow_params)?,
            backstop: BackstopPool::new(owner, treasury),
            backstop_shares: ShareToken::default(),
        })
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn treasury(&self) -> AccountId {
        self.treasury
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Listed markets in registration order
    pub fn markets(&self) -> impl Iterator<Item = MarketId> + '_ {
        self.risk.listed_markets()
    }

    pub fn is_listed(&self, market: MarketId) -> bool {
        self.asset_pools.contains_key(&market)
    }

    pub fn asset_pool(&self, market: MarketId) -> CoreResult<&ExchangePool> {
        self.asset_pools
            .get(&market)
            .ok_or(UmbraCoreError::InvalidMarket)
    }

    pub fn shadow_pool(&self, market: MarketId) -> CoreResult<&ExchangePool> {
        self.shadow_pools
            .get(&market)
            .ok_or(UmbraCoreError::InvalidMarket)
    }

    /// Pool holding collateral for positions of `domain` in `market`
    pub fn collateral_pool(
        &self,
        domain: PositionDomain,
        market: MarketId,
    ) -> CoreResult<&ExchangePool> {
        match domain {
            PositionDomain::AssetToShadow => self.asset_pool(market),
            PositionDomain::ShadowToAsset => self.shadow_pool(market),
        }
    }

    /// Pool lending to positions of `domain` in `market`
    pub fn debt_pool(
        &self,
        domain: PositionDomain,
        market: MarketId,
    ) -> CoreResult<&ExchangePool> {
        match domain {
            PositionDomain::AssetToShadow => self.shadow_pool(market),
            PositionDomain::ShadowToAsset => self.asset_pool(market),
        }
    }

    /// Value of the account's collateral at current rates, rounded down.
    /// Both deposit classes count.
    pub fn deposited_value(
        &self,
        domain: PositionDomain,
        market: MarketId,
        account: AccountId,
    ) -> CoreResult<u64> {
        let pool = self.collateral_pool(domain, market)?;
        let position = self.ledger.position(domain, market, account);
        let normal = pool.amount_for_deposit_shares(
            position.normal_deposit_share,
            DepositMode::Normal,
            Rounding::Down,
        )?;
        let conly = pool.amount_for_deposit_shares(
            position.collateral_only_deposit_share,
            DepositMode::CollateralOnly,
            Rounding::Down,
        )?;
        safe_add_u64(normal, conly)
    }

    /// Value of the account's debt at current rates, rounded up
    pub fn borrowed_value(
        &self,
        domain: PositionDomain,
        market: MarketId,
        account: AccountId,
    ) -> CoreResult<u64> {
        let share = self.ledger.borrowed_share(domain, market, account);
        self.debt_pool(domain, market)?
            .amount_for_borrow_shares(share, Rounding::Up)
    }

    // ========================================================================
    // Admin
    // ========================================================================

    /// List a market: one risk entry plus an asset/shadow pool pair
    pub fn register_market(
        &mut self,
        caller: AccountId,
        market: MarketId,
        params: MarketParams,
    ) -> CoreResult<()> {
        self.require_owner(caller)?;
        self.risk.insert_market(market, params)?;
        self.asset_pools
            .insert(market, ExchangePool::new(DEFAULT_PROTOCOL_FEE_RATE)?);
        self.shadow_pools
            .insert(market, ExchangePool::new(DEFAULT_PROTOCOL_FEE_RATE)?);
        Ok(())
    }

    // ========================================================================
    // User operations
    // ========================================================================

    /// Deposit into the collateral pool of (domain, market). Returns minted
    /// deposit shares.
    pub fn deposit(
        &mut self,
        account: AccountId,
        domain: PositionDomain,
        market: MarketId,
        amount: u64,
        mode: DepositMode,
    ) -> CoreResult<u64> {
        let share = self
            .collateral_pool_mut(domain, market)?
            .deposit(amount, mode)?;
        self.ledger
            .add_deposited_share(domain, market, account, mode, share)?;
        Ok(share)
    }

    /// Withdraw from the collateral pool of (domain, market). Returns the
    /// amount paid out.
    pub fn withdraw(
        &mut self,
        account: AccountId,
        domain: PositionDomain,
        market: MarketId,
        kind: WithdrawKind,
        mode: DepositMode,
    ) -> CoreResult<u64> {
        match kind {
            WithdrawKind::Amount(amount) => {
                let share = self
                    .collateral_pool(domain, market)?
                    .deposit_shares_for_amount(amount, mode, Rounding::Up)?;
                if share > self.ledger.deposited_share(domain, market, account, mode) {
                    return Err(UmbraCoreError::ExceedsDeposited);
                }
                let burned = self
                    .collateral_pool_mut(domain, market)?
                    .withdraw_by_amount(amount, mode)?;
                self.ledger
                    .sub_deposited_share(domain, market, account, mode, burned)?;
                Ok(amount)
            }
            WithdrawKind::All => {
                let share = self.ledger.deposited_share(domain, market, account, mode);
                let amount = self
                    .collateral_pool_mut(domain, market)?
                    .withdraw_all(share, mode)?;
                self.ledger
                    .sub_deposited_share(domain, market, account, mode, share)?;
                Ok(amount)
            }
        }
    }

    /// Pay down the account's debt in (domain, market), clamped to what is
    /// owed. Returns the amount actually taken.
    pub fn repay(
        &mut self,
        account: AccountId,
        domain: PositionDomain,
        market: MarketId,
        amount: u64,
    ) -> CoreResult<u64> {
        if amount == 0 {
            return Err(UmbraCoreError::InvalidAmount);
        }
        self.repay_up_to(account, domain, market, amount)
    }

    /// Flag or unflag a market of the account as off-limits to rebalancing
    pub fn set_protected(
        &mut self,
        account: AccountId,
        market: MarketId,
        on: bool,
    ) -> CoreResult<()> {
        if !self.is_listed(market) {
            return Err(UmbraCoreError::InvalidMarket);
        }
        self.ledger.set_protected(account, market, on);
        Ok(())
    }

    // ========================================================================
    // Host-driven accrual
    // ========================================================================

    /// Post interest earned by the debt pool of (domain, market). Returns the
    /// protocol fee split off.
    pub fn accrue_interest(
        &mut self,
        domain: PositionDomain,
        market: MarketId,
        interest: u64,
    ) -> CoreResult<u64> {
        self.debt_pool_mut(domain, market)?.accrue_interest(interest)
    }

    /// Harvest protocol fees from both pools of a market. Returns
    /// (asset paid, shadow paid).
    pub fn harvest_market_fees(&mut self, market: MarketId) -> CoreResult<(u64, u64)> {
        let asset = self.asset_pool_mut(market)?.harvest_protocol_fees()?;
        let shadow = self.shadow_pool_mut(market)?.harvest_protocol_fees()?;
        Ok((asset, shadow))
    }

    // ========================================================================
    // Backstop
    // ========================================================================

    pub fn backstop(&self) -> &BackstopPool {
        &self.backstop
    }

    pub fn backstop_mut(&mut self) -> &mut BackstopPool {
        &mut self.backstop
    }

    pub fn backstop_share_supply(&self) -> u64 {
        self.backstop_shares.supply()
    }

    pub fn backstop_share_balance(&self, account: AccountId) -> u64 {
        self.backstop_shares.balance_of(account)
    }

    pub fn backstop_deposit(&mut self, account: AccountId, amount: u64) -> CoreResult<u64> {
        self.backstop
            .deposit(&mut self.backstop_shares, account, amount)
    }

    pub fn backstop_withdraw(&mut self, account: AccountId, kind: WithdrawKind) -> CoreResult<u64> {
        self.backstop
            .withdraw(&mut self.backstop_shares, account, kind)
    }

    // ========================================================================
    // Rebalance executor hooks
    // ========================================================================

    /// Borrow from the debt pool of (domain, market) onto the account.
    /// Returns minted debt shares.
    pub(crate) fn exec_borrow(
        &mut self,
        account: AccountId,
        domain: PositionDomain,
        market: MarketId,
        amount: u64,
    ) -> CoreResult<u64> {
        let share = self.debt_pool_mut(domain, market)?.borrow(amount)?;
        self.ledger
            .add_borrowed_share(domain, market, account, share)?;
        Ok(share)
    }

    /// Withdraw exactly `amount` of collateral value, draining the normal
    /// class before collateral-only.
    pub(crate) fn exec_withdraw(
        &mut self,
        account: AccountId,
        domain: PositionDomain,
        market: MarketId,
        amount: u64,
    ) -> CoreResult<()> {
        let position = self.ledger.position(domain, market, account);
        let normal_value = self.collateral_pool(domain, market)?.amount_for_deposit_shares(
            position.normal_deposit_share,
            DepositMode::Normal,
            Rounding::Down,
        )?;
        let take_normal = amount.min(normal_value);
        let rest = safe_sub_u64(amount, take_normal)?;
        // Collateral-only shares are 1:1, so this bounds the second leg
        if rest > position.collateral_only_deposit_share {
            return Err(UmbraCoreError::ExceedsDeposited);
        }
        if take_normal > 0 {
            let burned = self
                .collateral_pool_mut(domain, market)?
                .withdraw_by_amount(take_normal, DepositMode::Normal)?;
            self.ledger.sub_deposited_share(
                domain,
                market,
                account,
                DepositMode::Normal,
                burned,
            )?;
        }
        if rest > 0 {
            let burned = self
                .collateral_pool_mut(domain, market)?
                .withdraw_by_amount(rest, DepositMode::CollateralOnly)?;
            self.ledger.sub_deposited_share(
                domain,
                market,
                account,
                DepositMode::CollateralOnly,
                burned,
            )?;
        }
        Ok(())
    }

    /// Deposit rebalanced funds as collateral. Lands in whichever class the
    /// position already uses; normal when empty or mixed.
    pub(crate) fn exec_deposit(
        &mut self,
        account: AccountId,
        domain: PositionDomain,
        market: MarketId,
        amount: u64,
    ) -> CoreResult<()> {
        let position = self.ledger.position(domain, market, account);
        let mode = if position.normal_deposit_share == 0 && position.collateral_only_deposit_share > 0
        {
            DepositMode::CollateralOnly
        } else {
            DepositMode::Normal
        };
        let share = self
            .collateral_pool_mut(domain, market)?
            .deposit(amount, mode)?;
        self.ledger
            .add_deposited_share(domain, market, account, mode, share)?;
        Ok(())
    }

    /// Repay up to `amount` of the account's debt; overshoot settles the
    /// debt in full instead. Returns the amount actually taken.
    pub(crate) fn repay_up_to(
        &mut self,
        account: AccountId,
        domain: PositionDomain,
        market: MarketId,
        amount: u64,
    ) -> CoreResult<u64> {
        let share = self.ledger.borrowed_share(domain, market, account);
        if share == 0 || amount == 0 {
            return Ok(0);
        }
        let owed = self
            .debt_pool(domain, market)?
            .amount_for_borrow_shares(share, Rounding::Up)?;
        if amount >= owed {
            let paid = self.debt_pool_mut(domain, market)?.repay_shares(share)?;
            self.ledger
                .sub_borrowed_share(domain, market, account, share)?;
            Ok(paid)
        } else {
            let burned = self.debt_pool_mut(domain, market)?.repay_by_amount(amount)?;
            self.ledger
                .sub_borrowed_share(domain, market, account, burned)?;
            Ok(amount)
        }
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn asset_pool_mut(&mut self, market: MarketId) -> CoreResult<&mut ExchangePool> {
        self.asset_pools
            .get_mut(&market)
            .ok_or(UmbraCoreError::InvalidMarket)
    }

    fn shadow_pool_mut(&mut self, market: MarketId) -> CoreResult<&mut ExchangePool> {
        self.shadow_pools
            .get_mut(&market)
            .ok_or(UmbraCoreError::InvalidMarket)
    }

    fn collateral_pool_mut(
        &mut self,
        domain: PositionDomain,
        market: MarketId,
    ) -> CoreResult<&mut ExchangePool> {
        match domain {
            PositionDomain::AssetToShadow => self.asset_pool_mut(market),
            PositionDomain::ShadowToAsset => self.shadow_pool_mut(market),
        }
    }

    fn debt_pool_mut(
        &mut self,
        domain: PositionDomain,
        market: MarketId,
    ) -> CoreResult<&mut ExchangePool> {
        match domain {
            PositionDomain::AssetToShadow => self.shadow_pool_mut(market),
            PositionDomain::ShadowToAsset => self.asset_pool_mut(market),
        }
    }

    fn require_owner(&self, caller: AccountId) -> CoreResult<()> {
        if caller != self.owner {
            return Err(UmbraCoreError::Unauthorized);
        }
        Ok(())
    }
}
