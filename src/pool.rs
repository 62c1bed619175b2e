//! # Market Exchange Pool
//!
//! One pool of one value type. Each listed market owns a pair of these: the
//! asset side holds the market's asset, the shadow side holds shadow. Claims
//! on the pool are shares; interest accrual raises the value of deposit
//! shares and debt shares alike without touching any account record.
//!
//! Every conversion rounds in the pool's favor:
//!
//! - deposit mints shares rounded down, withdraw-by-amount burns rounded up
//! - withdraw-all pays out rounded down
//! - borrow mints debt shares rounded up, repay-by-amount burns rounded down
//! - repaying shares in full owes the ceiling of their value
//!
//! Collateral-only deposits are segregated: they are never lent, earn no
//! interest, and their exchange rate stays 1:1 by construction.

use crate::constants::MAX_FEE_RATE;
use crate::errors::{CoreResult, UmbraCoreError};
use crate::math::{
    amount_for_shares, ceil_fee, safe_add_u64, safe_sub_u64, shares_for_amount, Rounding,
};
use crate::types::DepositMode;

/// Exchange-rate pool for one value type of one market
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangePool {
    /// Cash available for lending and normal withdrawals
    liquid_balance: u64,
    /// Value backing normal deposit shares; grows as interest accrues
    normal_deposited: u64,
    normal_share_supply: u64,
    /// Collateral-only value; segregated cash, never lent
    conly_deposited: u64,
    conly_share_supply: u64,
    /// Outstanding debt value; grows as interest accrues
    total_borrowed: u64,
    borrow_share_supply: u64,
    /// Protocol's cut of accrued interest, not yet paid out
    uncollected_fee: u64,
    harvested_fee: u64,
    protocol_fee_rate: u64,
}

impl ExchangePool {
    pub fn new(protocol_fee_rate: u64) -> CoreResult<Self> {
        if protocol_fee_rate > MAX_FEE_RATE {
            return Err(UmbraCoreError::InvalidRate);
        }
        Ok(Self {
            protocol_fee_rate,
            ..Self::default()
        })
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn liquid_balance(&self) -> u64 {
        self.liquid_balance
    }

    pub fn normal_deposited(&self) -> u64 {
        self.normal_deposited
    }

    pub fn conly_deposited(&self) -> u64 {
        self.conly_deposited
    }

    /// Total depositor claims across both classes
    pub fn total_deposited(&self) -> u64 {
        self.normal_deposited.saturating_add(self.conly_deposited)
    }

    pub fn total_borrowed(&self) -> u64 {
        self.total_borrowed
    }

    pub fn normal_share_supply(&self) -> u64 {
        self.normal_share_supply
    }

    pub fn conly_share_supply(&self) -> u64 {
        self.conly_share_supply
    }

    pub fn borrow_share_supply(&self) -> u64 {
        self.borrow_share_supply
    }

    pub fn uncollected_fee(&self) -> u64 {
        self.uncollected_fee
    }

    pub fn harvested_fee(&self) -> u64 {
        self.harvested_fee
    }

    pub fn protocol_fee_rate(&self) -> u64 {
        self.protocol_fee_rate
    }

    /// Deposit shares for `amount` at the current rate of the given class
    pub fn deposit_shares_for_amount(
        &self,
        amount: u64,
        mode: DepositMode,
        rounding: Rounding,
    ) -> CoreResult<u64> {
        match mode {
            DepositMode::Normal => shares_for_amount(
                amount,
                self.normal_deposited,
                self.normal_share_supply,
                rounding,
            ),
            DepositMode::CollateralOnly => shares_for_amount(
                amount,
                self.conly_deposited,
                self.conly_share_supply,
                rounding,
            ),
        }
    }

    /// Value of deposit shares at the current rate of the given class
    pub fn amount_for_deposit_shares(
        &self,
        share: u64,
        mode: DepositMode,
        rounding: Rounding,
    ) -> CoreResult<u64> {
        match mode {
            DepositMode::Normal => amount_for_shares(
                share,
                self.normal_deposited,
                self.normal_share_supply,
                rounding,
            ),
            DepositMode::CollateralOnly => amount_for_shares(
                share,
                self.conly_deposited,
                self.conly_share_supply,
                rounding,
            ),
        }
    }

    pub fn borrow_shares_for_amount(&self, amount: u64, rounding: Rounding) -> CoreResult<u64> {
        shares_for_amount(
            amount,
            self.total_borrowed,
            self.borrow_share_supply,
            rounding,
        )
    }

    pub fn amount_for_borrow_shares(&self, share: u64, rounding: Rounding) -> CoreResult<u64> {
        amount_for_shares(
            share,
            self.total_borrowed,
            self.borrow_share_supply,
            rounding,
        )
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Deposit `amount`, minting shares rounded down. Returns minted shares.
    pub fn deposit(&mut self, amount: u64, mode: DepositMode) -> CoreResult<u64> {
        if amount == 0 {
            return Err(UmbraCoreError::InvalidAmount);
        }
        let share = self.deposit_shares_for_amount(amount, mode, Rounding::Down)?;
        match mode {
            DepositMode::Normal => {
                self.normal_deposited = safe_add_u64(self.normal_deposited, amount)?;
                self.normal_share_supply = safe_add_u64(self.normal_share_supply, share)?;
                self.liquid_balance = safe_add_u64(self.liquid_balance, amount)?;
            }
            DepositMode::CollateralOnly => {
                self.conly_deposited = safe_add_u64(self.conly_deposited, amount)?;
                self.conly_share_supply = safe_add_u64(self.conly_share_supply, share)?;
            }
        }
        Ok(share)
    }

    /// Withdraw exactly `amount`, burning shares rounded up. Returns burned
    /// shares; the caller is responsible for holding that many.
    pub fn withdraw_by_amount(&mut self, amount: u64, mode: DepositMode) -> CoreResult<u64> {
        if amount == 0 {
            return Err(UmbraCoreError::InvalidAmount);
        }
        match mode {
            DepositMode::Normal => {
                if amount > self.normal_deposited {
                    return Err(UmbraCoreError::ExceedsDeposited);
                }
                if amount > self.liquid_balance {
                    return Err(UmbraCoreError::ExceedsLiquidity);
                }
                let share = self.deposit_shares_for_amount(amount, mode, Rounding::Up)?;
                self.normal_deposited = safe_sub_u64(self.normal_deposited, amount)?;
                self.normal_share_supply = safe_sub_u64(self.normal_share_supply, share)?;
                self.liquid_balance = safe_sub_u64(self.liquid_balance, amount)?;
                Ok(share)
            }
            DepositMode::CollateralOnly => {
                if amount > self.conly_deposited {
                    return Err(UmbraCoreError::ExceedsDeposited);
                }
                let share = self.deposit_shares_for_amount(amount, mode, Rounding::Up)?;
                self.conly_deposited = safe_sub_u64(self.conly_deposited, amount)?;
                self.conly_share_supply = safe_sub_u64(self.conly_share_supply, share)?;
                Ok(share)
            }
        }
    }

    /// Burn `share` deposit shares, paying their value rounded down. Returns
    /// the amount paid out.
    pub fn withdraw_all(&mut self, share: u64, mode: DepositMode) -> CoreResult<u64> {
        if share == 0 {
            return Ok(0);
        }
        match mode {
            DepositMode::Normal => {
                if share > self.normal_share_supply {
                    return Err(UmbraCoreError::ExceedsDeposited);
                }
                let amount = self.amount_for_deposit_shares(share, mode, Rounding::Down)?;
                if amount > self.liquid_balance {
                    return Err(UmbraCoreError::ExceedsLiquidity);
                }
                self.normal_deposited = safe_sub_u64(self.normal_deposited, amount)?;
                self.normal_share_supply = safe_sub_u64(self.normal_share_supply, share)?;
                self.liquid_balance = safe_sub_u64(self.liquid_balance, amount)?;
                Ok(amount)
            }
            DepositMode::CollateralOnly => {
                if share > self.conly_share_supply {
                    return Err(UmbraCoreError::ExceedsDeposited);
                }
                let amount = self.amount_for_deposit_shares(share, mode, Rounding::Down)?;
                self.conly_deposited = safe_sub_u64(self.conly_deposited, amount)?;
                self.conly_share_supply = safe_sub_u64(self.conly_share_supply, share)?;
                Ok(amount)
            }
        }
    }

    /// Lend out `amount`, minting debt shares rounded up. Returns the minted
    /// debt shares.
    pub fn borrow(&mut self, amount: u64) -> CoreResult<u64> {
        if amount == 0 {
            return Err(UmbraCoreError::InvalidAmount);
        }
        if amount > self.liquid_balance {
            return Err(UmbraCoreError::ExceedsLiquidity);
        }
        let share = self.borrow_shares_for_amount(amount, Rounding::Up)?;
        self.total_borrowed = safe_add_u64(self.total_borrowed, amount)?;
        self.borrow_share_supply = safe_add_u64(self.borrow_share_supply, share)?;
        self.liquid_balance = safe_sub_u64(self.liquid_balance, amount)?;
        Ok(share)
    }

    /// Repay exactly `amount`, burning debt shares rounded down. Returns the
    /// burned debt shares.
    pub fn repay_by_amount(&mut self, amount: u64) -> CoreResult<u64> {
        if amount == 0 || amount > self.total_borrowed {
            return Err(UmbraCoreError::InvalidAmount);
        }
        let share = self.borrow_shares_for_amount(amount, Rounding::Down)?;
        self.total_borrowed = safe_sub_u64(self.total_borrowed, amount)?;
        self.borrow_share_supply = safe_sub_u64(self.borrow_share_supply, share)?;
        self.liquid_balance = safe_add_u64(self.liquid_balance, amount)?;
        Ok(share)
    }

    /// Retire `share` debt shares at their ceiling value. Returns the amount
    /// owed and received into the pool.
    pub fn repay_shares(&mut self, share: u64) -> CoreResult<u64> {
        if share == 0 {
            return Ok(0);
        }
        if share > self.borrow_share_supply {
            return Err(UmbraCoreError::InvalidAmount);
        }
        let amount = self.amount_for_borrow_shares(share, Rounding::Up)?;
        self.total_borrowed = safe_sub_u64(self.total_borrowed, amount)?;
        self.borrow_share_supply = safe_sub_u64(self.borrow_share_supply, share)?;
        self.liquid_balance = safe_add_u64(self.liquid_balance, amount)?;
        Ok(amount)
    }

    /// Post `interest` earned by outstanding debt. The protocol cut is the
    /// ceiling of `interest * protocol_fee_rate`; the remainder raises the
    /// value of every normal deposit share. Returns the protocol cut.
    pub fn accrue_interest(&mut self, interest: u64) -> CoreResult<u64> {
        if interest == 0 {
            return Ok(0);
        }
        let fee = ceil_fee(interest, self.protocol_fee_rate)?;
        self.normal_deposited = safe_add_u64(self.normal_deposited, safe_sub_u64(interest, fee)?)?;
        self.total_borrowed = safe_add_u64(self.total_borrowed, interest)?;
        self.uncollected_fee = safe_add_u64(self.uncollected_fee, fee)?;
        Ok(fee)
    }

    /// Pay out accumulated protocol fees, bounded by available cash. Returns
    /// the amount paid; zero is a no-op.
    pub fn harvest_protocol_fees(&mut self) -> CoreResult<u64> {
        let unharvested = safe_sub_u64(self.uncollected_fee, self.harvested_fee)?;
        let pay = unharvested.min(self.liquid_balance);
        if pay == 0 {
            return Ok(0);
        }
        self.harvested_fee = safe_add_u64(self.harvested_fee, pay)?;
        self.liquid_balance = safe_sub_u64(self.liquid_balance, pay)?;
        Ok(pay)
    }

    pub fn set_protocol_fee_rate(&mut self, rate: u64) -> CoreResult<()> {
        if rate > MAX_FEE_RATE {
            return Err(UmbraCoreError::InvalidRate);
        }
        self.protocol_fee_rate = rate;
        Ok(())
    }
}
