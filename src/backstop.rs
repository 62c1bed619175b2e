//! # Backstop Pool
//!
//! Protocol-level liquidity pool that supported markets draw on when their
//! own reserves run short. Depositors hold a dedicated share token whose
//! exchange rate rises as borrowing markets pay interest back in.
//!
//! Debt is tracked per market as plain amounts. A borrow may carry a
//! one-time support fee, charged to the borrowing market on top of the
//! amount taken out; interest accrual splits a protocol cut off before
//! crediting depositors. Both fee streams accumulate in
//! `total_uncollected_fee` until harvested to the treasury, bounded by the
//! cash actually on hand.

use std::collections::HashMap;

use crate::constants::{DEFAULT_PROTOCOL_FEE_RATE, DEFAULT_SUPPORT_FEE_RATE, MAX_FEE_RATE};
use crate::errors::{CoreResult, UmbraCoreError};
use crate::math::{amount_for_shares, ceil_fee, safe_add_u64, safe_sub_u64, shares_for_amount, Rounding};
use crate::types::{AccountId, MarketId, WithdrawKind};

// ============================================================================
// Share token
// ============================================================================

/// Mintable claim on the backstop pool, one balance per account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareToken {
    supply: u64,
    balances: HashMap<AccountId, u64>,
}

impl ShareToken {
    pub fn supply(&self) -> u64 {
        self.supply
    }

    pub fn balance_of(&self, account: AccountId) -> u64 {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    pub fn mint(&mut self, account: AccountId, share: u64) -> CoreResult<()> {
        let balance = self.balance_of(account);
        self.balances.insert(account, safe_add_u64(balance, share)?);
        self.supply = safe_add_u64(self.supply, share)?;
        Ok(())
    }

    pub fn burn(&mut self, account: AccountId, share: u64) -> CoreResult<()> {
        let balance = self.balance_of(account);
        if share > balance {
            return Err(UmbraCoreError::ExceedsDeposited);
        }
        self.balances.insert(account, balance - share);
        self.supply = safe_sub_u64(self.supply, share)?;
        Ok(())
    }
}

// ============================================================================
// Pool
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackstopPool {
    owner: AccountId,
    treasury: AccountId,
    /// Cash available for borrows, withdrawals, and fee harvests
    liquid_balance: u64,
    /// Value backing the share supply; grows as interest accrues
    total_deposited: u64,
    /// Outstanding debt summed over all markets
    total_borrowed: u64,
    total_uncollected_fee: u64,
    harvested_fee: u64,
    protocol_fee_rate: u64,
    support_fee_rate: u64,
    /// Markets allowed to draw on the pool, in listing order
    supported_markets: Vec<MarketId>,
    /// Per-market debt sub-ledger
    borrowed: HashMap<MarketId, u64>,
}

impl BackstopPool {
    pub fn new(owner: AccountId, treasury: AccountId) -> Self {
        Self {
            owner,
            treasury,
            liquid_balance: 0,
            total_deposited: 0,
            total_borrowed: 0,
            total_uncollected_fee: 0,
            harvested_fee: 0,
            protocol_fee_rate: DEFAULT_PROTOCOL_FEE_RATE,
            support_fee_rate: DEFAULT_SUPPORT_FEE_RATE,
            supported_markets: Vec::new(),
            borrowed: HashMap::new(),
        }
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

    pub fn liquid_balance(&self) -> u64 {
        self.liquid_balance
    }

    pub fn total_deposited(&self) -> u64 {
        self.total_deposited
    }

    pub fn total_borrowed(&self) -> u64 {
        self.total_borrowed
    }

    pub fn total_uncollected_fee(&self) -> u64 {
        self.total_uncollected_fee
    }

    pub fn protocol_fee_rate(&self) -> u64 {
        self.protocol_fee_rate
    }

    pub fn support_fee_rate(&self) -> u64 {
        self.support_fee_rate
    }

    pub fn supported_markets(&self) -> &[MarketId] {
        &self.supported_markets
    }

    pub fn is_supported(&self, market: MarketId) -> bool {
        self.supported_markets.contains(&market)
    }

    /// Outstanding debt of one market, zero if it never borrowed
    pub fn borrowed_of(&self, market: MarketId) -> u64 {
        self.borrowed.get(&market).copied().unwrap_or(0)
    }

    // ========================================================================
    // Depositor operations
    // ========================================================================

    /// Deposit `amount`, minting backstop shares to `account` rounded down.
    /// Returns the minted shares.
    pub fn deposit(
        &mut self,
        shares: &mut ShareToken,
        account: AccountId,
        amount: u64,
    ) -> CoreResult<u64> {
        if amount == 0 {
            return Err(UmbraCoreError::InvalidAmount);
        }
        let share = shares_for_amount(amount, self.total_deposited, shares.supply(), Rounding::Down)?;
        shares.mint(account, share)?;
        self.total_deposited = safe_add_u64(self.total_deposited, amount)?;
        self.liquid_balance = safe_add_u64(self.liquid_balance, amount)?;
        Ok(share)
    }

    /// Withdraw from `account`'s position. Returns the amount paid out.
    pub fn withdraw(
        &mut self,
        shares: &mut ShareToken,
        account: AccountId,
        kind: WithdrawKind,
    ) -> CoreResult<u64> {
        let (share, amount) = match kind {
            WithdrawKind::Amount(amount) => {
                if amount == 0 {
                    return Err(UmbraCoreError::InvalidAmount);
                }
                let share =
                    shares_for_amount(amount, self.total_deposited, shares.supply(), Rounding::Up)?;
                if share > shares.balance_of(account) {
                    return Err(UmbraCoreError::ExceedsDeposited);
                }
                (share, amount)
            }
            WithdrawKind::All => {
                let share = shares.balance_of(account);
                if share == 0 {
                    return Ok(0);
                }
                let amount =
                    amount_for_shares(share, self.total_deposited, shares.supply(), Rounding::Down)?;
                (share, amount)
            }
        };
        if amount > self.liquid_balance {
            return Err(UmbraCoreError::ExceedsLiquidity);
        }
        shares.burn(account, share)?;
        self.total_deposited = safe_sub_u64(self.total_deposited, amount)?;
        self.liquid_balance = safe_sub_u64(self.liquid_balance, amount)?;
        Ok(amount)
    }

    // ========================================================================
    // Market operations
    // ========================================================================

    /// Lend `amount` to a supported market. The support fee is charged on top
    /// as extra debt and earmarked for the treasury. Returns the market's debt
    /// increase, amount plus fee.
    pub fn borrow(&mut self, market: MarketId, amount: u64) -> CoreResult<u64> {
        if !self.is_supported(market) {
            return Err(UmbraCoreError::UnsupportedMarket);
        }
        if amount == 0 {
            return Err(UmbraCoreError::InvalidAmount);
        }
        if amount > self.liquid_balance {
            return Err(UmbraCoreError::ExceedsLiquidity);
        }
        let fee = ceil_fee(amount, self.support_fee_rate)?;
        let owed = safe_add_u64(amount, fee)?;
        let market_debt = safe_add_u64(self.borrowed_of(market), owed)?;
        self.borrowed.insert(market, market_debt);
        self.total_borrowed = safe_add_u64(self.total_borrowed, owed)?;
        self.total_uncollected_fee = safe_add_u64(self.total_uncollected_fee, fee)?;
        self.liquid_balance = safe_sub_u64(self.liquid_balance, amount)?;
        Ok(owed)
    }

    /// Pay down a market's debt. Overpaying is rejected.
    pub fn repay(&mut self, market: MarketId, amount: u64) -> CoreResult<()> {
        let market_debt = self.borrowed_of(market);
        if amount == 0 || amount > market_debt {
            return Err(UmbraCoreError::InvalidAmount);
        }
        self.borrowed.insert(market, market_debt - amount);
        self.total_borrowed = safe_sub_u64(self.total_borrowed, amount)?;
        self.liquid_balance = safe_add_u64(self.liquid_balance, amount)?;
        Ok(())
    }

    /// Post `interest` owed by a market. The protocol cut is the ceiling of
    /// `interest * protocol_fee_rate`; the remainder raises the share value.
    /// Cash is unchanged until the market repays. Returns the protocol cut.
    pub fn accrue_interest(&mut self, market: MarketId, interest: u64) -> CoreResult<u64> {
        if !self.is_supported(market) {
            return Err(UmbraCoreError::UnsupportedMarket);
        }
        if interest == 0 {
            return Ok(0);
        }
        let fee = ceil_fee(interest, self.protocol_fee_rate)?;
        let market_debt = safe_add_u64(self.borrowed_of(market), interest)?;
        self.borrowed.insert(market, market_debt);
        self.total_borrowed = safe_add_u64(self.total_borrowed, interest)?;
        self.total_deposited = safe_add_u64(self.total_deposited, safe_sub_u64(interest, fee)?)?;
        self.total_uncollected_fee = safe_add_u64(self.total_uncollected_fee, fee)?;
        Ok(fee)
    }

    /// Pay accumulated fees to the treasury, bounded by available cash.
    /// Returns the amount paid.
    pub fn harvest_protocol_fees(&mut self) -> CoreResult<u64> {
        let unharvested = safe_sub_u64(self.total_uncollected_fee, self.harvested_fee)?;
        let pay = unharvested.min(self.liquid_balance);
        if pay == 0 {
            return Ok(0);
        }
        self.harvested_fee = safe_add_u64(self.harvested_fee, pay)?;
        self.liquid_balance = safe_sub_u64(self.liquid_balance, pay)?;
        tracing::debug!(amount = pay, treasury = %self.treasury, "protocol fees harvested");
        Ok(pay)
    }

    // ========================================================================
    // Admin
    // ========================================================================

    pub fn add_supported_market(&mut self, caller: AccountId, market: MarketId) -> CoreResult<()> {
        self.require_owner(caller)?;
        if self.is_supported(market) {
            return Err(UmbraCoreError::DuplicateMarket);
        }
        self.supported_markets.push(market);
        tracing::debug!(market = %market, "market added to backstop");
        Ok(())
    }

    pub fn update_protocol_fee_rate(&mut self, caller: AccountId, rate: u64) -> CoreResult<()> {
        self.require_owner(caller)?;
        if rate > MAX_FEE_RATE {
            return Err(UmbraCoreError::InvalidRate);
        }
        self.protocol_fee_rate = rate;
        tracing::debug!(rate, "protocol fee rate updated");
        Ok(())
    }

    pub fn update_support_fee_rate(&mut self, caller: AccountId, rate: u64) -> CoreResult<()> {
        self.require_owner(caller)?;
        if rate > MAX_FEE_RATE {
            return Err(UmbraCoreError::InvalidRate);
        }
        self.support_fee_rate = rate;
        tracing::debug!(rate, "support fee rate updated");
        Ok(())
    }

    pub fn set_treasury(&mut self, caller: AccountId, treasury: AccountId) -> CoreResult<()> {
        self.require_owner(caller)?;
        self.treasury = treasury;
        tracing::debug!(treasury = %treasury, "treasury updated");
        Ok(())
    }

    fn require_owner(&self, caller: AccountId) -> CoreResult<()> {
        if caller != self.owner {
            return Err(UmbraCoreError::Unauthorized);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::rate_from_percent;

    const OWNER: AccountId = AccountId::new(0);
    const TREASURY: AccountId = AccountId::new(1);
    const DEPOSITOR: AccountId = AccountId::new(2);
    const MARKET: MarketId = MarketId::new(10);

    fn pool_with_market() -> BackstopPool {
        let mut pool = BackstopPool::new(OWNER, TREASURY);
        pool.add_supported_market(OWNER, MARKET).unwrap();
        pool
    }

    #[test]
    fn test_deposit_then_partial_withdraw() {
        let mut pool = pool_with_market();
        let mut shares = ShareToken::default();
        assert_eq!(pool.deposit(&mut shares, DEPOSITOR, 400_000), Ok(400_000));
        assert_eq!(shares.balance_of(DEPOSITOR), 400_000);
        assert_eq!(
            pool.withdraw(&mut shares, DEPOSITOR, WithdrawKind::Amount(300_000)),
            Ok(300_000)
        );
        assert_eq!(pool.total_deposited(), 100_000);
        assert_eq!(pool.liquid_balance(), 100_000);
        assert_eq!(shares.balance_of(DEPOSITOR), 100_000);
    }

    #[test]
    fn test_borrow_until_dry() {
        let mut pool = pool_with_market();
        let mut shares = ShareToken::default();
        pool.deposit(&mut shares, DEPOSITOR, 400_000).unwrap();
        for _ in 0..4 {
            assert_eq!(pool.borrow(MARKET, 100_000), Ok(100_000));
        }
        assert_eq!(pool.liquid_balance(), 0);
        assert_eq!(pool.borrowed_of(MARKET), 400_000);
        assert_eq!(
            pool.borrow(MARKET, 100_000),
            Err(UmbraCoreError::ExceedsLiquidity)
        );
    }

    #[test]
    fn test_repay_tracks_sub_ledger() {
        let mut pool = pool_with_market();
        let mut shares = ShareToken::default();
        pool.deposit(&mut shares, DEPOSITOR, 50_000).unwrap();
        pool.borrow(MARKET, 10_000).unwrap();
        assert_eq!(pool.repay(MARKET, 9_900), Ok(()));
        assert_eq!(pool.borrowed_of(MARKET), 100);
        assert_eq!(pool.repay(MARKET, 100), Ok(()));
        assert_eq!(pool.borrowed_of(MARKET), 0);
        assert_eq!(pool.total_borrowed(), 0);
        // No debt left to repay against
        assert_eq!(pool.repay(MARKET, 1), Err(UmbraCoreError::InvalidAmount));
    }

    #[test]
    fn test_accrual_splits_protocol_fee() {
        let mut pool = pool_with_market();
        let mut shares = ShareToken::default();
        pool.deposit(&mut shares, DEPOSITOR, 400_000).unwrap();
        pool.borrow(MARKET, 10_000).unwrap();
        // Default protocol fee is 10%
        assert_eq!(pool.accrue_interest(MARKET, 1_000), Ok(100));
        assert_eq!(pool.total_deposited(), 400_900);
        assert_eq!(pool.total_borrowed(), 11_000);
        assert_eq!(pool.borrowed_of(MARKET), 11_000);
        assert_eq!(pool.total_uncollected_fee(), 100);
        // Accrual posts no cash
        assert_eq!(pool.liquid_balance(), 390_000);
    }

    #[test]
    fn test_fee_rounds_up() {
        let mut pool = pool_with_market();
        let mut shares = ShareToken::default();
        pool.deposit(&mut shares, DEPOSITOR, 10_000).unwrap();
        pool.borrow(MARKET, 5_000).unwrap();
        // ceil(1001 * 10%) = 101
        assert_eq!(pool.accrue_interest(MARKET, 1_001), Ok(101));
    }

    #[test]
    fn test_support_fee_charged_as_debt() {
        let mut pool = pool_with_market();
        let mut shares = ShareToken::default();
        pool.update_support_fee_rate(OWNER, rate_from_percent(2)).unwrap();
        pool.deposit(&mut shares, DEPOSITOR, 100_000).unwrap();
        // Market receives 10_000 but owes 10_200
        assert_eq!(pool.borrow(MARKET, 10_000), Ok(10_200));
        assert_eq!(pool.borrowed_of(MARKET), 10_200);
        assert_eq!(pool.liquid_balance(), 90_000);
        assert_eq!(pool.total_uncollected_fee(), 200);
    }

    #[test]
    fn test_withdraw_all_at_raised_rate() {
        let mut pool = pool_with_market();
        let mut shares = ShareToken::default();
        pool.deposit(&mut shares, DEPOSITOR, 400_000).unwrap();
        pool.borrow(MARKET, 10_000).unwrap();
        pool.accrue_interest(MARKET, 1_000).unwrap();
        pool.repay(MARKET, 11_000).unwrap();
        // 400_000 shares now worth 400_900, all of it liquid
        assert_eq!(
            pool.withdraw(&mut shares, DEPOSITOR, WithdrawKind::All),
            Ok(400_900)
        );
        assert_eq!(shares.balance_of(DEPOSITOR), 0);
        assert_eq!(pool.total_deposited(), 0);
        // Withdrawing with no position is a no-op
        assert_eq!(
            pool.withdraw(&mut shares, DEPOSITOR, WithdrawKind::All),
            Ok(0)
        );
    }

    #[test]
    fn test_withdraw_blocked_by_outstanding_debt() {
        let mut pool = pool_with_market();
        let mut shares = ShareToken::default();
        pool.deposit(&mut shares, DEPOSITOR, 100_000).unwrap();
        pool.borrow(MARKET, 60_000).unwrap();
        assert_eq!(
            pool.withdraw(&mut shares, DEPOSITOR, WithdrawKind::Amount(50_000)),
            Err(UmbraCoreError::ExceedsLiquidity)
        );
        // A claim beyond the position reports the position, not the pool
        assert_eq!(
            pool.withdraw(&mut shares, DEPOSITOR, WithdrawKind::Amount(150_000)),
            Err(UmbraCoreError::ExceedsDeposited)
        );
        assert_eq!(
            pool.withdraw(&mut shares, DEPOSITOR, WithdrawKind::All),
            Err(UmbraCoreError::ExceedsLiquidity)
        );
    }

    #[test]
    fn test_harvest_pays_treasury_up_to_liquidity() {
        let mut pool = pool_with_market();
        let mut shares = ShareToken::default();
        pool.deposit(&mut shares, DEPOSITOR, 10_000).unwrap();
        pool.borrow(MARKET, 10_000).unwrap();
        pool.accrue_interest(MARKET, 1_000).unwrap();
        // Fee of 100 accrued with nothing liquid
        assert_eq!(pool.harvest_protocol_fees(), Ok(0));
        pool.repay(MARKET, 40).unwrap();
        assert_eq!(pool.harvest_protocol_fees(), Ok(40));
        pool.repay(MARKET, 10_960).unwrap();
        assert_eq!(pool.harvest_protocol_fees(), Ok(60));
        assert_eq!(pool.harvest_protocol_fees(), Ok(0));
    }

    #[test]
    fn test_unsupported_market_rejected() {
        let mut pool = pool_with_market();
        let mut shares = ShareToken::default();
        pool.deposit(&mut shares, DEPOSITOR, 10_000).unwrap();
        let other = MarketId::new(99);
        assert_eq!(
            pool.borrow(other, 1_000),
            Err(UmbraCoreError::UnsupportedMarket)
        );
        assert_eq!(
            pool.accrue_interest(other, 1_000),
            Err(UmbraCoreError::UnsupportedMarket)
        );
    }

    #[test]
    fn test_admin_requires_owner() {
        let mut pool = pool_with_market();
        let intruder = AccountId::new(7);
        assert_eq!(
            pool.add_supported_market(intruder, MarketId::new(11)),
            Err(UmbraCoreError::Unauthorized)
        );
        assert_eq!(
            pool.update_protocol_fee_rate(intruder, 0),
            Err(UmbraCoreError::Unauthorized)
        );
        assert_eq!(
            pool.update_support_fee_rate(intruder, 0),
            Err(UmbraCoreError::Unauthorized)
        );
        assert_eq!(
            pool.set_treasury(intruder, intruder),
            Err(UmbraCoreError::Unauthorized)
        );
        // Owner-side validation still applies
        assert_eq!(
            pool.add_supported_market(OWNER, MARKET),
            Err(UmbraCoreError::DuplicateMarket)
        );
        assert_eq!(
            pool.update_protocol_fee_rate(OWNER, MAX_FEE_RATE + 1),
            Err(UmbraCoreError::InvalidRate)
        );
    }
}
