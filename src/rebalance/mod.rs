//! # Rebalance-Assisted Borrow and Repay
//!
//! The optimizer's entry points. A borrow request first computes what it
//! would do (planner), proves the whole schedule can execute against current
//! pool liquidity, and only then mutates the store: the direct borrow,
//! followed by the plan's operations in fixed order (borrows, withdrawals,
//! repayments, deposits). The first two feed the caller's released balance
//! within the call; the last two spend it. A precondition failure anywhere
//! leaves the store untouched.
//!
//! Exchange rates cannot move between planning and execution: every
//! operation in a call mints or burns shares in proportion to value, and
//! interest accrual is a separate entry point.

mod plan;
mod planner;

pub use plan::{PlannedOp, RebalanceOutcome, RebalancePlan, RebalanceStrategy, RepayOutcome};

use std::collections::HashMap;

use crate::errors::{CoreResult, UmbraCoreError};
use crate::math::{safe_add_u64, safe_cast_u128_to_u64, Rounding};
use crate::oracle::ValueOracle;
use crate::store::ProtocolStore;
use crate::types::{AccountId, DepositMode, MarketId, MarketParams, PositionDomain};

use self::planner::{build_view, plan_borrow, split_repay};

/// Borrow `amount` of a market's asset, restructuring the account's other
/// positions as needed to keep the new debt within risk limits.
///
/// Protected markets are never touched, except that protection on the
/// requested market itself is ignored for its own call. Fails
/// `InsufficientCapacity` with no state change when the account's
/// unprotected collateral cannot support the borrow.
pub fn borrow_with_rebalance<O: ValueOracle>(
    store: &mut ProtocolStore,
    oracle: &O,
    account: AccountId,
    market: MarketId,
    amount: u64,
) -> CoreResult<RebalanceOutcome> {
    if amount == 0 {
        return Err(UmbraCoreError::ZeroAmount);
    }
    if !store.is_listed(market) {
        return Err(UmbraCoreError::InvalidMarket);
    }

    let shadow = MarketParams::new(store.risk().ltv_shadow(), store.risk().lt_shadow());
    let view = build_view(store, oracle, account, market, amount)?;
    let plan = plan_borrow(&view, shadow, market)?;
    validate_liquidity(store, account, market, amount, &plan)?;

    // The direct borrow itself, before any corrective operation
    store.exec_borrow(account, PositionDomain::ShadowToAsset, market, amount)?;
    let residual_shadow = execute(store, account, &plan)?;

    Ok(RebalanceOutcome {
        strategy: plan.strategy,
        borrowed: amount,
        residual_shadow,
        plan,
    })
}

/// Repay up to `amount` of the account's shadow debt, spread over its debt
/// markets: everything if the amount covers the total, otherwise an even
/// floor split with no redistribution of what smaller debts leave unused.
pub fn repay_shadow(
    store: &mut ProtocolStore,
    account: AccountId,
    amount: u64,
) -> CoreResult<RepayOutcome> {
    if amount == 0 {
        return Err(UmbraCoreError::ZeroAmount);
    }

    let mut debts: Vec<(MarketId, u64)> = Vec::new();
    for market in store.ledger().markets_of(account).to_vec() {
        let owed = store.borrowed_value(PositionDomain::AssetToShadow, market, account)?;
        if owed > 0 {
            debts.push((market, owed));
        }
    }
    if debts.is_empty() {
        return Ok(RepayOutcome {
            repaid: 0,
            residual: amount,
            per_market: Vec::new(),
        });
    }

    let mut repaid: u64 = 0;
    let mut per_market = Vec::new();
    for (market, pay) in split_repay(&debts, amount) {
        if pay == 0 {
            continue;
        }
        let paid = store.repay_up_to(account, PositionDomain::AssetToShadow, market, pay)?;
        repaid = safe_add_u64(repaid, paid)?;
        per_market.push((market, paid));
    }
    tracing::debug!(
        account = %account,
        repaid,
        markets = per_market.len(),
        "aggregate shadow repay"
    );
    // Each market got at most its even share, so the sum stays in bounds
    let residual = amount - repaid;
    Ok(RepayOutcome {
        repaid,
        residual,
        per_market,
    })
}

/// Prove the whole schedule can execute before anything mutates.
///
/// Liquidity is the only external constraint: borrows and the normal-class
/// part of withdrawals drain shadow pools, and all of that drain happens
/// before any repayment or deposit returns cash, so checking the drain
/// against current balances is exact.
fn validate_liquidity(
    store: &ProtocolStore,
    account: AccountId,
    market: MarketId,
    amount: u64,
    plan: &RebalancePlan,
) -> CoreResult<()> {
    if amount > store.asset_pool(market)?.liquid_balance() {
        return Err(UmbraCoreError::ExceedsLiquidity);
    }

    let mut draw: HashMap<MarketId, u128> = HashMap::new();
    for op in &plan.borrows {
        *draw.entry(op.market).or_default() += op.amount as u128;
    }
    for op in &plan.withdrawals {
        let position = store
            .ledger()
            .position(PositionDomain::ShadowToAsset, op.market, account);
        let normal_value = store.shadow_pool(op.market)?.amount_for_deposit_shares(
            position.normal_deposit_share,
            DepositMode::Normal,
            Rounding::Down,
        )?;
        *draw.entry(op.market).or_default() += op.amount.min(normal_value) as u128;
    }
    for (m, need) in &draw {
        if *need > store.shadow_pool(*m)?.liquid_balance() as u128 {
            return Err(UmbraCoreError::ExceedsLiquidity);
        }
    }

    // The released balance accumulates in u64 during execution
    safe_cast_u128_to_u64(plan.borrows_total() + plan.withdrawals_total())?;
    Ok(())
}

/// Apply the plan in fixed order, tracking the caller's released
/// balance. Returns the shadow left over after all spends.
fn execute(store: &mut ProtocolStore, account: AccountId, plan: &RebalancePlan) -> CoreResult<u64> {
    let mut pot: u64 = 0;

    for op in &plan.borrows {
        store.exec_borrow(account, PositionDomain::AssetToShadow, op.market, op.amount)?;
        pot = safe_add_u64(pot, op.amount)?;
    }
    for op in &plan.withdrawals {
        store.exec_withdraw(account, PositionDomain::ShadowToAsset, op.market, op.amount)?;
        pot = safe_add_u64(pot, op.amount)?;
    }
    for op in &plan.repayments {
        let budget = op.amount.min(pot);
        if budget < op.amount {
            tracing::warn!(
                market = %op.market,
                scheduled = op.amount,
                available = budget,
                "repayment clamped to released balance"
            );
        }
        let paid = store.repay_up_to(account, PositionDomain::AssetToShadow, op.market, budget)?;
        // paid <= budget <= pot
        pot -= paid;
    }
    for op in &plan.deposits {
        let take = op.amount.min(pot);
        if take < op.amount {
            tracing::warn!(
                market = %op.market,
                scheduled = op.amount,
                available = take,
                "deposit clamped to released balance"
            );
        }
        if take > 0 {
            store.exec_deposit(account, PositionDomain::ShadowToAsset, op.market, take)?;
            pot -= take;
        }
    }
    Ok(pot)
}
