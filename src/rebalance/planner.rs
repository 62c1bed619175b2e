//! # Rebalance Planner
//!
//! The read-only stage of the optimizer. It values every position of the
//! account once, virtually applies the requested borrow, and decides which
//! additional operations bring the affected positions back within limits.
//! Nothing here mutates the store; the plan it emits is validated and applied
//! by the executor against the same snapshot.
//!
//! All arithmetic is integer-only over `PRECISION` and every division
//! floors. Chaining those floors through the target formulas produces
//! one-unit deviations from the analytically round numbers; those deviations
//! are part of the observable behavior and are asserted exactly in tests.

use crate::constants::PRECISION;
use crate::errors::{CoreResult, UmbraCoreError};
use crate::math::{mul_div_u64, safe_add_u64, safe_cast_u128_to_u64, Rounding};
use crate::oracle::ValueOracle;
use crate::store::ProtocolStore;
use crate::types::{AccountId, MarketId, MarketParams, PositionDomain};

use super::plan::{PlannedOp, RebalancePlan, RebalanceStrategy};

/// One market of the account, valued in shadow at plan time.
///
/// Collateral is valued rounding down, debt rounding up; the requested
/// market's shadow-to-asset debt already includes the borrow being planned.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MarketSnapshot {
    pub market: MarketId,
    pub protected: bool,
    /// Shadow collateral (ShadowToAsset side)
    pub sta_deposit_vol: u64,
    /// Asset debt in shadow terms (ShadowToAsset side)
    pub sta_debt_vol: u64,
    /// Asset collateral in shadow terms (AssetToShadow side)
    pub ats_deposit_vol: u64,
    /// Shadow debt (AssetToShadow side)
    pub ats_debt_vol: u64,
    /// Risk limits of the asset side
    pub ltv: u64,
    pub lt: u64,
}

/// Value the account's markets for planning. The requested market joins the
/// set even if the account never touched it, and its protection flag is
/// ignored for the call that targets it.
pub(crate) fn build_view<O: ValueOracle>(
    store: &ProtocolStore,
    oracle: &O,
    account: AccountId,
    requested: MarketId,
    borrow_amount: u64,
) -> CoreResult<Vec<MarketSnapshot>> {
    let mut markets = store.ledger().markets_of(account).to_vec();
    if !markets.contains(&requested) {
        markets.push(requested);
    }

    let mut view = Vec::with_capacity(markets.len());
    for market in markets {
        let params = store.risk().params(market)?;
        let protected = market != requested && store.ledger().is_protected(market, account);

        let sta_deposit_vol =
            store.deposited_value(PositionDomain::ShadowToAsset, market, account)?;
        let mut sta_debt_amount =
            store.borrowed_value(PositionDomain::ShadowToAsset, market, account)?;
        if market == requested {
            sta_debt_amount = safe_add_u64(sta_debt_amount, borrow_amount)?;
        }
        let sta_debt_vol = oracle.to_volume(market, sta_debt_amount)?;

        let ats_deposit_amount =
            store.deposited_value(PositionDomain::AssetToShadow, market, account)?;
        let ats_deposit_vol = oracle.to_volume(market, ats_deposit_amount)?;
        let ats_debt_vol = store.borrowed_value(PositionDomain::AssetToShadow, market, account)?;

        view.push(MarketSnapshot {
            market,
            protected,
            sta_deposit_vol,
            sta_debt_vol,
            ats_deposit_vol,
            ats_debt_vol,
            ltv: params.ltv,
            lt: params.lt,
        });
    }
    Ok(view)
}

/// Decide what, beyond the direct borrow, the request needs
pub(crate) fn plan_borrow(
    view: &[MarketSnapshot],
    shadow: MarketParams,
    requested: MarketId,
) -> CoreResult<RebalancePlan> {
    let target_snap = view
        .iter()
        .find(|snap| snap.market == requested)
        .ok_or(UmbraCoreError::InvalidMarket)?;

    // The direct borrow may already be within the limit
    let borrowable =
        mul_div_u64(target_snap.sta_deposit_vol, shadow.ltv, PRECISION, Rounding::Down)?;
    if target_snap.sta_debt_vol <= borrowable {
        let plan = RebalancePlan::new(RebalanceStrategy::DirectBorrow);
        log_plan(&plan);
        return Ok(plan);
    }
    let insufficient_here = target_snap.sta_debt_vol - borrowable;

    // Spare vs missing borrow headroom across unprotected markets
    let mut extra_sum: u128 = 0;
    let mut insufficient_sum: u128 = 0;
    for snap in unprotected(view) {
        let borrowable =
            mul_div_u64(snap.sta_deposit_vol, shadow.ltv, PRECISION, Rounding::Down)?;
        extra_sum += borrowable.saturating_sub(snap.sta_debt_vol) as u128;
        insufficient_sum += snap.sta_debt_vol.saturating_sub(borrowable) as u128;
    }

    let plan = if extra_sum >= insufficient_sum {
        plan_pure_rebalance(view, shadow)?
    } else {
        plan_escalation(
            view,
            shadow,
            requested,
            insufficient_here,
            extra_sum,
            insufficient_sum,
        )?
    };
    log_plan(&plan);
    Ok(plan)
}

/// Spare collateral covers the shortfall. Move shadow collateral between
/// markets until every debt sits at the same distance from its limit; no new
/// debt is taken on.
fn plan_pure_rebalance(
    view: &[MarketSnapshot],
    shadow: MarketParams,
) -> CoreResult<RebalancePlan> {
    let deposit_total: u128 = unprotected(view).map(|s| s.sta_deposit_vol as u128).sum();
    let debt_total: u128 = unprotected(view).map(|s| s.sta_debt_vol as u128).sum();

    let mut plan = RebalancePlan::new(RebalanceStrategy::PureRebalance);
    schedule_shadow_targets(&mut plan, view, shadow, deposit_total, debt_total)?;
    Ok(plan)
}

/// Spare collateral is not enough. Borrow shadow against asset collateral,
/// redistribute the asset-side debt, then either rebalance the whole shadow
/// side or shore up the requested market alone.
fn plan_escalation(
    view: &[MarketSnapshot],
    shadow: MarketParams,
    requested: MarketId,
    insufficient_here: u64,
    extra_sum: u128,
    insufficient_sum: u128,
) -> CoreResult<RebalancePlan> {
    // Shadow needed as fresh collateral for the requested market
    let required = mul_div_u64(insufficient_here, PRECISION, shadow.ltv, Rounding::Down)?;

    let mut capacity_sum: u128 = 0;
    let mut capacities = vec![0u64; view.len()];
    for (i, snap) in view.iter().enumerate() {
        if snap.protected {
            continue;
        }
        let limit = mul_div_u64(snap.ats_deposit_vol, snap.ltv, PRECISION, Rounding::Down)?;
        capacities[i] = limit.saturating_sub(snap.ats_debt_vol);
        capacity_sum += capacities[i] as u128;
    }
    if capacity_sum < required as u128 {
        tracing::warn!(
            required,
            capacity_total = capacity_sum,
            "borrow capacity across unprotected markets does not cover the shortfall"
        );
        return Err(UmbraCoreError::InsufficientCapacity);
    }

    let full_rebalance = extra_sum + required as u128 >= insufficient_sum;
    let mut plan = RebalancePlan::new(if full_rebalance {
        RebalanceStrategy::EscalatedFull
    } else {
        RebalanceStrategy::EscalatedTarget
    });

    // Greedy allocation in position order; the remainder lands on the last
    // market drawn from
    let mut extra_debt = vec![0u64; view.len()];
    let mut remaining = required;
    for (i, snap) in view.iter().enumerate() {
        if snap.protected || remaining == 0 {
            continue;
        }
        let take = remaining.min(capacities[i]);
        if take > 0 {
            plan.borrows.push(PlannedOp::new(snap.market, take));
            extra_debt[i] = take;
            remaining -= take;
        }
    }

    // Redistribute asset-side debt, counting the escalation borrows as
    // already taken on
    let mut factors = vec![0u64; view.len()];
    let mut factor_total: u128 = 0;
    let mut debt_total: u128 = 0;
    for (i, snap) in view.iter().enumerate() {
        if snap.protected {
            continue;
        }
        factors[i] = collateral_factor(snap.ats_deposit_vol, snap.ltv, snap.lt)?;
        factor_total += factors[i] as u128;
        debt_total += snap.ats_debt_vol as u128 + extra_debt[i] as u128;
    }
    let factor_total = safe_cast_u128_to_u64(factor_total)?;
    let debt_total = safe_cast_u128_to_u64(debt_total)?;
    let one_minus_hf = mul_div_u64(debt_total, PRECISION, factor_total, Rounding::Down)?;
    for (i, snap) in view.iter().enumerate() {
        if snap.protected {
            continue;
        }
        let virtual_debt = safe_add_u64(snap.ats_debt_vol, extra_debt[i])?;
        let target = mul_div_u64(factors[i], one_minus_hf, PRECISION, Rounding::Down)?;
        if target > virtual_debt {
            plan.borrows
                .push(PlannedOp::new(snap.market, target - virtual_debt));
        } else if target < virtual_debt {
            plan.repayments
                .push(PlannedOp::new(snap.market, virtual_debt - target));
        }
    }

    // Rebalance everything if the borrowed shadow closes the overall gap,
    // otherwise put exactly the required amount under the new debt
    if full_rebalance {
        let deposit_total: u128 = unprotected(view)
            .map(|s| s.sta_deposit_vol as u128)
            .sum::<u128>()
            + required as u128;
        let sta_debt_total: u128 = unprotected(view).map(|s| s.sta_debt_vol as u128).sum();
        schedule_shadow_targets(&mut plan, view, shadow, deposit_total, sta_debt_total)?;
    } else {
        plan.deposits.push(PlannedOp::new(requested, required));
    }
    Ok(plan)
}

/// Push per-market deposit/withdraw deltas that move every unprotected
/// shadow collateral balance to its uniform target.
///
/// The target of market m is `b(m)·P / (floor(ltv·lt/P)·(1−HF*)/P)` with
/// `1−HF* = B·P / cf(D)`, all floored stage by stage. Markets with no debt
/// get a zero target and give up their whole deposit.
fn schedule_shadow_targets(
    plan: &mut RebalancePlan,
    view: &[MarketSnapshot],
    shadow: MarketParams,
    deposit_total: u128,
    debt_total: u128,
) -> CoreResult<()> {
    let deposit_total = safe_cast_u128_to_u64(deposit_total)?;
    let debt_total = safe_cast_u128_to_u64(debt_total)?;

    let factor_total = collateral_factor(deposit_total, shadow.ltv, shadow.lt)?;
    let one_minus_hf = mul_div_u64(debt_total, PRECISION, factor_total, Rounding::Down)?;
    let shadow_factor = mul_div_u64(shadow.ltv, shadow.lt, PRECISION, Rounding::Down)?;
    let denominator = mul_div_u64(shadow_factor, one_minus_hf, PRECISION, Rounding::Down)?;

    for snap in unprotected(view) {
        let target = if snap.sta_debt_vol == 0 {
            0
        } else {
            mul_div_u64(snap.sta_debt_vol, PRECISION, denominator, Rounding::Down)?
        };
        if target < snap.sta_deposit_vol {
            plan.withdrawals
                .push(PlannedOp::new(snap.market, snap.sta_deposit_vol - target));
        } else if target > snap.sta_deposit_vol {
            plan.deposits
                .push(PlannedOp::new(snap.market, target - snap.sta_deposit_vol));
        }
    }
    Ok(())
}

/// Even split of an aggregate repay across debt markets. Callers pass only
/// markets with outstanding debt, at least one.
///
/// Covers every debt in full when the amount allows; otherwise each market
/// gets `min(floor(amount/n), owed)` with no second pass to redistribute
/// what smaller debts left unused.
pub(crate) fn split_repay(debts: &[(MarketId, u64)], amount: u64) -> Vec<(MarketId, u64)> {
    let total: u128 = debts.iter().map(|(_, owed)| *owed as u128).sum();
    if amount as u128 >= total {
        return debts.to_vec();
    }
    let even = amount / debts.len() as u64;
    debts
        .iter()
        .map(|(market, owed)| (*market, even.min(*owed)))
        .collect()
}

/// `floor(floor(value·ltv/P)·lt/P)`, the debt level at which the position
/// would sit exactly on its liquidation threshold
fn collateral_factor(value: u64, ltv: u64, lt: u64) -> CoreResult<u64> {
    let limit = mul_div_u64(value, ltv, PRECISION, Rounding::Down)?;
    mul_div_u64(limit, lt, PRECISION, Rounding::Down)
}

fn unprotected(view: &[MarketSnapshot]) -> impl Iterator<Item = &MarketSnapshot> {
    view.iter().filter(|snap| !snap.protected)
}

fn log_plan(plan: &RebalancePlan) {
    tracing::debug!(
        strategy = ?plan.strategy,
        borrows = plan.borrows_total(),
        withdrawals = plan.withdrawals_total(),
        repayments = plan.repayments_total(),
        deposits = plan.deposits_total(),
        "rebalance plan built"
    );
}
