//! # Rebalancing Scenarios
//!
//! Full borrow and repay flows through the public store surface with a fixed
//! unit-price oracle, so share values equal amounts and every expectation can
//! be computed by hand. Covers the direct path, idle-collateral rebalancing,
//! both escalation flavors, protection, all-or-nothing failure, and the
//! aggregate repay split.

#[cfg(test)]
mod tests {
    use umbra_core::oracle::FixedPriceOracle;
    use umbra_core::rebalance::{PlannedOp, RebalanceStrategy};
    use umbra_core::{
        borrow_with_rebalance, rate_from_percent, repay_shadow, AccountId, DepositMode, MarketId,
        MarketParams, PositionDomain, ProtocolStore, UmbraCoreError, PRECISION,
    };

    const OWNER: AccountId = AccountId::new(1);
    const TREASURY: AccountId = AccountId::new(2);
    const ALICE: AccountId = AccountId::new(10);
    const BOB: AccountId = AccountId::new(11);
    const CAROL: AccountId = AccountId::new(12);
    const M1: MarketId = MarketId::new(1);
    const M2: MarketId = MarketId::new(2);
    const M3: MarketId = MarketId::new(3);

    const STA: PositionDomain = PositionDomain::ShadowToAsset;
    const ATS: PositionDomain = PositionDomain::AssetToShadow;

    /// Route plan and clamp events to the test writer, filtered by RUST_LOG
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Store with the given markets at 70% LTV / 85% LT and unit prices,
    /// under 90% / 95% shadow limits.
    fn setup(markets: &[MarketId]) -> (ProtocolStore, FixedPriceOracle) {
        init_tracing();
        let mut store = ProtocolStore::new(
            OWNER,
            TREASURY,
            MarketParams::new(rate_from_percent(90), rate_from_percent(95)),
        )
        .unwrap();
        let mut oracle = FixedPriceOracle::new();
        for &market in markets {
            store
                .register_market(
                    OWNER,
                    market,
                    MarketParams::new(rate_from_percent(70), rate_from_percent(85)),
                )
                .unwrap();
            oracle.set_price(market, PRECISION).unwrap();
        }
        (store, oracle)
    }

    // ========================================================================
    // Direct path and request validation
    // ========================================================================

    #[test]
    fn test_direct_borrow_within_limit() {
        let (mut store, oracle) = setup(&[M1]);
        store.deposit(BOB, ATS, M1, 200_000, DepositMode::Normal).unwrap();
        store.deposit(ALICE, STA, M1, 100_000, DepositMode::Normal).unwrap();

        let outcome = borrow_with_rebalance(&mut store, &oracle, ALICE, M1, 90_000).unwrap();
        assert_eq!(outcome.strategy, RebalanceStrategy::DirectBorrow);
        assert_eq!(outcome.borrowed, 90_000);
        assert_eq!(outcome.residual_shadow, 0);
        assert!(outcome.plan.is_empty());

        assert_eq!(store.borrowed_value(STA, M1, ALICE), Ok(90_000));
        assert_eq!(store.asset_pool(M1).unwrap().liquid_balance(), 110_000);
    }

    #[test]
    fn test_borrow_request_validation() {
        let (mut store, oracle) = setup(&[M1]);
        assert_eq!(
            borrow_with_rebalance(&mut store, &oracle, ALICE, M1, 0),
            Err(UmbraCoreError::ZeroAmount)
        );
        assert_eq!(
            borrow_with_rebalance(&mut store, &oracle, ALICE, M2, 100),
            Err(UmbraCoreError::InvalidMarket)
        );
    }

    // ========================================================================
    // Pure rebalance
    // ========================================================================

    #[test]
    fn test_pure_rebalance_moves_idle_collateral() {
        let (mut store, oracle) = setup(&[M1, M2]);
        store.deposit(ALICE, STA, M1, 10_000, DepositMode::Normal).unwrap();
        store.deposit(BOB, ATS, M2, 1_000, DepositMode::Normal).unwrap();

        let outcome = borrow_with_rebalance(&mut store, &oracle, ALICE, M2, 855).unwrap();
        assert_eq!(outcome.strategy, RebalanceStrategy::PureRebalance);
        assert_eq!(outcome.residual_shadow, 0);
        assert_eq!(outcome.plan.withdrawals, vec![PlannedOp::new(M1, 10_000)]);
        assert_eq!(outcome.plan.deposits, vec![PlannedOp::new(M2, 10_000)]);
        assert!(outcome.plan.borrows.is_empty());
        assert!(outcome.plan.repayments.is_empty());

        // Collateral followed the debt
        assert_eq!(store.deposited_value(STA, M1, ALICE), Ok(0));
        assert_eq!(store.deposited_value(STA, M2, ALICE), Ok(10_000));
        assert_eq!(store.borrowed_value(STA, M2, ALICE), Ok(855));
        let shadow1 = store.shadow_pool(M1).unwrap();
        assert_eq!(shadow1.liquid_balance(), 0);
        assert_eq!(shadow1.normal_deposited(), 0);
    }

    // ========================================================================
    // Escalation
    // ========================================================================

    #[test]
    fn test_escalation_full_rebalance_lands_next_to_the_limit() {
        let (mut store, oracle) = setup(&[M1, M2]);
        store.deposit(ALICE, ATS, M1, 10_000, DepositMode::Normal).unwrap();
        store.deposit(ALICE, STA, M2, 1_000, DepositMode::Normal).unwrap();
        store.deposit(BOB, ATS, M2, 7_000, DepositMode::Normal).unwrap();
        store.deposit(CAROL, STA, M1, 6_000, DepositMode::Normal).unwrap();

        let outcome = borrow_with_rebalance(&mut store, &oracle, ALICE, M2, 6_255).unwrap();
        assert_eq!(outcome.strategy, RebalanceStrategy::EscalatedFull);
        assert_eq!(outcome.plan.borrows, vec![PlannedOp::new(M1, 5_950)]);
        assert_eq!(outcome.plan.deposits, vec![PlannedOp::new(M2, 5_949)]);
        assert!(outcome.plan.withdrawals.is_empty());
        assert!(outcome.plan.repayments.is_empty());
        assert_eq!(outcome.residual_shadow, 1);

        // The staged floors leave the deposit one unit short of the exact
        // 6_950 target, so the new debt sits one unit past the borrow limit
        // while staying clear of the liquidation line
        let collateral = store.deposited_value(STA, M2, ALICE).unwrap();
        assert_eq!(collateral, 6_949);
        assert_eq!(store.borrowed_value(STA, M2, ALICE), Ok(6_255));
        assert_eq!(collateral * rate_from_percent(90) / PRECISION, 6_254);
        assert!(6_255 <= collateral * rate_from_percent(95) / PRECISION);
        assert_eq!(store.borrowed_value(ATS, M1, ALICE), Ok(5_950));

        // Pool books stay balanced on both legs
        let shadow1 = store.shadow_pool(M1).unwrap();
        assert_eq!(shadow1.liquid_balance(), 50);
        assert_eq!(shadow1.total_borrowed(), 5_950);
        let asset2 = store.asset_pool(M2).unwrap();
        assert_eq!(asset2.liquid_balance(), 745);
        assert_eq!(asset2.total_borrowed(), 6_255);
    }

    #[test]
    fn test_escalation_targets_requested_market_when_others_stay_short() {
        let (mut store, oracle) = setup(&[M1, M2, M3]);
        store.deposit(ALICE, ATS, M1, 10_000, DepositMode::Normal).unwrap();
        store.deposit(CAROL, ATS, M3, 2_000, DepositMode::Normal).unwrap();
        store.deposit(ALICE, STA, M3, 1_000, DepositMode::Normal).unwrap();
        borrow_with_rebalance(&mut store, &oracle, ALICE, M3, 900).unwrap();
        // Accrued interest pushes the M3 debt well past its collateral
        store.accrue_interest(STA, M3, 1_200).unwrap();
        assert_eq!(store.borrowed_value(STA, M3, ALICE), Ok(2_100));

        store.deposit(ALICE, STA, M2, 1_000, DepositMode::Normal).unwrap();
        store.deposit(CAROL, ATS, M2, 7_000, DepositMode::Normal).unwrap();
        store.deposit(BOB, STA, M1, 7_000, DepositMode::Normal).unwrap();

        let outcome = borrow_with_rebalance(&mut store, &oracle, ALICE, M2, 6_255).unwrap();
        assert_eq!(outcome.strategy, RebalanceStrategy::EscalatedTarget);
        assert_eq!(outcome.plan.borrows, vec![PlannedOp::new(M1, 5_950)]);
        assert_eq!(outcome.plan.deposits, vec![PlannedOp::new(M2, 5_950)]);
        assert_eq!(outcome.residual_shadow, 0);

        // The requested market lands exactly on its borrow limit
        let collateral = store.deposited_value(STA, M2, ALICE).unwrap();
        assert_eq!(collateral, 6_950);
        assert_eq!(store.borrowed_value(STA, M2, ALICE), Ok(6_255));
        assert_eq!(collateral * rate_from_percent(90) / PRECISION, 6_255);

        // The old shortfall elsewhere is left as found
        assert_eq!(store.borrowed_value(STA, M3, ALICE), Ok(2_100));
        assert_eq!(store.deposited_value(STA, M3, ALICE), Ok(1_000));
        assert_eq!(store.borrowed_value(ATS, M1, ALICE), Ok(5_950));
    }

    #[test]
    fn test_greedy_escalation_spills_across_markets_then_repays_evenly() {
        let (mut store, oracle) = setup(&[M1, M2, M3]);
        store.deposit(ALICE, ATS, M1, 572, DepositMode::Normal).unwrap();
        store.deposit(ALICE, ATS, M2, 20_000, DepositMode::Normal).unwrap();
        store.deposit(BOB, ATS, M3, 1_000, DepositMode::Normal).unwrap();
        store.deposit(CAROL, STA, M1, 500, DepositMode::Normal).unwrap();
        store.deposit(CAROL, STA, M2, 2_000, DepositMode::Normal).unwrap();

        let outcome = borrow_with_rebalance(&mut store, &oracle, ALICE, M3, 900).unwrap();
        assert_eq!(outcome.strategy, RebalanceStrategy::EscalatedFull);
        assert_eq!(
            outcome.plan.borrows,
            vec![
                PlannedOp::new(M1, 400),
                PlannedOp::new(M2, 600),
                PlannedOp::new(M2, 372),
            ]
        );
        assert_eq!(outcome.plan.repayments, vec![PlannedOp::new(M1, 373)]);
        assert_eq!(outcome.plan.deposits, vec![PlannedOp::new(M3, 1_000)]);

        // The scheduled repayment runs before the deposit, so the deposit is
        // clamped to the released balance and comes up one unit short
        assert_eq!(outcome.residual_shadow, 0);
        assert_eq!(store.deposited_value(STA, M3, ALICE), Ok(999));
        assert_eq!(store.borrowed_value(STA, M3, ALICE), Ok(900));
        assert_eq!(store.borrowed_value(ATS, M1, ALICE), Ok(27));
        assert_eq!(store.borrowed_value(ATS, M2, ALICE), Ok(972));

        // Aggregate repay: an even split, floored, with no second pass
        let repay = repay_shadow(&mut store, ALICE, 600).unwrap();
        assert_eq!(repay.repaid, 327);
        assert_eq!(repay.residual, 273);
        assert_eq!(repay.per_market, vec![(M1, 27), (M2, 300)]);
        assert_eq!(store.borrowed_value(ATS, M1, ALICE), Ok(0));
        assert_eq!(store.borrowed_value(ATS, M2, ALICE), Ok(672));

        // Covering amounts settle everything and report the leftovers
        let repay = repay_shadow(&mut store, ALICE, 10_000).unwrap();
        assert_eq!(repay.repaid, 672);
        assert_eq!(repay.residual, 9_328);
        assert_eq!(repay.per_market, vec![(M2, 672)]);

        let repay = repay_shadow(&mut store, ALICE, 5).unwrap();
        assert_eq!(repay.repaid, 0);
        assert_eq!(repay.residual, 5);
        assert!(repay.per_market.is_empty());
        assert_eq!(
            repay_shadow(&mut store, ALICE, 0),
            Err(UmbraCoreError::ZeroAmount)
        );
    }

    // ========================================================================
    // Failure atomicity
    // ========================================================================

    #[test]
    fn test_failed_borrow_leaves_store_untouched() {
        // No unprotected collateral anywhere to escalate against
        let (mut store, oracle) = setup(&[M1]);
        store.deposit(BOB, ATS, M1, 10_000, DepositMode::Normal).unwrap();
        store.deposit(ALICE, STA, M1, 1_000, DepositMode::Normal).unwrap();
        let snapshot = store.clone();
        assert_eq!(
            borrow_with_rebalance(&mut store, &oracle, ALICE, M1, 2_000),
            Err(UmbraCoreError::InsufficientCapacity)
        );
        assert_eq!(store, snapshot);

        // Plannable request, but the asset pool cannot fund it
        let (mut store, oracle) = setup(&[M1]);
        store.deposit(BOB, ATS, M1, 500, DepositMode::Normal).unwrap();
        store.deposit(ALICE, STA, M1, 1_000, DepositMode::Normal).unwrap();
        let snapshot = store.clone();
        assert_eq!(
            borrow_with_rebalance(&mut store, &oracle, ALICE, M1, 600),
            Err(UmbraCoreError::ExceedsLiquidity)
        );
        assert_eq!(store, snapshot);
    }

    // ========================================================================
    // Protection
    // ========================================================================

    #[test]
    fn test_protected_collateral_is_never_moved() {
        let (mut store, oracle) = setup(&[M1, M2]);
        store.deposit(ALICE, STA, M1, 10_000, DepositMode::Normal).unwrap();
        store.deposit(ALICE, STA, M2, 1_000, DepositMode::Normal).unwrap();
        store.deposit(BOB, ATS, M2, 2_000, DepositMode::Normal).unwrap();
        store.set_protected(ALICE, M1, true).unwrap();

        // The only spare collateral is protected, so the request dies
        let snapshot = store.clone();
        assert_eq!(
            borrow_with_rebalance(&mut store, &oracle, ALICE, M2, 1_500),
            Err(UmbraCoreError::InsufficientCapacity)
        );
        assert_eq!(store, snapshot);

        store.set_protected(ALICE, M1, false).unwrap();
        let outcome = borrow_with_rebalance(&mut store, &oracle, ALICE, M2, 1_500).unwrap();
        assert_eq!(outcome.strategy, RebalanceStrategy::PureRebalance);
        assert_eq!(store.deposited_value(STA, M1, ALICE), Ok(0));
        assert_eq!(store.deposited_value(STA, M2, ALICE), Ok(11_000));
    }

    #[test]
    fn test_successful_rebalance_leaves_protected_positions_untouched() {
        let (mut store, oracle) = setup(&[M1, M2, M3]);
        store.deposit(ALICE, STA, M1, 5_000, DepositMode::Normal).unwrap();
        store.deposit(ALICE, ATS, M1, 2_000, DepositMode::Normal).unwrap();
        store.deposit(ALICE, STA, M2, 10_000, DepositMode::Normal).unwrap();
        store.deposit(BOB, ATS, M3, 1_000, DepositMode::Normal).unwrap();
        store.set_protected(ALICE, M1, true).unwrap();

        let sta_before = store.ledger().position(STA, M1, ALICE);
        let ats_before = store.ledger().position(ATS, M1, ALICE);
        let shadow_pool_before = store.shadow_pool(M1).unwrap().clone();
        let asset_pool_before = store.asset_pool(M1).unwrap().clone();

        // M2's idle collateral alone covers the borrow, so the call succeeds
        // without ever looking at M1
        let outcome = borrow_with_rebalance(&mut store, &oracle, ALICE, M3, 855).unwrap();
        assert_eq!(outcome.strategy, RebalanceStrategy::PureRebalance);
        assert_eq!(outcome.plan.withdrawals, vec![PlannedOp::new(M2, 10_000)]);
        assert_eq!(outcome.plan.deposits, vec![PlannedOp::new(M3, 10_000)]);

        // The protected market's positions and pools are exactly as they were
        assert_eq!(store.ledger().position(STA, M1, ALICE), sta_before);
        assert_eq!(store.ledger().position(ATS, M1, ALICE), ats_before);
        assert_eq!(store.shadow_pool(M1).unwrap(), &shadow_pool_before);
        assert_eq!(store.asset_pool(M1).unwrap(), &asset_pool_before);

        // The unprotected collateral did all the moving
        assert_eq!(store.deposited_value(STA, M2, ALICE), Ok(0));
        assert_eq!(store.deposited_value(STA, M3, ALICE), Ok(10_000));
        assert_eq!(store.borrowed_value(STA, M3, ALICE), Ok(855));
    }

    #[test]
    fn test_protection_is_ignored_for_the_requested_market() {
        let (mut store, oracle) = setup(&[M1, M2]);
        store.deposit(ALICE, STA, M1, 10_000, DepositMode::Normal).unwrap();
        store.deposit(BOB, ATS, M2, 1_000, DepositMode::Normal).unwrap();
        store.set_protected(ALICE, M2, true).unwrap();

        // M2 is protected, but it is the request itself
        let outcome = borrow_with_rebalance(&mut store, &oracle, ALICE, M2, 855).unwrap();
        assert_eq!(outcome.strategy, RebalanceStrategy::PureRebalance);
        assert_eq!(outcome.plan.deposits, vec![PlannedOp::new(M2, 10_000)]);
        assert_eq!(store.deposited_value(STA, M2, ALICE), Ok(10_000));
    }

    // ========================================================================
    // Share classes
    // ========================================================================

    #[test]
    fn test_rebalance_drains_both_share_classes_and_keeps_the_deposit_mode() {
        let (mut store, oracle) = setup(&[M1, M2]);
        store.deposit(ALICE, STA, M1, 600, DepositMode::Normal).unwrap();
        store.deposit(ALICE, STA, M1, 500, DepositMode::CollateralOnly).unwrap();
        store.deposit(ALICE, STA, M2, 50, DepositMode::CollateralOnly).unwrap();
        store.deposit(BOB, ATS, M2, 1_000, DepositMode::Normal).unwrap();

        let outcome = borrow_with_rebalance(&mut store, &oracle, ALICE, M2, 95).unwrap();
        assert_eq!(outcome.strategy, RebalanceStrategy::PureRebalance);
        assert_eq!(outcome.plan.withdrawals, vec![PlannedOp::new(M1, 1_100)]);
        assert_eq!(outcome.plan.deposits, vec![PlannedOp::new(M2, 1_099)]);
        assert_eq!(outcome.residual_shadow, 1);

        // Both classes of the source were emptied
        let position = store.ledger().position(STA, M1, ALICE);
        assert_eq!(position.normal_deposit_share, 0);
        assert_eq!(position.collateral_only_deposit_share, 0);

        // The destination held only collateral-only shares, so the moved
        // value joined that class
        let position = store.ledger().position(STA, M2, ALICE);
        assert_eq!(position.normal_deposit_share, 0);
        assert_eq!(position.collateral_only_deposit_share, 1_149);
        assert_eq!(store.deposited_value(STA, M2, ALICE), Ok(1_149));
        assert_eq!(store.borrowed_value(STA, M2, ALICE), Ok(95));
    }
}
