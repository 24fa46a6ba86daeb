//! Passive hedge state machine driven against the paper exchange.

use std::sync::Arc;

use pmm_core::{MarketSpec, OrderKind, OrderSide, Price, Size, TradingPair};
use pmm_exchange::{Balances, Exchange, PaperExchange, RetryPolicy};
use pmm_hedge::{HedgeConfig, Leg, PassiveAction, PassiveHedgeState, PassiveHedger, TickSnapshot};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

/// 10 SUI at 100 against 1000 USDC.
const INIT_IQV_RATIO: f64 = 0.5;

fn pair() -> TradingPair {
    TradingPair::new("SUI", "USDC")
}

fn setup(config: HedgeConfig) -> (Arc<PaperExchange>, PassiveHedger) {
    let exchange = Arc::new(PaperExchange::new(
        pair(),
        100.0,
        2.0,
        Balances {
            inventory_amount: 10.0,
            quote_amount: 1_000.0,
        },
    ));
    let market = MarketSpec::new(Price::new(dec!(0.01)), Size::new(dec!(0.1)));
    let hedger = PassiveHedger::new(config, pair(), market, exchange.clone());
    (exchange, hedger)
}

fn no_retry() -> HedgeConfig {
    HedgeConfig {
        retry: RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
        },
        ..Default::default()
    }
}

async fn snapshot(exchange: &PaperExchange, seq: u64) -> TickSnapshot {
    TickSnapshot::capture(exchange, &pair(), seq, INIT_IQV_RATIO)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_long_round_trip_leaves_no_orders() {
    let (exchange, mut hedger) = setup(HedgeConfig::default());
    let token = CancellationToken::new();

    // Idle -> TriggerArmed
    let action = hedger
        .tick(&snapshot(&exchange, 1).await, &token)
        .await
        .unwrap();
    assert!(matches!(action, PassiveAction::Arm(_)));
    let open = exchange.open_orders();
    assert_eq!(open.len(), 2);
    assert_eq!(open[0].1.side, OrderSide::Sell);
    assert_eq!(
        open[0].1.kind,
        OrderKind::Trigger {
            trigger_price: Price::new(dec!(99))
        }
    );
    assert_eq!(open[1].1.side, OrderSide::Buy);
    assert_eq!(open[0].1.size, Size::new(dec!(5)));

    // Price rallies through the long trigger at 101.
    exchange.set_mid_price(101.5);
    let action = hedger
        .tick(&snapshot(&exchange, 2).await, &token)
        .await
        .unwrap();
    assert_eq!(
        action,
        PassiveAction::TriggerFilled {
            leg: Leg::Long,
            entry_price: 101.0,
            filled: 5.0,
            partial: false,
        }
    );
    match hedger.state() {
        PassiveHedgeState::Entered {
            side, stop_price, ..
        } => {
            assert_eq!(*side, OrderSide::Buy);
            assert_eq!(*stop_price, Price::new(dec!(100.50)));
        }
        other => panic!("expected Entered, got {other:?}"),
    }
    let open = exchange.open_orders();
    assert_eq!(open.len(), 1, "short trigger cancelled, stop resting");
    assert_eq!(open[0].1.side, OrderSide::Sell);

    // Waiting on the stop.
    let action = hedger
        .tick(&snapshot(&exchange, 3).await, &token)
        .await
        .unwrap();
    assert_eq!(action, PassiveAction::Hold);

    // Price falls through the stop.
    exchange.set_mid_price(100.2);
    let action = hedger
        .tick(&snapshot(&exchange, 4).await, &token)
        .await
        .unwrap();
    assert!(matches!(action, PassiveAction::StopFilled { .. }));
    assert!(hedger.state().is_idle());
    assert!(hedger.state().live_orders().is_empty());
    assert!(hedger.orphans().is_empty());
    assert!(exchange.open_orders().is_empty());

    let balances = exchange.balances(&pair()).await.unwrap();
    assert!((balances.inventory_amount - 10.0).abs() < 1e-9);
    assert!((balances.quote_amount - (1_000.0 - 505.0 + 502.5)).abs() < 1e-9);
}

#[tokio::test]
async fn test_externally_cancelled_trigger_is_repaired() {
    let (exchange, mut hedger) = setup(HedgeConfig::default());
    let token = CancellationToken::new();

    hedger
        .tick(&snapshot(&exchange, 1).await, &token)
        .await
        .unwrap();
    let (short_handle, _) = exchange.open_orders()[0].clone();
    assert!(exchange.cancel_externally(&short_handle));

    let action = hedger
        .tick(&snapshot(&exchange, 2).await, &token)
        .await
        .unwrap();
    assert_eq!(action, PassiveAction::Repair(vec![Leg::Short]));
    assert_eq!(exchange.open_orders().len(), 2);
    assert_eq!(hedger.state().live_orders().len(), 2);
    assert!(!hedger.state().live_orders().contains(&short_handle));
}

#[tokio::test]
async fn test_failed_stop_is_repaired_next_tick() {
    let (exchange, mut hedger) = setup(no_retry());
    let token = CancellationToken::new();

    hedger
        .tick(&snapshot(&exchange, 1).await, &token)
        .await
        .unwrap();
    exchange.set_mid_price(98.5);

    // Stop placement is the first exchange write of the entering tick.
    exchange.fail_next(1);
    let action = hedger
        .tick(&snapshot(&exchange, 2).await, &token)
        .await
        .unwrap();
    assert!(matches!(
        action,
        PassiveAction::TriggerFilled {
            leg: Leg::Short,
            ..
        }
    ));
    assert!(matches!(
        hedger.state(),
        PassiveHedgeState::Entered {
            stop_order: None,
            ..
        }
    ));
    assert!(exchange.open_orders().is_empty());

    let action = hedger
        .tick(&snapshot(&exchange, 3).await, &token)
        .await
        .unwrap();
    assert_eq!(action, PassiveAction::Repair(vec![Leg::Stop]));
    let open = exchange.open_orders();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].1.side, OrderSide::Buy);
}

#[tokio::test]
async fn test_refresh_orphans_failed_cancels_and_retries_them() {
    let (exchange, mut hedger) = setup(no_retry());
    let token = CancellationToken::new();

    hedger
        .tick(&snapshot(&exchange, 1).await, &token)
        .await
        .unwrap();

    // Small move: exposure stays in the refresh band, no trigger crosses.
    exchange.set_mid_price(100.5);
    exchange.fail_next(2);
    let action = hedger
        .tick(&snapshot(&exchange, 2).await, &token)
        .await
        .unwrap();
    assert!(matches!(action, PassiveAction::Refresh(_)));
    assert_eq!(hedger.orphans().len(), 2);
    assert_eq!(exchange.open_orders().len(), 4);

    let action = hedger
        .tick(&snapshot(&exchange, 3).await, &token)
        .await
        .unwrap();
    assert_eq!(action, PassiveAction::Hold);
    assert!(hedger.orphans().is_empty());
    assert_eq!(exchange.open_orders().len(), 2);
}

#[tokio::test]
async fn test_single_sided_arms_only_short() {
    let config = HedgeConfig {
        dual_sided_hedge: false,
        ..Default::default()
    };
    let (exchange, mut hedger) = setup(config);
    let token = CancellationToken::new();

    hedger
        .tick(&snapshot(&exchange, 1).await, &token)
        .await
        .unwrap();
    let open = exchange.open_orders();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].1.side, OrderSide::Sell);
}

#[tokio::test]
async fn test_trigger_filled_during_refresh_gets_a_stop() {
    let (exchange, mut hedger) = setup(HedgeConfig::default());
    let token = CancellationToken::new();

    hedger
        .tick(&snapshot(&exchange, 1).await, &token)
        .await
        .unwrap();

    // A neutral snapshot at 105 moves the plan, so the policy refreshes.
    let moved = TickSnapshot::new(
        2,
        pmm_core::Position::new(105.0, 1_000.0 / 105.0, 1_000.0),
        INIT_IQV_RATIO,
    )
    .unwrap();
    let observation = hedger.observe(&token).await.unwrap();
    let action = hedger
        .policy()
        .decide(hedger.state(), &observation, &moved)
        .unwrap();
    assert!(matches!(action, PassiveAction::Refresh(_)));

    // The short trigger at 99 fires before the refresh cancels it.
    exchange.set_mid_price(98.5);
    hedger.apply(&action, &token).await.unwrap();

    let balances = exchange.balances(&pair()).await.unwrap();
    assert!((balances.inventory_amount - 5.0).abs() < 1e-9);
    match hedger.state() {
        PassiveHedgeState::Entered {
            side,
            entry_price,
            stop_price,
            stop_order,
            size,
        } => {
            assert_eq!(*side, OrderSide::Sell);
            assert_eq!(*entry_price, 99.0);
            assert_eq!(*stop_price, Price::new(dec!(99.49)));
            assert!(stop_order.is_some());
            assert_eq!(*size, Size::new(dec!(5)));
        }
        other => panic!("expected Entered, got {other:?}"),
    }
    let open = exchange.open_orders();
    assert_eq!(open.len(), 1, "long trigger cancelled, stop resting");
    assert_eq!(open[0].1.side, OrderSide::Buy);
    assert!(hedger.orphans().is_empty());
}
