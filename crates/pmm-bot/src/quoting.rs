//! Quoting loop: turns each snapshot into a post-only ladder.
//!
//! Every `update_interval_ms` the previous ladder is cancelled and the one
//! computed from the latest snapshot is placed. Orders whose cancel failed
//! stay tracked and are cancelled again on the next refresh.
//!
//! Before a quote is cancelled its status is read, so each round reports
//! what the previous ladder executed.

use std::time::Duration;

use pmm_core::{
    Ladder, MarketSpec, OrderHandle, OrderKind, OrderRequest, OrderSide, OrderStatus, TradingPair,
};
use pmm_exchange::{DynExchange, ExchangeError, RetryPolicy};
use pmm_hedge::{SnapshotReceiver, TickSnapshot};
use pmm_strategy::{Strategy, StrategyMode};
use pmm_telemetry::Metrics;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppResult;

/// A quote the loop placed and has not seen finish.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveQuote {
    pub handle: OrderHandle,
    pub side: OrderSide,
    pub size: f64,
    pub price: f64,
}

/// Quote executions observed while pulling one ladder.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoundFills {
    pub bought: f64,
    pub sold: f64,
    /// Quote spent on buys.
    pub buy_value: f64,
    /// Quote received from sells.
    pub sell_value: f64,
}

impl RoundFills {
    fn record(&mut self, side: OrderSide, qty: f64, price: f64) {
        if qty <= 0.0 {
            return;
        }
        Metrics::quote_filled(side.as_str(), qty);
        match side {
            OrderSide::Buy => {
                self.bought += qty;
                self.buy_value += qty * price;
            }
            OrderSide::Sell => {
                self.sold += qty;
                self.sell_value += qty * price;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bought == 0.0 && self.sold == 0.0
    }

    pub fn net_inventory(&self) -> f64 {
        self.bought - self.sold
    }

    pub fn net_quote(&self) -> f64 {
        self.sell_value - self.buy_value
    }

    /// Quote paid or received per unit of net inventory change.
    pub fn avg_price(&self) -> Option<f64> {
        let net = self.net_inventory();
        (net.abs() > f64::EPSILON).then(|| (self.net_quote() / net).abs())
    }
}

pub struct QuotingLoop {
    strategy: Box<dyn Strategy>,
    pair: TradingPair,
    market: MarketSpec,
    exchange: DynExchange,
    retry: RetryPolicy,
    update_interval: Duration,
    live: Vec<LiveQuote>,
    mode: StrategyMode,
    round: u64,
}

impl QuotingLoop {
    pub fn new(
        strategy: Box<dyn Strategy>,
        pair: TradingPair,
        market: MarketSpec,
        exchange: DynExchange,
        retry: RetryPolicy,
        update_interval: Duration,
    ) -> Self {
        let mode = strategy.mode();
        Metrics::strategy_mode_set(mode.as_str());
        Self {
            strategy,
            pair,
            market,
            exchange,
            retry,
            update_interval,
            live: Vec::new(),
            mode,
            round: 0,
        }
    }

    /// Strategy producing the next ladder.
    pub fn mode(&self) -> StrategyMode {
        self.mode
    }

    pub fn live_orders(&self) -> &[LiveQuote] {
        &self.live
    }

    /// Feed a volatility reading and track the mode auto mode settles on.
    pub fn observe_volatility(&mut self, effective_vol: f64) {
        self.strategy.observe_volatility(effective_vol);
        let mode = self.strategy.mode();
        if mode != self.mode {
            Metrics::strategy_mode_set(mode.as_str());
            self.mode = mode;
        }
    }

    /// Replace the resting ladder with one computed from `snapshot`.
    pub async fn requote(
        &mut self,
        snapshot: &TickSnapshot,
        shutdown: &CancellationToken,
    ) -> AppResult<Ladder> {
        let ladder = self
            .strategy
            .compute_bins(&snapshot.position, &snapshot.exposure)?;

        let fills = self.cancel_ladder(shutdown).await;
        self.log_round(&fills);
        let placed = self.place_ladder(&ladder, shutdown).await;

        Metrics::ladder_bins(ladder.bids.len(), ladder.asks.len());
        debug!(
            seq = snapshot.seq,
            mode = %self.mode,
            iqv_move_ratio = snapshot.iqv_move_ratio(),
            bids = ladder.bids.len(),
            asks = ladder.asks.len(),
            placed,
            "Ladder refreshed"
        );
        Ok(ladder)
    }

    /// Cancel every tracked quote and report what executed. Failed
    /// cancels stay tracked.
    pub async fn cancel_ladder(&mut self, shutdown: &CancellationToken) -> RoundFills {
        let mut fills = RoundFills::default();
        let previous = std::mem::take(&mut self.live);
        for quote in previous {
            let handle = &quote.handle;
            let status = self
                .retry
                .run("quote_status", shutdown, || self.exchange.order_status(handle))
                .await;
            let mut filled = 0.0;
            match status {
                Ok(OrderStatus::Filled { avg_price }) => {
                    fills.record(quote.side, quote.size, avg_price);
                    continue;
                }
                Ok(OrderStatus::PartiallyFilled {
                    remaining,
                    avg_price,
                }) => {
                    filled = (quote.size - remaining).max(0.0);
                    fills.record(quote.side, filled, avg_price);
                }
                Ok(OrderStatus::Cancelled) | Err(ExchangeError::OrderNotFound(_)) => continue,
                Ok(OrderStatus::Open) => {}
                Err(e) => {
                    Metrics::order_failure("status");
                    debug!(order = %handle, error = %e, "Quote status unavailable");
                }
            }

            let result = self
                .retry
                .run("quote_cancel", shutdown, || self.exchange.cancel_order(handle))
                .await;
            match result {
                Ok(()) | Err(ExchangeError::OrderNotFound(_)) => {}
                // Filled before the cancel landed.
                Err(ExchangeError::Rejected(_)) => {
                    fills.record(quote.side, quote.size - filled, quote.price);
                }
                Err(e) => {
                    Metrics::order_failure("cancel");
                    if e.is_retryable() {
                        Metrics::degraded("quoting");
                    }
                    warn!(order = %handle, error = %e, "Quote cancel failed, retrying next refresh");
                    self.live.push(quote);
                }
            }
        }
        fills
    }

    fn log_round(&mut self, fills: &RoundFills) {
        self.round += 1;
        if fills.is_empty() {
            debug!(round = self.round, "No quotes executed");
            return;
        }
        info!(
            round = self.round,
            bought = fills.bought,
            sold = fills.sold,
            net_inventory = fills.net_inventory(),
            net_quote = fills.net_quote(),
            avg_price = ?fills.avg_price(),
            "Quotes executed"
        );
    }

    async fn place_ladder(&mut self, ladder: &Ladder, shutdown: &CancellationToken) -> usize {
        let mut placed = 0;
        let sides = [(OrderSide::Buy, &ladder.bids), (OrderSide::Sell, &ladder.asks)];
        for (side, bins) in sides {
            for bin in bins {
                let (price, size) = match (
                    self.market.quantize_price(side, bin.price),
                    self.market.quantize_size(bin.size),
                ) {
                    (Ok(price), Ok(Some(size))) => (price, size),
                    (Ok(_), Ok(None)) => continue,
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(%side, price = bin.price, size = bin.size, error = %e, "Bin not quantizable, skipped");
                        continue;
                    }
                };

                let request = OrderRequest::new(
                    self.pair.clone(),
                    side,
                    OrderKind::Limit {
                        price,
                        post_only: true,
                    },
                    size,
                );
                let result = self
                    .retry
                    .run("quote_place", shutdown, || {
                        self.exchange.place_order(request.clone())
                    })
                    .await;
                match result {
                    Ok(handle) => {
                        Metrics::order_placed("quote");
                        self.live.push(LiveQuote {
                            handle,
                            side,
                            size: size.to_f64(),
                            price: price.to_f64(),
                        });
                        placed += 1;
                    }
                    Err(e) => {
                        Metrics::order_failure("place");
                        if e.is_retryable() {
                            Metrics::degraded("quoting");
                        }
                        warn!(%side, %price, %size, error = %e, "Quote placement failed");
                    }
                }
            }
        }
        placed
    }

    /// Requote every `update_interval` until `shutdown`, then pull the ladder.
    pub async fn run(
        mut self,
        snapshots: SnapshotReceiver,
        volatility: watch::Receiver<Option<f64>>,
        shutdown: CancellationToken,
    ) {
        info!(
            pair = %self.pair,
            mode = %self.mode,
            interval_ms = self.update_interval.as_millis() as u64,
            "Quoting loop started"
        );

        let mut ticker = tokio::time::interval(self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = shutdown.cancelled() => break,
            }

            let vol = *volatility.borrow();
            if let Some(vol) = vol {
                self.observe_volatility(vol);
            }

            let snapshot = snapshots.borrow().clone();
            let Some(snapshot) = snapshot else {
                continue;
            };
            if let Err(e) = self.requote(&snapshot, &shutdown).await {
                warn!(seq = snapshot.seq, error = %e, "Ladder computation failed");
            }
        }

        // Fresh token: the shutdown token is already cancelled and would cut retries short.
        let fills = self.cancel_ladder(&CancellationToken::new()).await;
        self.log_round(&fills);
        info!(remaining = self.live.len(), "Quoting loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmm_core::{ExposureConfig, Position, Price, Size};
    use pmm_exchange::{Balances, PaperExchange};
    use pmm_strategy::{build_strategy, StrategyConfig};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn pair() -> TradingPair {
        TradingPair::new("SUI", "USDC")
    }

    fn setup(mode: StrategyMode) -> (Arc<PaperExchange>, QuotingLoop) {
        let exchange = Arc::new(PaperExchange::new(
            pair(),
            100.0,
            10.0,
            Balances {
                inventory_amount: 10.0,
                quote_amount: 1_000.0,
            },
        ));
        let exposure = ExposureConfig::new(0.5, 0.6, -0.6, 0.3, -0.3).unwrap();
        let config = StrategyConfig {
            mode,
            ..Default::default()
        };
        let strategy = build_strategy(&config, exposure).unwrap();
        let quoting = QuotingLoop::new(
            strategy,
            pair(),
            MarketSpec::new(Price::new(dec!(0.01)), Size::new(dec!(0.1))),
            exchange.clone(),
            RetryPolicy::default(),
            Duration::from_millis(10),
        );
        (exchange, quoting)
    }

    fn snapshot(seq: u64) -> TickSnapshot {
        TickSnapshot::new(seq, Position::new(100.0, 10.0, 1_000.0), 0.5).unwrap()
    }

    #[tokio::test]
    async fn test_requote_replaces_previous_ladder() {
        let (exchange, mut quoting) = setup(StrategyMode::Spot);
        let token = CancellationToken::new();

        let ladder = quoting.requote(&snapshot(1), &token).await.unwrap();
        let bins = ladder.bids.len() + ladder.asks.len();
        assert!(bins > 0);
        assert_eq!(exchange.open_orders().len(), bins);
        assert_eq!(quoting.live_orders().len(), bins);

        quoting.requote(&snapshot(2), &token).await.unwrap();
        assert_eq!(exchange.open_orders().len(), bins);
        assert_eq!(exchange.order_history().len(), 2 * bins);

        quoting.cancel_ladder(&token).await;
        assert!(exchange.open_orders().is_empty());
        assert!(quoting.live_orders().is_empty());
    }

    #[tokio::test]
    async fn test_quotes_are_post_only_and_quantized() {
        let (exchange, mut quoting) = setup(StrategyMode::Curve);
        let token = CancellationToken::new();
        quoting.requote(&snapshot(1), &token).await.unwrap();

        for (_, request) in exchange.open_orders() {
            match request.kind {
                OrderKind::Limit { price, post_only } => {
                    assert!(post_only);
                    assert_eq!(price, price.floor_to_tick(Price::new(dec!(0.01))));
                    match request.side {
                        OrderSide::Buy => assert!(price.to_f64() < 100.0),
                        OrderSide::Sell => assert!(price.to_f64() > 100.0),
                    }
                }
                other => panic!("unexpected order kind {other:?}"),
            }
            assert_eq!(request.size, request.size.round_to_lot(Size::new(dec!(0.1))));
        }
    }

    #[test]
    fn test_auto_mode_switch_is_tracked() {
        let (_, mut quoting) = setup(StrategyMode::Auto);
        assert_eq!(quoting.mode(), StrategyMode::Spot);
        quoting.observe_volatility(1.0);
        assert_eq!(quoting.mode(), StrategyMode::Curve);
        quoting.observe_volatility(100.0);
        assert_eq!(quoting.mode(), StrategyMode::BidAsk);
    }

    #[tokio::test]
    async fn test_failed_cancel_stays_tracked() {
        let (exchange, mut quoting) = setup(StrategyMode::Spot);
        let token = CancellationToken::new();
        quoting.requote(&snapshot(1), &token).await.unwrap();
        let bins = quoting.live_orders().len();

        exchange.fail_next(RetryPolicy::default().max_attempts);
        quoting.cancel_ladder(&token).await;
        assert_eq!(quoting.live_orders().len(), 1);
        assert_eq!(exchange.open_orders().len(), 1);
        assert!(bins > 1);
    }

    #[tokio::test]
    async fn test_cancel_reports_round_fills() {
        let (exchange, mut quoting) = setup(StrategyMode::Spot);
        let token = CancellationToken::new();
        quoting.requote(&snapshot(1), &token).await.unwrap();

        let bid = quoting
            .live_orders()
            .iter()
            .find(|q| q.side == OrderSide::Buy)
            .cloned()
            .unwrap();
        let half = bid.size / 2.0;
        assert!(exchange.fill_partially(&bid.handle, half));

        let fills = quoting.cancel_ladder(&token).await;
        assert!((fills.bought - half).abs() < 1e-9);
        assert_eq!(fills.sold, 0.0);
        assert!((fills.buy_value - half * bid.price).abs() < 1e-9);
        assert!((fills.avg_price().unwrap() - bid.price).abs() < 1e-9);
        assert!(exchange.open_orders().is_empty());
    }

    #[test]
    fn test_round_fills_net() {
        let mut fills = RoundFills::default();
        assert!(fills.is_empty());
        assert_eq!(fills.avg_price(), None);

        fills.record(OrderSide::Buy, 3.0, 10.0);
        fills.record(OrderSide::Sell, 1.0, 11.0);
        assert!((fills.net_inventory() - 2.0).abs() < 1e-12);
        assert!((fills.net_quote() + 19.0).abs() < 1e-12);
        assert!((fills.avg_price().unwrap() - 9.5).abs() < 1e-12);
    }
}
