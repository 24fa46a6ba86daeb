//! In-memory paper exchange.
//!
//! Simulates a single spot pair: a mid price with a fixed spread, balances,
//! resting limit orders and stop-market triggers. Used as the dry-run
//! backend of the bot and as the exchange double in tests.
//!
//! Lock order: `market` before `orders`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use pmm_core::{OrderHandle, OrderKind, OrderRequest, OrderSide, OrderStatus, TradingPair};
use tracing::{debug, info};

use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::{Balances, BoxFuture, Exchange, PriceFeed, TopOfBook};

/// Mid prices kept for the price feed.
const DEFAULT_HISTORY_LIMIT: usize = 10_000;

#[derive(Debug)]
struct MarketState {
    mid: f64,
    history: VecDeque<f64>,
    balances: Balances,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaperState {
    Working,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    seq: u64,
    request: OrderRequest,
    size: f64,
    filled: f64,
    avg_price: f64,
    state: PaperState,
}

impl PaperOrder {
    fn remaining(&self) -> f64 {
        (self.size - self.filled).max(0.0)
    }

    fn status(&self) -> OrderStatus {
        match self.state {
            PaperState::Filled => OrderStatus::Filled {
                avg_price: self.avg_price,
            },
            PaperState::Cancelled => OrderStatus::Cancelled,
            PaperState::Working if self.filled > 0.0 => OrderStatus::PartiallyFilled {
                remaining: self.remaining(),
                avg_price: self.avg_price,
            },
            PaperState::Working => OrderStatus::Open,
        }
    }

    /// Execute `qty` at `price`, settling against `balances`.
    fn fill(&mut self, qty: f64, price: f64, balances: &mut Balances) {
        let qty = qty.min(self.remaining());
        if qty <= 0.0 {
            return;
        }
        let notional = qty * price;
        match self.request.side {
            OrderSide::Buy => {
                balances.inventory_amount += qty;
                balances.quote_amount -= notional;
            }
            OrderSide::Sell => {
                balances.inventory_amount -= qty;
                balances.quote_amount += notional;
            }
        }
        self.avg_price = (self.avg_price * self.filled + notional) / (self.filled + qty);
        self.filled += qty;
        if self.remaining() <= f64::EPSILON * self.size.max(1.0) {
            self.state = PaperState::Filled;
        }
    }
}

/// Single-pair in-memory exchange and price feed.
#[derive(Debug)]
pub struct PaperExchange {
    pair: TradingPair,
    /// Full spread around mid, in basis points.
    spread_bps: f64,
    history_limit: usize,
    market: Mutex<MarketState>,
    orders: DashMap<OrderHandle, PaperOrder>,
    next_id: AtomicU64,
    fail_next: AtomicU32,
}

impl PaperExchange {
    pub fn new(pair: TradingPair, mid: f64, spread_bps: f64, balances: Balances) -> Self {
        let mut history = VecDeque::new();
        history.push_back(mid);
        Self {
            pair,
            spread_bps: spread_bps.max(0.0),
            history_limit: DEFAULT_HISTORY_LIMIT,
            market: Mutex::new(MarketState {
                mid,
                history,
                balances,
            }),
            orders: DashMap::new(),
            next_id: AtomicU64::new(1),
            fail_next: AtomicU32::new(0),
        }
    }

    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    fn touch(&self, mid: f64) -> TopOfBook {
        let half = mid * self.spread_bps / 20_000.0;
        TopOfBook {
            bid: mid - half,
            ask: mid + half,
        }
    }

    fn check_pair(&self, pair: &TradingPair) -> ExchangeResult<()> {
        if pair == &self.pair {
            Ok(())
        } else {
            Err(ExchangeError::Unavailable(format!("unknown pair {pair}")))
        }
    }

    /// Consume one injected failure, if any.
    fn injected_failure(&self, op: &str) -> ExchangeResult<()> {
        let hit = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hit {
            Err(ExchangeError::ExecutionFailure(format!(
                "injected {op} failure"
            )))
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------------
    // Simulation controls
    // ------------------------------------------------------------------------

    /// Move the market. Crossed limits fill at their limit price, crossed
    /// triggers fire at their trigger price.
    pub fn set_mid_price(&self, mid: f64) {
        let mut market = self.market.lock();
        market.mid = mid;
        market.history.push_back(mid);
        while market.history.len() > self.history_limit {
            market.history.pop_front();
        }
        let touch = self.touch(mid);

        for mut entry in self.orders.iter_mut() {
            let order = entry.value_mut();
            if order.state != PaperState::Working {
                continue;
            }
            let fill_price = match (order.request.kind, order.request.side) {
                (OrderKind::Limit { price, .. }, OrderSide::Buy) if touch.ask <= price.to_f64() => {
                    Some(price.to_f64())
                }
                (OrderKind::Limit { price, .. }, OrderSide::Sell) if touch.bid >= price.to_f64() => {
                    Some(price.to_f64())
                }
                (OrderKind::Trigger { trigger_price }, OrderSide::Buy)
                    if mid >= trigger_price.to_f64() =>
                {
                    Some(trigger_price.to_f64())
                }
                (OrderKind::Trigger { trigger_price }, OrderSide::Sell)
                    if mid <= trigger_price.to_f64() =>
                {
                    Some(trigger_price.to_f64())
                }
                _ => None,
            };
            if let Some(price) = fill_price {
                let qty = order.remaining();
                order.fill(qty, price, &mut market.balances);
                debug!(order = %entry.key(), price, qty, "Paper order filled");
            }
        }
    }

    pub fn mid(&self) -> f64 {
        self.market.lock().mid
    }

    /// Replace balances, e.g. to simulate deposits.
    pub fn set_balances(&self, balances: Balances) {
        self.market.lock().balances = balances;
    }

    /// Make the next `n` place/cancel calls fail with `ExecutionFailure`.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Cancel an order as the venue would on expiry.
    pub fn cancel_externally(&self, handle: &OrderHandle) -> bool {
        match self.orders.get_mut(handle) {
            Some(mut order) if order.state == PaperState::Working => {
                order.state = PaperState::Cancelled;
                true
            }
            _ => false,
        }
    }

    /// Execute part of a working order at its limit/trigger price.
    pub fn fill_partially(&self, handle: &OrderHandle, qty: f64) -> bool {
        let mut market = self.market.lock();
        let Some(mut order) = self.orders.get_mut(handle) else {
            return false;
        };
        if order.state != PaperState::Working {
            return false;
        }
        let price = match order.request.kind {
            OrderKind::Limit { price, .. } => price.to_f64(),
            OrderKind::Trigger { trigger_price } => trigger_price.to_f64(),
            OrderKind::Market => market.mid,
        };
        order.fill(qty, price, &mut market.balances);
        true
    }

    /// Working orders.
    pub fn open_orders(&self) -> Vec<(OrderHandle, OrderRequest)> {
        let mut open: Vec<_> = self
            .orders
            .iter()
            .filter(|e| e.state == PaperState::Working)
            .map(|e| (e.seq, e.key().clone(), e.request.clone()))
            .collect();
        open.sort_by_key(|(seq, _, _)| *seq);
        open.into_iter()
            .map(|(_, handle, request)| (handle, request))
            .collect()
    }

    /// Every order ever accepted, in submission order.
    pub fn order_history(&self) -> Vec<OrderRequest> {
        let mut all: Vec<_> = self
            .orders
            .iter()
            .map(|e| (e.seq, e.request.clone()))
            .collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, request)| request).collect()
    }

    fn place(&self, request: OrderRequest) -> ExchangeResult<OrderHandle> {
        self.check_pair(&request.pair)?;
        self.injected_failure("place")?;

        let size = request.size.to_f64();
        if size <= 0.0 {
            return Err(ExchangeError::Rejected(format!(
                "size must be positive, got {}",
                request.size
            )));
        }

        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = OrderHandle::new(format!("paper-{seq}"));
        let mut market = self.market.lock();
        let touch = self.touch(market.mid);
        let mut order = PaperOrder {
            seq,
            request: request.clone(),
            size,
            filled: 0.0,
            avg_price: 0.0,
            state: PaperState::Working,
        };

        match (request.kind, request.side) {
            (OrderKind::Market, OrderSide::Buy) => {
                order.fill(size, touch.ask, &mut market.balances);
            }
            (OrderKind::Market, OrderSide::Sell) => {
                order.fill(size, touch.bid, &mut market.balances);
            }
            (OrderKind::Limit { price, post_only }, side) => {
                let limit = price.to_f64();
                let crosses = match side {
                    OrderSide::Buy => limit >= touch.ask,
                    OrderSide::Sell => limit <= touch.bid,
                };
                if crosses && post_only {
                    info!(order = %handle, %side, limit, "Post-only order would cross, rejected");
                    order.state = PaperState::Cancelled;
                } else if crosses {
                    let px = match side {
                        OrderSide::Buy => touch.ask,
                        OrderSide::Sell => touch.bid,
                    };
                    order.fill(size, px, &mut market.balances);
                }
            }
            (OrderKind::Trigger { trigger_price }, side) => {
                let trigger = trigger_price.to_f64();
                let fired = match side {
                    OrderSide::Buy => market.mid >= trigger,
                    OrderSide::Sell => market.mid <= trigger,
                };
                if fired {
                    let px = match side {
                        OrderSide::Buy => touch.ask,
                        OrderSide::Sell => touch.bid,
                    };
                    order.fill(size, px, &mut market.balances);
                }
            }
        }

        debug!(
            order = %handle,
            side = %request.side,
            kind = request.kind.label(),
            size,
            "Paper order accepted"
        );
        self.orders.insert(handle.clone(), order);
        Ok(handle)
    }

    fn cancel(&self, handle: &OrderHandle) -> ExchangeResult<()> {
        self.injected_failure("cancel")?;
        let mut order = self
            .orders
            .get_mut(handle)
            .ok_or_else(|| ExchangeError::OrderNotFound(handle.clone()))?;
        match order.state {
            PaperState::Working => {
                order.state = PaperState::Cancelled;
                Ok(())
            }
            PaperState::Cancelled => Ok(()),
            PaperState::Filled => Err(ExchangeError::Rejected(format!(
                "order {handle} already filled"
            ))),
        }
    }
}

impl Exchange for PaperExchange {
    fn mid_price<'a>(&'a self, pair: &'a TradingPair) -> BoxFuture<'a, ExchangeResult<f64>> {
        Box::pin(async move {
            self.check_pair(pair)?;
            Ok(self.market.lock().mid)
        })
    }

    fn top_of_book<'a>(
        &'a self,
        pair: &'a TradingPair,
    ) -> BoxFuture<'a, ExchangeResult<TopOfBook>> {
        Box::pin(async move {
            self.check_pair(pair)?;
            let mid = self.market.lock().mid;
            Ok(self.touch(mid))
        })
    }

    fn balances<'a>(&'a self, pair: &'a TradingPair) -> BoxFuture<'a, ExchangeResult<Balances>> {
        Box::pin(async move {
            self.check_pair(pair)?;
            Ok(self.market.lock().balances)
        })
    }

    fn place_order(&self, request: OrderRequest) -> BoxFuture<'_, ExchangeResult<OrderHandle>> {
        Box::pin(async move { self.place(request) })
    }

    fn cancel_order<'a>(&'a self, handle: &'a OrderHandle) -> BoxFuture<'a, ExchangeResult<()>> {
        Box::pin(async move { self.cancel(handle) })
    }

    fn order_status<'a>(
        &'a self,
        handle: &'a OrderHandle,
    ) -> BoxFuture<'a, ExchangeResult<OrderStatus>> {
        Box::pin(async move {
            self.orders
                .get(handle)
                .map(|o| o.status())
                .ok_or_else(|| ExchangeError::OrderNotFound(handle.clone()))
        })
    }
}

impl PriceFeed for PaperExchange {
    fn latest_prices<'a>(
        &'a self,
        pair: &'a TradingPair,
        n: usize,
    ) -> BoxFuture<'a, ExchangeResult<Vec<f64>>> {
        Box::pin(async move {
            self.check_pair(pair)?;
            let market = self.market.lock();
            let skip = market.history.len().saturating_sub(n);
            Ok(market.history.iter().skip(skip).copied().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmm_core::{Price, Size};
    use rust_decimal_macros::dec;

    fn pair() -> TradingPair {
        TradingPair::new("SUI", "USDC")
    }

    fn exchange() -> PaperExchange {
        PaperExchange::new(
            pair(),
            100.0,
            10.0,
            Balances {
                inventory_amount: 10.0,
                quote_amount: 1_000.0,
            },
        )
    }

    fn limit(side: OrderSide, price: rust_decimal::Decimal, post_only: bool) -> OrderRequest {
        OrderRequest::new(
            pair(),
            side,
            OrderKind::Limit {
                price: Price::new(price),
                post_only,
            },
            Size::new(dec!(1)),
        )
    }

    #[test]
    fn test_top_of_book_spread() {
        let ex = exchange();
        let tob = tokio_test::block_on(ex.top_of_book(&pair())).unwrap();
        assert!((tob.bid - 99.95).abs() < 1e-9);
        assert!((tob.ask - 100.05).abs() < 1e-9);
        assert!((tob.mid() - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_resting_limit_fills_on_price_move() {
        let ex = exchange();
        let handle = ex
            .place_order(limit(OrderSide::Buy, dec!(99), true))
            .await
            .unwrap();
        assert_eq!(ex.order_status(&handle).await.unwrap(), OrderStatus::Open);

        ex.set_mid_price(98.9);
        assert_eq!(
            ex.order_status(&handle).await.unwrap(),
            OrderStatus::Filled { avg_price: 99.0 }
        );
        let balances = ex.balances(&pair()).await.unwrap();
        assert!((balances.inventory_amount - 11.0).abs() < 1e-9);
        assert!((balances.quote_amount - 901.0).abs() < 1e-9);
        assert!(ex.open_orders().is_empty());
    }

    #[tokio::test]
    async fn test_crossing_post_only_is_rejected() {
        let ex = exchange();
        let handle = ex
            .place_order(limit(OrderSide::Buy, dec!(101), true))
            .await
            .unwrap();
        assert_eq!(ex.order_status(&handle).await.unwrap(), OrderStatus::Cancelled);

        let taker = ex
            .place_order(limit(OrderSide::Buy, dec!(101), false))
            .await
            .unwrap();
        assert!(matches!(
            ex.order_status(&taker).await.unwrap(),
            OrderStatus::Filled { .. }
        ));
    }

    #[tokio::test]
    async fn test_trigger_fires_on_cross() {
        let ex = exchange();
        let request = OrderRequest::new(
            pair(),
            OrderSide::Sell,
            OrderKind::Trigger {
                trigger_price: Price::new(dec!(95)),
            },
            Size::new(dec!(2)),
        );
        let handle = ex.place_order(request).await.unwrap();
        ex.set_mid_price(96.0);
        assert_eq!(ex.order_status(&handle).await.unwrap(), OrderStatus::Open);

        ex.set_mid_price(94.0);
        assert_eq!(
            ex.order_status(&handle).await.unwrap(),
            OrderStatus::Filled { avg_price: 95.0 }
        );
        let balances = ex.balances(&pair()).await.unwrap();
        assert!((balances.inventory_amount - 8.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_partial_fill_and_cancel() {
        let ex = exchange();
        let handle = ex
            .place_order(limit(OrderSide::Sell, dec!(102), true))
            .await
            .unwrap();
        assert!(ex.fill_partially(&handle, 0.25));
        assert_eq!(
            ex.order_status(&handle).await.unwrap(),
            OrderStatus::PartiallyFilled {
                remaining: 0.75,
                avg_price: 102.0
            }
        );

        ex.cancel_order(&handle).await.unwrap();
        assert_eq!(ex.order_status(&handle).await.unwrap(), OrderStatus::Cancelled);
        // cancelling twice is fine
        ex.cancel_order(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let ex = exchange();
        ex.fail_next(1);
        let err = ex
            .place_order(limit(OrderSide::Buy, dec!(99), true))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(ex
            .place_order(limit(OrderSide::Buy, dec!(99), true))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_pair_and_order() {
        let ex = exchange();
        let other = TradingPair::new("BTC", "USDC");
        assert!(matches!(
            ex.mid_price(&other).await,
            Err(ExchangeError::Unavailable(_))
        ));
        assert!(matches!(
            ex.order_status(&OrderHandle::new("nope")).await,
            Err(ExchangeError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_price_feed_returns_latest_oldest_first() {
        let ex = exchange();
        for p in [101.0, 102.0, 103.0] {
            ex.set_mid_price(p);
        }
        let prices = ex.latest_prices(&pair(), 3).await.unwrap();
        assert_eq!(prices, vec![101.0, 102.0, 103.0]);
        let all = ex.latest_prices(&pair(), 100).await.unwrap();
        assert_eq!(all.len(), 4);
    }
}
