//! Active hedge: pulls the IQV ratio back toward its target with a taker
//! fallback once the move ratio exceeds `active_hedge_iqv_ratio`.
//!
//! Flow per evaluation:
//! 1. `plan()` picks a side and solves for the restoring size
//! 2. `ActiveHedgeState::is_duplicate()` drops repeats within one window
//! 3. `execute()` posts a post-only order at the touch, waits the grace
//!    period, and sends whatever is left as a market order
//!
//! Snapshots taken before the last hedge settled still show pre-hedge
//! balances and are skipped. A post-only order left behind by a failed
//! execution is resolved before anything new is planned.

use std::sync::Arc;

use pmm_core::{
    MarketSpec, OrderHandle, OrderKind, OrderRequest, OrderSide, OrderStatus, Position, Size,
    TradingPair,
};
use pmm_exchange::{DynExchange, ExchangeError, TopOfBook};
use pmm_telemetry::Metrics;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HedgeConfig;
use crate::error::{HedgeError, HedgeResult};
use crate::snapshot::{SnapshotReceiver, TickSnapshot};

// ============================================================================
// Sizing
// ============================================================================

/// Size that moves `position` to IQV ratio `target_ratio` when traded on
/// `side` at the position's price.
///
/// Solves `((i ∓ x)·p) / ((i ∓ x)·p + q ± x·p) = N`; the total value is
/// unchanged by the trade, so:
/// - sell: `x = (i·p − N·(i·p + q)) / p`
/// - buy:  `x = (N·(i·p + q) − i·p) / p`
///
/// Negative solutions (already past the target) are reported as zero.
pub fn hedge_size(side: OrderSide, position: &Position, target_ratio: f64) -> HedgeResult<f64> {
    let Position {
        price,
        inventory_amount,
        quote_amount,
    } = *position;
    if !(price.is_finite() && price > 0.0) {
        return Err(HedgeError::Calculation(format!(
            "price must be positive, got {price}"
        )));
    }
    if !(inventory_amount.is_finite() && quote_amount.is_finite() && target_ratio.is_finite()) {
        return Err(HedgeError::Calculation(format!(
            "non-finite sizing input: inventory={inventory_amount} quote={quote_amount} target={target_ratio}"
        )));
    }

    let inventory_value = inventory_amount * price;
    let target_value = target_ratio * (inventory_value + quote_amount);
    let x = match side {
        OrderSide::Sell => (inventory_value - target_value) / price,
        OrderSide::Buy => (target_value - inventory_value) / price,
    };
    Ok(x.max(0.0))
}

/// A hedge decided from one snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveHedgePlan {
    pub side: OrderSide,
    pub size: f64,
    pub target_ratio: f64,
    pub seq: u64,
}

// ============================================================================
// ActiveHedgeState
// ============================================================================

/// Bookkeeping of the last submitted hedge.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActiveHedgeState {
    pub last_hedge_size: Option<f64>,
    pub last_hedge_seq: Option<u64>,
    /// Unix milliseconds.
    pub last_hedge_timestamp: Option<i64>,
    /// When the last execution attempt finished, in Unix milliseconds.
    pub settled_at_ms: Option<i64>,
}

impl ActiveHedgeState {
    /// A hedge repeats the previous one when its size is within `tolerance`
    /// and it comes from the same snapshot or less than one interval later.
    pub fn is_duplicate(
        &self,
        size: f64,
        seq: u64,
        now_ms: i64,
        interval_ms: u64,
        tolerance: f64,
    ) -> bool {
        let (Some(last_size), Some(last_seq), Some(last_ts)) = (
            self.last_hedge_size,
            self.last_hedge_seq,
            self.last_hedge_timestamp,
        ) else {
            return false;
        };
        let same_size = (size - last_size).abs() <= tolerance;
        let same_window =
            seq == last_seq || now_ms.saturating_sub(last_ts) < interval_ms as i64;
        same_size && same_window
    }

    pub fn record(&mut self, size: f64, seq: u64, now_ms: i64) {
        self.last_hedge_size = Some(size);
        self.last_hedge_seq = Some(seq);
        self.last_hedge_timestamp = Some(now_ms);
    }

    pub fn settle(&mut self, now_ms: i64) {
        self.settled_at_ms = Some(now_ms);
    }

    /// A snapshot taken no later than the last settlement predates its fills.
    pub fn is_stale(&self, taken_at_ms: i64) -> bool {
        self.settled_at_ms.is_some_and(|settled| taken_at_ms <= settled)
    }
}

/// What an executed hedge did.
#[derive(Debug, Clone, PartialEq)]
pub struct HedgeExecution {
    pub side: OrderSide,
    pub size: f64,
    pub post_only_order: OrderHandle,
    /// Size filled passively before the grace period ran out.
    pub maker_filled: f64,
    /// Remainder sent as a market order.
    pub market_order: Option<(OrderHandle, f64)>,
}

impl HedgeExecution {
    fn maker(side: OrderSide, size: f64, post_only_order: OrderHandle) -> Self {
        Self {
            side,
            size,
            post_only_order,
            maker_filled: size,
            market_order: None,
        }
    }
}

// ============================================================================
// ActiveHedger
// ============================================================================

pub struct ActiveHedger {
    config: HedgeConfig,
    init_iqv_ratio: f64,
    pair: TradingPair,
    market: MarketSpec,
    exchange: DynExchange,
    state: ActiveHedgeState,
    /// Post-only hedge whose outcome is not known yet.
    in_flight: Option<OrderHandle>,
}

impl ActiveHedger {
    pub fn new(
        config: HedgeConfig,
        init_iqv_ratio: f64,
        pair: TradingPair,
        market: MarketSpec,
        exchange: DynExchange,
    ) -> Self {
        Self {
            config,
            init_iqv_ratio,
            pair,
            market,
            exchange,
            state: ActiveHedgeState::default(),
            in_flight: None,
        }
    }

    pub fn state(&self) -> &ActiveHedgeState {
        &self.state
    }

    pub fn in_flight(&self) -> Option<&OrderHandle> {
        self.in_flight.as_ref()
    }

    /// IQV ratio the hedge restores to.
    pub fn target_ratio(&self) -> f64 {
        self.init_iqv_ratio * self.config.active_hedge_iqv_ratio
    }

    /// Decide whether `snapshot` calls for a hedge. `None` when the move
    /// ratio is inside the band or the size is below `min_hedge_order_size`.
    pub fn plan(&self, snapshot: &TickSnapshot) -> HedgeResult<Option<ActiveHedgePlan>> {
        let m = snapshot.iqv_move_ratio();
        let threshold = self.config.active_hedge_iqv_ratio;
        let side = if m > threshold {
            OrderSide::Sell
        } else if m < -threshold && self.config.dual_sided_hedge {
            OrderSide::Buy
        } else {
            return Ok(None);
        };

        let target_ratio = self.target_ratio();
        let size = hedge_size(side, &snapshot.position, target_ratio)?;
        if size <= 0.0 || size < self.config.min_hedge_order_size {
            debug!(
                seq = snapshot.seq,
                %side,
                size,
                min = self.config.min_hedge_order_size,
                "Active hedge below minimum size"
            );
            return Ok(None);
        }

        Ok(Some(ActiveHedgePlan {
            side,
            size,
            target_ratio,
            seq: snapshot.seq,
        }))
    }

    /// One evaluation: resolve leftovers, plan, de-duplicate, execute, record.
    pub async fn tick(
        &mut self,
        snapshot: &TickSnapshot,
        shutdown: &CancellationToken,
    ) -> HedgeResult<Option<HedgeExecution>> {
        self.resolve_in_flight(shutdown).await?;

        if self.state.is_stale(snapshot.taken_at_ms) {
            debug!(
                seq = snapshot.seq,
                taken_at_ms = snapshot.taken_at_ms,
                settled_at_ms = ?self.state.settled_at_ms,
                "Snapshot predates last hedge, skipped"
            );
            return Ok(None);
        }

        let Some(plan) = self.plan(snapshot)? else {
            return Ok(None);
        };

        let now_ms = chrono::Utc::now().timestamp_millis();
        if self.state.is_duplicate(
            plan.size,
            plan.seq,
            now_ms,
            self.config.active_hedge_interval_ms,
            self.config.min_hedge_order_size,
        ) {
            debug!(seq = plan.seq, side = %plan.side, size = plan.size, "Duplicate active hedge skipped");
            return Ok(None);
        }

        info!(
            pair = %self.pair,
            seq = plan.seq,
            iqv_move_ratio = snapshot.iqv_move_ratio(),
            side = %plan.side,
            size = plan.size,
            target_ratio = plan.target_ratio,
            "Active hedge triggered"
        );

        let result = self.execute(plan.side, plan.size, shutdown).await;
        let settled_ms = chrono::Utc::now().timestamp_millis();
        self.state.settle(settled_ms);
        let execution = result?;
        if execution.is_some() {
            self.state.record(plan.size, plan.seq, settled_ms);
        }
        Ok(execution)
    }

    /// Bring a post-only hedge left by a failed execution to a final state.
    /// Its fills land in the balances, so the snapshot in hand is stale
    /// once this succeeds.
    async fn resolve_in_flight(&mut self, shutdown: &CancellationToken) -> HedgeResult<()> {
        let Some(handle) = self.in_flight.clone() else {
            return Ok(());
        };

        let status = match self.query_status(&handle, shutdown).await {
            Ok(status) => status,
            Err(HedgeError::Exchange(ExchangeError::OrderNotFound(_))) => OrderStatus::Cancelled,
            Err(e) => return Err(e),
        };
        let filled_during_cancel = if status.is_live() {
            self.cancel_resting(&handle, shutdown).await?
        } else {
            None
        };

        info!(
            order = %handle,
            ?status,
            filled_during_cancel = ?filled_during_cancel,
            "Leftover active hedge resolved"
        );
        self.in_flight = None;
        self.state.settle(chrono::Utc::now().timestamp_millis());
        Ok(())
    }

    /// Post-only at the touch, then the unfilled remainder at market after
    /// the grace period. `None` when the size rounds to zero lots.
    pub async fn execute(
        &mut self,
        side: OrderSide,
        size: f64,
        shutdown: &CancellationToken,
    ) -> HedgeResult<Option<HedgeExecution>> {
        let Some(lots) = self.market.quantize_size(size)? else {
            debug!(%side, size, "Active hedge rounds to zero lots");
            return Ok(None);
        };
        let size = lots.to_f64();

        let book = self.checked_book(side).await?;
        let touch = match side {
            OrderSide::Sell => book.ask,
            OrderSide::Buy => book.bid,
        };
        let price = self.market.quantize_price(side, touch)?;
        let kind = OrderKind::Limit {
            price,
            post_only: true,
        };

        let handle = self.submit(side, kind, lots, shutdown).await?;
        self.in_flight = Some(handle.clone());
        debug!(order = %handle, %side, %price, size, "Post-only hedge resting");

        tokio::time::sleep(self.config.post_only_grace()).await;

        let status = self.query_status(&handle, shutdown).await?;
        let remaining = match status {
            OrderStatus::Filled { avg_price } => {
                self.in_flight = None;
                info!(order = %handle, %side, size, avg_price, "Active hedge filled as maker");
                return Ok(Some(HedgeExecution::maker(side, size, handle)));
            }
            OrderStatus::PartiallyFilled { remaining, .. } => remaining,
            OrderStatus::Open => size,
            // Post-only crossed at submission or expired unfilled.
            OrderStatus::Cancelled => size,
        };
        if status.is_live() {
            if let Some(avg_price) = self.cancel_resting(&handle, shutdown).await? {
                self.in_flight = None;
                info!(order = %handle, %side, avg_price, "Active hedge filled during cancel");
                return Ok(Some(HedgeExecution::maker(side, size, handle)));
            }
        }
        self.in_flight = None;

        let maker_filled = (size - remaining).max(0.0);
        let Some(remaining_lots) = self.market.quantize_size(remaining)? else {
            return Ok(Some(HedgeExecution {
                side,
                size,
                post_only_order: handle,
                maker_filled,
                market_order: None,
            }));
        };

        self.checked_book(side).await?;
        let market_handle = self
            .submit(side, OrderKind::Market, remaining_lots, shutdown)
            .await?;
        info!(
            order = %market_handle,
            %side,
            maker_filled,
            taker_size = remaining_lots.to_f64(),
            "Active hedge remainder sent at market"
        );

        Ok(Some(HedgeExecution {
            side,
            size,
            post_only_order: handle,
            maker_filled,
            market_order: Some((market_handle, remaining_lots.to_f64())),
        }))
    }

    /// Top of book, refused when the price a taker on `side` would get has
    /// drifted more than `max_price_deviation` from mid.
    async fn checked_book(&self, side: OrderSide) -> HedgeResult<TopOfBook> {
        let mid = self.exchange.mid_price(&self.pair).await?;
        let book = self.exchange.top_of_book(&self.pair).await?;
        let taker_price = match side {
            OrderSide::Sell => book.bid,
            OrderSide::Buy => book.ask,
        };
        let deviation = ((taker_price - mid) / mid).abs();
        if !deviation.is_finite() || deviation >= self.config.max_price_deviation {
            Metrics::order_failure("price_guard");
            warn!(%side, mid, taker_price, deviation, "Active hedge refused, price off mid");
            return Err(HedgeError::PriceDeviation {
                price: taker_price,
                mid,
                max: self.config.max_price_deviation,
            });
        }
        Ok(book)
    }

    async fn submit(
        &self,
        side: OrderSide,
        kind: OrderKind,
        size: Size,
        shutdown: &CancellationToken,
    ) -> HedgeResult<OrderHandle> {
        let request = OrderRequest::new(self.pair.clone(), side, kind, size);
        let result = self
            .config
            .retry
            .run("active_hedge_place", shutdown, || {
                self.exchange.place_order(request.clone())
            })
            .await;
        match result {
            Ok(handle) => {
                Metrics::order_placed("active_hedge");
                Metrics::hedge_order(kind.label(), side.as_str());
                Ok(handle)
            }
            Err(e) => {
                Metrics::order_failure("place");
                Err(HedgeError::from(e))
            }
        }
    }

    async fn query_status(
        &self,
        handle: &OrderHandle,
        shutdown: &CancellationToken,
    ) -> HedgeResult<OrderStatus> {
        self.config
            .retry
            .run("active_hedge_status", shutdown, || {
                self.exchange.order_status(handle)
            })
            .await
            .map_err(|e| {
                Metrics::order_failure("status");
                HedgeError::from(e)
            })
    }

    /// Cancel a resting hedge. Returns the fill price when the order turned
    /// out to be fully filled before the cancel landed.
    async fn cancel_resting(
        &self,
        handle: &OrderHandle,
        shutdown: &CancellationToken,
    ) -> HedgeResult<Option<f64>> {
        let result = self
            .config
            .retry
            .run("active_hedge_cancel", shutdown, || {
                self.exchange.cancel_order(handle)
            })
            .await;
        match result {
            Ok(()) => Ok(None),
            Err(ExchangeError::Rejected(reason)) => {
                debug!(order = %handle, %reason, "Cancel rejected, re-checking status");
                match self.query_status(handle, shutdown).await? {
                    OrderStatus::Filled { avg_price } => Ok(Some(avg_price)),
                    _ => Err(HedgeError::Exchange(ExchangeError::Rejected(reason))),
                }
            }
            Err(e) => {
                Metrics::order_failure("cancel");
                Err(HedgeError::from(e))
            }
        }
    }

    /// Evaluate the latest snapshot every `active_hedge_interval_ms` until
    /// `shutdown` is cancelled.
    pub async fn run(mut self, snapshots: SnapshotReceiver, shutdown: CancellationToken) {
        info!(
            pair = %self.pair,
            threshold = self.config.active_hedge_iqv_ratio,
            target_ratio = self.target_ratio(),
            interval_ms = self.config.active_hedge_interval_ms,
            dual_sided = self.config.dual_sided_hedge,
            "Active hedge started"
        );

        let mut ticker = tokio::time::interval(self.config.active_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = shutdown.cancelled() => break,
            }

            let snapshot: Option<Arc<TickSnapshot>> = snapshots.borrow().clone();
            let Some(snapshot) = snapshot else {
                continue;
            };

            if let Err(e) = self.tick(&snapshot, &shutdown).await {
                if e.is_degraded() {
                    warn!(seq = snapshot.seq, error = %e, "Active hedge degraded, retrying next tick");
                    Metrics::degraded("active_hedge");
                } else {
                    warn!(seq = snapshot.seq, error = %e, "Active hedge evaluation failed");
                }
            }
        }

        info!("Active hedge stopped");
    }
}
