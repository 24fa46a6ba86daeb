//! Passive hedge: stop-market triggers around the mid, each protected by a
//! stop once it fills.
//!
//! ```text
//!            arm                 trigger fills            stop fills
//!   Idle ───────────► TriggerArmed ──────────► Entered ──────────► Idle
//!                       │    ▲
//!                       └────┘ refresh (|m| small, plan moved)
//! ```
//!
//! `PassivePolicy::decide` is pure: it maps (state, observed order statuses,
//! snapshot) to one `PassiveAction`. `PassiveHedger::apply` performs it.
//! A submission that fails leaves its slot empty; the next tick sees the
//! missing order and repairs it.

use pmm_core::{
    MarketSpec, OrderHandle, OrderKind, OrderRequest, OrderSide, OrderStatus, Price, Size,
    TradingPair,
};
use pmm_exchange::{DynExchange, ExchangeError, RetryPolicy};
use pmm_telemetry::Metrics;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HedgeConfig;
use crate::error::HedgeResult;
use crate::snapshot::{SnapshotReceiver, TickSnapshot};

// ============================================================================
// State
// ============================================================================

/// One armed stop-market trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerLeg {
    pub side: OrderSide,
    pub trigger_price: Price,
    /// `None` until the exchange accepted the order.
    pub order: Option<OrderHandle>,
}

/// Orders the passive hedge is responsible for.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PassiveHedgeState {
    #[default]
    Idle,
    TriggerArmed {
        /// SELL trigger below the mid.
        short: TriggerLeg,
        /// BUY trigger above the mid; only with `dual_sided_hedge`.
        long: Option<TriggerLeg>,
        size: Size,
    },
    Entered {
        /// Side of the filled trigger.
        side: OrderSide,
        entry_price: f64,
        stop_price: Price,
        stop_order: Option<OrderHandle>,
        size: Size,
    },
}

/// Order slots of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Short,
    Long,
    Stop,
}

impl Leg {
    fn purpose(self) -> &'static str {
        match self {
            Self::Short | Self::Long => "passive_trigger",
            Self::Stop => "passive_stop",
        }
    }

    fn order_kind(self) -> &'static str {
        match self {
            Self::Short | Self::Long => "trigger",
            Self::Stop => "stop",
        }
    }
}

impl PassiveHedgeState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::TriggerArmed { .. } => "trigger_armed",
            Self::Entered { .. } => "entered",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Prices and size currently armed.
    pub fn armed_plan(&self) -> Option<TriggerPlan> {
        match self {
            Self::TriggerArmed { short, long, size } => Some(TriggerPlan {
                short_price: short.trigger_price,
                long_price: long.as_ref().map(|l| l.trigger_price),
                size: *size,
            }),
            _ => None,
        }
    }

    /// Handle held in `leg`'s slot, if the slot exists and is filled.
    pub fn order(&self, leg: Leg) -> Option<&OrderHandle> {
        match (self, leg) {
            (Self::TriggerArmed { short, .. }, Leg::Short) => short.order.as_ref(),
            (Self::TriggerArmed { long: Some(long), .. }, Leg::Long) => long.order.as_ref(),
            (Self::Entered { stop_order, .. }, Leg::Stop) => stop_order.as_ref(),
            _ => None,
        }
    }

    /// Side, trigger price and size for (re)submitting `leg`.
    fn leg_order(&self, leg: Leg) -> Option<(OrderSide, Price, Size)> {
        match (self, leg) {
            (Self::TriggerArmed { short, size, .. }, Leg::Short) => {
                Some((short.side, short.trigger_price, *size))
            }
            (Self::TriggerArmed { long: Some(long), size, .. }, Leg::Long) => {
                Some((long.side, long.trigger_price, *size))
            }
            (
                Self::Entered {
                    side,
                    stop_price,
                    size,
                    ..
                },
                Leg::Stop,
            ) => Some((side.opposite(), *stop_price, *size)),
            _ => None,
        }
    }

    fn slot_mut(&mut self, leg: Leg) -> Option<&mut Option<OrderHandle>> {
        match (self, leg) {
            (Self::TriggerArmed { short, .. }, Leg::Short) => Some(&mut short.order),
            (Self::TriggerArmed { long: Some(long), .. }, Leg::Long) => Some(&mut long.order),
            (Self::Entered { stop_order, .. }, Leg::Stop) => Some(stop_order),
            _ => None,
        }
    }

    /// Every handle the state holds.
    pub fn live_orders(&self) -> Vec<OrderHandle> {
        [Leg::Short, Leg::Long, Leg::Stop]
            .into_iter()
            .filter_map(|leg| self.order(leg).cloned())
            .collect()
    }
}

/// Trigger prices and size computed from one snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerPlan {
    pub short_price: Price,
    pub long_price: Option<Price>,
    pub size: Size,
}

/// Exchange statuses of the state's orders. `None` means no order is on
/// record for the slot or the exchange does not know it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PassiveObservation {
    pub short: Option<OrderStatus>,
    pub long: Option<OrderStatus>,
    pub stop: Option<OrderStatus>,
}

impl PassiveObservation {
    fn get(&self, leg: Leg) -> Option<OrderStatus> {
        match leg {
            Leg::Short => self.short,
            Leg::Long => self.long,
            Leg::Stop => self.stop,
        }
    }
}

/// Result of cancelling an order the hedge no longer wants.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CancelOutcome {
    /// Not working on the exchange anymore, nothing executed.
    Gone,
    /// The cancel lost the race against a fill.
    Filled(OrderStatus),
    /// The exchange could not be reached.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PassiveAction {
    Arm(TriggerPlan),
    TriggerFilled {
        leg: Leg,
        entry_price: f64,
        filled: f64,
        /// The trigger still has a working remainder to cancel.
        partial: bool,
    },
    Refresh(TriggerPlan),
    Repair(Vec<Leg>),
    StopFilled { exit_price: f64 },
    Hold,
}

// ============================================================================
// PassivePolicy
// ============================================================================

/// Pure decision logic of the passive hedge.
#[derive(Debug, Clone)]
pub struct PassivePolicy {
    config: HedgeConfig,
    market: MarketSpec,
}

impl PassivePolicy {
    pub fn new(config: HedgeConfig, market: MarketSpec) -> Self {
        Self { config, market }
    }

    pub fn config(&self) -> &HedgeConfig {
        &self.config
    }

    /// Trigger plan around the snapshot price. `None` when the hedge size
    /// rounds to zero lots.
    pub fn plan(&self, snapshot: &TickSnapshot) -> HedgeResult<Option<TriggerPlan>> {
        let price = snapshot.position.price;
        let ratio = self.config.passive_hedge_ratio;
        let raw_size = snapshot.position.inventory_amount * self.config.passive_hedge_proportion;
        let Some(size) = self.market.quantize_size(raw_size)? else {
            return Ok(None);
        };

        let short_price = self
            .market
            .quantize_price(OrderSide::Sell, price * (1.0 - ratio))?;
        let long_price = if self.config.dual_sided_hedge {
            Some(
                self.market
                    .quantize_price(OrderSide::Buy, price * (1.0 + ratio))?,
            )
        } else {
            None
        };

        Ok(Some(TriggerPlan {
            short_price,
            long_price,
            size,
        }))
    }

    /// Stop for an entry on `entry_side`: below entry for a long, above for a short.
    pub fn stop_price(&self, entry_side: OrderSide, entry_price: f64) -> HedgeResult<Price> {
        let sp = self.config.passive_hedge_sp_ratio;
        let stop_side = entry_side.opposite();
        let raw = match entry_side {
            OrderSide::Buy => entry_price * (1.0 - sp),
            OrderSide::Sell => entry_price * (1.0 + sp),
        };
        Ok(self.market.quantize_price(stop_side, raw)?)
    }

    pub fn decide(
        &self,
        state: &PassiveHedgeState,
        observation: &PassiveObservation,
        snapshot: &TickSnapshot,
    ) -> HedgeResult<PassiveAction> {
        match state {
            PassiveHedgeState::Idle => Ok(match self.plan(snapshot)? {
                Some(plan) => PassiveAction::Arm(plan),
                None => PassiveAction::Hold,
            }),

            PassiveHedgeState::TriggerArmed { long, size, .. } => {
                let mut legs = vec![Leg::Short];
                if long.is_some() {
                    legs.push(Leg::Long);
                }

                for &leg in &legs {
                    match observation.get(leg) {
                        Some(OrderStatus::Filled { avg_price }) => {
                            return Ok(PassiveAction::TriggerFilled {
                                leg,
                                entry_price: avg_price,
                                filled: size.to_f64(),
                                partial: false,
                            });
                        }
                        Some(OrderStatus::PartiallyFilled {
                            remaining,
                            avg_price,
                        }) => {
                            return Ok(PassiveAction::TriggerFilled {
                                leg,
                                entry_price: avg_price,
                                filled: (size.to_f64() - remaining).max(0.0),
                                partial: true,
                            });
                        }
                        _ => {}
                    }
                }

                if snapshot.iqv_move_ratio().abs() <= self.config.passive_hedge_refresh_iqv_ratio {
                    if let Some(plan) = self.plan(snapshot)? {
                        if state.armed_plan() != Some(plan) {
                            return Ok(PassiveAction::Refresh(plan));
                        }
                    }
                }

                let missing: Vec<Leg> = legs
                    .into_iter()
                    .filter(|&leg| {
                        matches!(observation.get(leg), None | Some(OrderStatus::Cancelled))
                    })
                    .collect();
                if missing.is_empty() {
                    Ok(PassiveAction::Hold)
                } else {
                    Ok(PassiveAction::Repair(missing))
                }
            }

            PassiveHedgeState::Entered { .. } => Ok(match observation.stop {
                Some(OrderStatus::Filled { avg_price }) => PassiveAction::StopFilled {
                    exit_price: avg_price,
                },
                None | Some(OrderStatus::Cancelled) => PassiveAction::Repair(vec![Leg::Stop]),
                Some(OrderStatus::Open | OrderStatus::PartiallyFilled { .. }) => {
                    PassiveAction::Hold
                }
            }),
        }
    }
}

// ============================================================================
// PassiveHedger
// ============================================================================

/// Owns the passive hedge state and drives it against the exchange.
pub struct PassiveHedger {
    policy: PassivePolicy,
    pair: TradingPair,
    market: MarketSpec,
    exchange: DynExchange,
    retry: RetryPolicy,
    state: PassiveHedgeState,
    /// Orders we stopped tracking whose cancel has not gone through.
    orphans: Vec<OrderHandle>,
}

impl PassiveHedger {
    pub fn new(
        config: HedgeConfig,
        pair: TradingPair,
        market: MarketSpec,
        exchange: DynExchange,
    ) -> Self {
        let retry = config.retry;
        Self {
            policy: PassivePolicy::new(config, market),
            pair,
            market,
            exchange,
            retry,
            state: PassiveHedgeState::Idle,
            orphans: Vec::new(),
        }
    }

    pub fn state(&self) -> &PassiveHedgeState {
        &self.state
    }

    pub fn orphans(&self) -> &[OrderHandle] {
        &self.orphans
    }

    pub fn policy(&self) -> &PassivePolicy {
        &self.policy
    }

    /// One evaluation: clean up orphans, observe, decide, apply.
    pub async fn tick(
        &mut self,
        snapshot: &TickSnapshot,
        shutdown: &CancellationToken,
    ) -> HedgeResult<PassiveAction> {
        self.retry_orphans(shutdown).await;

        let observation = self.observe(shutdown).await?;
        let action = self.policy.decide(&self.state, &observation, snapshot)?;
        if action != PassiveAction::Hold {
            debug!(
                seq = snapshot.seq,
                state = self.state.label(),
                iqv_move_ratio = snapshot.iqv_move_ratio(),
                ?action,
                "Passive hedge action"
            );
        }

        self.apply(&action, shutdown).await?;
        Metrics::passive_hedge_state_set(self.state.label());
        Ok(action)
    }

    pub async fn observe(&self, shutdown: &CancellationToken) -> HedgeResult<PassiveObservation> {
        Ok(PassiveObservation {
            short: self.status_of(Leg::Short, shutdown).await?,
            long: self.status_of(Leg::Long, shutdown).await?,
            stop: self.status_of(Leg::Stop, shutdown).await?,
        })
    }

    async fn status_of(
        &self,
        leg: Leg,
        shutdown: &CancellationToken,
    ) -> HedgeResult<Option<OrderStatus>> {
        match self.state.order(leg) {
            Some(handle) => self.status_by_handle(handle, shutdown).await,
            None => Ok(None),
        }
    }

    /// `None` when the exchange does not know the order.
    async fn status_by_handle(
        &self,
        handle: &OrderHandle,
        shutdown: &CancellationToken,
    ) -> HedgeResult<Option<OrderStatus>> {
        let result = self
            .retry
            .run("passive_hedge_status", shutdown, || {
                self.exchange.order_status(handle)
            })
            .await;
        match result {
            Ok(status) => Ok(Some(status)),
            Err(ExchangeError::OrderNotFound(_)) => Ok(None),
            Err(e) => {
                Metrics::order_failure("status");
                Err(e.into())
            }
        }
    }

    pub async fn apply(
        &mut self,
        action: &PassiveAction,
        shutdown: &CancellationToken,
    ) -> HedgeResult<()> {
        match action {
            PassiveAction::Hold => {}
            PassiveAction::Arm(plan) => self.arm(*plan, shutdown).await,
            PassiveAction::Refresh(plan) => {
                info!(
                    short_price = %plan.short_price,
                    long_price = ?plan.long_price.map(|p| p.to_f64()),
                    size = %plan.size,
                    "Refreshing passive hedge triggers"
                );
                if let Some((leg, status)) = self.cancel_triggers(shutdown).await {
                    // Filled between observe and cancel: protect the position.
                    let (entry_price, filled, partial) = self.fill_of(leg, status);
                    warn!(?leg, entry_price, filled, "Trigger filled during refresh, entering");
                    return self
                        .enter(leg, entry_price, filled, partial, shutdown)
                        .await;
                }
                self.state = PassiveHedgeState::Idle;
                self.arm(*plan, shutdown).await;
            }
            PassiveAction::TriggerFilled {
                leg,
                entry_price,
                filled,
                partial,
            } => {
                self.enter(*leg, *entry_price, *filled, *partial, shutdown)
                    .await?;
            }
            PassiveAction::Repair(legs) => {
                for &leg in legs {
                    let Some((side, price, size)) = self.state.leg_order(leg) else {
                        continue;
                    };
                    warn!(?leg, %side, %price, %size, "Passive hedge order missing, re-submitting");
                    let handle = self
                        .place_trigger(leg, side, price, size, shutdown)
                        .await;
                    if let Some(slot) = self.state.slot_mut(leg) {
                        *slot = handle;
                    }
                }
            }
            PassiveAction::StopFilled { exit_price } => {
                if let PassiveHedgeState::Entered {
                    side,
                    entry_price,
                    size,
                    ..
                } = &self.state
                {
                    info!(
                        pair = %self.pair,
                        entry_side = %side,
                        entry_price,
                        exit_price,
                        %size,
                        "Passive hedge stop filled, cycle complete"
                    );
                }
                self.state = PassiveHedgeState::Idle;
            }
        }
        Ok(())
    }

    async fn arm(&mut self, plan: TriggerPlan, shutdown: &CancellationToken) {
        let short_order = self
            .place_trigger(
                Leg::Short,
                OrderSide::Sell,
                plan.short_price,
                plan.size,
                shutdown,
            )
            .await;
        let long = match plan.long_price {
            Some(price) => Some(TriggerLeg {
                side: OrderSide::Buy,
                trigger_price: price,
                order: self
                    .place_trigger(Leg::Long, OrderSide::Buy, price, plan.size, shutdown)
                    .await,
            }),
            None => None,
        };

        info!(
            pair = %self.pair,
            short_price = %plan.short_price,
            long_price = ?plan.long_price.map(|p| p.to_f64()),
            size = %plan.size,
            "Passive hedge triggers armed"
        );
        self.state = PassiveHedgeState::TriggerArmed {
            short: TriggerLeg {
                side: OrderSide::Sell,
                trigger_price: plan.short_price,
                order: short_order,
            },
            long,
            size: plan.size,
        };
    }

    async fn enter(
        &mut self,
        leg: Leg,
        entry_price: f64,
        filled: f64,
        partial: bool,
        shutdown: &CancellationToken,
    ) -> HedgeResult<()> {
        let Some((entry_side, _, _)) = self.state.leg_order(leg) else {
            return Ok(());
        };
        let stop_price = self.policy.stop_price(entry_side, entry_price)?;
        let stop_size = self.market.quantize_size(filled)?;

        let mut to_cancel: Vec<OrderHandle> = [Leg::Short, Leg::Long]
            .into_iter()
            .filter(|&other| other != leg)
            .filter_map(|other| self.state.order(other).cloned())
            .collect();
        if partial {
            to_cancel.extend(self.state.order(leg).cloned());
        }

        let Some(stop_size) = stop_size else {
            warn!(?leg, filled, "Passive hedge fill below one lot, returning to idle");
            for handle in to_cancel {
                self.cancel_or_orphan(handle, shutdown).await;
            }
            self.state = PassiveHedgeState::Idle;
            return Ok(());
        };

        let stop_side = entry_side.opposite();
        let stop_order = self
            .place_trigger(Leg::Stop, stop_side, stop_price, stop_size, shutdown)
            .await;
        info!(
            pair = %self.pair,
            %entry_side,
            entry_price,
            filled,
            %stop_price,
            stop_placed = stop_order.is_some(),
            "Passive hedge entered"
        );

        for handle in to_cancel {
            if let Some(status) = self.cancel_or_orphan(handle.clone(), shutdown).await {
                warn!(order = %handle, ?status, "Second trigger filled before its cancel");
            }
        }

        self.state = PassiveHedgeState::Entered {
            side: entry_side,
            entry_price,
            stop_price,
            stop_order,
            size: stop_size,
        };
        Ok(())
    }

    /// Submit a stop-market order. Failures are logged and leave the slot
    /// empty for the next repair.
    async fn place_trigger(
        &self,
        leg: Leg,
        side: OrderSide,
        trigger_price: Price,
        size: Size,
        shutdown: &CancellationToken,
    ) -> Option<OrderHandle> {
        let purpose = leg.purpose();
        let request = OrderRequest::new(
            self.pair.clone(),
            side,
            OrderKind::Trigger { trigger_price },
            size,
        );
        let result = self
            .retry
            .run("passive_hedge_place", shutdown, || {
                self.exchange.place_order(request.clone())
            })
            .await;
        match result {
            Ok(handle) => {
                Metrics::order_placed(purpose);
                Metrics::hedge_order(leg.order_kind(), side.as_str());
                debug!(order = %handle, %side, %trigger_price, %size, purpose, "Passive hedge order placed");
                Some(handle)
            }
            Err(e) => {
                Metrics::order_failure("place");
                if e.is_retryable() {
                    Metrics::degraded("passive_hedge");
                }
                warn!(%side, %trigger_price, %size, purpose, error = %e, "Passive hedge order failed");
                None
            }
        }
    }

    /// Cancel both triggers ahead of a refresh. Returns the first trigger
    /// found to have filled; the remaining legs are left to `enter`.
    async fn cancel_triggers(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Option<(Leg, OrderStatus)> {
        for leg in [Leg::Short, Leg::Long] {
            let Some(handle) = self.state.order(leg).cloned() else {
                continue;
            };
            if let Some(status) = self.cancel_or_orphan(handle, shutdown).await {
                return Some((leg, status));
            }
        }
        None
    }

    /// Entry price, filled size and whether a remainder is still working.
    fn fill_of(&self, leg: Leg, status: OrderStatus) -> (f64, f64, bool) {
        let size = self
            .state
            .leg_order(leg)
            .map(|(_, _, size)| size.to_f64())
            .unwrap_or_default();
        match status {
            OrderStatus::Filled { avg_price } => (avg_price, size, false),
            OrderStatus::PartiallyFilled {
                remaining,
                avg_price,
            } => (avg_price, (size - remaining).max(0.0), true),
            OrderStatus::Open | OrderStatus::Cancelled => (0.0, 0.0, false),
        }
    }

    /// Cancel an order we no longer track; keep it as an orphan if the
    /// exchange could not be reached. Returns the status when it had filled.
    async fn cancel_or_orphan(
        &mut self,
        handle: OrderHandle,
        shutdown: &CancellationToken,
    ) -> Option<OrderStatus> {
        match self.try_cancel(&handle, shutdown).await {
            CancelOutcome::Gone => None,
            CancelOutcome::Filled(status) => Some(status),
            CancelOutcome::Failed => {
                warn!(order = %handle, "Cancel failed, keeping order as orphan");
                self.orphans.push(handle);
                None
            }
        }
    }

    async fn try_cancel(
        &self,
        handle: &OrderHandle,
        shutdown: &CancellationToken,
    ) -> CancelOutcome {
        let result = self
            .retry
            .run("passive_hedge_cancel", shutdown, || {
                self.exchange.cancel_order(handle)
            })
            .await;
        match result {
            Ok(()) | Err(ExchangeError::OrderNotFound(_)) => CancelOutcome::Gone,
            Err(ExchangeError::Rejected(reason)) => {
                debug!(order = %handle, %reason, "Cancel rejected, re-checking status");
                match self.status_by_handle(handle, shutdown).await {
                    Ok(Some(
                        status @ (OrderStatus::Filled { .. } | OrderStatus::PartiallyFilled { .. }),
                    )) => CancelOutcome::Filled(status),
                    Ok(None | Some(OrderStatus::Cancelled)) => CancelOutcome::Gone,
                    Ok(Some(OrderStatus::Open)) | Err(_) => CancelOutcome::Failed,
                }
            }
            Err(e) => {
                Metrics::order_failure("cancel");
                if e.is_retryable() {
                    Metrics::degraded("passive_hedge");
                }
                CancelOutcome::Failed
            }
        }
    }

    async fn retry_orphans(&mut self, shutdown: &CancellationToken) {
        if self.orphans.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.orphans);
        for handle in pending {
            match self.try_cancel(&handle, shutdown).await {
                CancelOutcome::Gone => info!(order = %handle, "Orphaned order cancelled"),
                CancelOutcome::Filled(status) => {
                    warn!(order = %handle, ?status, "Orphaned order filled before its cancel")
                }
                CancelOutcome::Failed => self.orphans.push(handle),
            }
        }
    }

    /// Tick every `passive_hedge_refresh_interval_secs` until `shutdown`.
    pub async fn run(mut self, snapshots: SnapshotReceiver, shutdown: CancellationToken) {
        let config = self.policy.config();
        info!(
            pair = %self.pair,
            ratio = config.passive_hedge_ratio,
            sp_ratio = config.passive_hedge_sp_ratio,
            proportion = config.passive_hedge_proportion,
            interval_secs = config.passive_hedge_refresh_interval_secs,
            "Passive hedge started"
        );

        let mut ticker = tokio::time::interval(config.passive_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Metrics::passive_hedge_state_set(self.state.label());

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = shutdown.cancelled() => break,
            }

            let snapshot = snapshots.borrow().clone();
            let Some(snapshot) = snapshot else {
                continue;
            };

            if let Err(e) = self.tick(&snapshot, &shutdown).await {
                if e.is_degraded() {
                    warn!(seq = snapshot.seq, state = self.state.label(), error = %e, "Passive hedge degraded, retrying next tick");
                    Metrics::degraded("passive_hedge");
                } else {
                    warn!(seq = snapshot.seq, state = self.state.label(), error = %e, "Passive hedge tick failed");
                }
            }
        }

        info!(
            state = self.state.label(),
            live_orders = self.state.live_orders().len(),
            orphans = self.orphans.len(),
            "Passive hedge stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmm_core::Position;
    use rust_decimal_macros::dec;

    const INIT: f64 = 0.5;

    fn market() -> MarketSpec {
        MarketSpec::new(Price::new(dec!(0.01)), Size::new(dec!(0.1)))
    }

    fn policy(config: HedgeConfig) -> PassivePolicy {
        PassivePolicy::new(config, market())
    }

    /// inventory 10 at 100 with 1000 quote: iqv 0.5, m = 0.
    fn neutral(price: f64) -> TickSnapshot {
        TickSnapshot::new(1, Position::new(price, 1000.0 / price, 1000.0), INIT).unwrap()
    }

    fn armed(plan: TriggerPlan) -> PassiveHedgeState {
        PassiveHedgeState::TriggerArmed {
            short: TriggerLeg {
                side: OrderSide::Sell,
                trigger_price: plan.short_price,
                order: Some(OrderHandle::new("short")),
            },
            long: plan.long_price.map(|price| TriggerLeg {
                side: OrderSide::Buy,
                trigger_price: price,
                order: Some(OrderHandle::new("long")),
            }),
            size: plan.size,
        }
    }

    fn live() -> PassiveObservation {
        PassiveObservation {
            short: Some(OrderStatus::Open),
            long: Some(OrderStatus::Open),
            stop: None,
        }
    }

    #[test]
    fn test_plan_prices_and_size() {
        let plan = policy(HedgeConfig::default())
            .plan(&neutral(100.0))
            .unwrap()
            .unwrap();
        assert_eq!(plan.short_price, Price::new(dec!(99)));
        assert_eq!(plan.long_price, Some(Price::new(dec!(101))));
        assert_eq!(plan.size, Size::new(dec!(5)));
    }

    #[test]
    fn test_plan_single_sided() {
        let config = HedgeConfig {
            dual_sided_hedge: false,
            ..Default::default()
        };
        let plan = policy(config).plan(&neutral(100.0)).unwrap().unwrap();
        assert_eq!(plan.long_price, None);
    }

    #[test]
    fn test_stop_price_direction() {
        let p = policy(HedgeConfig::default());
        assert_eq!(
            p.stop_price(OrderSide::Buy, 101.0).unwrap(),
            Price::new(dec!(100.50))
        );
        assert_eq!(
            p.stop_price(OrderSide::Sell, 99.0).unwrap(),
            Price::new(dec!(99.49))
        );
    }

    #[test]
    fn test_idle_arms() {
        let p = policy(HedgeConfig::default());
        let action = p
            .decide(&PassiveHedgeState::Idle, &PassiveObservation::default(), &neutral(100.0))
            .unwrap();
        assert!(matches!(action, PassiveAction::Arm(_)));
    }

    #[test]
    fn test_idle_without_inventory_holds() {
        let p = policy(HedgeConfig::default());
        let snapshot = TickSnapshot::new(1, Position::new(100.0, 0.0, 1000.0), INIT).unwrap();
        let action = p
            .decide(&PassiveHedgeState::Idle, &PassiveObservation::default(), &snapshot)
            .unwrap();
        assert_eq!(action, PassiveAction::Hold);
    }

    #[test]
    fn test_filled_trigger_enters() {
        let p = policy(HedgeConfig::default());
        let snapshot = neutral(100.0);
        let state = armed(p.plan(&snapshot).unwrap().unwrap());
        let observation = PassiveObservation {
            long: Some(OrderStatus::Filled { avg_price: 101.0 }),
            ..live()
        };
        assert_eq!(
            p.decide(&state, &observation, &snapshot).unwrap(),
            PassiveAction::TriggerFilled {
                leg: Leg::Long,
                entry_price: 101.0,
                filled: 5.0,
                partial: false,
            }
        );
    }

    #[test]
    fn test_partial_trigger_counts_as_entered() {
        let p = policy(HedgeConfig::default());
        let snapshot = neutral(100.0);
        let state = armed(p.plan(&snapshot).unwrap().unwrap());
        let observation = PassiveObservation {
            short: Some(OrderStatus::PartiallyFilled {
                remaining: 3.0,
                avg_price: 99.0,
            }),
            ..live()
        };
        assert_eq!(
            p.decide(&state, &observation, &snapshot).unwrap(),
            PassiveAction::TriggerFilled {
                leg: Leg::Short,
                entry_price: 99.0,
                filled: 2.0,
                partial: true,
            }
        );
    }

    #[test]
    fn test_refresh_only_when_plan_moves() {
        let p = policy(HedgeConfig::default());
        let snapshot = neutral(100.0);
        let state = armed(p.plan(&snapshot).unwrap().unwrap());

        assert_eq!(
            p.decide(&state, &live(), &snapshot).unwrap(),
            PassiveAction::Hold
        );

        let moved = neutral(105.0);
        assert!(matches!(
            p.decide(&state, &live(), &moved).unwrap(),
            PassiveAction::Refresh(_)
        ));
    }

    #[test]
    fn test_no_refresh_outside_band() {
        let p = policy(HedgeConfig::default());
        let state = armed(p.plan(&neutral(100.0)).unwrap().unwrap());
        // price moved, but iqv ~0.9 vs init 0.5 puts |m| far outside the band
        let skewed = TickSnapshot::new(2, Position::new(105.0, 9.0, 100.0), INIT).unwrap();
        assert!(skewed.iqv_move_ratio().abs() > 0.2);
        assert_eq!(
            p.decide(&state, &live(), &skewed).unwrap(),
            PassiveAction::Hold
        );
    }

    #[test]
    fn test_missing_trigger_is_repaired() {
        let p = policy(HedgeConfig::default());
        let snapshot = neutral(100.0);
        let state = armed(p.plan(&snapshot).unwrap().unwrap());
        let observation = PassiveObservation {
            short: Some(OrderStatus::Cancelled),
            long: None,
            stop: None,
        };
        assert_eq!(
            p.decide(&state, &observation, &snapshot).unwrap(),
            PassiveAction::Repair(vec![Leg::Short, Leg::Long])
        );
    }

    #[test]
    fn test_entered_transitions() {
        let p = policy(HedgeConfig::default());
        let snapshot = neutral(100.0);
        let state = PassiveHedgeState::Entered {
            side: OrderSide::Buy,
            entry_price: 101.0,
            stop_price: Price::new(dec!(100.5)),
            stop_order: Some(OrderHandle::new("stop")),
            size: Size::new(dec!(5)),
        };

        let open = PassiveObservation {
            stop: Some(OrderStatus::Open),
            ..Default::default()
        };
        assert_eq!(p.decide(&state, &open, &snapshot).unwrap(), PassiveAction::Hold);

        let gone = PassiveObservation::default();
        assert_eq!(
            p.decide(&state, &gone, &snapshot).unwrap(),
            PassiveAction::Repair(vec![Leg::Stop])
        );

        let filled = PassiveObservation {
            stop: Some(OrderStatus::Filled { avg_price: 100.5 }),
            ..Default::default()
        };
        assert_eq!(
            p.decide(&state, &filled, &snapshot).unwrap(),
            PassiveAction::StopFilled { exit_price: 100.5 }
        );
    }

    #[test]
    fn test_state_helpers() {
        let plan = TriggerPlan {
            short_price: Price::new(dec!(99)),
            long_price: Some(Price::new(dec!(101))),
            size: Size::new(dec!(5)),
        };
        let state = armed(plan);
        assert_eq!(state.label(), "trigger_armed");
        assert_eq!(state.armed_plan(), Some(plan));
        assert_eq!(state.live_orders().len(), 2);
        assert!(PassiveHedgeState::Idle.live_orders().is_empty());
    }
}
