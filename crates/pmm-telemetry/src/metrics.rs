//! Prometheus metrics for the market maker.
//!
//! Collectors register with the default registry on first use. Registration
//! only fails on a duplicate name, which panics on first touch.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Encoder, Gauge,
    GaugeVec, TextEncoder,
};

use crate::error::TelemetryResult;

/// Current IQV ratio.
pub static IQV_RATIO: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("pmm_iqv_ratio", "Inventory value / total value").unwrap()
});

/// Current IQV move ratio.
pub static IQV_MOVE_RATIO: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "pmm_iqv_move_ratio",
        "Deviation of the IQV ratio from its initial target"
    )
    .unwrap()
});

/// Latest blended volatility.
pub static EFFECTIVE_VOL: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("pmm_effective_vol", "Blended realized volatility").unwrap()
});

/// Strategy currently producing ladders.
/// Labels: mode (spot/curve/bid_ask)
pub static STRATEGY_MODE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pmm_strategy_mode",
        "Active quoting strategy (1=active, 0=inactive)",
        &["mode"]
    )
    .unwrap()
});

/// Bins in the last published ladder.
pub static LADDER_BINS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("pmm_ladder_bins", "Bins in the current ladder", &["side"]).unwrap()
});

/// Orders accepted by the exchange.
/// Labels: purpose (quote/active_hedge/passive_trigger/passive_stop)
pub static ORDERS_PLACED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_orders_placed_total",
        "Orders accepted by the exchange",
        &["purpose"]
    )
    .unwrap()
});

/// Exchange operations that failed.
/// Labels: op (place/cancel/status/snapshot/price_guard)
pub static ORDER_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_order_failures_total",
        "Failed exchange operations",
        &["op"]
    )
    .unwrap()
});

/// Base quantity executed against resting quotes.
/// Labels: side (buy/sell)
pub static QUOTE_FILLED_QTY: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_quote_filled_qty_total",
        "Base quantity filled on quotes",
        &["side"]
    )
    .unwrap()
});

/// Hedge orders submitted.
/// Labels: kind (post_only/market/trigger/stop), side
pub static HEDGE_ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_hedge_orders_total",
        "Hedge orders submitted",
        &["kind", "side"]
    )
    .unwrap()
});

/// Passive hedge state machine current state.
pub static PASSIVE_HEDGE_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pmm_passive_hedge_state",
        "Passive hedge state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Retry ceilings hit.
pub static DEGRADED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmm_degraded_total",
        "Operations that exhausted their retries",
        &["component"]
    )
    .unwrap()
});

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    /// Record the exposure signal of a snapshot.
    pub fn exposure(iqv_ratio: f64, iqv_move_ratio: f64) {
        IQV_RATIO.set(iqv_ratio);
        IQV_MOVE_RATIO.set(iqv_move_ratio);
    }

    pub fn effective_vol(value: f64) {
        EFFECTIVE_VOL.set(value);
    }

    /// Only the active mode is set to 1.
    pub fn strategy_mode_set(mode: &str) {
        for m in &["spot", "curve", "bid_ask"] {
            STRATEGY_MODE.with_label_values(&[m]).set(0.0);
        }
        STRATEGY_MODE.with_label_values(&[mode]).set(1.0);
    }

    pub fn ladder_bins(bids: usize, asks: usize) {
        LADDER_BINS.with_label_values(&["bid"]).set(bids as f64);
        LADDER_BINS.with_label_values(&["ask"]).set(asks as f64);
    }

    pub fn order_placed(purpose: &str) {
        ORDERS_PLACED_TOTAL.with_label_values(&[purpose]).inc();
    }

    pub fn order_failure(op: &str) {
        ORDER_FAILURES_TOTAL.with_label_values(&[op]).inc();
    }

    pub fn quote_filled(side: &str, qty: f64) {
        if qty > 0.0 {
            QUOTE_FILLED_QTY.with_label_values(&[side]).inc_by(qty);
        }
    }

    pub fn hedge_order(kind: &str, side: &str) {
        HEDGE_ORDERS_TOTAL.with_label_values(&[kind, side]).inc();
    }

    /// Only the active state is set to 1.
    pub fn passive_hedge_state_set(state: &str) {
        for s in &["idle", "trigger_armed", "entered"] {
            PASSIVE_HEDGE_STATE.with_label_values(&[s]).set(0.0);
        }
        PASSIVE_HEDGE_STATE.with_label_values(&[state]).set(1.0);
    }

    /// Record that a component gave up after its retry ceiling.
    pub fn degraded(component: &str) {
        DEGRADED_TOTAL.with_label_values(&[component]).inc();
    }

    /// Render the default registry in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_gauges_are_exclusive() {
        Metrics::passive_hedge_state_set("trigger_armed");
        Metrics::passive_hedge_state_set("entered");
        assert_eq!(
            PASSIVE_HEDGE_STATE
                .with_label_values(&["trigger_armed"])
                .get(),
            0.0
        );
        assert_eq!(PASSIVE_HEDGE_STATE.with_label_values(&["entered"]).get(), 1.0);

        Metrics::strategy_mode_set("curve");
        assert_eq!(STRATEGY_MODE.with_label_values(&["curve"]).get(), 1.0);
        assert_eq!(STRATEGY_MODE.with_label_values(&["spot"]).get(), 0.0);
    }

    #[test]
    fn test_gather_text_contains_metrics() {
        Metrics::exposure(0.7, 0.05);
        Metrics::degraded("passive_hedge");
        Metrics::quote_filled("buy", 1.5);
        let text = Metrics::gather_text().unwrap();
        assert!(text.contains("pmm_iqv_ratio"));
        assert!(text.contains("pmm_degraded_total"));
        assert!(text.contains("pmm_quote_filled_qty_total"));
    }
}
