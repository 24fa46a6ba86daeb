//! Inventory risk scaling shared by every strategy.
//!
//! Raw bin sizes are multiplied by a side multiplier derived from the IQV
//! move ratio, capped per bin, then normalized so one side never commits
//! more than the balance that funds it.

use pmm_core::{Bin, ExposureConfig};
use tracing::debug;

/// Bid multiplier: 1 up to `inventory_rb_iqv_ratio`, 0 from `iqv_up_limit`,
/// linear in between.
pub fn buy_multiplier(iqv_move_ratio: f64, config: &ExposureConfig) -> f64 {
    let start = config.inventory_rb_iqv_ratio;
    let end = config.iqv_up_limit;
    let raw = if iqv_move_ratio <= start {
        1.0
    } else if iqv_move_ratio >= end {
        0.0
    } else {
        1.0 - (iqv_move_ratio - start) / (end - start)
    };
    clamp_unit(raw)
}

/// Ask multiplier: 1 down to `quote_rb_iqv_ratio`, 0 from `iqv_down_limit`,
/// linear in between.
pub fn sell_multiplier(iqv_move_ratio: f64, config: &ExposureConfig) -> f64 {
    let start = config.quote_rb_iqv_ratio;
    let end = config.iqv_down_limit;
    let raw = if iqv_move_ratio >= start {
        1.0
    } else if iqv_move_ratio <= end {
        0.0
    } else {
        1.0 - (start - iqv_move_ratio) / (start - end)
    };
    clamp_unit(raw)
}

#[inline]
fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// What a side's budget is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// Bids spend quote currency: `Σ size * price`.
    Notional,
    /// Asks spend inventory: `Σ size`.
    Quantity,
}

impl Budget {
    fn cost(&self, bins: &[Bin]) -> f64 {
        match self {
            Self::Notional => bins.iter().map(Bin::notional).sum(),
            Self::Quantity => bins.iter().map(|b| b.size).sum(),
        }
    }
}

/// Per-side sizing limits.
#[derive(Debug, Clone, Copy)]
pub struct SideLimits {
    pub multiplier: f64,
    pub budget: f64,
    pub kind: Budget,
    pub min_order_size: f64,
    pub max_order_size: f64,
}

/// Fit one side of the ladder.
///
/// `prices` holds every candidate bin (nearest first); `raw_sizes(n)`
/// returns the unscaled sizes for the first `n` bins. Starting with all
/// bins, sizes are scaled, capped and proportionally normalized into the
/// budget. If any bin ends up below `min_order_size` the side is retried
/// with one bin fewer, so the same budget spreads over fewer bins.
pub fn fit_side<F>(prices: &[f64], raw_sizes: F, limits: &SideLimits) -> Vec<Bin>
where
    F: Fn(usize) -> Vec<f64>,
{
    if limits.multiplier <= 0.0 || limits.budget.is_nan() || limits.budget <= 0.0 {
        return Vec::new();
    }

    for n in (1..=prices.len()).rev() {
        let mut bins: Vec<Bin> = prices[..n]
            .iter()
            .zip(raw_sizes(n))
            .map(|(&price, raw)| {
                Bin::new(price, (raw * limits.multiplier).min(limits.max_order_size))
            })
            .collect();

        let cost = limits.kind.cost(&bins);
        if cost > limits.budget {
            let factor = limits.budget / cost;
            for bin in &mut bins {
                bin.size *= factor;
            }
        }

        let fits = bins.len() == n
            && bins
                .iter()
                .all(|b| b.size.is_finite() && b.size > 0.0 && b.size >= limits.min_order_size);
        if fits {
            if n < prices.len() {
                debug!(
                    bins = n,
                    candidates = prices.len(),
                    budget = limits.budget,
                    "Ladder side shrunk to keep bins above min_order_size"
                );
            }
            return bins;
        }
    }

    Vec::new()
}
