//! Spot strategy: equal size per bin.

use pmm_core::{ExposureConfig, ExposureSignal, Ladder, Position};

use crate::config::StrategyMode;
use crate::error::StrategyResult;
use crate::strategy::{BinSizer, LadderBuilder, Strategy};

/// Uniform ladder. Bids split the quote balance (in inventory units at
/// mid) evenly; asks split the inventory evenly.
#[derive(Debug, Clone)]
pub struct SpotStrategy {
    builder: LadderBuilder,
}

impl SpotStrategy {
    pub fn new(builder: LadderBuilder) -> Self {
        Self { builder }
    }
}

impl BinSizer for SpotStrategy {
    fn bid_sizes(&self, position: &Position, prices: &[f64]) -> Vec<f64> {
        let n = prices.len();
        if n == 0 {
            return Vec::new();
        }
        let base = position.quote_amount / position.price / n as f64;
        vec![base; n]
    }

    fn ask_sizes(&self, position: &Position, n: usize) -> Vec<f64> {
        if n == 0 {
            return Vec::new();
        }
        vec![position.inventory_amount / n as f64; n]
    }
}

impl Strategy for SpotStrategy {
    fn mode(&self) -> StrategyMode {
        StrategyMode::Spot
    }

    fn exposure_config(&self) -> &ExposureConfig {
        self.builder.exposure()
    }

    fn compute_bins(
        &self,
        position: &Position,
        exposure: &ExposureSignal,
    ) -> StrategyResult<Ladder> {
        self.builder.build(self, position, exposure)
    }
}
