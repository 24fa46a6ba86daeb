//! Curve strategy: liquidity concentrated near mid.

use pmm_core::{ExposureConfig, ExposureSignal, Ladder, Position};

use crate::config::StrategyMode;
use crate::error::StrategyResult;
use crate::strategy::{decay_weights, BinSizer, LadderBuilder, Strategy};

/// Bin `i` gets `max_size * decay^i`, where `max_size` spreads the side's
/// balance over the geometric weights.
#[derive(Debug, Clone)]
pub struct CurveStrategy {
    builder: LadderBuilder,
}

impl CurveStrategy {
    pub fn new(builder: LadderBuilder) -> Self {
        Self { builder }
    }

    fn curve(&self, total: f64, n: usize) -> Vec<f64> {
        let weights = decay_weights(self.builder.config().decay_rate, n);
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return vec![0.0; n];
        }
        let max_size = total / sum;
        weights.into_iter().map(|w| max_size * w).collect()
    }
}

impl BinSizer for CurveStrategy {
    fn bid_sizes(&self, position: &Position, prices: &[f64]) -> Vec<f64> {
        self.curve(position.quote_amount / position.price, prices.len())
    }

    fn ask_sizes(&self, position: &Position, n: usize) -> Vec<f64> {
        self.curve(position.inventory_amount, n)
    }
}

impl Strategy for CurveStrategy {
    fn mode(&self) -> StrategyMode {
        StrategyMode::Curve
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::strategy::{assert_ladder_within_balances, sample_exposure};

    fn strategy() -> CurveStrategy {
        CurveStrategy::new(LadderBuilder::new(StrategyConfig::default(), sample_exposure()))
    }

    #[test]
    fn test_sizes_decay_with_distance() {
        let ladder = strategy().compute_current_bins(100.0, 10.0, 500.0).unwrap();

        assert_eq!(ladder.bids.len(), 5);
        for side in [&ladder.bids, &ladder.asks] {
            for k in 1..side.len() {
                assert!(side[0].size >= side[k].size);
                assert!(side[k - 1].size > side[k].size);
            }
            let ratio = side[1].size / side[0].size;
            assert!((ratio - 0.95).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ask_side_spends_inventory() {
        let ladder = strategy().compute_current_bins(100.0, 10.0, 500.0).unwrap();
        // weights sum to the full inventory before normalization
        assert!((ladder.ask_size() - 10.0).abs() < 1e-9);
        assert_ladder_within_balances(&ladder, &Position::new(100.0, 10.0, 500.0));
    }

    #[test]
    fn test_ladder_invariant_across_inputs() {
        let strategy = strategy();
        for (price, inventory, quote) in [
            (100.0, 10.0, 500.0),
            (3.2, 150.0, 80.0),
            (100.0, 0.5, 2_000.0),
            (1.0, 1_000.0, 1_000.0),
        ] {
            let ladder = strategy
                .compute_current_bins(price, inventory, quote)
                .unwrap();
            assert_ladder_within_balances(&ladder, &Position::new(price, inventory, quote));
        }
    }
}
