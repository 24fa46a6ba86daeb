//! Bid-Ask strategy: liquidity pushed to the edges of the range.

use pmm_core::{ExposureConfig, ExposureSignal, Ladder, Position};

use crate::config::StrategyMode;
use crate::error::StrategyResult;
use crate::strategy::{BinSizer, LadderBuilder, Strategy};

/// Keeps the inner weight finite when `decay^(i+1)` underflows.
const WEIGHT_EPSILON: f64 = 1e-6;

/// Bin `i` weighs `1 / (decay^(i+1) + ε)`, normalized to one, so size grows
/// with distance from mid.
#[derive(Debug, Clone)]
pub struct BidAskStrategy {
    builder: LadderBuilder,
}

impl BidAskStrategy {
    pub fn new(builder: LadderBuilder) -> Self {
        Self { builder }
    }

    fn weights(&self, n: usize) -> Vec<f64> {
        let decay = self.builder.config().decay_rate;
        let raw: Vec<f64> = (0..n)
            .map(|i| 1.0 / (decay.powi(i as i32 + 1) + WEIGHT_EPSILON))
            .collect();
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|w| w / total).collect()
    }
}

impl BinSizer for BidAskStrategy {
    fn bid_sizes(&self, position: &Position, prices: &[f64]) -> Vec<f64> {
        self.weights(prices.len())
            .into_iter()
            .zip(prices)
            .map(|(w, &price)| position.quote_amount * w / price)
            .collect()
    }

    fn ask_sizes(&self, position: &Position, n: usize) -> Vec<f64> {
        self.weights(n)
            .into_iter()
            .map(|w| position.inventory_amount * w)
            .collect()
    }
}

impl Strategy for BidAskStrategy {
    fn mode(&self) -> StrategyMode {
        StrategyMode::BidAsk
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
    use crate::curve::CurveStrategy;
    use crate::strategy::{assert_ladder_within_balances, sample_exposure};

    fn builder() -> LadderBuilder {
        LadderBuilder::new(StrategyConfig::default(), sample_exposure())
    }

    #[test]
    fn test_sizes_grow_with_distance() {
        let ladder = BidAskStrategy::new(builder())
            .compute_current_bins(100.0, 10.0, 500.0)
            .unwrap();

        for side in [&ladder.bids, &ladder.asks] {
            assert_eq!(side.len(), 5);
            for k in 1..side.len() {
                assert!(side[0].size <= side[k].size);
            }
        }
    }

    #[test]
    fn test_inverse_of_curve() {
        let position = Position::new(100.0, 10.0, 500.0);
        let curve = CurveStrategy::new(builder())
            .compute_current_bins(position.price, position.inventory_amount, position.quote_amount)
            .unwrap();
        let bid_ask = BidAskStrategy::new(builder())
            .compute_current_bins(position.price, position.inventory_amount, position.quote_amount)
            .unwrap();

        let last = curve.asks.len() - 1;
        assert!(curve.asks[0].size >= curve.asks[last].size);
        assert!(bid_ask.asks[0].size <= bid_ask.asks[last].size);
        assert!(curve.bids[0].size >= curve.bids[last].size);
        assert!(bid_ask.bids[0].size <= bid_ask.bids[last].size);
    }

    #[test]
    fn test_bids_spend_at_most_quote() {
        let position = Position::new(100.0, 10.0, 500.0);
        let ladder = BidAskStrategy::new(builder())
            .compute_current_bins(position.price, position.inventory_amount, position.quote_amount)
            .unwrap();

        // weights sum to one, so bids commit the whole quote balance
        assert!((ladder.bid_notional() - 500.0).abs() < 1e-6);
        assert_ladder_within_balances(&ladder, &position);
    }

    #[test]
    fn test_weights_normalized() {
        let strategy = BidAskStrategy::new(builder());
        let weights = strategy.weights(5);
        let total: f64 = weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(weights.windows(2).all(|w| w[0] < w[1]));
    }
}
