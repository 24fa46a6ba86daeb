//! Auto mode: volatility-driven strategy selection.
//!
//! ```text
//! effective_vol <  lower  → Curve   (calm: concentrate near mid)
//! effective_vol >  upper  → BidAsk  (volatile: push size outward)
//! otherwise               → Spot
//! ```
//!
//! The comparison is strict on both edges and has no debounce, so a reading
//! sitting on a threshold falls to Spot.

use pmm_core::{ExposureConfig, ExposureSignal, Ladder, Position};
use tracing::info;

use crate::bid_ask::BidAskStrategy;
use crate::config::StrategyMode;
use crate::curve::CurveStrategy;
use crate::error::StrategyResult;
use crate::spot::SpotStrategy;
use crate::strategy::{LadderBuilder, Strategy};

/// Decorator delegating each tick to Curve, Spot or BidAsk.
#[derive(Debug, Clone)]
pub struct AutoModeStrategy {
    spot: SpotStrategy,
    curve: CurveStrategy,
    bid_ask: BidAskStrategy,
    exposure: ExposureConfig,
    vol_lower_threshold: f64,
    vol_upper_threshold: f64,
    effective_vol: f64,
}

impl AutoModeStrategy {
    /// Starts at the midpoint of the volatility band (Spot) until the first
    /// reading arrives.
    pub fn new(builder: LadderBuilder) -> Self {
        let config = builder.config();
        Self {
            vol_lower_threshold: config.vol_lower_threshold,
            vol_upper_threshold: config.vol_upper_threshold,
            effective_vol: config.neutral_vol(),
            exposure: *builder.exposure(),
            spot: SpotStrategy::new(builder.clone()),
            curve: CurveStrategy::new(builder.clone()),
            bid_ask: BidAskStrategy::new(builder),
        }
    }

    pub fn effective_vol(&self) -> f64 {
        self.effective_vol
    }

    /// Strategy chosen for a volatility reading.
    pub fn select(&self, effective_vol: f64) -> StrategyMode {
        if effective_vol < self.vol_lower_threshold {
            StrategyMode::Curve
        } else if effective_vol > self.vol_upper_threshold {
            StrategyMode::BidAsk
        } else {
            StrategyMode::Spot
        }
    }

    fn delegate(&self) -> &dyn Strategy {
        match self.select(self.effective_vol) {
            StrategyMode::Curve => &self.curve,
            StrategyMode::BidAsk => &self.bid_ask,
            _ => &self.spot,
        }
    }
}

impl Strategy for AutoModeStrategy {
    fn mode(&self) -> StrategyMode {
        self.select(self.effective_vol)
    }

    fn exposure_config(&self) -> &ExposureConfig {
        &self.exposure
    }

    fn compute_bins(
        &self,
        position: &Position,
        exposure: &ExposureSignal,
    ) -> StrategyResult<Ladder> {
        self.delegate().compute_bins(position, exposure)
    }

    fn observe_volatility(&mut self, effective_vol: f64) {
        if !effective_vol.is_finite() {
            return;
        }
        let previous = self.select(self.effective_vol);
        self.effective_vol = effective_vol;
        let next = self.select(effective_vol);
        if previous != next {
            info!(
                from = %previous,
                to = %next,
                effective_vol,
                lower = self.vol_lower_threshold,
                upper = self.vol_upper_threshold,
                "Auto mode switched strategy"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::strategy::sample_exposure;

    fn auto() -> AutoModeStrategy {
        AutoModeStrategy::new(LadderBuilder::new(StrategyConfig::default(), sample_exposure()))
    }

    #[test]
    fn test_starts_in_spot() {
        let auto = auto();
        assert_eq!(auto.mode(), StrategyMode::Spot);
        assert!((auto.effective_vol() - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_selection_thresholds() {
        let auto = auto();
        assert_eq!(auto.select(4.99), StrategyMode::Curve);
        assert_eq!(auto.select(5.0), StrategyMode::Spot);
        assert_eq!(auto.select(25.0), StrategyMode::Spot);
        assert_eq!(auto.select(25.01), StrategyMode::BidAsk);
    }

    #[test]
    fn test_delegates_to_selected_strategy() {
        let mut auto = auto();
        let position = Position::new(100.0, 10.0, 500.0);
        let exposure =
            ExposureSignal::from_position(&position, auto.exposure_config().init_iqv_ratio)
                .unwrap();

        auto.observe_volatility(1.0);
        assert_eq!(auto.mode(), StrategyMode::Curve);
        let calm = auto.compute_bins(&position, &exposure).unwrap();
        assert!(calm.asks[0].size > calm.asks[4].size);

        auto.observe_volatility(40.0);
        assert_eq!(auto.mode(), StrategyMode::BidAsk);
        let wild = auto.compute_bins(&position, &exposure).unwrap();
        assert!(wild.asks[0].size < wild.asks[4].size);

        auto.observe_volatility(10.0);
        let spot = auto.compute_bins(&position, &exposure).unwrap();
        assert!((spot.asks[0].size - spot.asks[4].size).abs() < 1e-12);
    }

    #[test]
    fn test_ignores_non_finite_reading() {
        let mut auto = auto();
        auto.observe_volatility(1.0);
        auto.observe_volatility(f64::NAN);
        assert_eq!(auto.mode(), StrategyMode::Curve);
    }
}
