//! Strategy trait and the ladder pipeline shared by all variants.

use pmm_core::{ExposureConfig, ExposureSignal, Ladder, Position};

use crate::auto_mode::AutoModeStrategy;
use crate::bid_ask::BidAskStrategy;
use crate::config::{StrategyConfig, StrategyMode};
use crate::curve::CurveStrategy;
use crate::error::{StrategyError, StrategyResult};
use crate::risk_scaling::{buy_multiplier, fit_side, sell_multiplier, Budget, SideLimits};
use crate::spot::SpotStrategy;

/// A quoting algorithm.
pub trait Strategy: Send + Sync {
    /// The variant producing the next ladder. Auto mode reports the
    /// strategy it currently delegates to.
    fn mode(&self) -> StrategyMode;

    fn exposure_config(&self) -> &ExposureConfig;

    /// Build the ladder for one snapshot. `exposure` must be derived from
    /// `position`; it is passed in so every consumer of a tick shares it.
    fn compute_bins(&self, position: &Position, exposure: &ExposureSignal)
        -> StrategyResult<Ladder>;

    /// Convenience entry point computing the exposure signal itself.
    fn compute_current_bins(
        &self,
        current_price: f64,
        cur_inventory_amount: f64,
        cur_quote_amount: f64,
    ) -> StrategyResult<Ladder> {
        let position = Position::new(current_price, cur_inventory_amount, cur_quote_amount);
        let exposure =
            ExposureSignal::from_position(&position, self.exposure_config().init_iqv_ratio)?;
        self.compute_bins(&position, &exposure)
    }

    /// Feed the latest effective volatility. Only auto mode cares.
    fn observe_volatility(&mut self, _effective_vol: f64) {}
}

/// Build the configured strategy after validating its parameters.
pub fn build_strategy(
    config: &StrategyConfig,
    exposure: ExposureConfig,
) -> StrategyResult<Box<dyn Strategy>> {
    config.validate()?;
    exposure.validate()?;

    let builder = LadderBuilder::new(config.clone(), exposure);
    Ok(match config.mode {
        StrategyMode::Spot => Box::new(SpotStrategy::new(builder)),
        StrategyMode::Curve => Box::new(CurveStrategy::new(builder)),
        StrategyMode::BidAsk => Box::new(BidAskStrategy::new(builder)),
        StrategyMode::Auto => Box::new(AutoModeStrategy::new(builder)),
    })
}

// ============================================================================
// Ladder pipeline
// ============================================================================

/// Raw, unscaled sizes for a variant.
pub(crate) trait BinSizer {
    /// Sizes for bids at `prices` (nearest first).
    fn bid_sizes(&self, position: &Position, prices: &[f64]) -> Vec<f64>;

    /// Sizes for the first `n` asks.
    fn ask_sizes(&self, position: &Position, n: usize) -> Vec<f64>;
}

/// Grid geometry plus risk scaling. Each variant only supplies raw sizes.
#[derive(Debug, Clone)]
pub struct LadderBuilder {
    config: StrategyConfig,
    exposure: ExposureConfig,
}

impl LadderBuilder {
    pub fn new(config: StrategyConfig, exposure: ExposureConfig) -> Self {
        Self { config, exposure }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn exposure(&self) -> &ExposureConfig {
        &self.exposure
    }

    /// Bid prices below mid, nearest first.
    pub fn bid_prices(&self, price: f64) -> StrategyResult<Vec<f64>> {
        let step = self.config.step_ratio();
        let prices: Vec<f64> = (0..self.config.bid_bin_nums())
            .map(|i| price * (1.0 - (i + 1) as f64 * step))
            .collect();
        check_monotonic(&prices, price, |prev, next| next < prev)?;
        Ok(prices)
    }

    /// Ask prices above mid, nearest first.
    pub fn ask_prices(&self, price: f64) -> StrategyResult<Vec<f64>> {
        let step = self.config.step_ratio();
        let prices: Vec<f64> = (0..self.config.ask_bin_nums())
            .map(|i| price * (1.0 + (i + 1) as f64 * step))
            .collect();
        check_monotonic(&prices, price, |prev, next| next > prev)?;
        Ok(prices)
    }

    pub(crate) fn build<S: BinSizer>(
        &self,
        sizer: &S,
        position: &Position,
        exposure: &ExposureSignal,
    ) -> StrategyResult<Ladder> {
        if !(position.price.is_finite() && position.price > 0.0) {
            return Err(pmm_core::CoreError::InvalidInput(format!(
                "price must be > 0, got {}",
                position.price
            ))
            .into());
        }

        let bid_prices = self.bid_prices(position.price)?;
        let ask_prices = self.ask_prices(position.price)?;

        let bid_limits = SideLimits {
            multiplier: buy_multiplier(exposure.iqv_move_ratio, &self.exposure),
            budget: position.quote_amount,
            kind: Budget::Notional,
            min_order_size: self.config.min_order_size,
            max_order_size: self.config.max_order_size,
        };
        let ask_limits = SideLimits {
            multiplier: sell_multiplier(exposure.iqv_move_ratio, &self.exposure),
            budget: position.inventory_amount,
            kind: Budget::Quantity,
            min_order_size: self.config.min_order_size,
            max_order_size: self.config.max_order_size,
        };

        let bids = fit_side(
            &bid_prices,
            |n| sizer.bid_sizes(position, &bid_prices[..n]),
            &bid_limits,
        );
        let asks = fit_side(
            &ask_prices,
            |n| sizer.ask_sizes(position, n),
            &ask_limits,
        );

        Ok(Ladder::new(bids, asks))
    }
}

fn check_monotonic<F>(prices: &[f64], mid: f64, ordered: F) -> StrategyResult<()>
where
    F: Fn(f64, f64) -> bool,
{
    let mut prev = mid;
    for &next in prices {
        if !(next.is_finite() && next > 0.0 && ordered(prev, next)) {
            return Err(StrategyError::Config(format!(
                "ladder prices are not monotonic around mid {mid}: {prices:?}"
            )));
        }
        prev = next;
    }
    Ok(())
}

/// Geometric weights `decay^0 .. decay^(n-1)`.
pub(crate) fn decay_weights(decay_rate: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| decay_rate.powi(i as i32)).collect()
}

/// Invariant checks used by every variant's tests.
#[cfg(test)]
pub(crate) fn assert_ladder_within_balances(ladder: &Ladder, position: &Position) {
    let tolerance = 1e-9;
    if let Some(vwap) = ladder.vwap_bid_price() {
        assert!(
            ladder.bid_size() * vwap <= position.quote_amount * (1.0 + tolerance),
            "bids overcommit quote: {} > {}",
            ladder.bid_size() * vwap,
            position.quote_amount
        );
    }
    assert!(
        ladder.ask_size() <= position.inventory_amount * (1.0 + tolerance),
        "asks overcommit inventory: {} > {}",
        ladder.ask_size(),
        position.inventory_amount
    );
    for pair in ladder.bids.windows(2) {
        assert!(pair[1].price < pair[0].price);
    }
    for pair in ladder.asks.windows(2) {
        assert!(pair[1].price > pair[0].price);
    }
    assert!(ladder.bids.iter().all(|b| b.price < position.price));
    assert!(ladder.asks.iter().all(|b| b.price > position.price));
}

/// Exposure config matching a 10 @ 100 / 500 quote starting position.
#[cfg(test)]
pub(crate) fn sample_exposure() -> ExposureConfig {
    ExposureConfig::new(1000.0 / 1500.0, 0.6, -0.6, 0.3, -0.3).unwrap()
}
