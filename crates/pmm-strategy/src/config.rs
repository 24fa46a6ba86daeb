//! Strategy and volatility configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{StrategyError, StrategyResult};

/// Quoting algorithm.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// Equal size per bin.
    Spot,
    /// Size decays with distance from mid.
    Curve,
    /// Size grows with distance from mid.
    #[serde(alias = "bid-ask")]
    BidAsk,
    /// Picks Curve/Spot/BidAsk from realized volatility.
    #[default]
    Auto,
}

impl StrategyMode {
    pub const ALL: [StrategyMode; 4] = [Self::Spot, Self::Curve, Self::BidAsk, Self::Auto];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Curve => "curve",
            Self::BidAsk => "bid_ask",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quote ladder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub mode: StrategyMode,

    /// Ladder refresh interval in milliseconds.
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Highest ask as a fraction above mid (0.02 = 2%).
    #[serde(default = "default_pct_limit")]
    pub price_up_pct_limit: f64,

    /// Lowest bid as a fraction below mid.
    #[serde(default = "default_pct_limit")]
    pub price_down_pct_limit: f64,

    /// Distance between bins in basis points.
    #[serde(default = "default_bin_step")]
    pub bin_step: u32,

    /// Total live orders across both sides. Each side gets half.
    #[serde(default = "default_live_order_nums")]
    pub live_order_nums: usize,

    /// Bins smaller than this shrink the ladder instead of being posted.
    #[serde(default = "default_min_order_size")]
    pub min_order_size: f64,

    /// Per-bin size cap.
    #[serde(default = "default_max_order_size")]
    pub max_order_size: f64,

    /// Geometric decay for the Curve and BidAsk weights.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,

    /// Auto mode uses Curve below this effective volatility.
    #[serde(default = "default_vol_lower_threshold")]
    pub vol_lower_threshold: f64,

    /// Auto mode uses BidAsk above this effective volatility.
    #[serde(default = "default_vol_upper_threshold")]
    pub vol_upper_threshold: f64,
}

fn default_update_interval_ms() -> u64 {
    30_000
}

fn default_pct_limit() -> f64 {
    0.02
}

fn default_bin_step() -> u32 {
    40
}

fn default_live_order_nums() -> usize {
    10
}

fn default_min_order_size() -> f64 {
    0.1
}

fn default_max_order_size() -> f64 {
    5.0
}

fn default_decay_rate() -> f64 {
    0.95
}

fn default_vol_lower_threshold() -> f64 {
    5.0
}

fn default_vol_upper_threshold() -> f64 {
    25.0
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            mode: StrategyMode::default(),
            update_interval_ms: default_update_interval_ms(),
            price_up_pct_limit: default_pct_limit(),
            price_down_pct_limit: default_pct_limit(),
            bin_step: default_bin_step(),
            live_order_nums: default_live_order_nums(),
            min_order_size: default_min_order_size(),
            max_order_size: default_max_order_size(),
            decay_rate: default_decay_rate(),
            vol_lower_threshold: default_vol_lower_threshold(),
            vol_upper_threshold: default_vol_upper_threshold(),
        }
    }
}

impl StrategyConfig {
    /// `bin_step` as a fraction of price.
    #[inline]
    pub fn step_ratio(&self) -> f64 {
        f64::from(self.bin_step) / 10_000.0
    }

    /// Number of bid bins: grid size below mid, capped at half the live orders.
    pub fn bid_bin_nums(&self) -> usize {
        self.bins_within(self.price_down_pct_limit)
    }

    /// Number of ask bins.
    pub fn ask_bin_nums(&self) -> usize {
        self.bins_within(self.price_up_pct_limit)
    }

    fn bins_within(&self, pct_limit: f64) -> usize {
        let step = self.step_ratio();
        if step <= 0.0 {
            return 0;
        }
        // Guard against 0.02 / 0.004 landing at 4.999...
        let grid = (pct_limit / step + 1e-9).floor() as usize;
        grid.min(self.live_order_nums / 2)
    }

    /// Midpoint of the volatility band, used before any reading exists.
    pub fn neutral_vol(&self) -> f64 {
        (self.vol_lower_threshold + self.vol_upper_threshold) / 2.0
    }

    pub fn validate(&self) -> StrategyResult<()> {
        if self.bin_step == 0 {
            return Err(StrategyError::Config("bin_step must be > 0".to_string()));
        }
        for (name, pct) in [
            ("price_up_pct_limit", self.price_up_pct_limit),
            ("price_down_pct_limit", self.price_down_pct_limit),
        ] {
            if !(pct > 0.0 && pct < 1.0) {
                return Err(StrategyError::Config(format!(
                    "{name} must be in (0, 1), got {pct}"
                )));
            }
        }
        if self.bid_bin_nums() == 0 || self.ask_bin_nums() == 0 {
            return Err(StrategyError::Config(format!(
                "bin_step {}bps leaves no bins inside the price limits with live_order_nums {}",
                self.bin_step, self.live_order_nums
            )));
        }
        if !(self.min_order_size >= 0.0 && self.min_order_size <= self.max_order_size) {
            return Err(StrategyError::Config(format!(
                "order size bounds must satisfy 0 <= min ({}) <= max ({})",
                self.min_order_size, self.max_order_size
            )));
        }
        if !(self.decay_rate > 0.0 && self.decay_rate < 1.0) {
            return Err(StrategyError::Config(format!(
                "decay_rate must be in (0, 1), got {}",
                self.decay_rate
            )));
        }
        if !(self.vol_lower_threshold < self.vol_upper_threshold) {
            return Err(StrategyError::Config(format!(
                "vol_lower_threshold ({}) must be below vol_upper_threshold ({})",
                self.vol_lower_threshold, self.vol_upper_threshold
            )));
        }
        if self.update_interval_ms == 0 {
            return Err(StrategyError::Config(
                "update_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Volatility sampling and estimator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityConfig {
    /// How often a price is sampled into the estimator.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Prices requested from the feed per update.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_short_window")]
    pub short_window: usize,

    #[serde(default = "default_long_window")]
    pub long_window: usize,

    #[serde(default = "default_ewma_lambda")]
    pub ewma_lambda: f64,

    /// Multiplier applied to the blended volatility.
    #[serde(default = "default_annualization_factor")]
    pub annualization_factor: f64,
}

fn default_sample_interval_ms() -> u64 {
    1_000
}

fn default_history_limit() -> usize {
    1_000
}

fn default_short_window() -> usize {
    60
}

fn default_long_window() -> usize {
    600
}

fn default_ewma_lambda() -> f64 {
    0.94
}

fn default_annualization_factor() -> f64 {
    3600f64.sqrt()
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            history_limit: default_history_limit(),
            short_window: default_short_window(),
            long_window: default_long_window(),
            ewma_lambda: default_ewma_lambda(),
            annualization_factor: default_annualization_factor(),
        }
    }
}

impl VolatilityConfig {
    pub fn validate(&self) -> StrategyResult<()> {
        if self.short_window < 2 || self.long_window < 2 {
            return Err(StrategyError::Config(
                "volatility windows must be >= 2".to_string(),
            ));
        }
        if self.short_window > self.long_window {
            return Err(StrategyError::Config(format!(
                "short_window ({}) must not exceed long_window ({})",
                self.short_window, self.long_window
            )));
        }
        if self.history_limit <= self.long_window {
            return Err(StrategyError::Config(format!(
                "history_limit ({}) must exceed long_window ({})",
                self.history_limit, self.long_window
            )));
        }
        if !(self.ewma_lambda > 0.0 && self.ewma_lambda < 1.0) {
            return Err(StrategyError::Config(format!(
                "ewma_lambda must be in (0, 1), got {}",
                self.ewma_lambda
            )));
        }
        if !(self.annualization_factor > 0.0 && self.annualization_factor.is_finite()) {
            return Err(StrategyError::Config(
                "annualization_factor must be > 0".to_string(),
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err(StrategyError::Config(
                "sample_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StrategyConfig::default();
        assert_eq!(config.mode, StrategyMode::Auto);
        assert_eq!(config.bin_step, 40);
        assert!((config.step_ratio() - 0.004).abs() < 1e-15);
        // 0.02 / 0.004 = 5 bins, live_order_nums / 2 = 5
        assert_eq!(config.bid_bin_nums(), 5);
        assert_eq!(config.ask_bin_nums(), 5);
        assert!((config.neutral_vol() - 15.0).abs() < 1e-12);
        assert!(config.validate().is_ok());

        let vol = VolatilityConfig::default();
        assert_eq!(vol.short_window, 60);
        assert_eq!(vol.long_window, 600);
        assert!((vol.annualization_factor - 60.0).abs() < 1e-12);
        assert!(vol.validate().is_ok());
    }

    #[test]
    fn test_bins_capped_by_live_orders() {
        let config = StrategyConfig {
            bin_step: 10,
            live_order_nums: 6,
            ..Default::default()
        };
        assert_eq!(config.bid_bin_nums(), 3);
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let zero_step = StrategyConfig {
            bin_step: 0,
            ..Default::default()
        };
        assert!(matches!(zero_step.validate(), Err(StrategyError::Config(_))));

        let step_too_wide = StrategyConfig {
            bin_step: 500,
            ..Default::default()
        };
        assert!(step_too_wide.validate().is_err());

        let inverted_sizes = StrategyConfig {
            min_order_size: 10.0,
            max_order_size: 1.0,
            ..Default::default()
        };
        assert!(inverted_sizes.validate().is_err());

        let inverted_vol = StrategyConfig {
            vol_lower_threshold: 30.0,
            ..Default::default()
        };
        assert!(inverted_vol.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            mode = "bid_ask"
            bin_step = 25
            price_up_pct_limit = 0.01
        "#;
        let config: StrategyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.mode, StrategyMode::BidAsk);
        assert_eq!(config.bin_step, 25);
        assert!((config.price_up_pct_limit - 0.01).abs() < 1e-15);
        assert!((config.decay_rate - 0.95).abs() < 1e-15);

        let legacy: StrategyConfig = toml::from_str(r#"mode = "bid-ask""#).unwrap();
        assert_eq!(legacy.mode, StrategyMode::BidAsk);
    }
}
