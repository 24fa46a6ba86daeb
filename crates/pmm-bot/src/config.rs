//! Application configuration.

use crate::error::{AppError, AppResult};
use pmm_core::{ExposureConfig, MarketSpec, Price, Size, TradingPair};
use pmm_hedge::HedgeConfig;
use pmm_strategy::{StrategyConfig, VolatilityConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Traded pair and its exchange precision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Inventory asset. Default: SUI.
    #[serde(default = "default_base")]
    pub base: String,
    /// Quote asset. Default: USDC.
    #[serde(default = "default_quote")]
    pub quote: String,
    /// Default: 0.0001.
    #[serde(default = "default_tick_size")]
    pub tick_size: Price,
    /// Default: 0.1.
    #[serde(default = "default_lot_size")]
    pub lot_size: Size,
}

fn default_base() -> String {
    "SUI".to_string()
}

fn default_quote() -> String {
    "USDC".to_string()
}

fn default_tick_size() -> Price {
    Price::new(Decimal::new(1, 4))
}

fn default_lot_size() -> Size {
    Size::new(Decimal::new(1, 1))
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            quote: default_quote(),
            tick_size: default_tick_size(),
            lot_size: default_lot_size(),
        }
    }
}

impl MarketConfig {
    pub fn pair(&self) -> TradingPair {
        TradingPair::new(self.base.clone(), self.quote.clone())
    }

    pub fn spec(&self) -> MarketSpec {
        MarketSpec::new(self.tick_size, self.lot_size)
    }
}

/// Exposure thresholds. The initial IQV ratio is either given directly or
/// derived from the starting balances at the startup mid price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureSection {
    #[serde(default)]
    pub init_inventory_amount: f64,
    #[serde(default)]
    pub init_quote_amount: f64,
    /// Overrides the ratio derived from the starting balances.
    #[serde(default)]
    pub init_iqv_ratio: Option<f64>,
    #[serde(default = "default_iqv_up_limit")]
    pub iqv_up_limit: f64,
    #[serde(default = "default_iqv_down_limit")]
    pub iqv_down_limit: f64,
    #[serde(default = "default_inventory_rb_iqv_ratio")]
    pub inventory_rb_iqv_ratio: f64,
    #[serde(default = "default_quote_rb_iqv_ratio")]
    pub quote_rb_iqv_ratio: f64,
}

fn default_iqv_up_limit() -> f64 {
    0.6
}

fn default_iqv_down_limit() -> f64 {
    -0.6
}

fn default_inventory_rb_iqv_ratio() -> f64 {
    0.3
}

fn default_quote_rb_iqv_ratio() -> f64 {
    -0.3
}

impl Default for ExposureSection {
    fn default() -> Self {
        Self {
            init_inventory_amount: 0.0,
            init_quote_amount: 0.0,
            init_iqv_ratio: None,
            iqv_up_limit: default_iqv_up_limit(),
            iqv_down_limit: default_iqv_down_limit(),
            inventory_rb_iqv_ratio: default_inventory_rb_iqv_ratio(),
            quote_rb_iqv_ratio: default_quote_rb_iqv_ratio(),
        }
    }
}

impl ExposureSection {
    /// Resolve the exposure configuration at the startup `price`.
    pub fn resolve(&self, price: f64) -> AppResult<ExposureConfig> {
        let init_iqv_ratio = match self.init_iqv_ratio {
            Some(ratio) => ratio,
            None => ExposureConfig::init_iqv_ratio_from(
                self.init_inventory_amount,
                self.init_quote_amount,
                price,
            )
            .map_err(|e| AppError::Config(format!("init_iqv_ratio: {e}")))?,
        };
        ExposureConfig::new(
            init_iqv_ratio,
            self.iqv_up_limit,
            self.iqv_down_limit,
            self.inventory_rb_iqv_ratio,
            self.quote_rb_iqv_ratio,
        )
        .map_err(|e| AppError::Config(e.to_string()))
    }
}

/// Paper exchange used as the execution backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Starting mid price. Default: 1.0.
    #[serde(default = "default_initial_price")]
    pub initial_price: f64,
    /// Full bid/ask spread in basis points. Default: 10.
    #[serde(default = "default_spread_bps")]
    pub spread_bps: f64,
    /// Largest mid move per step of the simulated price, in basis points.
    /// 0 keeps the mid fixed. Default: 0.
    #[serde(default)]
    pub random_walk_bps: f64,
    /// Time between simulated price steps. Default: 1000.
    #[serde(default = "default_price_step_ms")]
    pub price_step_ms: u64,
    /// Seed for a reproducible price path.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_initial_price() -> f64 {
    1.0
}

fn default_spread_bps() -> f64 {
    10.0
}

fn default_price_step_ms() -> u64 {
    1_000
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_price: default_initial_price(),
            spread_bps: default_spread_bps(),
            random_walk_bps: 0.0,
            price_step_ms: default_price_step_ms(),
            seed: None,
        }
    }
}

fn default_snapshot_interval_ms() -> u64 {
    1_000
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub exposure: ExposureSection,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub volatility: VolatilityConfig,
    #[serde(default)]
    pub hedge: HedgeConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    /// How often balances and mid price are sampled.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            exposure: ExposureSection::default(),
            strategy: StrategyConfig::default(),
            volatility: VolatilityConfig::default(),
            hedge: HedgeConfig::default(),
            paper: PaperConfig::default(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Check every section. The exposure ordering is checked at the paper
    /// starting price.
    pub fn validate(&self) -> AppResult<()> {
        if !self.market.tick_size.is_positive() || self.market.lot_size.is_zero() {
            return Err(AppError::Config(format!(
                "tick_size ({}) and lot_size ({}) must be positive",
                self.market.tick_size, self.market.lot_size
            )));
        }
        if self.market.lot_size.inner().is_sign_negative() {
            return Err(AppError::Config(format!(
                "lot_size must be positive, got {}",
                self.market.lot_size
            )));
        }
        if !(self.paper.initial_price.is_finite() && self.paper.initial_price > 0.0) {
            return Err(AppError::Config(format!(
                "paper.initial_price must be positive, got {}",
                self.paper.initial_price
            )));
        }
        if !(self.paper.spread_bps.is_finite() && self.paper.spread_bps >= 0.0) {
            return Err(AppError::Config(format!(
                "paper.spread_bps must be non-negative, got {}",
                self.paper.spread_bps
            )));
        }
        let walk = self.paper.random_walk_bps;
        if !(walk.is_finite() && (0.0..10_000.0).contains(&walk)) {
            return Err(AppError::Config(format!(
                "paper.random_walk_bps must be in [0, 10000), got {walk}"
            )));
        }
        if self.paper.price_step_ms == 0 {
            return Err(AppError::Config(
                "paper.price_step_ms must be greater than zero".to_string(),
            ));
        }
        if self.snapshot_interval_ms == 0 {
            return Err(AppError::Config(
                "snapshot_interval_ms must be greater than zero".to_string(),
            ));
        }

        self.exposure.resolve(self.paper.initial_price)?;
        self.strategy
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        self.volatility
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        self.hedge
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(())
    }
}
