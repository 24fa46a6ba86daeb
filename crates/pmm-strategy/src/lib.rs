//! Quote ladder strategies for the IQV market maker.
//!
//! Provides:
//! - Spot, Curve and BidAsk ladder sizing
//! - Auto mode switching between them on realized volatility
//! - Shared inventory risk scaling and balance normalization
//! - The volatility estimator feeding auto mode
//!
//! # Architecture
//!
//! ```text
//! Snapshot(Position, ExposureSignal)
//!     → Strategy::compute_bins
//!          ├─ grid geometry (bin_step, pct limits, live_order_nums)
//!          ├─ variant raw sizes (Spot / Curve / BidAsk)
//!          └─ risk scaling: side multiplier → max cap → normalization → min size
//!     → Ladder
//! ```

pub mod auto_mode;
pub mod bid_ask;
pub mod config;
pub mod curve;
pub mod error;
pub mod risk_scaling;
pub mod spot;
pub mod strategy;
pub mod volatility;

pub use auto_mode::AutoModeStrategy;
pub use bid_ask::BidAskStrategy;
pub use config::{StrategyConfig, StrategyMode, VolatilityConfig};
pub use curve::CurveStrategy;
pub use error::{StrategyError, StrategyResult};
pub use risk_scaling::{buy_multiplier, sell_multiplier};
pub use spot::SpotStrategy;
pub use strategy::{build_strategy, LadderBuilder, Strategy};
pub use volatility::{VolatilityEstimator, VolatilityReading};
