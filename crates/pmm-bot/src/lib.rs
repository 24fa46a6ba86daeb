//! IQV passive market maker.
//!
//! Main application that orchestrates all components:
//! - Exposure snapshots from exchange balances and mid price
//! - Quote ladder refresh (Spot / Curve / Bid-Ask / Auto)
//! - Volatility sampling for auto mode
//! - Active and passive hedging

pub mod app;
pub mod config;
pub mod error;
pub mod quoting;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use quoting::{LiveQuote, QuotingLoop, RoundFills};
