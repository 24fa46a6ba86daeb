//! Core domain types for the IQV passive market maker.
//!
//! This crate provides the types shared by the strategy and hedge layers:
//! - `Position`: the (price, inventory, quote) triple read every tick
//! - `ExposureConfig`, `ExposureSignal`: IQV ratio and IQV move ratio
//! - `Bin`, `Ladder`: quote ladders emitted by strategies
//! - `Price`, `Size`, `MarketSpec`: tick/lot quantization for submission
//! - `OrderSide`, `OrderKind`, `OrderStatus`: order model

pub mod decimal;
pub mod error;
pub mod exposure;
pub mod ladder;
pub mod market;
pub mod order;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use exposure::{ExposureConfig, ExposureSignal, Position};
pub use ladder::{Bin, Ladder};
pub use market::{MarketSpec, TradingPair};
pub use order::{ClientOrderId, OrderHandle, OrderKind, OrderRequest, OrderSide, OrderStatus};
