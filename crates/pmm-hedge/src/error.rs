//! Error types for pmm-hedge.

use pmm_core::CoreError;
use pmm_exchange::ExchangeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HedgeError {
    /// Sizing could not be computed from the snapshot (e.g. non-positive price).
    #[error("Hedge calculation error: {0}")]
    Calculation(String),

    #[error("Hedge configuration error: {0}")]
    Config(String),

    /// Taker price too far from mid to trade safely.
    #[error("Price {price} deviates from mid {mid} by more than {max}")]
    PriceDeviation { price: f64, mid: f64, max: f64 },

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl HedgeError {
    /// True when the failure came from an exhausted retry budget.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Exchange(e) if e.is_retryable())
    }
}

pub type HedgeResult<T> = Result<T, HedgeError>;
