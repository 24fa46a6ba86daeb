//! Strategy error types.

use pmm_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    /// Inconsistent strategy parameters. Fatal at startup.
    #[error("Strategy configuration error: {0}")]
    Config(String),

    /// Not enough price history yet. Callers keep their fallback.
    #[error("Insufficient data: need {needed} returns, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type StrategyResult<T> = Result<T, StrategyError>;
