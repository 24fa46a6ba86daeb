//! Exchange error types.

use pmm_core::OrderHandle;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Placement, cancellation or query failed at the exchange boundary.
    #[error("Execution failure: {0}")]
    ExecutionFailure(String),

    /// The exchange refused the request outright.
    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderHandle),

    /// No price or balance available for the pair yet.
    #[error("Market data unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Core(#[from] pmm_core::CoreError),
}

impl ExchangeError {
    /// Whether the operation may succeed if retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExecutionFailure(_) | Self::Unavailable(_))
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
