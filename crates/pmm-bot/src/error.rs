//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] pmm_core::CoreError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] pmm_strategy::StrategyError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] pmm_exchange::ExchangeError),

    #[error("Hedge error: {0}")]
    Hedge(#[from] pmm_hedge::HedgeError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] pmm_telemetry::TelemetryError),

    #[error("Preflight error: {0}")]
    Preflight(String),
}

pub type AppResult<T> = Result<T, AppError>;
