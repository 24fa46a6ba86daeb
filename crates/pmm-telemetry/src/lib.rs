//! Prometheus metrics and structured logging for the IQV market maker.
//!
//! - Structured logging with tracing (JSON in production)
//! - Prometheus collectors for exposure, ladder, strategy and hedge state

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat};
pub use metrics::Metrics;
