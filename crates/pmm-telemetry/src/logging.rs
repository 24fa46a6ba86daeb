//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info,pmm=debug";

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines with span context.
    Json,
    /// Multi-line human output.
    Pretty,
    /// One line per event.
    Compact,
}

impl LogFormat {
    /// `PMM_LOG_FORMAT` (`json`, `pretty`, `compact`) wins; otherwise
    /// `RUST_ENV=production` means JSON and anything else pretty.
    pub fn select(log_format: Option<&str>, rust_env: Option<&str>) -> Self {
        match log_format.map(str::to_ascii_lowercase).as_deref() {
            Some("json") => return Self::Json,
            Some("pretty") => return Self::Pretty,
            Some("compact") => return Self::Compact,
            _ => {}
        }
        match rust_env {
            Some("production") => Self::Json,
            _ => Self::Pretty,
        }
    }

    pub fn from_env() -> Self {
        let log_format = std::env::var("PMM_LOG_FORMAT").ok();
        let rust_env = std::env::var("RUST_ENV").ok();
        Self::select(log_format.as_deref(), rust_env.as_deref())
    }
}

/// Initialize structured logging in the format picked by `LogFormat::from_env`.
///
/// Fails when a global subscriber is already installed.
pub fn init_logging() -> TelemetryResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(true).with_thread_names(true))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_selection() {
        assert_eq!(LogFormat::select(None, None), LogFormat::Pretty);
        assert_eq!(LogFormat::select(None, Some("production")), LogFormat::Json);
        assert_eq!(LogFormat::select(None, Some("staging")), LogFormat::Pretty);
        assert_eq!(
            LogFormat::select(Some("COMPACT"), Some("production")),
            LogFormat::Compact
        );
        assert_eq!(LogFormat::select(Some("json"), None), LogFormat::Json);
        // unknown values fall back to RUST_ENV
        assert_eq!(
            LogFormat::select(Some("xml"), Some("production")),
            LogFormat::Json
        );
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
