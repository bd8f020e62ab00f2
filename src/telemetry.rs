//! Logging initialization
//!
//! Structured logs go to stdout, either as text or as one JSON object per line.
//! The filter comes from `RUST_LOG` when set.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "info,opensearch_operator=debug,kube=info,tower=warn,hyper=warn";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_telemetry(format: LogFormat) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}
