//! # Edge Telemetry
//!
//! Structured logging bootstrap for edge-isc services.
//!
//! Builds a `tracing-subscriber` stack from environment-driven
//! configuration: an `EnvFilter` level filter plus either a pretty
//! console layer for development or a JSON layer for containers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use edge_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::for_service("gnss");
//!     let _guard = init_telemetry(&config).expect("Failed to init telemetry");
//!
//!     // Your service code here
//! }
//! ```

mod config;

pub use config::TelemetryConfig;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The log level filter did not parse, or a subscriber is already set.
    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),
}

/// Guard that keeps the subscriber installed for the process lifetime.
pub struct TelemetryGuard {
    _private: (),
}

/// Initialize structured logging.
///
/// Returns a guard to hold for the lifetime of the application.
///
/// # Errors
///
/// Returns [`TelemetryError::TracingInit`] if the level filter is
/// invalid or a global subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;

    if config.json_logs {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        if config.console_output {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init()
                .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .try_init()
                .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;
        }
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        if config.console_output {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .try_init()
                .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;
        }
    }

    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { _private: () })
}
