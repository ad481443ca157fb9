//! # Duplex Telemetry
//!
//! Observability for processes built on Duplex-IPC.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an env filter and pretty or JSON output
//! - **Metrics**: Prometheus counters for the messaging layer
//!
//! ## Usage
//!
//! ```rust,ignore
//! use duplex_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(&config).expect("Failed to init telemetry");
//!
//!     // Client / Server code here
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DUPLEX_SERVICE_NAME` | `duplex-ipc` | Service name in logs |
//! | `DUPLEX_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `DUPLEX_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `DUPLEX_JSON_LOGS` | `false` | JSON instead of pretty output |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, LoggingGuard};
pub use metrics::{encode_metrics, register_metrics, MetricsHandle};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard that must be held for the lifetime of the process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    let logging = init_logging(config)?;

    Ok(TelemetryGuard {
        _logging: logging,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logging: LoggingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
