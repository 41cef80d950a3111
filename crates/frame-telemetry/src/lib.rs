//! # Frame Telemetry
//!
//! Logging and metrics for the queue engine.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an `EnvFilter`, compact or JSON output
//! - **Metrics**: Prometheus counters, gauges and histograms per publisher/subscriber
//!
//! ## Usage
//!
//! ```rust,ignore
//! use frame_telemetry::{TelemetryConfig, init_telemetry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_telemetry(&config).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FRAME_SERVICE_NAME` | `frame` | Service name in log lines |
//! | `FRAME_LOG_LEVEL` | `info` | Log level filter |
//! | `FRAME_JSON_LOGS` | `false` | One JSON object per line |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, handler_timer, register_metrics, HANDLERS_IN_FLIGHT, HANDLER_DURATION,
    MESSAGES_ACKED, MESSAGES_NACKED, MESSAGES_PUBLISHED, PUBLISH_FAILURES, RECEIVE_FAILURES,
};

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
/// # Errors
///
/// Fails if a global subscriber is already installed or metrics were
/// registered before.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    // Initialize metrics first (synchronous, no output)
    register_metrics()?;

    init_logging(config)
}
