//! # Service Configuration
//!
//! Runtime parameters for a `Service`, loaded from the environment.

use std::env;

use tracing::warn;

/// Reference under which the internal events publisher and subscriber are registered.
pub const EVENTS_QUEUE_NAME: &str = "frame.events.internal";

/// Concurrency of the internal events subscriber unless overridden.
pub const DEFAULT_EVENTS_CONCURRENCY: usize = 10;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service name, used in log lines.
    pub service_name: String,
    /// Transport URL of the internal events queue.
    pub events_queue_url: String,
    /// Concurrency limit of the internal events subscriber.
    pub events_concurrency: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "frame".to_string(),
            events_queue_url: format!("mem://{EVENTS_QUEUE_NAME}"),
            events_concurrency: DEFAULT_EVENTS_CONCURRENCY,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FRAME_SERVICE_NAME`: Service name (default: frame)
    /// - `EVENTS_QUEUE_URL`: Internal events queue (default: `mem://frame.events.internal`)
    /// - `FRAME_EVENTS_CONCURRENCY`: Events subscriber concurrency (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let events_concurrency = match env::var("FRAME_EVENTS_CONCURRENCY") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "FRAME_EVENTS_CONCURRENCY is not a number, using default");
                defaults.events_concurrency
            }),
            Err(_) => defaults.events_concurrency,
        };

        Self {
            service_name: env::var("FRAME_SERVICE_NAME").unwrap_or(defaults.service_name),
            events_queue_url: env::var("EVENTS_QUEUE_URL").unwrap_or(defaults.events_queue_url),
            events_concurrency,
        }
    }
}
