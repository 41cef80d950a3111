//! Prometheus metrics for the queue engine.
//!
//! All metrics follow the naming convention: `frame_queue_<metric>_<unit>`
//! and are labelled by the publisher or subscriber reference.
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., messages_acked_total)
//! - **Gauge**: Value that can go up or down (e.g., handlers_in_flight)
//! - **Histogram**: Distribution of values (e.g., handler_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramTimer,
    HistogramVec, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PUBLISH PATH
    // =========================================================================

    /// Messages handed to a transport send primitive
    pub static ref MESSAGES_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("frame_queue_messages_published_total", "Messages sent to a topic"),
        &["reference"]
    ).expect("metric creation failed");

    /// Publish calls that returned an error
    pub static ref PUBLISH_FAILURES: CounterVec = CounterVec::new(
        Opts::new("frame_queue_publish_failures_total", "Failed publish calls"),
        &["reference", "kind"]  // kind: configuration/not_ready/encoding/transport
    ).expect("metric creation failed");

    // =========================================================================
    // RECEIVE PATH
    // =========================================================================

    /// Messages acknowledged after a successful handler run
    pub static ref MESSAGES_ACKED: CounterVec = CounterVec::new(
        Opts::new("frame_queue_messages_acked_total", "Messages acknowledged"),
        &["subscriber"]
    ).expect("metric creation failed");

    /// Messages negatively acknowledged after a handler error
    pub static ref MESSAGES_NACKED: CounterVec = CounterVec::new(
        Opts::new("frame_queue_messages_nacked_total", "Messages negatively acknowledged"),
        &["subscriber"]
    ).expect("metric creation failed");

    /// Receive calls that failed and stopped a subscriber
    pub static ref RECEIVE_FAILURES: CounterVec = CounterVec::new(
        Opts::new("frame_queue_receive_failures_total", "Fatal receive errors"),
        &["subscriber"]
    ).expect("metric creation failed");

    /// Handler invocations currently holding a slot
    pub static ref HANDLERS_IN_FLIGHT: GaugeVec = GaugeVec::new(
        Opts::new("frame_queue_handlers_in_flight", "Handler invocations in progress"),
        &["subscriber"]
    ).expect("metric creation failed");

    /// Handler execution time
    pub static ref HANDLER_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "frame_queue_handler_duration_seconds",
            "Time spent inside message handlers"
        ).buckets(exponential_buckets(0.0005, 2.0, 16).expect("valid buckets")),
        &["subscriber"]
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if a metric is already registered.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Publish
        Box::new(MESSAGES_PUBLISHED.clone()),
        Box::new(PUBLISH_FAILURES.clone()),
        // Receive
        Box::new(MESSAGES_ACKED.clone()),
        Box::new(MESSAGES_NACKED.clone()),
        Box::new(RECEIVE_FAILURES.clone()),
        Box::new(HANDLERS_IN_FLIGHT.clone()),
        Box::new(HANDLER_DURATION.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(())
}

/// Render the registry in the Prometheus text exposition format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let mut text = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut text)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(text).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Start timing one handler invocation for `subscriber`.
///
/// The duration is recorded when the returned guard is dropped.
pub fn handler_timer(subscriber: &str) -> HistogramTimer {
    HANDLER_DURATION
        .with_label_values(&[subscriber])
        .start_timer()
}
