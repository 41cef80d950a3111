//! # Frame Runtime
//!
//! Embeds the queue engine in a service with a managed lifecycle.
//!
//! ## Modular Structure
//!
//! - `service` - `Service`, its options and builder
//! - `events` - named internal events over a dedicated queue
//! - `health` - health checker abstraction
//! - `config` - environment-driven service configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use frame_runtime::{register_publisher, register_subscriber, Service};
//!
//! let service = Service::new("orders", vec![
//!     register_publisher("orders", "mem://orders"),
//!     register_subscriber("orders", "mem://orders", 5, handler),
//! ]);
//! service.start().await?;
//! service.publish(&ctx, "orders", b"hello".as_slice()).await?;
//! service.stop().await;
//! ```

pub mod config;
pub mod events;
pub mod health;
pub mod service;

pub use config::{ServiceConfig, DEFAULT_EVENTS_CONCURRENCY, EVENTS_QUEUE_NAME};
pub use events::{EventEnvelope, EventHandler, EventRegistry};
pub use health::HealthChecker;
pub use service::{
    background_consumer, register_events, register_publisher, register_subscriber, with_config,
    with_propagator, with_transport, BackgroundConsumer, Service, ServiceBuilder, ServiceOption,
    ServiceSetup,
};

use frame_types::QueueError;
use thiserror::Error;

/// Service lifecycle errors.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Background consumer failed: {0}")]
    BackgroundConsumer(String),

    #[error("Unhealthy: {}", .0.join("; "))]
    Unhealthy(Vec<String>),
}
