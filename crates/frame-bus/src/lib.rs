//! # Frame Bus - Queue Dispatch Engine
//!
//! Named publishers and subscribers in front of pluggable transport drivers.
//!
//! ## Data Flow
//!
//! ```text
//!  publish(ctx, reference, payload)
//!        │
//!        ▼
//!  ┌──────────────┐  claims → metadata  ┌──────────────┐
//!  │ QueueRegistry│ ──────────────────▶ │    Topic     │ ──▶ broker
//!  └──────────────┘                     └──────────────┘
//!
//!  broker ──▶ Subscription ──▶ dispatch loop (N slots) ──▶ MessageHandler
//!                                   │        metadata → claims      │
//!                                   └──────── ack / nack ◀──────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Bounded concurrency:** at most `concurrency` handlers run per subscriber
//! - **Single resolution:** every delivered message is acked or nacked once
//! - **Drain on cancel:** a subscriber reports stopped only after its
//!   in-flight handlers finish
//! - **Fail-fast start:** any open failure aborts `Queue::initialize`

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod driver;
pub mod lifecycle;
pub mod mem;
pub mod mux;
pub mod propagation;
pub mod publisher;
pub mod queue;
pub mod registry;
pub mod subscriber;

// Re-export main types
pub use driver::{Delivery, Subscription, Topic, TransportDriver};
pub use lifecycle::ShutdownCoordinator;
pub use mem::{MemTransport, TopicStats, MEM_SCHEME};
pub use mux::{is_push_endpoint, looks_like_url, scheme_of, TransportMux};
pub use propagation::{ClaimsPropagator, MetadataClaimsPropagator};
pub use publisher::Publisher;
pub use queue::Queue;
pub use registry::QueueRegistry;
pub use subscriber::{handler_fn, FnHandler, MessageHandler, Subscriber, MAX_CONCURRENCY};
