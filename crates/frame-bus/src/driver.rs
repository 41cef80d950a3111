//! # Transport Driver
//!
//! The capability the engine consumes to reach a broker. A driver turns a URL
//! into an opened topic (send side) or an opened subscription (receive side).
//! Wire encoding, retries and redelivery belong to the driver, not the engine.

use std::sync::Arc;

use async_trait::async_trait;
use frame_types::{Message, TransportError};

/// Opens topics and subscriptions for one or more URL schemes.
#[async_trait]
pub trait TransportDriver: Send + Sync {
    /// Open the topic addressed by `url`.
    async fn open_topic(&self, url: &str) -> Result<Arc<dyn Topic>, TransportError>;

    /// Open the subscription addressed by `url`.
    async fn open_subscription(&self, url: &str)
        -> Result<Arc<dyn Subscription>, TransportError>;
}

/// The send side of an opened destination.
#[async_trait]
pub trait Topic: Send + Sync {
    /// Hand a message to the broker.
    async fn send(&self, message: Message) -> Result<(), TransportError>;

    /// Close the topic. Later sends fail with `TransportError::Closed`.
    async fn shutdown(&self) -> Result<(), TransportError>;
}

/// The receive side of an opened destination.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Wait for the next message.
    ///
    /// Must be cancel-safe: dropping the returned future before it resolves
    /// must not lose a message. An error means no further receive will
    /// succeed on this subscription.
    async fn receive(&self) -> Result<Box<dyn Delivery>, TransportError>;

    /// Close the subscription. Later receives fail with `TransportError::Closed`.
    async fn shutdown(&self) -> Result<(), TransportError>;
}

/// One received message awaiting a terminal decision.
///
/// `ack` and `nack` consume the delivery, so a message is resolved at most once.
pub trait Delivery: Send + Sync {
    /// The received message.
    fn message(&self) -> &Message;

    /// Processing succeeded; the broker may forget the message.
    fn ack(self: Box<Self>);

    /// Processing failed; redelivery or dead-lettering is up to the driver.
    fn nack(self: Box<Self>);
}
