//! # Error Types
//!
//! Defines error types used across the engine and its transports.

use thiserror::Error;

/// Errors raised by a transport driver or the scheme multiplexer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The URL is not of the form `scheme://rest`.
    #[error("Invalid transport URL: {url}")]
    InvalidUrl { url: String },

    /// No driver is registered for the URL scheme.
    #[error("No transport driver registered for scheme \"{scheme}\" (url: {url})")]
    UnsupportedScheme { scheme: String, url: String },

    /// The topic or subscription has been shut down.
    #[error("Transport closed: {0}")]
    Closed(String),

    /// Opening a topic or subscription failed.
    #[error("Could not open {url}: {reason}")]
    Open { url: String, reason: String },

    /// The driver rejected a send.
    #[error("Send failed: {0}")]
    Send(String),

    /// The driver could not deliver the next message.
    #[error("Receive failed: {0}")]
    Receive(String),

    /// Closing a topic or subscription failed.
    #[error("Shutdown failed: {0}")]
    Shutdown(String),
}

/// Errors surfaced by the queue engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Publish against a reference that is neither registered nor a URL.
    #[error("Reference \"{reference}\" is not registered")]
    NotRegistered { reference: String },

    /// Publish against a registered publisher before the initialization pass.
    #[error("Publisher \"{reference}\" is not initialized")]
    Uninitialized { reference: String },

    /// The payload has no wire representation.
    #[error("Payload encoding failed: {0}")]
    Encoding(String),

    /// A subscriber was registered with a concurrency limit outside the supported range.
    #[error("Subscriber \"{reference}\" has invalid concurrency limit {limit}")]
    InvalidConcurrency { reference: String, limit: usize },

    /// Subscribers whose dispatch loop is no longer running.
    #[error("Subscribers not running: {}", references.join(", "))]
    SubscribersStopped { references: Vec<String> },

    /// A transport driver failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Coarse classification of a `QueueError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NotReady,
    Encoding,
    Transport,
}

impl QueueError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotRegistered { .. } | Self::InvalidConcurrency { .. } => ErrorKind::Configuration,
            Self::Uninitialized { .. } | Self::SubscribersStopped { .. } => ErrorKind::NotReady,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }
}
