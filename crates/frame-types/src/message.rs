//! # Message Model
//!
//! The unit handed to a transport driver and the payload accepted by publish.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::errors::QueueError;

/// Flat string-keyed metadata attached to every message.
///
/// Ordered so that logs and test assertions are deterministic.
pub type Metadata = BTreeMap<String, String>;

/// A message as seen by a transport driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Opaque body bytes.
    pub body: Vec<u8>,
    /// Propagated metadata. Unknown keys are carried through untouched.
    pub metadata: Metadata,
}

impl Message {
    /// Create a message with empty metadata.
    #[must_use]
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            metadata: Metadata::new(),
        }
    }

    /// Replace the metadata of this message.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// What an application hands to publish.
///
/// Raw bytes are sent as-is. Structured values are JSON-encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw body, sent unchanged.
    Raw(Vec<u8>),
    /// Structured value, encoded as UTF-8 JSON on the wire.
    Structured(serde_json::Value),
}

impl Payload {
    /// Build a structured payload from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Encoding` when the value has no JSON
    /// representation (for example a map with non-string keys).
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, QueueError> {
        serde_json::to_value(value)
            .map(Self::Structured)
            .map_err(|e| QueueError::Encoding(e.to_string()))
    }

    /// Produce the wire bytes for this payload.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Encoding` if the structured value cannot be written.
    pub fn into_body(self) -> Result<Vec<u8>, QueueError> {
        match self {
            Self::Raw(bytes) => Ok(bytes),
            Self::Structured(value) => {
                serde_json::to_vec(&value).map_err(|e| QueueError::Encoding(e.to_string()))
            }
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Raw(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Raw(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Payload {
    fn from(bytes: &[u8; N]) -> Self {
        Self::Raw(bytes.to_vec())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}
