//! # Publisher
//!
//! A named outbound channel bound to one transport URL. The topic handle is
//! populated once, by the initialization pass or by the first ad-hoc publish
//! to a URL reference, and is never replaced.

use std::sync::Arc;

use frame_types::TransportError;
use tokio::sync::OnceCell;

use crate::driver::{Topic, TransportDriver};

/// Registered publisher.
pub struct Publisher {
    reference: String,
    url: String,
    /// Created by publishing to a URL that had no registration.
    transient: bool,
    topic: OnceCell<Arc<dyn Topic>>,
}

impl Publisher {
    pub fn new(reference: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            url: url.into(),
            transient: false,
            topic: OnceCell::new(),
        }
    }

    /// Publisher whose reference is its own URL.
    pub(crate) fn transient(url: &str) -> Self {
        Self {
            transient: true,
            ..Self::new(url, url)
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Whether the topic has been opened.
    pub fn is_initialized(&self) -> bool {
        self.topic.initialized()
    }

    /// The opened topic, if any.
    pub fn topic(&self) -> Option<Arc<dyn Topic>> {
        self.topic.get().cloned()
    }

    /// Bind a topic opened elsewhere. Returns `false` if one is already bound.
    pub(crate) fn attach(&self, topic: Arc<dyn Topic>) -> bool {
        self.topic.set(topic).is_ok()
    }

    /// Open the topic unless it is already open.
    ///
    /// Returns the topic and whether this call opened it. Concurrent callers
    /// wait for a single open attempt.
    pub(crate) async fn open(
        &self,
        driver: &dyn TransportDriver,
    ) -> Result<(Arc<dyn Topic>, bool), TransportError> {
        let mut opened = false;
        let topic = self
            .topic
            .get_or_try_init(|| {
                opened = true;
                driver.open_topic(&self.url)
            })
            .await?;
        Ok((Arc::clone(topic), opened))
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("reference", &self.reference)
            .field("url", &self.url)
            .field("transient", &self.transient)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemTransport;

    #[tokio::test]
    async fn test_open_once() {
        let transport = MemTransport::new();
        let publisher = Publisher::new("orders", "mem://orders");
        assert!(!publisher.is_initialized());
        assert!(publisher.topic().is_none());

        let (_, first) = publisher.open(&transport).await.unwrap();
        let (_, second) = publisher.open(&transport).await.unwrap();
        assert!(first);
        assert!(!second);
        assert!(publisher.is_initialized());
    }

    #[tokio::test]
    async fn test_failed_open_stays_uninitialized() {
        let transport = MemTransport::new();
        let publisher = Publisher::new("broken", "nats://broker");

        assert!(publisher.open(&transport).await.is_err());
        assert!(!publisher.is_initialized());
    }

    #[tokio::test]
    async fn test_attach_binds_once() {
        let transport = MemTransport::new();
        let publisher = Publisher::new("orders", "mem://orders");

        let first = transport.open_topic("mem://orders").await.unwrap();
        let second = transport.open_topic("mem://orders").await.unwrap();
        assert!(publisher.attach(first));
        assert!(!publisher.attach(second));
        assert!(publisher.is_initialized());

        let (_, opened) = publisher.open(&transport).await.unwrap();
        assert!(!opened);
    }

    #[test]
    fn test_transient_uses_url_as_reference() {
        let publisher = Publisher::transient("mem://adhoc");
        assert_eq!(publisher.reference(), "mem://adhoc");
        assert_eq!(publisher.url(), "mem://adhoc");
        assert!(publisher.is_transient());
    }
}
