//! # Queue Registry
//!
//! Reference-to-configuration maps for publishers and subscribers. The two
//! namespaces are independent. Registration performs no validation and a
//! repeated reference replaces the earlier entry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::publisher::Publisher;
use crate::subscriber::{MessageHandler, Subscriber};

#[derive(Debug, Default)]
pub struct QueueRegistry {
    publishers: HashMap<String, Arc<Publisher>>,
    subscribers: HashMap<String, Arc<Subscriber>>,
}

impl QueueRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the publisher `reference`.
    pub fn register_publisher(&mut self, reference: impl Into<String>, url: impl Into<String>) {
        let publisher = Publisher::new(reference, url);
        debug!(reference = %publisher.reference(), url = %publisher.url(), "Publisher registered");
        self.publishers
            .insert(publisher.reference().to_string(), Arc::new(publisher));
    }

    /// Register (or replace) the subscriber `reference`.
    pub fn register_subscriber(
        &mut self,
        reference: impl Into<String>,
        url: impl Into<String>,
        concurrency: usize,
        handler: Arc<dyn MessageHandler>,
    ) {
        let subscriber = Subscriber::new(reference, url, concurrency, handler);
        debug!(
            subscriber = %subscriber.reference(),
            url = %subscriber.url(),
            concurrency,
            "Subscriber registered"
        );
        self.subscribers
            .insert(subscriber.reference().to_string(), Arc::new(subscriber));
    }

    pub fn publisher(&self, reference: &str) -> Option<&Arc<Publisher>> {
        self.publishers.get(reference)
    }

    pub fn subscriber(&self, reference: &str) -> Option<&Arc<Subscriber>> {
        self.subscribers.get(reference)
    }

    pub fn publishers(&self) -> impl Iterator<Item = &Arc<Publisher>> {
        self.publishers.values()
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &Arc<Subscriber>> {
        self.subscribers.values()
    }

    pub fn has_publisher(&self, reference: &str) -> bool {
        self.publishers.contains_key(reference)
    }

    pub fn has_subscriber(&self, reference: &str) -> bool {
        self.subscribers.contains_key(reference)
    }

    /// The publisher registered under `url`, or a new transient one for it.
    pub(crate) fn publisher_for_url(&mut self, url: &str) -> Arc<Publisher> {
        let publisher = self
            .publishers
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(Publisher::transient(url)));
        Arc::clone(publisher)
    }

    /// Drop `publisher` if it is still the unopened transient entry for its URL.
    pub(crate) fn forget_transient(&mut self, publisher: &Arc<Publisher>) {
        let stale = self.publishers.get(publisher.reference()).is_some_and(|entry| {
            Arc::ptr_eq(entry, publisher) && entry.is_transient() && !entry.is_initialized()
        });
        if stale {
            self.publishers.remove(publisher.reference());
        }
    }
}
