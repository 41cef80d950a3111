//! # In-Memory Transport
//!
//! Implements the `mem://<name>` scheme entirely inside the process.
//!
//! ## Semantics
//!
//! - A topic and the subscriptions opened on the same name share state,
//!   whichever is opened first.
//! - Every subscription receives each message sent after it was opened.
//!   Messages sent while nobody is subscribed are dropped.
//! - A nacked message is redelivered to the same subscription until it has
//!   been delivered `max_deliveries` times, then it is dead-lettered.
//! - Shutting down a topic rejects later sends; shutting down a subscription
//!   wakes any pending receive with `TransportError::Closed`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use frame_types::{Message, TransportError};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};

use crate::driver::{Delivery, Subscription, Topic, TransportDriver};
use crate::mux::{scheme_of, SCHEME_SEPARATOR};

/// Scheme served by `MemTransport`.
pub const MEM_SCHEME: &str = "mem";

/// Snapshot of the counters kept for one in-memory topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicStats {
    pub sent: u64,
    pub acked: u64,
    pub nacked: u64,
    pub dead_lettered: u64,
}

#[derive(Default)]
struct TopicCounters {
    sent: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
    dead_lettered: AtomicU64,
}

struct Pending {
    message: Message,
    attempt: u32,
}

/// Shared state of one named destination.
struct TopicState {
    name: String,
    queues: RwLock<Vec<(u64, mpsc::UnboundedSender<Pending>)>>,
    next_queue_id: AtomicU64,
    counters: TopicCounters,
}

impl TopicState {
    fn new(name: String) -> Self {
        Self {
            name,
            queues: RwLock::new(Vec::new()),
            next_queue_id: AtomicU64::new(0),
            counters: TopicCounters::default(),
        }
    }

    fn stats(&self) -> TopicStats {
        TopicStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            acked: self.counters.acked.load(Ordering::Relaxed),
            nacked: self.counters.nacked.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// In-process transport driver for the `mem` scheme.
pub struct MemTransport {
    topics: RwLock<HashMap<String, Arc<TopicState>>>,
    max_deliveries: u32,
}

impl MemTransport {
    /// Create a transport that dead-letters a message on its first nack.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_deliveries(1)
    }

    /// Create a transport that delivers a nacked message up to `max_deliveries` times.
    #[must_use]
    pub fn with_max_deliveries(max_deliveries: u32) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            max_deliveries: max_deliveries.max(1),
        }
    }

    /// Counters for the destination called `name`.
    #[must_use]
    pub fn topic_stats(&self, name: &str) -> Option<TopicStats> {
        self.topics.read().get(name).map(|state| state.stats())
    }

    /// Number of live subscriptions on the destination called `name`.
    #[must_use]
    pub fn subscription_count(&self, name: &str) -> usize {
        self.topics
            .read()
            .get(name)
            .map_or(0, |state| state.queues.read().len())
    }

    fn state_for(&self, url: &str) -> Result<Arc<TopicState>, TransportError> {
        let scheme = scheme_of(url)?;
        if !scheme.eq_ignore_ascii_case(MEM_SCHEME) {
            return Err(TransportError::UnsupportedScheme {
                scheme: scheme.to_string(),
                url: url.to_string(),
            });
        }
        let name = &url[scheme.len() + SCHEME_SEPARATOR.len()..];

        let mut topics = self.topics.write();
        let state = topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TopicState::new(name.to_string())));
        Ok(Arc::clone(state))
    }
}

impl Default for MemTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportDriver for MemTransport {
    async fn open_topic(&self, url: &str) -> Result<Arc<dyn Topic>, TransportError> {
        let state = self.state_for(url)?;
        debug!(topic = %state.name, "In-memory topic opened");
        Ok(Arc::new(MemTopic {
            state,
            closed: AtomicBool::new(false),
        }))
    }

    async fn open_subscription(
        &self,
        url: &str,
    ) -> Result<Arc<dyn Subscription>, TransportError> {
        let state = self.state_for(url)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let queue_id = state.next_queue_id.fetch_add(1, Ordering::Relaxed);
        state.queues.write().push((queue_id, tx.clone()));
        let (closed, _) = watch::channel(false);

        debug!(topic = %state.name, queue_id, "In-memory subscription opened");
        Ok(Arc::new(MemSubscription {
            state,
            queue_id,
            requeue: tx,
            inbox: Mutex::new(rx),
            closed,
            max_deliveries: self.max_deliveries,
        }))
    }
}

struct MemTopic {
    state: Arc<TopicState>,
    closed: AtomicBool,
}

#[async_trait]
impl Topic for MemTopic {
    async fn send(&self, message: Message) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed(format!("mem://{}", self.state.name)));
        }

        self.state.counters.sent.fetch_add(1, Ordering::Relaxed);
        let mut queues = self.state.queues.write();
        queues.retain(|(_, queue)| {
            queue
                .send(Pending {
                    message: message.clone(),
                    attempt: 1,
                })
                .is_ok()
        });
        if queues.is_empty() {
            debug!(topic = %self.state.name, "Message dropped (no subscriptions)");
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct MemSubscription {
    state: Arc<TopicState>,
    queue_id: u64,
    requeue: mpsc::UnboundedSender<Pending>,
    inbox: Mutex<mpsc::UnboundedReceiver<Pending>>,
    closed: watch::Sender<bool>,
    max_deliveries: u32,
}

#[async_trait]
impl Subscription for MemSubscription {
    async fn receive(&self) -> Result<Box<dyn Delivery>, TransportError> {
        let closed_error = || TransportError::Closed(format!("mem://{}", self.state.name));
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(closed_error());
        }

        let mut inbox = tokio::select! {
            inbox = self.inbox.lock() => inbox,
            _ = closed.wait_for(|closed| *closed) => return Err(closed_error()),
        };

        tokio::select! {
            pending = inbox.recv() => match pending {
                Some(pending) => Ok(Box::new(MemDelivery {
                    pending,
                    state: Arc::clone(&self.state),
                    requeue: self.requeue.clone(),
                    max_deliveries: self.max_deliveries,
                })),
                None => Err(closed_error()),
            },
            _ = closed.wait_for(|closed| *closed) => Err(closed_error()),
        }
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.closed.send_replace(true);
        self.state
            .queues
            .write()
            .retain(|(id, _)| *id != self.queue_id);
        Ok(())
    }
}

struct MemDelivery {
    pending: Pending,
    state: Arc<TopicState>,
    requeue: mpsc::UnboundedSender<Pending>,
    max_deliveries: u32,
}

impl Delivery for MemDelivery {
    fn message(&self) -> &Message {
        &self.pending.message
    }

    fn ack(self: Box<Self>) {
        self.state.counters.acked.fetch_add(1, Ordering::Relaxed);
    }

    fn nack(self: Box<Self>) {
        let MemDelivery {
            pending: Pending { message, attempt },
            state,
            requeue,
            max_deliveries,
        } = *self;
        state.counters.nacked.fetch_add(1, Ordering::Relaxed);

        if attempt >= max_deliveries {
            state.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
            debug!(topic = %state.name, attempt, "Message dead-lettered");
            return;
        }

        let redelivery = Pending {
            message,
            attempt: attempt + 1,
        };
        if requeue.send(redelivery).is_err() {
            state.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
            warn!(topic = %state.name, "Redelivery failed, subscription gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn recv(sub: &Arc<dyn Subscription>) -> Box<dyn Delivery> {
        timeout(Duration::from_millis(200), sub.receive())
            .await
            .expect("timeout")
            .expect("delivery")
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let transport = MemTransport::new();
        let sub = transport.open_subscription("mem://orders").await.unwrap();
        let topic = transport.open_topic("mem://orders").await.unwrap();

        topic.send(Message::new("first")).await.unwrap();
        let delivery = recv(&sub).await;
        assert_eq!(delivery.message().body, b"first");
        delivery.ack();

        let stats = transport.topic_stats("orders").unwrap();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.acked, 1);
        assert_eq!(stats.nacked, 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscription() {
        let transport = MemTransport::new();
        let sub1 = transport.open_subscription("mem://fan").await.unwrap();
        let sub2 = transport.open_subscription("mem://fan").await.unwrap();
        let topic = transport.open_topic("mem://fan").await.unwrap();
        assert_eq!(transport.subscription_count("fan"), 2);

        topic.send(Message::new("event")).await.unwrap();
        recv(&sub1).await.ack();
        recv(&sub2).await.ack();

        assert_eq!(transport.topic_stats("fan").unwrap().acked, 2);
    }

    #[tokio::test]
    async fn test_nack_dead_letters_by_default() {
        let transport = MemTransport::new();
        let sub = transport.open_subscription("mem://dlq").await.unwrap();
        let topic = transport.open_topic("mem://dlq").await.unwrap();

        topic.send(Message::new("poison")).await.unwrap();
        recv(&sub).await.nack();

        let stats = transport.topic_stats("dlq").unwrap();
        assert_eq!(stats.nacked, 1);
        assert_eq!(stats.dead_lettered, 1);
        assert!(timeout(Duration::from_millis(50), sub.receive()).await.is_err());
    }

    #[tokio::test]
    async fn test_nack_redelivers_up_to_limit() {
        let transport = MemTransport::with_max_deliveries(3);
        let sub = transport.open_subscription("mem://retry").await.unwrap();
        let topic = transport.open_topic("mem://retry").await.unwrap();

        topic.send(Message::new("flaky")).await.unwrap();
        for _ in 0..3 {
            let delivery = recv(&sub).await;
            assert_eq!(delivery.message().body, b"flaky");
            delivery.nack();
        }

        let stats = transport.topic_stats("retry").unwrap();
        assert_eq!(stats.nacked, 3);
        assert_eq!(stats.dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_closed_topic_rejects_send() {
        let transport = MemTransport::new();
        let topic = transport.open_topic("mem://closing").await.unwrap();
        topic.shutdown().await.unwrap();

        let result = topic.send(Message::new("late")).await;
        assert!(matches!(result, Err(TransportError::Closed(_))));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_pending_receive() {
        let transport = MemTransport::new();
        let sub = transport.open_subscription("mem://idle").await.unwrap();

        let waiter = {
            let sub = Arc::clone(&sub);
            tokio::spawn(async move { sub.receive().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        sub.shutdown().await.unwrap();

        let result = timeout(Duration::from_millis(200), waiter)
            .await
            .expect("timeout")
            .expect("join");
        assert!(matches!(result, Err(TransportError::Closed(_))));
        assert_eq!(transport.subscription_count("idle"), 0);
    }

    #[tokio::test]
    async fn test_metadata_is_preserved() {
        let transport = MemTransport::new();
        let sub = transport.open_subscription("mem://meta").await.unwrap();
        let topic = transport.open_topic("mem://meta").await.unwrap();

        let mut metadata = frame_types::Metadata::new();
        metadata.insert("x-custom".to_string(), "kept".to_string());
        topic
            .send(Message::new("body").with_metadata(metadata.clone()))
            .await
            .unwrap();

        let delivery = recv(&sub).await;
        assert_eq!(delivery.message().metadata, metadata);
    }

    #[tokio::test]
    async fn test_rejects_foreign_scheme() {
        let transport = MemTransport::new();
        let result = transport.open_topic("nats://orders").await;
        assert!(matches!(
            result,
            Err(TransportError::UnsupportedScheme { .. })
        ));
    }
}
