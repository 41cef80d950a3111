//! # Queue Engine
//!
//! Ties the registry, the transport driver, claims propagation and the
//! shutdown coordinator together.
//!
//! ## Lifecycle
//!
//! 1. Build a `QueueRegistry` during configuration.
//! 2. `Queue::initialize` opens every topic and subscription, fails fast on
//!    the first error without leaving anything bound, and starts one dispatch
//!    loop per live subscription.
//! 3. `Queue::publish` sends through the registered publishers.
//! 4. Firing the shutdown signal drains every loop; `wait_stopped` joins them.
//! 5. The shutdown coordinator closes every opened topic and subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use frame_telemetry::{MESSAGES_PUBLISHED, PUBLISH_FAILURES};
use frame_types::{
    ErrorKind, Message, Metadata, Payload, QueueError, RequestContext, TransportError,
};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::driver::{Subscription, Topic, TransportDriver};
use crate::lifecycle::ShutdownCoordinator;
use crate::mux::{is_push_endpoint, looks_like_url};
use crate::propagation::ClaimsPropagator;
use crate::publisher::Publisher;
use crate::registry::QueueRegistry;
use crate::subscriber::Subscriber;

/// The queue dispatch engine.
pub struct Queue {
    registry: RwLock<QueueRegistry>,
    driver: Arc<dyn TransportDriver>,
    propagator: Arc<dyn ClaimsPropagator>,
    lifecycle: Arc<ShutdownCoordinator>,
    initialized: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl Queue {
    pub fn new(
        registry: QueueRegistry,
        driver: Arc<dyn TransportDriver>,
        propagator: Arc<dyn ClaimsPropagator>,
        lifecycle: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            registry: RwLock::new(registry),
            driver,
            propagator,
            lifecycle,
            initialized: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Open every registered topic and subscription and start dispatching.
    ///
    /// All handles are opened before any publisher or subscriber is bound to
    /// one, so a failure leaves nothing live: the handles opened so far are
    /// closed and the queue stays uninitialized. A later call retries.
    /// Once initialization has succeeded, further calls return `Ok(())`
    /// without doing anything. `shutdown` is the governing cancellation
    /// signal for every dispatch loop.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid concurrency limit or transport open error.
    pub async fn initialize(&self, shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        let _init = self.init_lock.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            warn!("Queue already initialized");
            return Ok(());
        }

        let (publishers, subscribers) = {
            let registry = self.registry.read();
            (
                registry.publishers().cloned().collect::<Vec<_>>(),
                registry.subscribers().cloned().collect::<Vec<_>>(),
            )
        };

        for subscriber in &subscribers {
            subscriber.validate()?;
        }

        let mut opened = Opened::default();
        if let Err(e) = self.open_all(&publishers, &subscribers, &mut opened).await {
            warn!(error = %e, "Initialization failed, closing opened handles");
            opened.discard().await;
            return Err(e);
        }

        self.commit(opened, shutdown).await;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Open a handle for every registered entry without binding any of them.
    async fn open_all(
        &self,
        publishers: &[Arc<Publisher>],
        subscribers: &[Arc<Subscriber>],
        opened: &mut Opened,
    ) -> Result<(), QueueError> {
        for publisher in publishers {
            // ad-hoc URL publishers are opened by the publish path
            if publisher.is_transient() || publisher.is_initialized() {
                continue;
            }
            let topic = self.driver.open_topic(publisher.url()).await?;
            opened.topics.push((Arc::clone(publisher), topic));
        }

        for subscriber in subscribers {
            if is_push_endpoint(subscriber.url()) {
                opened.push_endpoints.push(Arc::clone(subscriber));
                continue;
            }
            let subscription = self.driver.open_subscription(subscriber.url()).await?;
            opened.subscriptions.push((Arc::clone(subscriber), subscription));
        }
        Ok(())
    }

    /// Bind every opened handle and start the dispatch loops.
    async fn commit(&self, opened: Opened, shutdown: watch::Receiver<bool>) {
        for (publisher, topic) in opened.topics {
            if publisher.attach(Arc::clone(&topic)) {
                self.close_on_shutdown(publisher.reference().to_string(), topic);
                info!(
                    reference = %publisher.reference(),
                    url = %publisher.url(),
                    "Publisher initialized"
                );
            } else {
                close_logged(publisher.reference(), &topic).await;
            }
        }

        for subscriber in opened.push_endpoints {
            subscriber.set_initialized(true);
            debug!(
                subscriber = %subscriber.reference(),
                url = %subscriber.url(),
                "Push endpoint, no dispatch loop"
            );
        }

        let mut loops = Vec::with_capacity(opened.subscriptions.len());
        for (subscriber, subscription) in opened.subscriptions {
            if !subscriber.attach(Arc::clone(&subscription)) {
                warn!(subscriber = %subscriber.reference(), "Subscription already bound");
            }
            self.close_on_shutdown(
                subscriber.reference().to_string(),
                Arc::clone(&subscription),
            );
            subscriber.set_initialized(true);
            loops.push(tokio::spawn(subscriber.run(
                subscription,
                Arc::clone(&self.propagator),
                shutdown.clone(),
            )));
        }
        self.loops.lock().extend(loops);
    }

    /// Send `payload` through the publisher registered as `reference`.
    ///
    /// An unregistered `reference` shaped like a transport URL gets a transient
    /// publisher that is opened on first use and kept for later calls.
    ///
    /// # Errors
    ///
    /// - `NotRegistered` for an unknown reference that is not a URL
    /// - `Uninitialized` before `initialize` has opened the publisher
    /// - `Encoding` when the payload has no wire form
    /// - `Transport` for open or send failures
    pub async fn publish(
        &self,
        ctx: &RequestContext,
        reference: &str,
        payload: impl Into<Payload>,
    ) -> Result<(), QueueError> {
        let result = self.send(ctx, reference, payload.into()).await;
        let label = if self.registry.read().has_publisher(reference) {
            reference
        } else {
            UNREGISTERED_LABEL
        };
        match &result {
            Ok(()) => MESSAGES_PUBLISHED.with_label_values(&[label]).inc(),
            Err(e) => {
                PUBLISH_FAILURES
                    .with_label_values(&[label, kind_label(e.kind())])
                    .inc();
                debug!(reference = %reference, error = %e, "Publish failed");
            }
        }
        result
    }

    async fn send(
        &self,
        ctx: &RequestContext,
        reference: &str,
        payload: Payload,
    ) -> Result<(), QueueError> {
        let publisher = self.resolve(reference)?;
        if publisher.is_transient() {
            self.open_transient(&publisher).await?;
        }
        let topic = publisher.topic().ok_or_else(|| QueueError::Uninitialized {
            reference: reference.to_string(),
        })?;

        let body = payload.into_body()?;
        let mut metadata = Metadata::new();
        self.propagator.inject(ctx, &mut metadata);

        topic
            .send(Message::new(body).with_metadata(metadata))
            .await
            .map_err(QueueError::from)
    }

    fn resolve(&self, reference: &str) -> Result<Arc<Publisher>, QueueError> {
        if let Some(publisher) = self.registry.read().publisher(reference) {
            return Ok(Arc::clone(publisher));
        }
        if looks_like_url(reference) {
            return Ok(self.registry.write().publisher_for_url(reference));
        }
        Err(QueueError::NotRegistered {
            reference: reference.to_string(),
        })
    }

    /// Open an ad-hoc URL publisher. A failed open drops it from the registry.
    async fn open_transient(&self, publisher: &Arc<Publisher>) -> Result<(), TransportError> {
        match publisher.open(self.driver.as_ref()).await {
            Ok((topic, opened)) => {
                if opened {
                    self.close_on_shutdown(publisher.reference().to_string(), topic);
                }
                Ok(())
            }
            Err(e) => {
                self.registry.write().forget_transient(publisher);
                Err(e)
            }
        }
    }

    fn close_on_shutdown(&self, reference: String, handle: impl Closable) {
        self.lifecycle.add_cleanup(move || {
            async move { close_logged(&reference, &handle).await }.boxed()
        });
    }

    /// Whether the subscriber `reference` is registered and live.
    pub fn subscription_is_initiated(&self, reference: &str) -> bool {
        self.registry
            .read()
            .subscriber(reference)
            .is_some_and(|subscriber| subscriber.is_initialized())
    }

    /// Whether the publisher `reference` is registered and open.
    pub fn publisher_is_initiated(&self, reference: &str) -> bool {
        self.registry
            .read()
            .publisher(reference)
            .is_some_and(|publisher| publisher.is_initialized())
    }

    /// Whether `initialize` has completed successfully.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Wait for every dispatch loop to reach STOPPED.
    ///
    /// Only returns once the shutdown signal has fired or every loop hit a
    /// receive error.
    pub async fn wait_stopped(&self) {
        let loops = std::mem::take(&mut *self.loops.lock());
        for outcome in futures::future::join_all(loops).await {
            if let Err(e) = outcome {
                error!(error = %e, "Dispatch loop terminated abnormally");
            }
        }
    }

    /// Report subscribers that should be running but are not.
    ///
    /// Push endpoints are not checked.
    ///
    /// # Errors
    ///
    /// `SubscribersStopped` listing the affected references, sorted.
    pub fn check_health(&self) -> Result<(), QueueError> {
        let mut references: Vec<String> = self
            .registry
            .read()
            .subscribers()
            .filter(|subscriber| !is_push_endpoint(subscriber.url()))
            .filter(|subscriber| !subscriber.is_initialized())
            .map(|subscriber| subscriber.reference().to_string())
            .collect();

        if references.is_empty() {
            return Ok(());
        }
        references.sort();
        Err(QueueError::SubscribersStopped { references })
    }
}

/// Metric label for publish calls that did not resolve to a registered
/// publisher, so caller input cannot grow the label set.
const UNREGISTERED_LABEL: &str = "unregistered";

/// Handles opened by one initialization attempt, not yet bound.
#[derive(Default)]
struct Opened {
    topics: Vec<(Arc<Publisher>, Arc<dyn Topic>)>,
    subscriptions: Vec<(Arc<Subscriber>, Arc<dyn Subscription>)>,
    push_endpoints: Vec<Arc<Subscriber>>,
}

impl Opened {
    /// Close everything opened by a failed attempt.
    async fn discard(self) {
        for (publisher, topic) in self.topics {
            close_logged(publisher.reference(), &topic).await;
        }
        for (subscriber, subscription) in self.subscriptions {
            close_logged(subscriber.reference(), &subscription).await;
        }
    }
}

async fn close_logged(reference: &str, handle: &impl Closable) {
    match handle.close().await {
        Ok(()) => debug!(reference = %reference, "Closed"),
        Err(e) => error!(reference = %reference, error = %e, "Failed to close"),
    }
}

/// Label used for the `kind` dimension of publish failure metrics.
fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Configuration => "configuration",
        ErrorKind::NotReady => "not_ready",
        ErrorKind::Encoding => "encoding",
        ErrorKind::Transport => "transport",
    }
}

/// Transport handle closed by the shutdown coordinator.
#[async_trait::async_trait]
trait Closable: Send + Sync + 'static {
    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait::async_trait]
impl Closable for Arc<dyn Topic> {
    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown().await
    }
}

#[async_trait::async_trait]
impl Closable for Arc<dyn Subscription> {
    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown().await
    }
}
