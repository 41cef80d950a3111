//! # Service
//!
//! The process-level owner of the queue engine.
//!
//! ## Startup Sequence
//!
//! 1. `Service::new` applies every `ServiceOption` to a `ServiceSetup`
//! 2. If any event handler was registered, the internal events queue is added
//! 3. `start()` opens every topic and subscription (fail-fast, nothing bound on failure)
//! 4. `run()` waits for cancellation or a failed background consumer
//! 5. `stop()` cancels, drains every subscriber, then runs cleanup once

use std::sync::Arc;

use frame_bus::{
    ClaimsPropagator, MemTransport, MessageHandler, MetadataClaimsPropagator, Queue,
    QueueRegistry, ShutdownCoordinator, TransportDriver, TransportMux, MEM_SCHEME,
};
use frame_types::{Payload, QueueError, RequestContext};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::{ServiceConfig, EVENTS_QUEUE_NAME};
use crate::events::{EventEnvelope, EventHandler, EventQueueHandler, EventRegistry};
use crate::health::{HealthChecker, QueueHealth};
use crate::ServiceError;

/// Long-running task started by `run`, given the shutdown signal.
pub type BackgroundConsumer =
    Box<dyn FnOnce(watch::Receiver<bool>) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// A configuration step applied by `Service::new`.
pub type ServiceOption = Box<dyn FnOnce(&mut ServiceSetup) + Send>;

/// Mutable state the options act on before the service is built.
pub struct ServiceSetup {
    pub config: ServiceConfig,
    pub registry: QueueRegistry,
    pub transports: TransportMux,
    pub events: EventRegistry,
    pub propagator: Arc<dyn ClaimsPropagator>,
    pub background: Option<BackgroundConsumer>,
}

impl ServiceSetup {
    fn new(name: &str) -> Self {
        let config = ServiceConfig {
            service_name: name.to_string(),
            ..ServiceConfig::from_env()
        };
        Self {
            config,
            registry: QueueRegistry::new(),
            transports: TransportMux::new().with(MEM_SCHEME, Arc::new(MemTransport::new())),
            events: EventRegistry::default(),
            propagator: Arc::new(MetadataClaimsPropagator),
            background: None,
        }
    }
}

/// Register an outbound channel.
pub fn register_publisher(reference: impl Into<String>, url: impl Into<String>) -> ServiceOption {
    let (reference, url) = (reference.into(), url.into());
    Box::new(move |setup| setup.registry.register_publisher(reference, url))
}

/// Register an inbound channel. At most `concurrency` messages are handled at once.
pub fn register_subscriber(
    reference: impl Into<String>,
    url: impl Into<String>,
    concurrency: usize,
    handler: Arc<dyn MessageHandler>,
) -> ServiceOption {
    let (reference, url) = (reference.into(), url.into());
    Box::new(move |setup| {
        setup
            .registry
            .register_subscriber(reference, url, concurrency, handler);
    })
}

/// Register handlers for internal events.
pub fn register_events(handlers: Vec<Arc<dyn EventHandler>>) -> ServiceOption {
    Box::new(move |setup| {
        for handler in handlers {
            setup.events.register(handler);
        }
    })
}

/// Route `scheme` URLs to `driver`.
pub fn with_transport(
    scheme: impl Into<String>,
    driver: Arc<dyn TransportDriver>,
) -> ServiceOption {
    let scheme = scheme.into();
    Box::new(move |setup| setup.transports.register(scheme, driver))
}

/// Run `consumer` alongside the subscribers. Its error ends `run`.
pub fn background_consumer<F, Fut>(consumer: F) -> ServiceOption
where
    F: FnOnce(watch::Receiver<bool>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move |setup| {
        setup.background = Some(Box::new(move |shutdown| consumer(shutdown).boxed()));
    })
}

/// Replace the service configuration. The service name is kept.
pub fn with_config(config: ServiceConfig) -> ServiceOption {
    Box::new(move |setup| {
        let name = std::mem::take(&mut setup.config.service_name);
        setup.config = ServiceConfig {
            service_name: name,
            ..config
        };
    })
}

/// Replace the claims propagator.
pub fn with_propagator(propagator: Arc<dyn ClaimsPropagator>) -> ServiceOption {
    Box::new(move |setup| setup.propagator = propagator)
}

/// A configured service.
pub struct Service {
    config: ServiceConfig,
    queue: Arc<Queue>,
    lifecycle: Arc<ShutdownCoordinator>,
    health_checkers: RwLock<Vec<Arc<dyn HealthChecker>>>,
    background: Mutex<Option<BackgroundConsumer>>,
    shutdown: watch::Sender<bool>,
}

impl Service {
    /// Apply `options` in order and build the service.
    pub fn new(name: impl Into<String>, options: Vec<ServiceOption>) -> Self {
        let name = name.into();
        let mut setup = ServiceSetup::new(&name);
        for option in options {
            option(&mut setup);
        }

        if !setup.events.is_empty() {
            let url = setup.config.events_queue_url.clone();
            debug!(url = %url, handlers = setup.events.len(), "Registering events queue");
            let handler = Arc::new(EventQueueHandler::new(std::mem::take(&mut setup.events)));
            setup.registry.register_subscriber(
                EVENTS_QUEUE_NAME,
                url.as_str(),
                setup.config.events_concurrency,
                handler,
            );
            setup.registry.register_publisher(EVENTS_QUEUE_NAME, url);
        }

        let lifecycle = Arc::new(ShutdownCoordinator::new());
        let queue = Arc::new(Queue::new(
            setup.registry,
            Arc::new(setup.transports),
            setup.propagator,
            Arc::clone(&lifecycle),
        ));
        let queue_health: Arc<dyn HealthChecker> = Arc::new(QueueHealth(Arc::clone(&queue)));
        let (shutdown, _) = watch::channel(false);

        Self {
            config: setup.config,
            queue,
            lifecycle,
            health_checkers: RwLock::new(vec![queue_health]),
            background: Mutex::new(setup.background),
            shutdown,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.service_name
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The underlying queue engine.
    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Open every registered topic and subscription and start the dispatch loops.
    ///
    /// A no-op once a start has succeeded. A failed start binds nothing, so
    /// publishers stay uninitialized and a later call tries again.
    ///
    /// # Errors
    ///
    /// Any open or concurrency validation failure.
    pub async fn start(&self) -> Result<(), ServiceError> {
        if self.queue.is_initialized() {
            return Ok(());
        }

        info!(service = %self.name(), "Starting service");
        self.queue.initialize(self.shutdown.subscribe()).await?;
        info!(service = %self.name(), "Service started");
        Ok(())
    }

    /// Start, then block until cancelled or the background consumer fails.
    ///
    /// Always stops the service before returning.
    ///
    /// # Errors
    ///
    /// A failed start, or the background consumer's error.
    pub async fn run(&self) -> Result<(), ServiceError> {
        if let Err(e) = self.start().await {
            error!(service = %self.name(), error = %e, "Service failed to start");
            self.stop().await;
            return Err(e);
        }

        let consumer = self.background.lock().take();
        let outcome = match consumer {
            Some(consumer) => {
                let mut consumer = tokio::spawn(consumer(self.shutdown.subscribe()));
                tokio::select! {
                    joined = &mut consumer => consumer_outcome(joined),
                    () = cancelled(self.shutdown.subscribe()) => consumer_outcome(consumer.await),
                }
            }
            None => {
                cancelled(self.shutdown.subscribe()).await;
                Ok(())
            }
        };

        if let Err(e) = &outcome {
            error!(service = %self.name(), error = %e, "Background consumer failed");
        }
        self.stop().await;
        outcome
    }

    /// Fire the shutdown signal. Subscribers start draining.
    pub fn cancel(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Cancel, wait for every subscriber to drain, then run cleanup once.
    pub async fn stop(&self) {
        self.cancel();
        self.queue.wait_stopped().await;
        self.lifecycle.run_cleanup().await;
        info!(service = %self.name(), "Service stopped");
    }

    /// Publish through the queue engine.
    ///
    /// # Errors
    ///
    /// See `Queue::publish`.
    pub async fn publish(
        &self,
        ctx: &RequestContext,
        reference: &str,
        payload: impl Into<Payload>,
    ) -> Result<(), QueueError> {
        self.queue.publish(ctx, reference, payload).await
    }

    /// Emit an internal event handled by the event handler named `name`.
    ///
    /// # Errors
    ///
    /// `NotRegistered` when no event handler was registered at all,
    /// `Encoding` when `payload` is not JSON-representable.
    pub async fn emit<T: Serialize + ?Sized>(
        &self,
        ctx: &RequestContext,
        name: &str,
        payload: &T,
    ) -> Result<(), QueueError> {
        let payload =
            serde_json::to_value(payload).map_err(|e| QueueError::Encoding(e.to_string()))?;
        let envelope = Payload::json(&EventEnvelope::new(name, payload))?;
        self.queue.publish(ctx, EVENTS_QUEUE_NAME, envelope).await
    }

    pub fn subscription_is_initiated(&self, reference: &str) -> bool {
        self.queue.subscription_is_initiated(reference)
    }

    /// Run `f` at stop, after earlier cleanup methods.
    pub fn add_cleanup_method<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.lifecycle.add_cleanup(move || async move { f() }.boxed());
    }

    pub fn add_health_check(&self, checker: Arc<dyn HealthChecker>) {
        self.health_checkers.write().push(checker);
    }

    pub fn health_checkers(&self) -> Vec<Arc<dyn HealthChecker>> {
        self.health_checkers.read().clone()
    }

    /// Run every health checker.
    ///
    /// # Errors
    ///
    /// `ServiceError::Unhealthy` with one entry per failing checker.
    pub fn check_health(&self) -> Result<(), ServiceError> {
        let failures: Vec<String> = self
            .health_checkers()
            .iter()
            .filter_map(|checker| checker.check_health().err())
            .map(|e| format!("{e:#}"))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Unhealthy(failures))
        }
    }
}

/// Resolves once the shutdown signal is `true` or its sender is gone.
async fn cancelled(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|cancelled| *cancelled).await;
}

fn consumer_outcome(
    joined: Result<anyhow::Result<()>, tokio::task::JoinError>,
) -> Result<(), ServiceError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ServiceError::BackgroundConsumer(format!("{e:#}"))),
        Err(e) => Err(ServiceError::BackgroundConsumer(e.to_string())),
    }
}

/// Fluent construction of a `Service`.
pub struct ServiceBuilder {
    name: String,
    options: Vec<ServiceOption>,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    #[must_use]
    pub fn option(mut self, option: ServiceOption) -> Self {
        self.options.push(option);
        self
    }

    #[must_use]
    pub fn publisher(self, reference: impl Into<String>, url: impl Into<String>) -> Self {
        self.option(register_publisher(reference, url))
    }

    #[must_use]
    pub fn subscriber(
        self,
        reference: impl Into<String>,
        url: impl Into<String>,
        concurrency: usize,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        self.option(register_subscriber(reference, url, concurrency, handler))
    }

    #[must_use]
    pub fn event(self, handler: Arc<dyn EventHandler>) -> Self {
        self.option(register_events(vec![handler]))
    }

    #[must_use]
    pub fn transport(self, scheme: impl Into<String>, driver: Arc<dyn TransportDriver>) -> Self {
        self.option(with_transport(scheme, driver))
    }

    #[must_use]
    pub fn config(self, config: ServiceConfig) -> Self {
        self.option(with_config(config))
    }

    pub fn build(self) -> Service {
        Service::new(self.name, self.options)
    }
}
