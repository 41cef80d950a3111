//! # Subscriber Dispatch
//!
//! A named inbound channel and the loop that consumes it.
//!
//! ## Dispatch Loop
//!
//! ```text
//!            cancelled / receive error
//! RUNNING ─────────────────────────────▶ DRAINING ──▶ STOPPED
//!    │  acquire slot ─▶ receive ─▶ spawn handler (slot held until ack/nack)
//!    └──────────────────────────────────────┘
//! ```
//!
//! - A slot is acquired before every receive, so the number of messages in
//!   hand never exceeds the concurrency limit.
//! - DRAINING re-acquires every slot, so the loop only reports STOPPED once
//!   all in-flight handlers have resolved their message.
//! - A receive error is terminal: the subscriber is marked not initialized and
//!   the loop drains and exits. It is not restarted.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use frame_telemetry::{
    handler_timer, HANDLERS_IN_FLIGHT, MESSAGES_ACKED, MESSAGES_NACKED, RECEIVE_FAILURES,
};
use frame_types::{QueueError, RequestContext};
use futures::FutureExt;
use tokio::sync::{watch, OnceCell, Semaphore};
use tracing::{debug, error, info, warn};

use crate::driver::{Delivery, Subscription};
use crate::propagation::ClaimsPropagator;

/// Largest accepted concurrency limit: `u32::MAX`, or the semaphore's permit
/// ceiling where that is lower (32-bit targets).
pub const MAX_CONCURRENCY: usize = if Semaphore::MAX_PERMITS < u32::MAX as usize {
    Semaphore::MAX_PERMITS
} else {
    u32::MAX as usize
};

/// Application code invoked for every received message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message body. An error nacks the message.
    async fn handle(&self, ctx: RequestContext, body: &[u8]) -> anyhow::Result<()>;
}

/// `MessageHandler` backed by an async closure.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(RequestContext, Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, ctx: RequestContext, body: &[u8]) -> anyhow::Result<()> {
        (self.0)(ctx, body.to_vec()).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(RequestContext, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Registered subscriber.
pub struct Subscriber {
    reference: String,
    url: String,
    concurrency: usize,
    handler: Arc<dyn MessageHandler>,
    subscription: OnceCell<Arc<dyn Subscription>>,
    initialized: AtomicBool,
}

impl Subscriber {
    pub fn new(
        reference: impl Into<String>,
        url: impl Into<String>,
        concurrency: usize,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            reference: reference.into(),
            url: url.into(),
            concurrency,
            handler,
            subscription: OnceCell::new(),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Whether the subscription is live.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::Release);
    }

    /// Reject a concurrency limit the dispatch loop cannot honor.
    pub(crate) fn validate(&self) -> Result<(), QueueError> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(QueueError::InvalidConcurrency {
                reference: self.reference.clone(),
                limit: self.concurrency,
            });
        }
        Ok(())
    }

    /// The opened subscription, if any.
    pub(crate) fn subscription(&self) -> Option<Arc<dyn Subscription>> {
        self.subscription.get().cloned()
    }

    /// Bind an opened subscription. Returns `false` if one is already bound.
    pub(crate) fn attach(&self, subscription: Arc<dyn Subscription>) -> bool {
        self.subscription.set(subscription).is_ok()
    }

    /// Consume `subscription` until `shutdown` fires or receive fails.
    pub(crate) async fn run(
        self: Arc<Self>,
        subscription: Arc<dyn Subscription>,
        propagator: Arc<dyn ClaimsPropagator>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        // validate() bounds the limit to MAX_CONCURRENCY
        let limit = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        let slots = Arc::new(Semaphore::new(limit as usize));
        info!(
            subscriber = %self.reference,
            url = %self.url,
            concurrency = limit,
            "Subscriber started"
        );

        // RUNNING
        loop {
            let permit = tokio::select! {
                biased;
                () = cancelled(&mut shutdown) => break,
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let received = tokio::select! {
                biased;
                () = cancelled(&mut shutdown) => break,
                received = subscription.receive() => received,
            };

            match received {
                Ok(delivery) => {
                    let subscriber = Arc::clone(&self);
                    let propagator = Arc::clone(&propagator);
                    tokio::spawn(async move {
                        let _slot = permit;
                        subscriber.process(delivery, propagator.as_ref()).await;
                    });
                }
                Err(e) => {
                    self.set_initialized(false);
                    RECEIVE_FAILURES.with_label_values(&[&self.reference]).inc();
                    error!(
                        subscriber = %self.reference,
                        error = %e,
                        "Receive failed, stopping subscriber"
                    );
                    break;
                }
            }
        }

        // DRAINING
        debug!(
            subscriber = %self.reference,
            in_flight = limit as usize - slots.available_permits(),
            "Draining subscriber"
        );
        if slots.acquire_many(limit).await.is_err() {
            warn!(subscriber = %self.reference, "Slot pool closed while draining");
        }

        // STOPPED
        self.set_initialized(false);
        info!(subscriber = %self.reference, "Subscriber stopped");
    }

    /// Run the handler for one delivery and resolve it.
    async fn process(&self, delivery: Box<dyn Delivery>, propagator: &dyn ClaimsPropagator) {
        let in_flight = HANDLERS_IN_FLIGHT.with_label_values(&[&self.reference]);
        in_flight.inc();

        let outcome = {
            let _timer = handler_timer(&self.reference);
            AssertUnwindSafe(async {
                let message = delivery.message();
                let ctx = propagator.extract(&message.metadata);
                self.handler.handle(ctx, &message.body).await
            })
            .catch_unwind()
            .await
        };
        in_flight.dec();

        match outcome {
            Ok(Ok(())) => {
                delivery.ack();
                MESSAGES_ACKED.with_label_values(&[&self.reference]).inc();
            }
            Ok(Err(e)) => {
                delivery.nack();
                MESSAGES_NACKED.with_label_values(&[&self.reference]).inc();
                warn!(
                    subscriber = %self.reference,
                    error = %format!("{e:#}"),
                    "Handler failed, message nacked"
                );
            }
            Err(_) => {
                delivery.nack();
                MESSAGES_NACKED.with_label_values(&[&self.reference]).inc();
                error!(subscriber = %self.reference, "Processing panicked, message nacked");
            }
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("reference", &self.reference)
            .field("url", &self.url)
            .field("concurrency", &self.concurrency)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Resolves once the governing signal is `true` or its sender is gone.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|cancelled| *cancelled).await;
}
