//! # Internal Events
//!
//! Named, JSON-bodied events routed through the service's own events queue.
//! `Service::emit` publishes an `EventEnvelope`; the events subscriber looks up
//! the handler registered under the envelope name, validates, then executes.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use frame_bus::MessageHandler;
use frame_types::RequestContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Handler for one named event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Event name this handler serves.
    fn name(&self) -> &str;

    /// Reject a malformed payload before `execute` runs.
    async fn validate(&self, _ctx: &RequestContext, _payload: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: RequestContext, payload: Value) -> anyhow::Result<()>;
}

/// Wire form of an emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub name: String,
    pub payload: Value,
}

impl EventEnvelope {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            payload,
        }
    }
}

/// Event handlers by name. A repeated name replaces the earlier handler.
#[derive(Default, Clone)]
pub struct EventRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventRegistry {
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}

/// Subscriber handler of the internal events queue.
pub(crate) struct EventQueueHandler {
    registry: EventRegistry,
}

impl EventQueueHandler {
    pub(crate) fn new(registry: EventRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MessageHandler for EventQueueHandler {
    async fn handle(&self, ctx: RequestContext, body: &[u8]) -> anyhow::Result<()> {
        let envelope: EventEnvelope =
            serde_json::from_slice(body).context("malformed event envelope")?;

        let handler = self
            .registry
            .get(&envelope.name)
            .with_context(|| format!("no handler for event \"{}\"", envelope.name))?;

        debug!(event = %envelope.name, id = %envelope.id, "Handling event");
        handler
            .validate(&ctx, &envelope.payload)
            .await
            .with_context(|| format!("event \"{}\" failed validation", envelope.name))?;
        handler.execute(ctx, envelope.payload).await
    }
}
