//! # Frame Runtime Demo
//!
//! Runs a service with one in-memory publisher/subscriber pair and one
//! internal event handler, publishes a few messages, then waits for Ctrl+C.
//!
//! ## Environment Variables
//!
//! See `TelemetryConfig::from_env` and `ServiceConfig::from_env`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use frame_bus::handler_fn;
use frame_runtime::{EventHandler, ServiceBuilder};
use frame_telemetry::{init_telemetry, TelemetryConfig};
use frame_types::{AuthenticationClaims, RequestContext};
use serde_json::{json, Value};
use tracing::info;

/// Logs every `greeting.sent` event.
struct GreetingSent;

#[async_trait]
impl EventHandler for GreetingSent {
    fn name(&self) -> &str {
        "greeting.sent"
    }

    async fn execute(&self, ctx: RequestContext, payload: Value) -> Result<()> {
        let tenant = ctx.claims().map(|c| c.tenant_id.as_str()).unwrap_or("-");
        info!(tenant = %tenant, payload = %payload, "Greeting event");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_telemetry(&telemetry)?;

    let greetings = handler_fn(|ctx: RequestContext, body: Vec<u8>| async move {
        let tenant = ctx.claims().map(|c| c.tenant_id.clone()).unwrap_or_default();
        info!(tenant = %tenant, body = %String::from_utf8_lossy(&body), "Greeting received");
        Ok(())
    });

    let service = ServiceBuilder::new(telemetry.service_name.clone())
        .publisher("greetings", "mem://greetings")
        .subscriber("greetings", "mem://greetings", 5, greetings)
        .event(Arc::new(GreetingSent))
        .build();
    service.start().await?;

    let ctx = RequestContext::from(AuthenticationClaims::new(
        "demo-tenant",
        "demo-partition",
        "demo-profile",
        "demo-access",
    ));
    for i in 1..=3 {
        service
            .publish(&ctx, "greetings", format!("hello #{i}").into_bytes())
            .await?;
        service
            .emit(&ctx, "greeting.sent", &json!({ "sequence": i }))
            .await?;
    }

    info!("Service is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    service.stop().await;
    Ok(())
}
