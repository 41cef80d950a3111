//! # Publishing Scenarios
//!
//! Reference resolution, readiness, ad-hoc URL destinations and identity
//! propagation from publisher to handler.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use frame_bus::MemTransport;
    use frame_runtime::{register_publisher, Service, ServiceBuilder};
    use frame_types::{AuthenticationClaims, ErrorKind, Payload, QueueError, RequestContext};
    use serde::Serialize;

    use crate::fixtures::{eventually, RecordingHandler};

    // =============================================================================
    // REFERENCE RESOLUTION
    // =============================================================================

    #[tokio::test]
    async fn test_unregistered_references_are_configuration_errors() {
        let service = Service::new("publish-test", vec![]);
        service.start().await.unwrap();

        let ctx = RequestContext::background();
        for reference in ["random", "orders", "mem:/missing-slashes"] {
            let err = service
                .publish(&ctx, reference, b"x".as_slice())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{reference}");
        }
        service.stop().await;
    }

    #[tokio::test]
    async fn test_uninitialized_then_ready() {
        let service = Service::new(
            "publish-test",
            vec![register_publisher("test", "mem://topicA")],
        );
        let ctx = RequestContext::background();

        let err = service
            .publish(&ctx, "test", b"early".as_slice())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Uninitialized { .. }));

        service.start().await.unwrap();
        service.publish(&ctx, "test", b"ready".as_slice()).await.unwrap();
        service.stop().await;
    }

    #[tokio::test]
    async fn test_adhoc_url_creates_transient_publisher() {
        let transport = Arc::new(MemTransport::new());
        let service = ServiceBuilder::new("publish-test")
            .transport("mem", transport.clone())
            .build();
        service.start().await.unwrap();

        let ctx = RequestContext::background();
        service
            .publish(&ctx, "mem://adhoc/path", b"one".as_slice())
            .await
            .unwrap();
        service
            .publish(&ctx, "mem://adhoc/path", b"two".as_slice())
            .await
            .unwrap();

        assert!(service.queue().publisher_is_initiated("mem://adhoc/path"));
        assert_eq!(transport.topic_stats("adhoc/path").unwrap().sent, 2);
        service.stop().await;
    }

    // =============================================================================
    // PAYLOADS
    // =============================================================================

    #[derive(Serialize)]
    struct Order {
        id: u32,
        items: Vec<&'static str>,
    }

    #[tokio::test]
    async fn test_structured_payload_arrives_as_json() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::<serde_json::Value>::new()));
        let capture = {
            let seen = seen.clone();
            frame_bus::handler_fn(move |_ctx, body: Vec<u8>| {
                let seen = seen.clone();
                async move {
                    let value = serde_json::from_slice(&body).unwrap_or_default();
                    seen.lock().push(value);
                    Ok(())
                }
            })
        };
        let service = ServiceBuilder::new("publish-test")
            .publisher("orders", "mem://orders.json")
            .subscriber("orders", "mem://orders.json", 1, capture)
            .build();
        service.start().await.unwrap();

        let order = Payload::json(&Order {
            id: 42,
            items: vec!["tea", "scone"],
        })
        .unwrap();
        service
            .publish(&RequestContext::background(), "orders", order)
            .await
            .unwrap();

        eventually(|| !seen.lock().is_empty()).await;
        assert_eq!(
            seen.lock()[0],
            serde_json::json!({"id": 42, "items": ["tea", "scone"]})
        );
        service.stop().await;
    }

    // =============================================================================
    // IDENTITY PROPAGATION
    // =============================================================================

    #[tokio::test]
    async fn test_claims_reach_handler() {
        let handler = RecordingHandler::with_delay(Duration::ZERO);
        let service = ServiceBuilder::new("publish-test")
            .publisher("test", "mem://claims")
            .subscriber("test", "mem://claims", 2, handler.clone())
            .build();
        service.start().await.unwrap();

        let claims = AuthenticationClaims::new("tenant-a", "partition-b", "profile-c", "access-d")
            .with_role("admin")
            .with_extra("device", "mobile");
        let ctx = RequestContext::from(claims.clone());
        service.publish(&ctx, "test", b"who am i".as_slice()).await.unwrap();
        service
            .publish(&RequestContext::background(), "test", b"anonymous".as_slice())
            .await
            .unwrap();

        eventually(|| handler.handled() == 2).await;
        assert_eq!(*handler.claims.lock(), vec![claims]);
        service.stop().await;
    }
}
