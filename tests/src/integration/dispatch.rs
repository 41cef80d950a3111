//! # Dispatch Scenarios
//!
//! A publisher and a subscriber share one in-memory destination. The
//! transport is shared with the test so its ack/nack counters can be read.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use frame_bus::MemTransport;
    use frame_runtime::{Service, ServiceBuilder};
    use frame_types::RequestContext;
    use tokio::time::{sleep, timeout};

    use crate::fixtures::{eventually, RecordingHandler, FAIL_BODY};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn service(
        transport: &Arc<MemTransport>,
        concurrency: usize,
        handler: &Arc<RecordingHandler>,
    ) -> Service {
        ServiceBuilder::new("dispatch-test")
            .transport("mem", transport.clone())
            .publisher("test", "mem://topicA")
            .subscriber("test", "mem://topicA", concurrency, handler.clone())
            .build()
    }

    // =============================================================================
    // ACK / NACK
    // =============================================================================

    /// 30 good messages are acked, the failing one is nacked, subscriber stays up.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_thirty_acked_one_nacked() {
        let transport = Arc::new(MemTransport::new());
        let handler = RecordingHandler::with_delay(Duration::from_millis(10));
        let service = service(&transport, 5, &handler);
        service.start().await.unwrap();

        let ctx = RequestContext::background();
        for i in 0..30 {
            service
                .publish(&ctx, "test", format!("message {i}").into_bytes())
                .await
                .unwrap();
            assert!(service.subscription_is_initiated("test"));
        }
        service.publish(&ctx, "test", FAIL_BODY).await.unwrap();

        eventually(|| {
            let stats = transport.topic_stats("topicA").unwrap();
            stats.acked + stats.nacked == 31
        })
        .await;

        let stats = transport.topic_stats("topicA").unwrap();
        assert_eq!(stats.sent, 31);
        assert_eq!(stats.acked, 30);
        assert_eq!(stats.nacked, 1);
        assert_eq!(handler.handled(), 30);
        assert_eq!(handler.failed(), 1);
        assert!(service.subscription_is_initiated("test"));

        service.stop().await;
    }

    // =============================================================================
    // CONCURRENCY
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_limit_holds() {
        for limit in [1, 3, 8] {
            let transport = Arc::new(MemTransport::new());
            let handler = RecordingHandler::with_delay(Duration::from_millis(15));
            let service = service(&transport, limit, &handler);
            service.start().await.unwrap();

            let ctx = RequestContext::background();
            for _ in 0..24 {
                service.publish(&ctx, "test", b"work".as_slice()).await.unwrap();
            }
            eventually(|| handler.handled() == 24).await;

            assert!(
                handler.peak() <= limit,
                "limit {limit} exceeded: peak {}",
                handler.peak()
            );
            service.stop().await;
        }
    }

    // =============================================================================
    // DRAIN ON CANCEL
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_waits_for_in_flight_handlers() {
        let transport = Arc::new(MemTransport::new());
        let handler = RecordingHandler::with_delay(Duration::from_millis(200));
        let service = Arc::new(service(&transport, 4, &handler));
        service.start().await.unwrap();

        let ctx = RequestContext::background();
        for _ in 0..4 {
            service.publish(&ctx, "test", b"slow".as_slice()).await.unwrap();
        }
        eventually(|| handler.peak() == 4).await;

        service.cancel();
        sleep(Duration::from_millis(50)).await;
        assert!(
            service.subscription_is_initiated("test"),
            "subscriber stopped with handlers in flight"
        );

        timeout(Duration::from_secs(2), service.stop()).await.unwrap();
        assert!(!service.subscription_is_initiated("test"));
        assert_eq!(handler.handled(), 4);
        assert_eq!(transport.topic_stats("topicA").unwrap().acked, 4);
    }

    #[tokio::test]
    async fn test_redelivery_after_nack() {
        let transport = Arc::new(MemTransport::with_max_deliveries(3));
        let handler = RecordingHandler::with_delay(Duration::ZERO);
        let service = service(&transport, 2, &handler);
        service.start().await.unwrap();

        service
            .publish(&RequestContext::background(), "test", FAIL_BODY)
            .await
            .unwrap();

        eventually(|| transport.topic_stats("topicA").unwrap().dead_lettered == 1).await;
        assert_eq!(handler.failed(), 3);
        assert!(service.subscription_is_initiated("test"));
        service.stop().await;
    }
}
