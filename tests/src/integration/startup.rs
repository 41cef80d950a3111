//! # Startup Scenarios
//!
//! Initialization is all-or-nothing: one bad subscriber or publisher keeps
//! the whole service from starting.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use frame_bus::{handler_fn, MessageHandler};
    use frame_runtime::{
        register_publisher, register_subscriber, Service, ServiceBuilder, ServiceError,
    };
    use frame_types::{ErrorKind, QueueError, RequestContext};
    use tokio::time::timeout;

    fn noop() -> Arc<dyn MessageHandler> {
        handler_fn(|_ctx, _body| async { Ok(()) })
    }

    fn queue_error(err: ServiceError) -> QueueError {
        match err {
            ServiceError::Queue(e) => e,
            other => panic!("expected queue error, got {other:?}"),
        }
    }

    // =============================================================================
    // FAIL-FAST INITIALIZATION
    // =============================================================================

    #[tokio::test]
    async fn test_invalid_subscriber_url_aborts_start() {
        let service = Service::new(
            "startup-test",
            vec![
                register_subscriber("good", "mem://good", 1, noop()),
                register_subscriber("test", "memt+://topicA", 1, noop()),
            ],
        );

        let err = queue_error(service.start().await.unwrap_err());
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(!service.subscription_is_initiated("test"));
        assert!(!service.subscription_is_initiated("good"));
        assert!(service.check_health().is_err());

        assert!(service.start().await.is_err(), "second start reported success");
        assert!(!service.subscription_is_initiated("good"));
    }

    #[tokio::test]
    async fn test_invalid_publisher_url_aborts_start() {
        let service = Service::new(
            "startup-test",
            vec![
                register_publisher("good", "mem://good"),
                register_publisher("broken", "not-a-url"),
            ],
        );

        let err = queue_error(service.start().await.unwrap_err());
        assert!(matches!(err, QueueError::Transport(_)));

        let err = service
            .publish(&RequestContext::background(), "good", b"x".as_slice())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Uninitialized { .. }));
        assert!(!service.queue().publisher_is_initiated("good"));
        assert!(service.start().await.is_err(), "second start reported success");
    }

    #[tokio::test]
    async fn test_second_start_after_success_is_noop() {
        let service = Service::new(
            "startup-test",
            vec![
                register_publisher("good", "mem://again"),
                register_subscriber("good", "mem://again", 1, noop()),
            ],
        );

        service.start().await.unwrap();
        service.start().await.unwrap();
        assert!(service.subscription_is_initiated("good"));
        service.stop().await;
    }

    #[tokio::test]
    async fn test_zero_concurrency_aborts_start() {
        let service = Service::new(
            "startup-test",
            vec![register_subscriber("zero", "mem://zero", 0, noop())],
        );

        let err = queue_error(service.start().await.unwrap_err());
        assert!(matches!(err, QueueError::InvalidConcurrency { limit: 0, .. }));
    }

    #[tokio::test]
    async fn test_run_returns_start_error() {
        let service = Service::new(
            "startup-test",
            vec![register_subscriber("test", "memt+://topicA", 1, noop())],
        );

        let result = timeout(Duration::from_secs(1), service.run()).await.unwrap();
        assert!(matches!(result, Err(ServiceError::Queue(_))));
    }

    // =============================================================================
    // PUSH ENDPOINTS
    // =============================================================================

    #[tokio::test]
    async fn test_http_subscriber_is_initiated_without_transport() {
        let service = ServiceBuilder::new("startup-test")
            .subscriber("webhook", "http://localhost:8080/events", 2, noop())
            .build();

        service.start().await.unwrap();
        assert!(service.subscription_is_initiated("webhook"));
        assert!(service.check_health().is_ok());

        let err = service
            .publish(&RequestContext::background(), "webhook", b"x".as_slice())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        service.stop().await;
    }
}
