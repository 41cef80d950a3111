//! # Frame Test Suite
//!
//! Cross-crate scenarios driving the queue engine through a `Service`.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── dispatch.rs     # Bounded concurrency, ack/nack, drain on cancel
//!     ├── publishing.rs   # Registration errors, ad-hoc URLs, claims
//!     └── startup.rs      # Fail-fast initialization
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p frame-tests
//! cargo test -p frame-tests integration::dispatch::
//! ```

pub mod integration;

pub mod fixtures {
    //! Shared helpers for scenario tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use frame_bus::MessageHandler;
    use frame_types::{AuthenticationClaims, RequestContext};
    use parking_lot::Mutex;

    /// Body that makes `RecordingHandler` fail.
    pub const FAIL_BODY: &[u8] = b"fail";

    /// Counts invocations and peak concurrency, records claims, fails on `FAIL_BODY`.
    #[derive(Default)]
    pub struct RecordingHandler {
        pub delay: Duration,
        pub handled: AtomicUsize,
        pub failed: AtomicUsize,
        current: AtomicUsize,
        pub peak: AtomicUsize,
        pub claims: Mutex<Vec<AuthenticationClaims>>,
    }

    impl RecordingHandler {
        pub fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                ..Self::default()
            })
        }

        pub fn handled(&self) -> usize {
            self.handled.load(Ordering::SeqCst)
        }

        pub fn failed(&self) -> usize {
            self.failed.load(Ordering::SeqCst)
        }

        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        async fn handle(&self, ctx: RequestContext, body: &[u8]) -> anyhow::Result<()> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(claims) = ctx.claims() {
                self.claims.lock().push(claims.clone());
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.current.fetch_sub(1, Ordering::SeqCst);

            if body == FAIL_BODY {
                self.failed.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("refusing message");
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Poll `condition` until it holds, panicking after five seconds.
    pub async fn eventually(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached within 5s");
    }
}
