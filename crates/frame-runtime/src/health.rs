//! # Health Checks
//!
//! A health checker reports whether one part of the service can do its job.
//! The queue engine is always checked; applications add their own.

use std::sync::Arc;

use frame_bus::Queue;

/// A single health probe.
pub trait HealthChecker: Send + Sync {
    /// `Ok(())` when healthy.
    fn check_health(&self) -> anyhow::Result<()>;
}

impl<F> HealthChecker for F
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    fn check_health(&self) -> anyhow::Result<()> {
        self()
    }
}

/// Fails while any non-push subscriber is not running.
pub(crate) struct QueueHealth(pub(crate) Arc<Queue>);

impl HealthChecker for QueueHealth {
    fn check_health(&self) -> anyhow::Result<()> {
        self.0.check_health().map_err(anyhow::Error::from)
    }
}
