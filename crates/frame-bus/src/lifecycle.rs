//! # Shutdown Coordinator
//!
//! Collects cleanup actions (closing topics and subscriptions, user hooks)
//! and runs them once, in registration order, when the process stops.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::debug;

type CleanupAction = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Ordered list of shutdown actions, executed exactly once.
#[derive(Default)]
pub struct ShutdownCoordinator {
    actions: Mutex<Vec<CleanupAction>>,
    has_run: AtomicBool,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cleanup action.
    ///
    /// Actions added after `run_cleanup` has started are never executed.
    pub fn add_cleanup<F>(&self, action: F)
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.actions.lock().push(Box::new(action));
    }

    /// Run every registered action in order. Later calls do nothing.
    pub async fn run_cleanup(&self) {
        if self.has_run.swap(true, Ordering::AcqRel) {
            return;
        }

        let actions = std::mem::take(&mut *self.actions.lock());
        debug!(count = actions.len(), "Running shutdown actions");
        for action in actions {
            action().await;
        }
    }

    /// Whether `run_cleanup` has been called.
    #[must_use]
    pub fn has_run(&self) -> bool {
        self.has_run.load(Ordering::Acquire)
    }

    /// Number of actions waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.actions.lock().len()
    }
}
