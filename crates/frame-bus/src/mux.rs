//! # Transport Multiplexer
//!
//! Routes a transport URL to the driver registered for its scheme, so the
//! engine can hold a single `TransportDriver` regardless of how many brokers
//! the application uses.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use frame_types::TransportError;
use tracing::debug;

use crate::driver::{Subscription, Topic, TransportDriver};

/// Separator between the scheme and the rest of a transport URL.
pub const SCHEME_SEPARATOR: &str = "://";

/// Whether `reference` is shaped like a transport URL.
#[must_use]
pub fn looks_like_url(reference: &str) -> bool {
    reference.contains(SCHEME_SEPARATOR)
}

/// Extract and validate the scheme of `url`.
///
/// A scheme starts with an ASCII letter followed by letters, digits, `+`, `-`
/// or `.`, and must be followed by `://` and a non-empty remainder.
///
/// # Errors
///
/// Returns `TransportError::InvalidUrl` when `url` does not have that shape.
pub fn scheme_of(url: &str) -> Result<&str, TransportError> {
    let invalid = || TransportError::InvalidUrl {
        url: url.to_string(),
    };

    let (scheme, rest) = url.split_once(SCHEME_SEPARATOR).ok_or_else(invalid)?;
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let tail_valid = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    if !starts_alpha || !tail_valid || rest.is_empty() {
        return Err(invalid());
    }
    Ok(scheme)
}

/// Whether `url` is an HTTP(S) push endpoint served by an external listener.
#[must_use]
pub fn is_push_endpoint(url: &str) -> bool {
    scheme_of(url)
        .map(|scheme| scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// Scheme-to-driver routing table.
#[derive(Default, Clone)]
pub struct TransportMux {
    drivers: HashMap<String, Arc<dyn TransportDriver>>,
}

impl TransportMux {
    /// Create an empty multiplexer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `driver` for `scheme`, replacing any previous driver.
    pub fn register(&mut self, scheme: impl Into<String>, driver: Arc<dyn TransportDriver>) {
        let scheme = scheme.into().to_ascii_lowercase();
        debug!(scheme = %scheme, "Transport driver registered");
        self.drivers.insert(scheme, driver);
    }

    /// Builder-style `register`.
    #[must_use]
    pub fn with(mut self, scheme: impl Into<String>, driver: Arc<dyn TransportDriver>) -> Self {
        self.register(scheme, driver);
        self
    }

    /// Whether a driver is registered for `scheme`.
    #[must_use]
    pub fn supports(&self, scheme: &str) -> bool {
        self.drivers.contains_key(&scheme.to_ascii_lowercase())
    }

    fn driver_for(&self, url: &str) -> Result<&Arc<dyn TransportDriver>, TransportError> {
        let scheme = scheme_of(url)?;
        self.drivers
            .get(&scheme.to_ascii_lowercase())
            .ok_or_else(|| TransportError::UnsupportedScheme {
                scheme: scheme.to_string(),
                url: url.to_string(),
            })
    }
}

#[async_trait]
impl TransportDriver for TransportMux {
    async fn open_topic(&self, url: &str) -> Result<Arc<dyn Topic>, TransportError> {
        self.driver_for(url)?.open_topic(url).await
    }

    async fn open_subscription(
        &self,
        url: &str,
    ) -> Result<Arc<dyn Subscription>, TransportError> {
        self.driver_for(url)?.open_subscription(url).await
    }
}
