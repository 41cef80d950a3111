//! # Request Context
//!
//! The execution context passed to publish and to every handler invocation.
//! It replaces ambient per-task state: identity travels as an explicit value.

use crate::claims::AuthenticationClaims;

/// Execution context for a publish call or a handler invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    claims: Option<AuthenticationClaims>,
}

impl RequestContext {
    /// The neutral, unauthenticated context.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Attach identity claims.
    #[must_use]
    pub fn with_claims(mut self, claims: AuthenticationClaims) -> Self {
        self.claims = Some(claims);
        self
    }

    /// Identity claims, if the context is authenticated.
    #[must_use]
    pub fn claims(&self) -> Option<&AuthenticationClaims> {
        self.claims.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.claims.is_some()
    }
}

impl From<AuthenticationClaims> for RequestContext {
    fn from(claims: AuthenticationClaims) -> Self {
        Self::background().with_claims(claims)
    }
}
