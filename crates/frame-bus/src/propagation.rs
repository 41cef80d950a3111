//! # Claims Propagation
//!
//! Moves the caller identity between a `RequestContext` and message metadata.
//! Propagation is best-effort: a context without claims publishes empty
//! metadata, and metadata without claim keys yields the background context.

use frame_types::{AuthenticationClaims, Metadata, RequestContext};

/// Injects identity into outgoing metadata and extracts it from incoming metadata.
pub trait ClaimsPropagator: Send + Sync {
    /// Copy the claims of `ctx`, if any, into `metadata`.
    fn inject(&self, ctx: &RequestContext, metadata: &mut Metadata);

    /// Build the handler context for a received message.
    fn extract(&self, metadata: &Metadata) -> RequestContext;
}

/// Propagator using the fixed `AuthenticationClaims` metadata keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataClaimsPropagator;

impl ClaimsPropagator for MetadataClaimsPropagator {
    fn inject(&self, ctx: &RequestContext, metadata: &mut Metadata) {
        if let Some(claims) = ctx.claims() {
            metadata.extend(claims.as_metadata());
        }
    }

    fn extract(&self, metadata: &Metadata) -> RequestContext {
        match AuthenticationClaims::from_metadata(metadata) {
            Some(claims) => RequestContext::background().with_claims(claims),
            None => RequestContext::background(),
        }
    }
}
