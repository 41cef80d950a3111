//! # Frame Types Crate
//!
//! This crate contains the message model, the identity claims carried in
//! message metadata, the execution context handed to publishers and
//! handlers, and the error types shared across the workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Every type crossing a crate boundary lives here.
//! - **Flat Metadata**: Messages carry a string-to-string map; anything richer
//!   is flattened into fixed key names.
//! - **Best-Effort Identity**: Missing claims never fail a publish or a receive.

pub mod claims;
pub mod context;
pub mod errors;
pub mod message;

pub use claims::AuthenticationClaims;
pub use context::RequestContext;
pub use errors::*;
pub use message::{Message, Metadata, Payload};
