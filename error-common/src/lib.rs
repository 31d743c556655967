//! Shared error taxonomy for the bearer token service.
//!
//! Crates in this workspace do not define their own ad-hoc "kind" enums for
//! user-visible failures; they reuse [`ErrorKind`] and [`WwwAuthenticate`]
//! here so that `token-service`'s refresh/invalidation/validation paths all
//! report failures the same way, and a request context ([`RequestContext`])
//! that survives retry-with-backoff waits unchanged.

pub mod context;
pub mod types;

pub use context::*;
pub use types::*;
