//! Document-store abstraction the token service is built on: CRUD plus a
//! single-field search, optimistic concurrency through `seq_no`/
//! `primary_term`, and a retry-with-backoff helper for the transient
//! failure kinds a sharded store can surface mid-request.

pub mod error;
pub mod in_memory;
pub mod model;
pub mod retry;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use in_memory::InMemoryTokenStore;
pub use model::{SearchQuery, StoredDocument, UpdateOutcome};
pub use retry::{with_retry, BackoffIterator, ExponentialBackoff};
pub use store::TokenStore;
