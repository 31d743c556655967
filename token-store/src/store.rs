use crate::error::StoreResult;
use crate::model::{SearchQuery, StoredDocument, UpdateOutcome};
use async_trait::async_trait;
use error_common::RequestContext;
use serde_json::Value;

/// Document-store abstraction the token service is built against. Calls
/// are raw: a single attempt, no retry. Retry-with-backoff is layered on
/// top by the caller so stages that issue several related calls can share
/// one backoff sequence.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create(&self, id: &str, source: Value, ctx: &RequestContext) -> StoreResult<StoredDocument>;

    async fn get(&self, id: &str, ctx: &RequestContext) -> StoreResult<Option<StoredDocument>>;

    /// Apply `patch` (merged field-by-field into the stored document) only
    /// if the document is still at `seq_no`/`primary_term`.
    async fn conditional_update(
        &self,
        id: &str,
        patch: Value,
        seq_no: i64,
        primary_term: i64,
        ctx: &RequestContext,
    ) -> StoreResult<UpdateOutcome>;

    /// Apply the same patch to every id in `ids`, unconditionally.
    /// Partial failure is reported per-id rather than aborting the batch.
    async fn bulk_update(
        &self,
        ids: &[String],
        patch: Value,
        ctx: &RequestContext,
    ) -> StoreResult<Vec<(String, StoreResult<UpdateOutcome>)>>;

    async fn search(&self, query: &SearchQuery, ctx: &RequestContext) -> StoreResult<Vec<StoredDocument>>;
}
