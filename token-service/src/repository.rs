//! Wraps a `token_store::TokenStore` with the four behaviors spec.md
//! §4.3 assigns the token repository: prepare-then-execute, origin
//! tagging, retry-with-backoff, and the optimistic-concurrency helpers
//! the refresh engine drives.

use crate::error::{TokenServiceError, TokenServiceResult};
use crate::model::{document_id, DOC_TYPE};
use error_common::RequestContext;
use serde_json::Value;
use std::sync::Arc;
use token_store::{ExponentialBackoff, SearchQuery, StoredDocument, TokenStore, UpdateOutcome};
use tracing::instrument;

pub struct TokenRepository {
    store: Arc<dyn TokenStore>,
}

impl TokenRepository {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    fn context(&self) -> RequestContext {
        RequestContext::new().with_origin(RequestContext::SECURITY_ORIGIN)
    }

    #[instrument(skip(self, source))]
    pub async fn create_document(&self, token_id: &str, source: Value) -> TokenServiceResult<StoredDocument> {
        let ctx = self.context();
        let id = document_id(token_id);
        let doc = token_store::with_retry(ExponentialBackoff::default(), || {
            let store = self.store.clone();
            let id = id.clone();
            let source = source.clone();
            let ctx = ctx.clone();
            async move { store.create(&id, source, &ctx).await }
        })
        .await?;
        Ok(doc)
    }

    #[instrument(skip(self))]
    pub async fn get_document(&self, doc_id: &str) -> TokenServiceResult<Option<StoredDocument>> {
        let ctx = self.context();
        let doc = token_store::with_retry(ExponentialBackoff::default(), || {
            let store = self.store.clone();
            let ctx = ctx.clone();
            async move { store.get(doc_id, &ctx).await }
        })
        .await?;
        Ok(doc)
    }

    /// Update a document only if it is still at `seq_no`/`primary_term`;
    /// retries on shard-unavailable but does *not* retry on conflict —
    /// that is the refresh engine's job (re-read and restart its own
    /// state machine), per spec.md §4.5 Stage D.
    #[instrument(skip(self, patch))]
    pub async fn conditional_update(
        &self,
        doc_id: &str,
        patch: Value,
        seq_no: i64,
        primary_term: i64,
    ) -> TokenServiceResult<UpdateOutcome> {
        let ctx = self.context();
        let outcome = token_store::with_retry(ExponentialBackoff::default(), || {
            let store = self.store.clone();
            let patch = patch.clone();
            let ctx = ctx.clone();
            async move { store.conditional_update(doc_id, patch, seq_no, primary_term, &ctx).await }
        })
        .await?;
        Ok(outcome)
    }

    #[instrument(skip(self, patch))]
    pub async fn bulk_update(
        &self,
        ids: &[String],
        patch: Value,
    ) -> TokenServiceResult<Vec<(String, Result<UpdateOutcome, token_store::StoreError>)>> {
        let ctx = self.context();
        let result = token_store::with_retry(ExponentialBackoff::default(), || {
            let store = self.store.clone();
            let ids = ids.to_vec();
            let patch = patch.clone();
            let ctx = ctx.clone();
            async move { store.bulk_update(&ids, patch, &ctx).await }
        })
        .await?;
        Ok(result)
    }

    /// Locate the one document whose refresh token string matches, used
    /// by Stage A of the refresh engine. Zero or more-than-one hits are
    /// the caller's business, not this method's.
    #[instrument(skip(self, refresh_token))]
    pub async fn find_by_refresh_token(&self, refresh_token: &str) -> TokenServiceResult<Vec<StoredDocument>> {
        self.search(&SearchQuery {
            doc_type: DOC_TYPE.to_string(),
            field: "refresh_token.token".to_string(),
            value: refresh_token.to_string(),
            size: 2,
        })
        .await
    }

    #[instrument(skip(self, query))]
    pub async fn search(&self, query: &SearchQuery) -> TokenServiceResult<Vec<StoredDocument>> {
        let ctx = self.context();
        let hits = token_store::with_retry(ExponentialBackoff::default(), || {
            let store = self.store.clone();
            let query = query.clone();
            let ctx = ctx.clone();
            async move { store.search(&query, &ctx).await }
        })
        .await
        .map_err(TokenServiceError::from)?;
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;
    use token_store::InMemoryTokenStore;

    fn repository() -> TokenRepository {
        TokenRepository::new(Arc::new(InMemoryTokenStore::new()))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = repository();
        repo.create_document("abc", json!({"type": DOC_TYPE, "v": 1})).await.unwrap();
        let doc = repo.get_document(&document_id("abc")).await.unwrap().unwrap();
        assert_eq!(doc.source["v"], 1);
    }

    #[tokio::test]
    async fn conditional_update_reports_conflict_without_retrying_forever() {
        let repo = repository();
        repo.create_document("abc", json!({"type": DOC_TYPE})).await.unwrap();
        let outcome = repo
            .conditional_update(&document_id("abc"), json!({"v": 2}), 99, 0)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Conflict);
    }

    #[tokio::test]
    async fn find_by_refresh_token_locates_the_document() {
        let repo = repository();
        repo.create_document(
            "abc",
            json!({"doc_type": DOC_TYPE, "refresh_token": {"token": "r-1"}}),
        )
        .await
        .unwrap();
        let hits = repo.find_by_refresh_token("r-1").await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
