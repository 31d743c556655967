//! spec.md §4.6: single and bulk token invalidation, plus the "maybe
//! start expired remover" hook every invalidation path runs first.

use crate::clock::Clock;
use crate::error::TokenServiceResult;
use crate::model::{document_id, DOC_TYPE};
use crate::repository::TokenRepository;
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use token_store::{BackoffIterator, ExponentialBackoff, SearchQuery, StoreError, UpdateOutcome};
use tracing::warn;

const DEFAULT_DELETE_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TokensInvalidationResult {
    pub invalidated: Vec<String>,
    pub previously_invalidated: Vec<String>,
    pub errors: Vec<String>,
}

impl TokensInvalidationResult {
    fn merge(&mut self, other: TokensInvalidationResult) {
        self.invalidated.extend(other.invalidated);
        self.previously_invalidated.extend(other.previously_invalidated);
        self.errors.extend(other.errors);
    }
}

/// Invoked by `InvalidationEngine` before every invalidation path runs,
/// standing in for submitting the cluster's expired-token sweeper.
pub trait ExpiredTokenSweeper: Send + Sync {
    fn maybe_submit(&self);
}

pub struct NoopSweeper;

impl ExpiredTokenSweeper for NoopSweeper {
    fn maybe_submit(&self) {}
}

pub struct InvalidationEngine {
    repository: Arc<TokenRepository>,
    clock: Arc<dyn Clock>,
    sweeper: Arc<dyn ExpiredTokenSweeper>,
    delete_interval: Duration,
    last_sweep_millis: AtomicI64,
}

impl InvalidationEngine {
    pub fn new(repository: Arc<TokenRepository>, clock: Arc<dyn Clock>, sweeper: Arc<dyn ExpiredTokenSweeper>) -> Self {
        let now = clock.now_millis();
        Self {
            repository,
            clock,
            sweeper,
            delete_interval: DEFAULT_DELETE_INTERVAL,
            last_sweep_millis: AtomicI64::new(now),
        }
    }

    fn maybe_start_expired_remover(&self) {
        let now = self.clock.now_millis();
        let last = self.last_sweep_millis.load(Ordering::SeqCst);
        if now.saturating_sub(last) < self.delete_interval.as_millis() as i64 {
            return;
        }
        if self
            .last_sweep_millis
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.sweeper.maybe_submit();
        }
    }

    pub async fn invalidate_access_token(&self, token_id: &str) -> TokenServiceResult<TokensInvalidationResult> {
        self.maybe_start_expired_remover();
        self.invalidate_one(&document_id(token_id), "access_token").await
    }

    pub async fn invalidate_refresh_token(&self, token_id: &str) -> TokenServiceResult<TokensInvalidationResult> {
        self.maybe_start_expired_remover();
        self.invalidate_one(&document_id(token_id), "refresh_token").await
    }

    /// Invalidate both halves of one document, refresh token first so a
    /// racing refresh can never mint a replacement against an
    /// already-dead access token (spec.md's property 8).
    pub async fn invalidate_both(&self, token_id: &str) -> TokenServiceResult<TokensInvalidationResult> {
        self.maybe_start_expired_remover();
        let doc_id = document_id(token_id);
        let mut result = self.bulk_invalidate(&[doc_id.clone()], "refresh_token").await?;
        result.merge(self.bulk_invalidate(&[doc_id], "access_token").await?);
        Ok(result)
    }

    pub async fn invalidate_active_tokens_for_realm_and_user(
        &self,
        realm: Option<&str>,
        user: &str,
    ) -> TokenServiceResult<TokensInvalidationResult> {
        self.maybe_start_expired_remover();

        let field = match realm {
            Some(_) => "access_token.realm",
            None => "access_token.user_token.authentication.user",
        };
        let value = realm.unwrap_or(user);
        let query = SearchQuery {
            doc_type: DOC_TYPE.to_string(),
            field: field.to_string(),
            value: value.to_string(),
            size: 10_000,
        };
        let hits = self.repository.search(&query).await?;
        let ids: Vec<String> = hits.into_iter().map(|doc| doc.id).collect();

        let mut result = self.bulk_invalidate(&ids, "refresh_token").await?;
        result.merge(self.bulk_invalidate(&ids, "access_token").await?);
        Ok(result)
    }

    async fn invalidate_one(&self, doc_id: &str, prefix: &str) -> TokenServiceResult<TokensInvalidationResult> {
        self.bulk_invalidate(&[doc_id.to_string()], prefix).await
    }

    /// `spec.md` §4.6's bulk path: one bulk update setting
    /// `<prefix>.invalidated=true`, UPDATED/NOOP split into the two
    /// success buckets, and the shard-unavailable subset retried with a
    /// single shared backoff until it's exhausted.
    async fn bulk_invalidate(&self, ids: &[String], prefix: &str) -> TokenServiceResult<TokensInvalidationResult> {
        if ids.is_empty() {
            return Ok(TokensInvalidationResult::default());
        }

        let patch = json!({ prefix: { "invalidated": true } });
        let mut backoff = ExponentialBackoff::default();
        let mut pending = ids.to_vec();
        let mut result = TokensInvalidationResult::default();

        loop {
            let responses = self.repository.bulk_update(&pending, patch.clone()).await?;
            let mut retryable = Vec::new();

            for (id, outcome) in responses {
                match outcome {
                    Ok(UpdateOutcome::Updated) => result.invalidated.push(id),
                    Ok(UpdateOutcome::Noop) => result.previously_invalidated.push(id),
                    Ok(UpdateOutcome::Conflict) => {
                        result.errors.push(format!("{id}: concurrent modification"));
                    }
                    Err(err) if err.is_transient() => retryable.push(id),
                    Err(err) => result.errors.push(format!("{id}: {err}")),
                }
            }

            if retryable.is_empty() {
                break;
            }
            match backoff.next_delay() {
                Some(delay) => {
                    warn!(count = retryable.len(), "retrying shard-unavailable invalidations");
                    tokio::time::sleep(delay).await;
                    pending = retryable;
                }
                None => {
                    result
                        .errors
                        .extend(retryable.into_iter().map(|id| format!("{id}: shard unavailable, retries exhausted")));
                    break;
                }
            }
        }

        Ok(result)
    }
}
