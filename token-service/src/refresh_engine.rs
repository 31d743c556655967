//! spec.md §4.5: the refresh state machine. Stage A locates the
//! document, Stage B inspects it, Stage C handles idempotent replay,
//! Stage D mints the superseding document.

use crate::clock::Clock;
use crate::codec::{ClusterVersion, Version};
use crate::config::TokenServiceConfig;
use crate::error::{TokenServiceError, TokenServiceResult};
use crate::minting::create_oauth2_tokens;
use crate::model::{document_id, Authentication, ClientInfo, RefreshTokenDoc, TokenDocument, UserToken};
use crate::repository::TokenRepository;
use serde_json::json;
use std::sync::Arc;
use token_store::{BackoffIterator, ExponentialBackoff, StoredDocument, UpdateOutcome};
use tracing::warn;

const TWENTY_FOUR_HOURS_MILLIS: i64 = 24 * 60 * 60 * 1000;
const IDEMPOTENCE_WINDOW_MILLIS: i64 = 30_000;

pub struct RefreshedPair {
    pub user_token: UserToken,
    pub refresh_token: String,
}

enum MintOutcome {
    Minted(RefreshedPair),
    Retry,
}

pub struct RefreshEngine {
    repository: Arc<TokenRepository>,
    clock: Arc<dyn Clock>,
    config: Arc<TokenServiceConfig>,
    cluster_min_version: ClusterVersion,
}

impl RefreshEngine {
    pub fn new(
        repository: Arc<TokenRepository>,
        clock: Arc<dyn Clock>,
        config: Arc<TokenServiceConfig>,
        cluster_min_version: ClusterVersion,
    ) -> Self {
        Self {
            repository,
            clock,
            config,
            cluster_min_version,
        }
    }

    pub async fn refresh(&self, refresh_token: &str, caller: &Authentication) -> TokenServiceResult<RefreshedPair> {
        let mut backoff = ExponentialBackoff::default();
        let mut current = self.locate(refresh_token).await?;
        self.inspect(&current, caller)?;

        loop {
            let document = TokenDocument::from_value(current.source.clone())?;
            let refresh_doc = document.refresh_token.clone().ok_or(TokenServiceError::InvalidGrant)?;

            if refresh_doc.refreshed {
                match self.replay(&document, &refresh_doc, &mut backoff).await? {
                    MintOutcome::Minted(pair) => return Ok(pair),
                    MintOutcome::Retry => {
                        current = self.wait_and_reread(&current.id, &mut backoff).await?;
                        continue;
                    }
                }
            }

            match self.mint(&current, &document).await? {
                MintOutcome::Minted(pair) => return Ok(pair),
                MintOutcome::Retry => {
                    current = self.wait_and_reread(&current.id, &mut backoff).await?;
                }
            }
        }
    }

    async fn locate(&self, refresh_token: &str) -> TokenServiceResult<StoredDocument> {
        let hits = self.repository.find_by_refresh_token(refresh_token).await?;
        match hits.len() {
            0 => Err(TokenServiceError::InvalidGrant),
            1 => hits
                .into_iter()
                .next()
                .ok_or_else(|| TokenServiceError::FatalInconsistency("search reported one hit but yielded none".to_string())),
            _ => Err(TokenServiceError::FatalInconsistency(
                "more than one document shares a refresh token".to_string(),
            )),
        }
    }

    fn inspect(&self, stored: &StoredDocument, caller: &Authentication) -> TokenServiceResult<()> {
        let document = TokenDocument::from_value(stored.source.clone())?;
        let now = self.clock.now_millis();

        if now.saturating_sub(document.creation_time) > TWENTY_FOUR_HOURS_MILLIS {
            return Err(TokenServiceError::InvalidGrant);
        }

        let refresh_doc = document.refresh_token.ok_or(TokenServiceError::InvalidGrant)?;
        if refresh_doc.invalidated {
            return Err(TokenServiceError::InvalidGrant);
        }
        if !refresh_doc.client.binds(caller) {
            return Err(TokenServiceError::InvalidGrant);
        }
        Ok(())
    }

    /// Stage C: a document already marked `refreshed=true`. Replayable
    /// only within a ±30s window of the recorded refresh time, and only
    /// for documents minted on a cluster at or above the modern
    /// threshold.
    async fn replay(
        &self,
        document: &TokenDocument,
        refresh_doc: &RefreshTokenDoc,
        backoff: &mut ExponentialBackoff,
    ) -> TokenServiceResult<MintOutcome> {
        if Version::from_u32(document.created_with_version) < Version::MODERN_THRESHOLD {
            return Err(TokenServiceError::InvalidGrant);
        }

        let refresh_time = refresh_doc.refresh_time.ok_or(TokenServiceError::InvalidGrant)?;
        let now = self.clock.now_millis();
        let delta = now - refresh_time;
        if delta.abs() > IDEMPOTENCE_WINDOW_MILLIS {
            return Err(TokenServiceError::InvalidGrant);
        }

        let superseded_by = refresh_doc.superseded_by.clone().ok_or(TokenServiceError::InvalidGrant)?;

        match self.repository.get_document(&superseded_by).await? {
            Some(superseding) => {
                let superseding_document = TokenDocument::from_value(superseding.source)?;
                let superseding_refresh = superseding_document
                    .refresh_token
                    .ok_or_else(|| TokenServiceError::FatalInconsistency("superseding document has no refresh token".to_string()))?;
                Ok(MintOutcome::Minted(RefreshedPair {
                    user_token: UserToken::from(superseding_document.access_token.user_token),
                    refresh_token: superseding_refresh.token,
                }))
            }
            None => {
                if backoff.next_delay().is_some() {
                    Ok(MintOutcome::Retry)
                } else {
                    Err(TokenServiceError::InvalidGrant)
                }
            }
        }
    }

    /// Stage D: mint the new document first, then conditionally point the
    /// original at it. A conflict means a concurrent refresh already won;
    /// the caller re-reads and falls back into Stage C against whatever
    /// that winner left behind.
    async fn mint(&self, stored: &StoredDocument, document: &TokenDocument) -> TokenServiceResult<MintOutcome> {
        let original_user_token = &document.access_token.user_token;
        let minted = create_oauth2_tokens(
            &self.repository,
            self.clock.as_ref(),
            &self.config,
            self.cluster_min_version.get(),
            original_user_token.authentication.clone(),
            original_user_token.metadata.clone(),
            ClientInfo::TOKEN_AUTH_TYPE,
            true,
        )
        .await?;

        let now = self.clock.now_millis();
        let patch = json!({
            "refresh_token": {
                "token": document.refresh_token.as_ref().map(|r| r.token.clone()).unwrap_or_default(),
                "invalidated": document.refresh_token.as_ref().map(|r| r.invalidated).unwrap_or(false),
                "refreshed": true,
                "refresh_time": now,
                "superseded_by": document_id(&minted.user_token.id),
                "client": document.refresh_token.as_ref().map(|r| r.client.clone()),
            }
        });

        let outcome = self
            .repository
            .conditional_update(&stored.id, patch, stored.seq_no, stored.primary_term)
            .await?;

        match outcome {
            UpdateOutcome::Updated => Ok(MintOutcome::Minted(RefreshedPair {
                user_token: minted.user_token,
                refresh_token: minted.refresh_token.unwrap_or_default(),
            })),
            UpdateOutcome::Conflict | UpdateOutcome::Noop => {
                warn!("lost the race to mark a refresh token superseded; deferring to the concurrent winner");
                Ok(MintOutcome::Retry)
            }
        }
    }

    async fn wait_and_reread(&self, doc_id: &str, backoff: &mut ExponentialBackoff) -> TokenServiceResult<StoredDocument> {
        if let Some(delay) = backoff.next_delay() {
            tokio::time::sleep(delay).await;
        } else {
            return Err(TokenServiceError::InvalidGrant);
        }
        self.repository
            .get_document(doc_id)
            .await?
            .ok_or(TokenServiceError::InvalidGrant)
    }
}
