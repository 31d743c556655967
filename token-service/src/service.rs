//! `TokenService`: the single entry point wiring the key manager, codec,
//! repository, validator, refresh engine, and invalidation engine
//! together (spec.md §3, "component table").

use crate::clock::{Clock, SystemClock};
use crate::codec::{ClusterVersion, Codec, Version};
use crate::config::TokenServiceConfig;
use crate::error::{TokenServiceError, TokenServiceResult};
use crate::invalidation_engine::{ExpiredTokenSweeper, InvalidationEngine, NoopSweeper, TokensInvalidationResult};
use crate::key_manager::KeyManager;
use crate::minting::create_oauth2_tokens;
use crate::model::Authentication;
use crate::refresh_engine::RefreshEngine;
use crate::repository::TokenRepository;
use crate::validator::Validator;
use cluster_metadata::MetadataChannel;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use token_store::TokenStore;

pub struct MintedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

pub struct TokenService {
    config: TokenServiceConfig,
    clock: Arc<dyn Clock>,
    key_manager: Arc<KeyManager>,
    codec: Arc<Codec>,
    repository: Arc<TokenRepository>,
    validator: Validator,
    refresh_engine: RefreshEngine,
    invalidation_engine: InvalidationEngine,
    cluster_min_version: ClusterVersion,
}

impl TokenService {
    pub async fn new(
        config: TokenServiceConfig,
        store: Arc<dyn TokenStore>,
        channel: Arc<dyn MetadataChannel>,
    ) -> TokenServiceResult<Arc<Self>> {
        Self::with_sweeper(config, store, channel, Arc::new(NoopSweeper)).await
    }

    pub async fn with_sweeper(
        config: TokenServiceConfig,
        store: Arc<dyn TokenStore>,
        channel: Arc<dyn MetadataChannel>,
        sweeper: Arc<dyn ExpiredTokenSweeper>,
    ) -> TokenServiceResult<Arc<Self>> {
        config
            .validate()
            .map_err(|err| TokenServiceError::FatalInconsistency(err.to_string()))?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let key_manager = KeyManager::bootstrap(channel)?;
        key_manager.spawn_subscriber();
        key_manager.maybe_install_token_metadata().await?;

        let codec =
            Arc::new(Codec::new().map_err(|err| TokenServiceError::FatalInconsistency(format!("derivation executor: {err}")))?);
        let repository = Arc::new(TokenRepository::new(store));
        let validator = Validator::new(repository.clone(), clock.clone());
        let cluster_min_version = ClusterVersion::new(Version::MODERN_THRESHOLD);
        let refresh_engine = RefreshEngine::new(
            repository.clone(),
            clock.clone(),
            Arc::new(config.clone()),
            cluster_min_version.clone(),
        );
        let invalidation_engine = InvalidationEngine::new(repository.clone(), clock.clone(), sweeper);

        Ok(Arc::new(Self {
            config,
            clock,
            key_manager,
            codec,
            repository,
            validator,
            refresh_engine,
            invalidation_engine,
            cluster_min_version,
        }))
    }

    /// Update the cluster's minimum node version as nodes join or leave,
    /// governing which bearer-string format newly minted tokens use and
    /// which documents are eligible for idempotent-refresh replay.
    pub fn set_cluster_min_version(&self, version: Version) {
        self.cluster_min_version.set(version);
    }

    fn cluster_min_version(&self) -> Version {
        self.cluster_min_version.get()
    }

    fn ensure_enabled(&self) -> TokenServiceResult<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(TokenServiceError::Disabled)
        }
    }

    pub async fn create_oauth2_tokens(
        &self,
        authentication: Authentication,
        metadata: HashMap<String, Value>,
        client_auth_type: &str,
        include_refresh: bool,
    ) -> TokenServiceResult<MintedTokens> {
        self.ensure_enabled()?;
        let cluster_min_version = self.cluster_min_version();
        let minted = create_oauth2_tokens(
            &self.repository,
            self.clock.as_ref(),
            &self.config,
            cluster_min_version,
            authentication,
            metadata,
            client_auth_type,
            include_refresh,
        )
        .await?;

        let ring = self.key_manager.current_ring();
        let access_token = self.codec.encode(&ring, &minted.user_token.id, cluster_min_version).await?;

        Ok(MintedTokens {
            access_token,
            refresh_token: minted.refresh_token,
        })
    }

    /// Decode and validate a bearer string. `Ok(None)` means "no token" —
    /// the bearer is malformed, expired, or invalidated, never an error on
    /// its own, so a different authenticator further down the chain can
    /// still run.
    pub async fn authenticate(&self, bearer: &str) -> TokenServiceResult<Option<crate::model::UserToken>> {
        self.ensure_enabled()?;
        let ring = self.key_manager.current_ring();
        let Some(token_id) = self.codec.decode(&ring, bearer).await else {
            return Ok(None);
        };
        Ok(self.validator.get_and_validate(&token_id).await)
    }

    pub async fn refresh(&self, refresh_token: &str, caller: &Authentication) -> TokenServiceResult<RefreshedTokens> {
        self.ensure_enabled()?;
        let refreshed = self.refresh_engine.refresh(refresh_token, caller).await?;
        let cluster_min_version = self.cluster_min_version();
        let ring = self.key_manager.current_ring();
        let access_token = self
            .codec
            .encode(&ring, &refreshed.user_token.id, cluster_min_version)
            .await?;
        Ok(RefreshedTokens {
            access_token,
            refresh_token: refreshed.refresh_token,
        })
    }

    pub async fn invalidate_access_token(&self, bearer: &str) -> TokenServiceResult<TokensInvalidationResult> {
        self.ensure_enabled()?;
        let ring = self.key_manager.current_ring();
        match self.codec.decode(&ring, bearer).await {
            Some(token_id) => self.invalidation_engine.invalidate_access_token(&token_id).await,
            None => Ok(TokensInvalidationResult::default()),
        }
    }

    pub async fn invalidate_refresh_token(&self, token: &str) -> TokenServiceResult<TokensInvalidationResult> {
        self.ensure_enabled()?;
        self.invalidation_engine.invalidate_refresh_token(token).await
    }

    pub async fn invalidate_active_tokens_for_realm_and_user(
        &self,
        realm: Option<&str>,
        user: &str,
    ) -> TokenServiceResult<TokensInvalidationResult> {
        self.ensure_enabled()?;
        self.invalidation_engine
            .invalidate_active_tokens_for_realm_and_user(realm, user)
            .await
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.key_manager
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::model::ClientInfo;
    use cluster_metadata::InMemoryMetadataChannel;
    use token_store::InMemoryTokenStore;

    async fn service() -> Arc<TokenService> {
        let store = Arc::new(InMemoryTokenStore::new());
        let channel = Arc::new(InMemoryMetadataChannel::default());
        TokenService::new(TokenServiceConfig::default(), store, channel).await.unwrap()
    }

    fn authentication() -> Authentication {
        Authentication {
            user: "alice".to_string(),
            realm: "r1".to_string(),
        }
    }

    #[tokio::test]
    async fn mints_and_authenticates_a_round_trip() {
        let service = service().await;
        let minted = service
            .create_oauth2_tokens(authentication(), HashMap::new(), ClientInfo::TOKEN_AUTH_TYPE, true)
            .await
            .unwrap();

        let token = service.authenticate(&minted.access_token).await.unwrap();
        assert!(token.is_some());
        assert_eq!(token.unwrap().authentication.user, "alice");
    }

    #[tokio::test]
    async fn disabled_service_rejects_minting() {
        let store = Arc::new(InMemoryTokenStore::new());
        let channel = Arc::new(InMemoryMetadataChannel::default());
        let mut config = TokenServiceConfig::default();
        config.enabled = false;
        let service = TokenService::new(config, store, channel).await.unwrap();

        let result = service
            .create_oauth2_tokens(authentication(), HashMap::new(), ClientInfo::TOKEN_AUTH_TYPE, true)
            .await;
        assert!(matches!(result, Err(TokenServiceError::Disabled)));
    }

    #[tokio::test]
    async fn refresh_mints_a_new_access_token_and_invalidates_the_old_refresh_token() {
        let service = service().await;
        let minted = service
            .create_oauth2_tokens(authentication(), HashMap::new(), ClientInfo::TOKEN_AUTH_TYPE, true)
            .await
            .unwrap();
        let refresh_token = minted.refresh_token.unwrap();

        let refreshed = service.refresh(&refresh_token, &authentication()).await.unwrap();
        assert_ne!(refreshed.access_token, minted.access_token);

        let token = service.authenticate(&refreshed.access_token).await.unwrap();
        assert!(token.is_some());
    }

    #[tokio::test]
    async fn invalidate_access_token_makes_it_unauthenticatable() {
        let service = service().await;
        let minted = service
            .create_oauth2_tokens(authentication(), HashMap::new(), ClientInfo::TOKEN_AUTH_TYPE, true)
            .await
            .unwrap();

        let result = service.invalidate_access_token(&minted.access_token).await.unwrap();
        assert_eq!(result.invalidated.len(), 1);

        let token = service.authenticate(&minted.access_token).await.unwrap();
        assert!(token.is_none());
    }
}
