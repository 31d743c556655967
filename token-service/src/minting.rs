//! `createOAuth2Tokens`: the one place new token documents are written,
//! shared by the top-level facade's initial mint and the refresh
//! engine's Stage D.

use crate::clock::Clock;
use crate::codec::Version;
use crate::config::TokenServiceConfig;
use crate::error::TokenServiceResult;
use crate::ids::generate_token_id;
use crate::model::{Authentication, ClientInfo, RefreshTokenDoc, TokenDocument, UserToken, UserTokenDoc};
use crate::repository::TokenRepository;
use serde_json::Value;
use std::collections::HashMap;

pub struct MintedPair {
    pub user_token: UserToken,
    pub refresh_token: Option<String>,
}

#[allow(clippy::too_many_arguments)]
pub async fn create_oauth2_tokens(
    repository: &TokenRepository,
    clock: &dyn Clock,
    config: &TokenServiceConfig,
    cluster_min_version: Version,
    authentication: Authentication,
    metadata: HashMap<String, Value>,
    client_auth_type: &str,
    include_refresh: bool,
) -> TokenServiceResult<MintedPair> {
    let new_id = generate_token_id();
    let now = clock.now_millis();
    let expiration_time = now + config.token_ttl.as_millis() as i64;

    let user_token_doc = UserTokenDoc {
        id: new_id.clone(),
        version: 1,
        authentication: authentication.clone(),
        metadata,
        expiration_time,
    };

    let refresh_token_doc = if include_refresh {
        Some(RefreshTokenDoc {
            token: generate_token_id(),
            invalidated: false,
            refreshed: false,
            refresh_time: None,
            superseded_by: None,
            client: ClientInfo {
                auth_type: client_auth_type.to_string(),
                user: authentication.user.clone(),
                realm: authentication.realm.clone(),
            },
        })
    } else {
        None
    };

    let document = TokenDocument::new(
        now,
        cluster_min_version.as_u32(),
        authentication.realm,
        user_token_doc.clone(),
        refresh_token_doc.clone(),
    );

    repository.create_document(&new_id, document.to_value()?).await?;

    Ok(MintedPair {
        user_token: UserToken::from(user_token_doc),
        refresh_token: refresh_token_doc.map(|r| r.token),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::clock::FrozenClock;
    use std::sync::Arc;
    use token_store::InMemoryTokenStore;

    #[tokio::test]
    async fn mints_a_document_with_both_tokens() {
        let repository = TokenRepository::new(Arc::new(InMemoryTokenStore::new()));
        let clock = FrozenClock::new(1_000);
        let config = TokenServiceConfig::default();
        let pair = create_oauth2_tokens(
            &repository,
            &clock,
            &config,
            Version::MODERN_THRESHOLD,
            Authentication {
                user: "alice".to_string(),
                realm: "r1".to_string(),
            },
            HashMap::new(),
            ClientInfo::TOKEN_AUTH_TYPE,
            true,
        )
        .await
        .unwrap();

        assert!(pair.refresh_token.is_some());
        assert_eq!(pair.user_token.expiration_time_millis, 1_000 + config.token_ttl.as_millis() as i64);
    }

    #[tokio::test]
    async fn skips_refresh_token_when_not_requested() {
        let repository = TokenRepository::new(Arc::new(InMemoryTokenStore::new()));
        let clock = FrozenClock::new(0);
        let config = TokenServiceConfig::default();
        let pair = create_oauth2_tokens(
            &repository,
            &clock,
            &config,
            Version::MODERN_THRESHOLD,
            Authentication {
                user: "alice".to_string(),
                realm: "r1".to_string(),
            },
            HashMap::new(),
            ClientInfo::TOKEN_AUTH_TYPE,
            false,
        )
        .await
        .unwrap();

        assert!(pair.refresh_token.is_none());
    }
}
