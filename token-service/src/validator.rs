//! spec.md §4.4: expiration and invalidation checks, in order, with
//! "index unavailable" deliberately downgraded to "no token" rather than
//! propagated — another authenticator further down the chain may still
//! succeed.

use crate::clock::Clock;
use crate::model::{document_id, AccessTokenDoc, TokenDocument, UserToken};
use crate::repository::TokenRepository;
use std::sync::Arc;

pub struct Validator {
    repository: Arc<TokenRepository>,
    clock: Arc<dyn Clock>,
}

impl Validator {
    pub fn new(repository: Arc<TokenRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Returns `Some(token)` if still valid, `None` for "no token" —
    /// expired, invalidated, or the document could not be read at all.
    pub async fn validate(&self, token: &UserToken) -> Option<UserToken> {
        if self.clock.now_millis() > token.expiration_time_millis {
            return None;
        }

        let doc_id = document_id(&token.id);
        let stored = self.repository.get_document(&doc_id).await.ok()??;
        let document = TokenDocument::from_value(stored.source).ok()?;

        let AccessTokenDoc { invalidated, .. } = document.access_token;
        if invalidated {
            return None;
        }

        Some(UserToken::from(document.access_token.user_token))
    }

    /// The authentication-time path: only a bare token id is known (a
    /// decoded opaque bearer carries no embedded claims), so this fetches
    /// the document once and runs the same expiration/invalidation order
    /// against what it finds, rather than against a caller-supplied token.
    pub async fn get_and_validate(&self, token_id: &str) -> Option<UserToken> {
        let doc_id = document_id(token_id);
        let stored = self.repository.get_document(&doc_id).await.ok()??;
        let document = TokenDocument::from_value(stored.source).ok()?;

        let candidate = UserToken::from(document.access_token.user_token.clone());
        if self.clock.now_millis() > candidate.expiration_time_millis {
            return None;
        }
        if document.access_token.invalidated {
            return None;
        }
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::clock::FrozenClock;
    use crate::model::{Authentication, UserTokenDoc};
    use serde_json::json;
    use std::collections::HashMap;
    use token_store::InMemoryTokenStore;

    fn user_token(id: &str, expiration_time_millis: i64) -> UserToken {
        UserToken {
            id: id.to_string(),
            version: 1,
            authentication: Authentication {
                user: "alice".to_string(),
                realm: "r1".to_string(),
            },
            metadata: HashMap::new(),
            expiration_time_millis,
        }
    }

    async fn seeded_repository(id: &str, invalidated: bool, expiration_time_millis: i64) -> Arc<TokenRepository> {
        let repository = Arc::new(TokenRepository::new(Arc::new(InMemoryTokenStore::new())));
        let doc = TokenDocument::new(
            0,
            0x00070100,
            "r1".to_string(),
            UserTokenDoc {
                id: id.to_string(),
                version: 1,
                authentication: Authentication {
                    user: "alice".to_string(),
                    realm: "r1".to_string(),
                },
                metadata: HashMap::new(),
                expiration_time: expiration_time_millis,
            },
            None,
        );
        let mut value = doc.to_value().unwrap();
        value["access_token"]["invalidated"] = json!(invalidated);
        repository.create_document(id, value).await.unwrap();
        repository
    }

    #[tokio::test]
    async fn valid_token_passes() {
        let repository = seeded_repository("abc", false, 10_000).await;
        let clock = Arc::new(FrozenClock::new(1_000));
        let validator = Validator::new(repository, clock);
        let result = validator.validate(&user_token("abc", 10_000)).await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn expired_by_clock_fails() {
        let repository = seeded_repository("abc", false, 10_000).await;
        let clock = Arc::new(FrozenClock::new(10_001));
        let validator = Validator::new(repository, clock);
        assert!(validator.validate(&user_token("abc", 10_000)).await.is_none());
    }

    #[tokio::test]
    async fn invalidated_access_token_fails() {
        let repository = seeded_repository("abc", true, 10_000).await;
        let clock = Arc::new(FrozenClock::new(1_000));
        let validator = Validator::new(repository, clock);
        assert!(validator.validate(&user_token("abc", 10_000)).await.is_none());
    }

    #[tokio::test]
    async fn missing_document_is_no_token_not_an_error() {
        let repository = Arc::new(TokenRepository::new(Arc::new(InMemoryTokenStore::new())));
        let clock = Arc::new(FrozenClock::new(1_000));
        let validator = Validator::new(repository, clock);
        assert!(validator.validate(&user_token("missing", 10_000)).await.is_none());
    }

    #[tokio::test]
    async fn get_and_validate_builds_the_token_from_the_document_alone() {
        let repository = seeded_repository("abc", false, 10_000).await;
        let clock = Arc::new(FrozenClock::new(1_000));
        let validator = Validator::new(repository, clock);
        let token = validator.get_and_validate("abc").await.unwrap();
        assert_eq!(token.id, "abc");
        assert_eq!(token.expiration_time_millis, 10_000);
    }

    #[tokio::test]
    async fn get_and_validate_fails_for_expired_document() {
        let repository = seeded_repository("abc", false, 10_000).await;
        let clock = Arc::new(FrozenClock::new(10_001));
        let validator = Validator::new(repository, clock);
        assert!(validator.get_and_validate("abc").await.is_none());
    }
}
