//! Typed document shapes for the security token index, replacing the
//! source system's untyped document maps (spec.md §9, "dynamic document
//! parsing"). Every missing mandatory field surfaces as
//! `TokenServiceError::Malformed` rather than a panic.

use crate::error::{TokenServiceError, TokenServiceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub const DOC_TYPE: &str = "token";
pub const DOC_ID_PREFIX: &str = "token_";

/// The caller presenting a bearer or refresh string, carried on every
/// mint/refresh/validate call so the refresh engine can bind a refresh
/// attempt to the principal and realm that originally received it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub user: String,
    pub realm: String,
}

/// The refresh document's record of which client it was issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(rename = "type")]
    pub auth_type: String,
    pub user: String,
    pub realm: String,
}

impl ClientInfo {
    pub const TOKEN_AUTH_TYPE: &'static str = "TOKEN";

    pub fn binds(&self, caller: &Authentication) -> bool {
        self.user == caller.user && self.realm == caller.realm
    }
}

/// In-memory reconstruction of the principal's access-token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserToken {
    pub id: String,
    pub version: u32,
    pub authentication: Authentication,
    pub metadata: HashMap<String, Value>,
    pub expiration_time_millis: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTokenDoc {
    pub id: String,
    pub version: u32,
    pub authentication: Authentication,
    pub metadata: HashMap<String, Value>,
    pub expiration_time: i64,
}

impl From<UserTokenDoc> for UserToken {
    fn from(doc: UserTokenDoc) -> Self {
        UserToken {
            id: doc.id,
            version: doc.version,
            authentication: doc.authentication,
            metadata: doc.metadata,
            expiration_time_millis: doc.expiration_time,
        }
    }
}

impl From<UserToken> for UserTokenDoc {
    fn from(token: UserToken) -> Self {
        UserTokenDoc {
            id: token.id,
            version: token.version,
            authentication: token.authentication,
            metadata: token.metadata,
            expiration_time: token.expiration_time_millis,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenDoc {
    pub invalidated: bool,
    pub realm: String,
    pub user_token: UserTokenDoc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenDoc {
    pub token: String,
    pub invalidated: bool,
    pub refreshed: bool,
    pub refresh_time: Option<i64>,
    pub superseded_by: Option<String>,
    pub client: ClientInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenDocument {
    pub doc_type: String,
    pub creation_time: i64,
    /// The cluster's minimum node version (packed, see `codec::Version`)
    /// at the instant this document was created. Governs both which
    /// bearer-string format the access token uses and whether a replayed
    /// refresh is eligible for the idempotence window (spec.md §4.5
    /// Stage C): pre-7.1.0 documents never replay.
    pub created_with_version: u32,
    pub access_token: AccessTokenDoc,
    pub refresh_token: Option<RefreshTokenDoc>,
}

impl TokenDocument {
    pub fn new(
        creation_time: i64,
        created_with_version: u32,
        realm: String,
        user_token: UserTokenDoc,
        refresh_token: Option<RefreshTokenDoc>,
    ) -> Self {
        Self {
            doc_type: DOC_TYPE.to_string(),
            creation_time,
            created_with_version,
            access_token: AccessTokenDoc {
                invalidated: false,
                realm,
                user_token,
            },
            refresh_token,
        }
    }

    pub fn to_value(&self) -> TokenServiceResult<Value> {
        serde_json::to_value(self).map_err(|_| TokenServiceError::Malformed)
    }

    pub fn from_value(value: Value) -> TokenServiceResult<Self> {
        serde_json::from_value(value).map_err(|_| TokenServiceError::Malformed)
    }
}

pub fn document_id(token_id: &str) -> String {
    format!("{DOC_ID_PREFIX}{token_id}")
}

/// Strip the `token_` prefix. Any id lacking it is a fatal inconsistency
/// (spec.md §6): the store should never hand back a document under a
/// foreign id scheme.
pub fn token_id_from_document_id(doc_id: &str) -> TokenServiceResult<&str> {
    doc_id
        .strip_prefix(DOC_ID_PREFIX)
        .ok_or_else(|| TokenServiceError::FatalInconsistency(format!("document id '{doc_id}' missing token_ prefix")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn document_id_round_trips() {
        let id = document_id("abc123");
        assert_eq!(id, "token_abc123");
        assert_eq!(token_id_from_document_id(&id).unwrap(), "abc123");
    }

    #[test]
    fn missing_prefix_is_fatal() {
        assert!(token_id_from_document_id("abc123").is_err());
    }

    #[test]
    fn client_info_binds_matching_principal_and_realm() {
        let client = ClientInfo {
            auth_type: ClientInfo::TOKEN_AUTH_TYPE.to_string(),
            user: "alice".to_string(),
            realm: "r1".to_string(),
        };
        assert!(client.binds(&Authentication {
            user: "alice".to_string(),
            realm: "r1".to_string(),
        }));
        assert!(!client.binds(&Authentication {
            user: "bob".to_string(),
            realm: "r1".to_string(),
        }));
    }

    #[test]
    fn document_serializes_and_parses_back() {
        let doc = TokenDocument::new(
            1_000,
            0x00070100,
            "r1".to_string(),
            UserTokenDoc {
                id: "abc".to_string(),
                version: 1,
                authentication: Authentication {
                    user: "alice".to_string(),
                    realm: "r1".to_string(),
                },
                metadata: HashMap::new(),
                expiration_time: 2_000,
            },
            None,
        );
        let value = doc.to_value().unwrap();
        let parsed = TokenDocument::from_value(value).unwrap();
        assert_eq!(parsed.creation_time, 1_000);
    }
}
