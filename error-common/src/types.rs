use serde::{Deserialize, Serialize};
use std::fmt;

/// The taxonomy of user-visible error kinds for the bearer token service.
///
/// Transient failures (shard-unavailable, version conflicts) are handled
/// internally by retry loops and never reach this taxonomy; these are the
/// kinds a caller of `token-service` can actually observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The service is not enabled; fail fast.
    Disabled,
    /// A bearer string or document failed to decode/parse.
    Malformed,
    /// The token is past its expiration, or has been invalidated.
    Expired,
    /// A refresh attempt could not be granted.
    InvalidGrant,
    /// An invariant was violated (duplicate refresh token, missing active key).
    FatalInconsistency,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Disabled => "disabled",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Expired => "expired",
            ErrorKind::InvalidGrant => "invalid_grant",
            ErrorKind::FatalInconsistency => "fatal_inconsistency",
        };
        f.write_str(s)
    }
}

/// The `WWW-Authenticate` header contract from the external-interfaces spec.
///
/// `token-service` never constructs an HTTP response itself (that's the
/// transport layer's job, out of scope here) but it hands back enough
/// structure that a transport layer can build the header without
/// re-deriving the wording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WwwAuthenticate {
    pub realm: &'static str,
    pub error: &'static str,
    pub error_description: &'static str,
}

impl WwwAuthenticate {
    pub const fn expired() -> Self {
        Self {
            realm: "security",
            error: "invalid_token",
            error_description: "The access token expired",
        }
    }

    pub const fn malformed() -> Self {
        Self {
            realm: "security",
            error: "invalid_token",
            error_description: "The access token is malformed",
        }
    }

    /// Render as the literal header value (sans the `WWW-Authenticate:` name).
    pub fn header_value(&self) -> String {
        format!(
            "Bearer realm=\"{}\", error=\"{}\", error_description=\"{}\"",
            self.realm, self.error, self.error_description
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_header_matches_contract() {
        let header = WwwAuthenticate::expired();
        assert_eq!(
            header.header_value(),
            "Bearer realm=\"security\", error=\"invalid_token\", error_description=\"The access token expired\""
        );
    }

    #[test]
    fn malformed_header_matches_contract() {
        let header = WwwAuthenticate::malformed();
        assert!(header.header_value().contains("is malformed"));
    }
}
