use error_common::ErrorKind;
use thiserror::Error;

/// The outward-facing error kinds from spec.md §7, plus the two internal
/// collaborator errors the retry loops consume and do not usually
/// surface. `Transient` store/metadata failures that exhaust their retry
/// budget are folded into `InvalidGrant` or `FatalInconsistency` by the
/// caller, per component — this enum only carries what a caller across an
/// await point needs to see.
#[derive(Error, Debug, Clone)]
pub enum TokenServiceError {
    #[error("tokens are not enabled")]
    Disabled,

    #[error("the access token is malformed")]
    Malformed,

    #[error("the access token expired")]
    Expired,

    #[error("invalid grant")]
    InvalidGrant,

    #[error("internal inconsistency: {0}")]
    FatalInconsistency(String),

    #[error("document store error: {0}")]
    Store(#[from] token_store::StoreError),

    #[error("cluster-metadata error: {0}")]
    Metadata(#[from] cluster_metadata::MetadataError),

    #[error("cryptography error: {0}")]
    Crypto(#[from] crypto::CryptoError),
}

impl TokenServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenServiceError::Disabled => ErrorKind::Disabled,
            TokenServiceError::Malformed => ErrorKind::Malformed,
            TokenServiceError::Expired => ErrorKind::Expired,
            TokenServiceError::InvalidGrant => ErrorKind::InvalidGrant,
            TokenServiceError::FatalInconsistency(_) => ErrorKind::FatalInconsistency,
            TokenServiceError::Store(_) | TokenServiceError::Metadata(_) | TokenServiceError::Crypto(_) => {
                ErrorKind::FatalInconsistency
            }
        }
    }
}

pub type TokenServiceResult<T> = Result<T, TokenServiceError>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn kind_maps_expired() {
        assert_eq!(TokenServiceError::Expired.kind(), ErrorKind::Expired);
    }

    #[test]
    fn is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<TokenServiceError>();
    }
}
