use thiserror::Error;

/// Errors surfaced by a `TokenStore`. `ShardUnavailable` and `Timeout` are
/// the transient kinds the retry-with-backoff loop knows how to recover
/// from; everything else is handed back to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("shard temporarily unavailable")]
    ShardUnavailable,

    #[error("request to the document store timed out")]
    Timeout,

    #[error("optimistic-concurrency version conflict")]
    VersionConflict,

    #[error("a document with this id already exists")]
    AlreadyExists,

    #[error("document not found")]
    NotFound,

    #[error("store request failed: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::ShardUnavailable | StoreError::Timeout)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
