use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A document as read back from the store, carrying the optimistic
/// concurrency coordinates needed to write it back conditionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub source: Value,
    pub seq_no: i64,
    pub primary_term: i64,
}

impl StoredDocument {
    pub fn new(id: impl Into<String>, source: Value, seq_no: i64, primary_term: i64) -> Self {
        Self {
            id: id.into(),
            source,
            seq_no,
            primary_term,
        }
    }
}

/// The result of a single conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The write applied and advanced `seq_no`.
    Updated,
    /// The passed-in `seq_no`/`primary_term` no longer matched the stored
    /// document.
    Conflict,
    /// The document already matched the patch; nothing changed.
    Noop,
}

/// A simple equality search against one field of one document type,
/// matching the refresh engine's "locate by refresh token string" lookup.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub doc_type: String,
    pub field: String,
    pub value: String,
    pub size: usize,
}

impl SearchQuery {
    pub fn exact(doc_type: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            field: field.into(),
            value: value.into(),
            size: 1,
        }
    }
}
