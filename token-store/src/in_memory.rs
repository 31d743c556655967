//! An in-memory `TokenStore` for tests: no network, no persistence, but
//! the same optimistic-concurrency and partial-failure semantics as a
//! real document store, plus fault injection so retry logic can be
//! exercised deterministically.

use crate::error::{StoreError, StoreResult};
use crate::model::{SearchQuery, StoredDocument, UpdateOutcome};
use crate::store::TokenStore;
use async_trait::async_trait;
use dashmap::DashMap;
use error_common::RequestContext;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Entry {
    doc_type: String,
    doc: StoredDocument,
}

/// Injected failures are consumed in FIFO order: the first `n` calls to
/// any store method fail with the given error before normal behavior
/// resumes.
pub struct InMemoryTokenStore {
    docs: DashMap<String, Entry>,
    fault_queue: std::sync::Mutex<Vec<StoreError>>,
    calls: AtomicUsize,
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            fault_queue: std::sync::Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue `error` to be returned by the next call instead of running it.
    pub fn inject_fault(&self, error: StoreError) {
        if let Ok(mut queue) = self.fault_queue.lock() {
            queue.push(error);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn take_fault(&self) -> Option<StoreError> {
        self.fault_queue.lock().ok().and_then(|mut q| {
            if q.is_empty() {
                None
            } else {
                Some(q.remove(0))
            }
        })
    }

    /// Recursive merge: a patch object's nested objects merge into the
    /// base's, everything else (scalars, arrays) replaces outright.
    fn merge(base: &mut Value, patch: &Value) {
        if let (Value::Object(base_map), Value::Object(patch_map)) = (base, patch) {
            for (key, value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) if value.is_object() => Self::merge(existing, value),
                    _ => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
    }

    /// Resolve a dotted path like `refresh_token.token` against a nested
    /// document, the same addressing `SearchQuery::field` uses.
    fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
        path.split('.').try_fold(value, |current, segment| current.get(segment))
    }

    /// True if every field the patch sets already holds that value.
    fn patch_already_applied(base: &Value, patch: &Value) -> bool {
        match (base, patch) {
            (Value::Object(base_map), Value::Object(patch_map)) => patch_map.iter().all(|(key, value)| {
                base_map
                    .get(key)
                    .is_some_and(|existing| Self::patch_already_applied(existing, value))
            }),
            _ => base == patch,
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create(&self, id: &str, source: Value, _ctx: &RequestContext) -> StoreResult<StoredDocument> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.take_fault() {
            return Err(fault);
        }
        if self.docs.contains_key(id) {
            return Err(StoreError::AlreadyExists);
        }
        let doc_type = source
            .get("doc_type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let doc = StoredDocument::new(id, source, 0, 0);
        self.docs.insert(
            id.to_string(),
            Entry {
                doc_type,
                doc: doc.clone(),
            },
        );
        Ok(doc)
    }

    async fn get(&self, id: &str, _ctx: &RequestContext) -> StoreResult<Option<StoredDocument>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.take_fault() {
            return Err(fault);
        }
        Ok(self.docs.get(id).map(|entry| entry.doc.clone()))
    }

    async fn conditional_update(
        &self,
        id: &str,
        patch: Value,
        seq_no: i64,
        primary_term: i64,
        _ctx: &RequestContext,
    ) -> StoreResult<UpdateOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.take_fault() {
            return Err(fault);
        }
        let mut entry = self.docs.get_mut(id).ok_or(StoreError::NotFound)?;
        if entry.doc.seq_no != seq_no || entry.doc.primary_term != primary_term {
            return Ok(UpdateOutcome::Conflict);
        }
        Self::merge(&mut entry.doc.source, &patch);
        entry.doc.seq_no += 1;
        Ok(UpdateOutcome::Updated)
    }

    async fn bulk_update(
        &self,
        ids: &[String],
        patch: Value,
        ctx: &RequestContext,
    ) -> StoreResult<Vec<(String, StoreResult<UpdateOutcome>)>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.take_fault() {
            return Err(fault);
        }
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = match self.docs.get_mut(id) {
                None => Err(StoreError::NotFound),
                Some(mut entry) if Self::patch_already_applied(&entry.doc.source, &patch) => Ok(UpdateOutcome::Noop),
                Some(mut entry) => {
                    Self::merge(&mut entry.doc.source, &patch);
                    entry.doc.seq_no += 1;
                    Ok(UpdateOutcome::Updated)
                }
            };
            results.push((id.clone(), outcome));
            let _ = ctx;
        }
        Ok(results)
    }

    async fn search(&self, query: &SearchQuery, _ctx: &RequestContext) -> StoreResult<Vec<StoredDocument>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.take_fault() {
            return Err(fault);
        }
        let mut matches: Vec<StoredDocument> = self
            .docs
            .iter()
            .filter(|entry| entry.doc_type == query.doc_type)
            .filter(|entry| {
                Self::get_path(&entry.doc.source, &query.field)
                    .and_then(Value::as_str)
                    .map(|v| v == query.value)
                    .unwrap_or(false)
            })
            .map(|entry| entry.doc.clone())
            .collect();
        matches.truncate(query.size);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    fn ctx() -> RequestContext {
        RequestContext::default()
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryTokenStore::new();
        store
            .create("a", json!({"type": "token", "v": 1}), &ctx())
            .await
            .unwrap();
        let doc = store.get("a", &ctx()).await.unwrap().unwrap();
        assert_eq!(doc.seq_no, 0);
        assert_eq!(doc.source["v"], 1);
    }

    #[tokio::test]
    async fn conditional_update_detects_conflict() {
        let store = InMemoryTokenStore::new();
        store.create("a", json!({"type": "token"}), &ctx()).await.unwrap();
        let outcome = store
            .conditional_update("a", json!({"v": 2}), 5, 0, &ctx())
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Conflict);
    }

    #[tokio::test]
    async fn conditional_update_applies_and_advances_seq_no() {
        let store = InMemoryTokenStore::new();
        store.create("a", json!({"type": "token"}), &ctx()).await.unwrap();
        let outcome = store
            .conditional_update("a", json!({"v": 2}), 0, 0, &ctx())
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);
        let doc = store.get("a", &ctx()).await.unwrap().unwrap();
        assert_eq!(doc.seq_no, 1);
        assert_eq!(doc.source["v"], 2);
    }

    #[tokio::test]
    async fn injected_fault_is_returned_once() {
        let store = InMemoryTokenStore::new();
        store.inject_fault(StoreError::ShardUnavailable);
        let first = store.get("missing", &ctx()).await;
        assert_eq!(first.unwrap_err(), StoreError::ShardUnavailable);
        let second = store.get("missing", &ctx()).await;
        assert!(second.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_filters_by_type_and_field() {
        let store = InMemoryTokenStore::new();
        store
            .create("a", json!({"doc_type": "refresh_token", "token": "xyz"}), &ctx())
            .await
            .unwrap();
        store
            .create("b", json!({"doc_type": "refresh_token", "token": "other"}), &ctx())
            .await
            .unwrap();
        let results = store
            .search(&SearchQuery::exact("refresh_token", "token", "xyz"), &ctx())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }
}
