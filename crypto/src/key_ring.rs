//! `KeyRing`: an immutable hash->`KeyAndCache` snapshot plus the active key.

use crate::error::CryptoError;
use crate::key_and_cache::{KeyAndCache, KeyAndTimestamp};
use crate::primitives::KeyHash;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable snapshot of every known key and which one is active.
///
/// Replaced atomically by the key manager; readers hold an `Arc<KeyRing>`
/// obtained from an `arc_swap::ArcSwap` and so always see a fully-formed
/// ring, never a partially rebuilt one.
pub struct KeyRing {
    entries: HashMap<KeyHash, Arc<KeyAndCache>>,
    active_key_hash: KeyHash,
    active_entry: Arc<KeyAndCache>,
}

impl KeyRing {
    /// Build a ring from cluster metadata, preserving any existing entry's
    /// `KeyAndCache` (and hence its derived-key cache) when the same key
    /// hash is already present in `previous`.
    pub fn rebuild(
        keys: Vec<KeyAndTimestamp>,
        active_key_hash: KeyHash,
        previous: Option<&KeyRing>,
    ) -> Result<Self, CryptoError> {
        let mut entries = HashMap::with_capacity(keys.len());
        for key in keys {
            let hash = KeyHash::of_passphrase(key.passphrase_bytes());
            let entry = previous
                .and_then(|ring| ring.entries.get(&hash))
                .cloned()
                .unwrap_or_else(|| Arc::new(KeyAndCache::new(key)));
            entries.insert(hash, entry);
        }

        let active_entry = entries
            .get(&active_key_hash)
            .cloned()
            .ok_or(CryptoError::ActiveKeyMissing)?;

        Ok(Self {
            entries,
            active_key_hash,
            active_entry,
        })
    }

    pub fn active_key_hash(&self) -> KeyHash {
        self.active_key_hash
    }

    pub fn active_entry(&self) -> &Arc<KeyAndCache> {
        &self.active_entry
    }

    pub fn get(&self, hash: KeyHash) -> Option<&Arc<KeyAndCache>> {
        self.entries.get(&hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries sorted newest-first by creation timestamp, for pruning.
    pub fn entries_by_timestamp_desc(&self) -> Vec<(KeyHash, Arc<KeyAndCache>)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|(h, e)| (*h, e.clone()))
            .collect();
        all.sort_by(|a, b| b.1.timestamp().cmp(&a.1.timestamp()));
        all
    }
}
