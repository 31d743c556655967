//! Pure key-ring mutation logic: `generateSpareKey`, `rotateToSpareKey`,
//! `pruneKeys`, and the rebuild step of `refreshMetaData`.
//!
//! These functions never touch the cluster-metadata channel and never hold
//! a lock themselves — they take a `&KeyRing` snapshot and a fresh
//! timestamp and return the new metadata to publish (or, for
//! `refresh_metadata`, the rebuilt ring). The caller (`token-service`'s
//! stateful key manager) is responsible for serializing calls, advancing
//! the timestamp counter, and submitting the result through the metadata
//! channel.

use crate::error::CryptoError;
use crate::key_and_cache::KeyAndTimestamp;
use crate::key_ring::KeyRing;
use crate::primitives::KeyHash;
use rand::RngCore;

/// The new metadata to publish after a successful mutation: every known
/// key plus which one should be active.
pub struct KeyMetadata {
    pub keys: Vec<KeyAndTimestamp>,
    pub active_key_hash: KeyHash,
}

pub fn random_passphrase() -> String {
    let mut buf = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut buf);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, buf)
}

/// If the newest entry is the active one, generate a new spare key with
/// `next_timestamp` and return the full metadata (old entries + the new
/// spare) with the active hash unchanged. Retries passphrase generation on
/// the astronomically unlikely event of a key-hash collision.
pub fn generate_spare_key(ring: &KeyRing, next_timestamp: i64) -> Result<KeyMetadata, CryptoError> {
    let newest = ring
        .entries_by_timestamp_desc()
        .into_iter()
        .next()
        .ok_or(CryptoError::ActiveKeyMissing)?;

    if newest.0 != ring.active_key_hash() {
        return Err(CryptoError::SpareKeyAlreadyExists);
    }

    let mut keys: Vec<KeyAndTimestamp> = ring
        .entries_by_timestamp_desc()
        .into_iter()
        .map(|(_, entry)| entry.key_and_timestamp())
        .collect();

    loop {
        let candidate = KeyAndTimestamp::new(random_passphrase(), next_timestamp);
        let candidate_hash = KeyHash::of_passphrase(candidate.passphrase_bytes());
        if ring.get(candidate_hash).is_some() {
            continue;
        }
        keys.push(candidate);
        break;
    }

    Ok(KeyMetadata {
        keys,
        active_key_hash: ring.active_key_hash(),
    })
}

/// If the newest entry is not the active one (a spare exists), return
/// metadata naming it active. Fails if there is no spare to promote.
pub fn rotate_to_spare_key(ring: &KeyRing) -> Result<KeyMetadata, CryptoError> {
    let newest = ring
        .entries_by_timestamp_desc()
        .into_iter()
        .next()
        .ok_or(CryptoError::ActiveKeyMissing)?;

    if newest.0 == ring.active_key_hash() {
        return Err(CryptoError::NoSpareKeyToRotate);
    }

    let keys = ring
        .entries_by_timestamp_desc()
        .into_iter()
        .map(|(_, entry)| entry.key_and_timestamp())
        .collect();

    Ok(KeyMetadata {
        keys,
        active_key_hash: newest.0,
    })
}

/// Keep the `n` entries with the largest timestamps, but never drop the
/// currently-active entry even if it would otherwise fall outside the top
/// `n`.
pub fn prune_keys(ring: &KeyRing, n: usize) -> KeyMetadata {
    let mut ordered = ring.entries_by_timestamp_desc();
    let active_hash = ring.active_key_hash();

    let mut kept: Vec<_> = ordered.drain(..ordered.len().min(n)).collect();
    if !kept.iter().any(|(hash, _)| *hash == active_hash) {
        if let Some(active) = ring.get(active_hash) {
            kept.push((active_hash, active.clone()));
        }
    }

    KeyMetadata {
        keys: kept.into_iter().map(|(_, entry)| entry.key_and_timestamp()).collect(),
        active_key_hash: active_hash,
    }
}

/// Rebuild a ring from metadata, preserving existing `KeyAndCache`
/// instances (and their derived-key caches) where the key hash already
/// existed in `previous`.
pub fn refresh_metadata(
    keys: Vec<KeyAndTimestamp>,
    active_key_hash: KeyHash,
    previous: Option<&KeyRing>,
) -> Result<KeyRing, CryptoError> {
    KeyRing::rebuild(keys, active_key_hash, previous)
}
