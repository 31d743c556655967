//! `KeyAndCache`: one passphrase/timestamp pair plus its salt-derived-key
//! cache, and `KeyAndTimestamp`, the cluster-metadata-shaped pair it wraps.

use crate::error::CryptoError;
use crate::kdf::{Kdf, Pbkdf2Params};
use crate::memory_security::{lock_memory, unlock_memory};
use crate::primitives::{KeyHash, Salt};
use moka::sync::Cache;
use secrecy::{CloneableSecret, DebugSecret, ExposeSecret, Secret};
use std::sync::Arc;
use std::time::Duration;
use zeroize::{Zeroize, Zeroizing};

const CACHE_CAPACITY: u64 = 500;
const CACHE_TTI: Duration = Duration::from_secs(60 * 60);

/// Thin `Zeroize`-able wrapper so `Secret<Passphrase>` can be cloned
/// (`secrecy::Secret` only clones types that opt in via `CloneableSecret`;
/// plain `String` does not). `Secret`'s own `Drop` calls `zeroize`, which is
/// also where the `mlock` taken out in `KeyAndTimestamp::new` is released.
#[derive(Clone)]
struct Passphrase(String);

impl Zeroize for Passphrase {
    fn zeroize(&mut self) {
        let _ = unlock_memory(self.0.as_bytes());
        self.0.zeroize();
    }
}

impl CloneableSecret for Passphrase {}
impl DebugSecret for Passphrase {}

/// `{ passphrase, timestamp }` as carried in cluster metadata.
#[derive(Clone)]
pub struct KeyAndTimestamp {
    passphrase: Secret<Passphrase>,
    pub timestamp: i64,
}

impl KeyAndTimestamp {
    pub fn new(passphrase: String, timestamp: i64) -> Self {
        if let Err(err) = lock_memory(passphrase.as_bytes()) {
            tracing::warn!(%err, "failed to lock passphrase memory; continuing unlocked");
        }
        Self {
            passphrase: Secret::new(Passphrase(passphrase)),
            timestamp,
        }
    }

    pub fn passphrase_bytes(&self) -> &[u8] {
        self.passphrase.expose_secret().0.as_bytes()
    }

    fn passphrase_string(&self) -> String {
        self.passphrase.expose_secret().0.clone()
    }
}

/// Owns one key's passphrase/timestamp plus a bounded, TTL-on-access cache
/// from salt to derived key (capacity 500, 60-minute time-to-idle).
///
/// Closing (dropping) zeroizes the passphrase; derived keys evicted from
/// the cache are dropped, and `Zeroizing` ensures their backing memory is
/// cleared at that point too.
pub struct KeyAndCache {
    key: KeyAndTimestamp,
    salt: Salt,
    hash: KeyHash,
    derived: Cache<Salt, Arc<Zeroizing<[u8; 16]>>>,
    params: Pbkdf2Params,
}

impl KeyAndCache {
    pub fn new(key: KeyAndTimestamp) -> Self {
        let hash = KeyHash::of_passphrase(key.passphrase_bytes());
        let salt = Salt::from_slice(&Kdf::generate_salt(Salt::LEN))
            .unwrap_or(Salt([0u8; Salt::LEN]));
        Self {
            key,
            salt,
            hash,
            derived: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_idle(CACHE_TTI)
                .build(),
            params: Pbkdf2Params::default(),
        }
    }

    pub fn hash(&self) -> KeyHash {
        self.hash
    }

    pub fn timestamp(&self) -> i64 {
        self.key.timestamp
    }

    /// Clone the `{passphrase, timestamp}` pair this entry wraps, e.g. to
    /// republish the full key set to cluster metadata after a rotation.
    pub fn key_and_timestamp(&self) -> KeyAndTimestamp {
        KeyAndTimestamp::new(self.key.passphrase_string(), self.key.timestamp)
    }

    /// The salt this entry generates new bearer strings with.
    pub fn own_salt(&self) -> Salt {
        self.salt
    }

    /// Derive (or fetch from cache) the AES key for `salt`, which may or
    /// may not be this entry's own salt: a legacy bearer string presents
    /// whatever salt it was encoded with, and the matching `KeyAndCache`
    /// (found by key hash) must be able to re-derive for it.
    pub fn compute_secret_key(&self, salt: Salt) -> Result<Arc<Zeroizing<[u8; 16]>>, CryptoError> {
        if let Some(hit) = self.derived.get(&salt) {
            return Ok(hit);
        }
        let derived = Kdf::derive_aes128_key(self.key.passphrase_bytes(), salt.as_bytes(), &self.params)?;
        let derived = Arc::new(derived);
        self.derived.insert(salt, derived.clone());
        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn hash_is_derived_from_passphrase() {
        let entry = KeyAndCache::new(KeyAndTimestamp::new("s3cret".into(), 1));
        assert_eq!(entry.hash(), KeyHash::of_passphrase(b"s3cret"));
    }

    #[test]
    fn repeated_derivation_for_same_salt_is_cached_and_consistent() {
        let entry = KeyAndCache::new(KeyAndTimestamp::new("s3cret".into(), 1));
        let salt = Salt::random();
        let k1 = entry.compute_secret_key(salt).unwrap();
        let k2 = entry.compute_secret_key(salt).unwrap();
        assert_eq!(**k1, **k2);
    }

    #[test]
    fn different_salts_derive_different_keys() {
        let entry = KeyAndCache::new(KeyAndTimestamp::new("s3cret".into(), 1));
        let k1 = entry.compute_secret_key(Salt::random()).unwrap();
        let k2 = entry.compute_secret_key(Salt::random()).unwrap();
        assert_ne!(**k1, **k2);
    }
}
