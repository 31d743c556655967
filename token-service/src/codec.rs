//! Version-prefixed bearer-string encode/decode (spec.md §4.1, §6).
//!
//! Wire layout after base64 (standard, padded): a 4-byte big-endian
//! version word, then either a length-prefixed token id (modern,
//! cluster minimum node version >= 7.1.0) or
//! `salt(32) || key_hash(8) || iv(12) || AES-GCM(length-prefixed id)`
//! (legacy). Any decode failure is "no token", never an error: another
//! authenticator further down the chain may own the bearer.

use crate::derivation_executor::DerivationExecutor;
use base64::{engine::general_purpose::STANDARD, Engine};
use crypto::{Iv, KeyHash, KeyRing, LegacyCipher, Salt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A packed `major.minor.patch`, ordered the way semver compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(u32);

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self(((major as u32) << 16) | ((minor as u32) << 8) | patch as u32)
    }

    pub const MODERN_THRESHOLD: Version = Version::new(7, 1, 0);

    fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    pub fn is_modern(self) -> bool {
        self >= Self::MODERN_THRESHOLD
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }
}

/// A shared, live view of the cluster's minimum node version, updated as
/// nodes join or leave and read by both the minting path (to pick the
/// bearer format) and the refresh engine (to decide idempotence-window
/// eligibility).
#[derive(Clone)]
pub struct ClusterVersion(Arc<AtomicU32>);

impl ClusterVersion {
    pub fn new(version: Version) -> Self {
        Self(Arc::new(AtomicU32::new(version.as_u32())))
    }

    pub fn get(&self) -> Version {
        Version::from_u32(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, version: Version) {
        self.0.store(version.as_u32(), Ordering::SeqCst);
    }
}

fn write_length_prefixed(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn read_length_prefixed(buf: &[u8]) -> Option<(&str, &[u8])> {
    if buf.len() < 4 {
        return None;
    }
    let (len_bytes, rest) = buf.split_at(4);
    let len_bytes: [u8; 4] = len_bytes.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if rest.len() < len {
        return None;
    }
    let (s_bytes, remainder) = rest.split_at(len);
    let s = std::str::from_utf8(s_bytes).ok()?;
    Some((s, remainder))
}

pub struct Codec {
    derivation: Arc<DerivationExecutor>,
}

impl Codec {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            derivation: Arc::new(DerivationExecutor::new()?),
        })
    }

    /// Encode `token_id` as a bearer string, choosing the modern or
    /// legacy wire format by the cluster's minimum node version.
    pub async fn encode(
        &self,
        ring: &KeyRing,
        token_id: &str,
        cluster_min_version: Version,
    ) -> Result<String, crypto::CryptoError> {
        if cluster_min_version.is_modern() {
            Ok(Self::encode_modern(token_id))
        } else {
            self.encode_legacy(ring, token_id).await
        }
    }

    fn encode_modern(token_id: &str) -> String {
        let mut buf = Version::MODERN_THRESHOLD.to_bytes().to_vec();
        write_length_prefixed(&mut buf, token_id);
        STANDARD.encode(buf)
    }

    async fn encode_legacy(&self, ring: &KeyRing, token_id: &str) -> Result<String, crypto::CryptoError> {
        let version = Version::new(7, 0, 0);
        let entry = ring.active_entry().clone();
        let salt = entry.own_salt();
        let key = self.derivation.run(move || entry.compute_secret_key(salt)).await?;

        let mut aad = version.to_bytes().to_vec();
        aad.extend_from_slice(salt.as_bytes());

        let mut plaintext = Vec::new();
        write_length_prefixed(&mut plaintext, token_id);

        let cipher = LegacyCipher::new(**key)?;
        let (iv, ciphertext) = cipher.encrypt(&aad, &plaintext)?;

        let mut buf = version.to_bytes().to_vec();
        buf.extend_from_slice(salt.as_bytes());
        buf.extend_from_slice(ring.active_key_hash().as_bytes());
        buf.extend_from_slice(iv.as_bytes());
        buf.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(buf))
    }

    /// Decode a bearer string to a token id, or `None` on any malformed
    /// input, unknown key, or failed authentication — per spec.md §4.1,
    /// never a hard error.
    pub async fn decode(&self, ring: &KeyRing, bearer: &str) -> Option<String> {
        let blob = STANDARD.decode(bearer).ok()?;
        if blob.len() < 4 {
            return None;
        }
        let (version_bytes, rest) = blob.split_at(4);
        let version_bytes: [u8; 4] = version_bytes.try_into().ok()?;
        let version = Version::from_bytes(version_bytes);

        if version.is_modern() {
            let (id, _) = read_length_prefixed(rest)?;
            return Some(id.to_string());
        }

        self.decode_legacy(ring, version, rest).await
    }

    async fn decode_legacy(&self, ring: &KeyRing, version: Version, rest: &[u8]) -> Option<String> {
        if rest.len() < Salt::LEN + KeyHash::LEN + Iv::LEN {
            return None;
        }
        let (salt_bytes, rest) = rest.split_at(Salt::LEN);
        let (hash_bytes, rest) = rest.split_at(KeyHash::LEN);
        let (iv_bytes, ciphertext) = rest.split_at(Iv::LEN);

        let salt = Salt::from_slice(salt_bytes)?;
        let hash = KeyHash::from_slice(hash_bytes)?;
        let iv = Iv::from_slice(iv_bytes)?;

        let entry = ring.get(hash)?.clone();

        let mut aad = version.to_bytes().to_vec();
        aad.extend_from_slice(salt.as_bytes());

        let key = self.derivation.run(move || entry.compute_secret_key(salt)).await.ok()?;
        let cipher = LegacyCipher::new(**key).ok()?;
        let plaintext = cipher.decrypt(&iv, &aad, ciphertext).ok()?;
        let (id, _) = read_length_prefixed(&plaintext)?;
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crypto::KeyAndTimestamp;
    use proptest::prelude::*;

    fn single_key_ring(passphrase: &str) -> KeyRing {
        let active_hash = crypto::KeyHash::of_passphrase(passphrase.as_bytes());
        KeyRing::rebuild(vec![KeyAndTimestamp::new(passphrase.to_string(), 1)], active_hash, None).unwrap()
    }

    #[tokio::test]
    async fn modern_round_trips() {
        let codec = Codec::new().unwrap();
        let ring = single_key_ring("passphrase-a");
        let bearer = codec.encode(&ring, "some-token-id", Version::MODERN_THRESHOLD).await.unwrap();
        let decoded = codec.decode(&ring, &bearer).await;
        assert_eq!(decoded.as_deref(), Some("some-token-id"));
    }

    #[tokio::test]
    async fn legacy_round_trips() {
        let codec = Codec::new().unwrap();
        let ring = single_key_ring("passphrase-a");
        let bearer = codec.encode(&ring, "some-token-id", Version::new(7, 0, 0)).await.unwrap();
        let decoded = codec.decode(&ring, &bearer).await;
        assert_eq!(decoded.as_deref(), Some("some-token-id"));
    }

    #[tokio::test]
    async fn legacy_bearer_does_not_contain_plaintext_id() {
        let codec = Codec::new().unwrap();
        let ring = single_key_ring("passphrase-a");
        let bearer = codec.encode(&ring, "super-secret-id-value", Version::new(7, 0, 0)).await.unwrap();
        assert!(!bearer.contains("super-secret-id-value"));
    }

    #[tokio::test]
    async fn decode_fails_gracefully_on_garbage_input() {
        let codec = Codec::new().unwrap();
        let ring = single_key_ring("passphrase-a");
        assert!(codec.decode(&ring, "not-valid-base64!!").await.is_none());
        assert!(codec.decode(&ring, &STANDARD.encode(b"short")).await.is_none());
    }

    #[tokio::test]
    async fn legacy_decode_fails_for_unknown_key_hash() {
        let codec = Codec::new().unwrap();
        let ring_a = single_key_ring("passphrase-a");
        let ring_b = single_key_ring("passphrase-b");
        let bearer = codec.encode(&ring_a, "some-id", Version::new(7, 0, 0)).await.unwrap();
        assert!(codec.decode(&ring_b, &bearer).await.is_none());
    }

    #[test]
    fn version_ordering_matches_semver_intuition() {
        assert!(Version::new(7, 1, 0) > Version::new(7, 0, 9));
        assert!(Version::new(7, 1, 0) >= Version::MODERN_THRESHOLD);
        assert!(Version::new(6, 9, 9) < Version::MODERN_THRESHOLD);
    }

    proptest::proptest! {
        #[test]
        fn modern_codec_round_trip_holds_for_arbitrary_ids(id in "[a-zA-Z0-9_-]{1,64}") {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let decoded = runtime.block_on(async {
                let codec = Codec::new().unwrap();
                let ring = single_key_ring("passphrase-a");
                let bearer = codec.encode(&ring, &id, Version::MODERN_THRESHOLD).await.unwrap();
                codec.decode(&ring, &bearer).await
            });
            prop_assert_eq!(decoded, Some(id));
        }
    }
}
