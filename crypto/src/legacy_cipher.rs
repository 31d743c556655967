//! AES-128-GCM with explicit IV and associated data, for the legacy
//! (pre-7.1.0) bearer-string format.
//!
//! Adapted from the teacher's `crypto::aes_gcm::Aes256GcmEncryptor`: same
//! shape (a cipher built from a derived key, zeroized material, a thin
//! encrypt/decrypt surface) but narrowed to AES-128 with a caller-supplied
//! IV and AAD, since the legacy wire format fixes both (`iv` travels
//! alongside the ciphertext; AAD is `version || salt`) rather than letting
//! the cipher generate and embed its own nonce.

use crate::error::CryptoError;
use crate::primitives::Iv;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Nonce,
};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

/// A one-shot AES-128-GCM cipher over a derived key.
#[derive(ZeroizeOnDrop)]
pub struct LegacyCipher {
    #[zeroize(skip)]
    cipher: Aes128Gcm,
    key: [u8; 16],
}

impl LegacyCipher {
    pub fn new(key: [u8; 16]) -> Result<Self, CryptoError> {
        let cipher = Aes128Gcm::new_from_slice(&key).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { cipher, key })
    }

    /// Encrypt `plaintext` under a freshly generated 96-bit IV, returning
    /// the IV alongside the ciphertext (including the authentication tag).
    pub fn encrypt(&self, aad: &[u8], plaintext: &[u8]) -> Result<(Iv, Vec<u8>), CryptoError> {
        let mut iv_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut iv_bytes);
        let nonce = Nonce::from_slice(&iv_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok((Iv(iv_bytes), ciphertext))
    }

    /// Decrypt and verify `ciphertext` (including tag) produced by
    /// [`Self::encrypt`] under the given IV and AAD.
    pub fn decrypt(&self, iv: &Iv, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(iv.as_bytes());
        self.cipher
            .decrypt(nonce, Payload { msg: ciphertext, aad })
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn key() -> [u8; 16] {
        let mut k = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut k);
        k
    }

    #[test]
    fn round_trips_with_matching_aad() {
        let cipher = LegacyCipher::new(key()).unwrap();
        let aad = b"version+salt";
        let (iv, ct) = cipher.encrypt(aad, b"token-id-goes-here").unwrap();
        let pt = cipher.decrypt(&iv, aad, &ct).unwrap();
        assert_eq!(pt, b"token-id-goes-here");
    }

    #[test]
    fn tag_mismatch_on_wrong_aad() {
        let cipher = LegacyCipher::new(key()).unwrap();
        let (iv, ct) = cipher.encrypt(b"aad-a", b"secret").unwrap();
        assert!(cipher.decrypt(&iv, b"aad-b", &ct).is_err());
    }

    #[test]
    fn ivs_differ_across_encryptions_of_same_plaintext() {
        let cipher = LegacyCipher::new(key()).unwrap();
        let (iv1, ct1) = cipher.encrypt(b"aad", b"same plaintext").unwrap();
        let (iv2, ct2) = cipher.encrypt(b"aad", b"same plaintext").unwrap();
        assert_ne!(iv1.0, iv2.0);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn opacity_ciphertext_does_not_contain_plaintext() {
        let cipher = LegacyCipher::new(key()).unwrap();
        let plaintext = b"AAAAAAAAAAAAAAAAAAAAAA";
        let (_iv, ct) = cipher.encrypt(b"aad", plaintext).unwrap();
        assert!(!ct.windows(plaintext.len()).any(|w| w == plaintext.as_slice()));
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let cipher = LegacyCipher::new(key()).unwrap();
        let (iv, mut ct) = cipher.encrypt(b"aad", b"payload").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(cipher.decrypt(&iv, b"aad", &ct).is_err());
    }
}
