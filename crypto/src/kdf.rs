//! Key derivation for the legacy (pre-7.1.0) bearer-string format.
//!
//! Adapted from the teacher's `crypto::kdf` module: same `Kdf` namespace and
//! `Zeroizing`-wrapped output, narrowed to the single algorithm the legacy
//! codec path actually needs (PBKDF2-HMAC-SHA512, 100,000 iterations, a
//! 128-bit AES key) instead of carrying Argon2/HKDF paths nothing here
//! exercises.

use crate::error::CryptoError;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha512;
use zeroize::Zeroizing;

pub type KdfResult<T> = Result<T, CryptoError>;

/// PBKDF2 parameters for legacy master-key derivation.
#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2Params {
    pub iterations: u32,
}

impl Default for Pbkdf2Params {
    fn default() -> Self {
        Self { iterations: 100_000 }
    }
}

pub struct Kdf;

impl Kdf {
    /// Derive a 128-bit AES key from a passphrase and salt using
    /// PBKDF2-HMAC-SHA512, matching the legacy bearer-string master-key
    /// derivation.
    pub fn derive_aes128_key(
        passphrase: &[u8],
        salt: &[u8],
        params: &Pbkdf2Params,
    ) -> KdfResult<Zeroizing<[u8; 16]>> {
        let mut derived = Zeroizing::new([0u8; 16]);
        pbkdf2_hmac::<Sha512>(passphrase, salt, params.iterations, &mut *derived);
        Ok(derived)
    }

    /// Generate a cryptographically secure random salt of the given length.
    pub fn generate_salt(length: usize) -> Vec<u8> {
        let mut salt = vec![0u8; length];
        rand::thread_rng().fill_bytes(&mut salt);
        salt
    }
}
