//! Fixed-width byte wrappers used throughout key management and the codec.
//!
//! These are the "Byte/Key primitives" component of the system overview:
//! plain newtypes over fixed-size arrays with the equality/hash semantics
//! `HashMap<KeyHash, _>` and ring lookups need, kept separate from the
//! `Vec<u8>`-based secret material in [`crate::key_and_cache`].

use rand::RngCore;
use std::fmt;

macro_rules! fixed_bytes {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                if bytes.len() != $len {
                    return None;
                }
                let mut buf = [0u8; $len];
                buf.copy_from_slice(bytes);
                Some(Self(buf))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn random() -> Self {
                let mut buf = [0u8; $len];
                rand::thread_rng().fill_bytes(&mut buf);
                Self(buf)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        // Never print key material or derived identifiers verbatim.
        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(..)", stringify!($name))
            }
        }
    };
}

fixed_bytes!(KeyHash, 8);
fixed_bytes!(Salt, 32);
fixed_bytes!(Iv, 12);

impl KeyHash {
    /// First 8 bytes of SHA-256(passphrase); uniquely identifies a key
    /// across nodes without revealing the passphrase itself.
    pub fn of_passphrase(passphrase: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(passphrase);
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&digest[..8]);
        Self(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_hash_is_deterministic() {
        let a = KeyHash::of_passphrase(b"hunter2");
        let b = KeyHash::of_passphrase(b"hunter2");
        assert_eq!(a, b);
    }

    #[test]
    fn key_hash_differs_across_passphrases() {
        let a = KeyHash::of_passphrase(b"hunter2");
        let b = KeyHash::of_passphrase(b"hunter3");
        assert_ne!(a, b);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(Salt::from_slice(&[0u8; 31]).is_none());
        assert!(Salt::from_slice(&[0u8; 32]).is_some());
    }

    #[test]
    fn random_values_are_not_all_zero() {
        let iv = Iv::random();
        assert_ne!(iv.0, [0u8; 12]);
    }
}
