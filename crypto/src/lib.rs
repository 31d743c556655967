//! Key lifecycle and bearer-string cryptography for the token service.
//!
//! Scope: fixed-width key/byte primitives, a key's passphrase plus its
//! bounded derived-key cache (`KeyAndCache`), an immutable ring of known
//! keys (`KeyRing`), the pure key-rotation mutations (`key_manager`), and
//! the AES-128-GCM cipher the legacy bearer-string codec uses. This crate
//! does no I/O: publishing rotated metadata and talking to the document
//! store live in `token-service`.

pub mod error;
pub mod key_and_cache;
pub mod key_manager;
pub mod key_ring;
pub mod legacy_cipher;
pub mod memory_security;
pub mod kdf;
pub mod primitives;

pub use error::*;
pub use key_and_cache::{KeyAndCache, KeyAndTimestamp};
pub use key_ring::KeyRing;
pub use legacy_cipher::LegacyCipher;
pub use memory_security::SecureMemory;
pub use primitives::{Iv, KeyHash, Salt};
