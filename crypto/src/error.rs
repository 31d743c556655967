use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid key")]
    InvalidKey,

    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("payload too short to contain a valid header")]
    ShortPayload,

    #[error("unrecognized bearer-string version {0}")]
    UnknownVersion(u32),

    #[error("no key in the ring matches the presented key hash")]
    UnknownKeyHash,

    #[error("invalid encrypted data format")]
    InvalidFormat,

    #[error("invalid nonce length")]
    InvalidNonce,

    #[error("invalid UTF-8 in decoded data")]
    InvalidUtf8,

    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("the active key hash named in cluster metadata is not present")]
    ActiveKeyMissing,

    #[error("a spare key already exists; call rotateToSpareKey instead")]
    SpareKeyAlreadyExists,

    #[error("no spare key to rotate to; call generateSpareKey first")]
    NoSpareKeyToRotate,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
