use serde::{Deserialize, Serialize};

/// Wire form of a single key: the passphrase travels in cleartext over
/// the cluster-metadata channel, exactly as it would in the published
/// cluster state, and is wrapped in a `Secret` the moment it lands in a
/// `KeyRing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEntryDto {
    pub passphrase: String,
    pub timestamp: i64,
}

/// The full metadata document published on every key-ring mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMetadataDto {
    pub keys: Vec<KeyEntryDto>,
    pub active_key_hash: String,
}
