//! Stateful wrapper around the pure `crypto::key_manager` mutations: owns
//! the atomically-swapped `KeyRing`, the monotonic timestamp counter, and
//! the install/rotate submissions through the cluster-metadata channel.
//!
//! `generate_spare_key`, `rotate_to_spare_key`, and `prune_keys` are
//! mutually exclusive (spec.md §5) — serialized by `op_lock` rather than
//! relying on the caller, since two administrative rotations racing
//! would otherwise both read the same "newest entry" snapshot.

use arc_swap::ArcSwap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use cluster_metadata::{KeyEntryDto, KeyMetadataDto, MetadataChannel};
use crypto::{KeyAndTimestamp, KeyHash, KeyRing};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{TokenServiceError, TokenServiceResult};

fn encode_hash(hash: KeyHash) -> String {
    URL_SAFE_NO_PAD.encode(hash.as_bytes())
}

fn decode_hash(s: &str) -> Option<KeyHash> {
    let bytes = URL_SAFE_NO_PAD.decode(s).ok()?;
    KeyHash::from_slice(&bytes)
}

fn to_dto(keys: &[KeyAndTimestamp], active_key_hash: KeyHash) -> KeyMetadataDto {
    KeyMetadataDto {
        keys: keys
            .iter()
            .map(|k| KeyEntryDto {
                passphrase: String::from_utf8_lossy(k.passphrase_bytes()).into_owned(),
                timestamp: k.timestamp,
            })
            .collect(),
        active_key_hash: encode_hash(active_key_hash),
    }
}

fn from_dto(dto: &KeyMetadataDto) -> TokenServiceResult<(Vec<KeyAndTimestamp>, KeyHash)> {
    let keys = dto
        .keys
        .iter()
        .map(|entry| KeyAndTimestamp::new(entry.passphrase.clone(), entry.timestamp))
        .collect();
    let active_hash = decode_hash(&dto.active_key_hash)
        .ok_or_else(|| TokenServiceError::FatalInconsistency("malformed active key hash in metadata".to_string()))?;
    Ok((keys, active_hash))
}

pub struct KeyManager {
    ring: ArcSwap<KeyRing>,
    counter: AtomicI64,
    channel: Arc<dyn MetadataChannel>,
    op_lock: Mutex<()>,
    install_in_progress: AtomicBool,
}

impl KeyManager {
    /// Start with a single ephemeral key (spec.md §3, "KeyRing is created
    /// at startup with one ephemeral key").
    pub fn bootstrap(channel: Arc<dyn MetadataChannel>) -> TokenServiceResult<Arc<Self>> {
        let ephemeral = KeyAndTimestamp::new(crypto::key_manager::random_passphrase(), 0);
        let active_hash = KeyHash::of_passphrase(ephemeral.passphrase_bytes());
        let ring = KeyRing::rebuild(vec![ephemeral], active_hash, None)?;

        Ok(Arc::new(Self {
            ring: ArcSwap::from_pointee(ring),
            counter: AtomicI64::new(0),
            channel,
            op_lock: Mutex::new(()),
            install_in_progress: AtomicBool::new(false),
        }))
    }

    pub fn current_ring(&self) -> Arc<KeyRing> {
        self.ring.load_full()
    }

    /// Spawn the background task every node runs: on each received
    /// metadata change, rebuild the local ring (spec.md §4.2, "on
    /// receiving a changed metadata event, every node invokes
    /// refreshMetaData").
    pub fn spawn_subscriber(self: &Arc<Self>) {
        let manager = self.clone();
        let mut receiver = manager.channel.subscribe();
        tokio::spawn(async move {
            while let Ok(dto) = receiver.recv().await {
                if let Err(err) = manager.apply_metadata(&dto) {
                    warn!(error = %err, "failed to apply incoming key metadata");
                }
            }
        });
    }

    fn apply_metadata(&self, dto: &KeyMetadataDto) -> TokenServiceResult<()> {
        let (keys, active_hash) = from_dto(dto)?;
        let max_timestamp = keys.iter().map(|k| k.timestamp).max().unwrap_or(0);
        let current = self.current_ring();
        let rebuilt = crypto::key_manager::refresh_metadata(keys, active_hash, Some(&current))?;
        self.ring.store(Arc::new(rebuilt));
        let mut observed = self.counter.load(Ordering::SeqCst);
        while max_timestamp > observed {
            match self
                .counter
                .compare_exchange(observed, max_timestamp, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(actual) => observed = actual,
            }
        }
        debug!("applied incoming key metadata");
        Ok(())
    }

    /// If the newest entry is the active one, publish a new spare key.
    pub async fn generate_spare_key(&self) -> TokenServiceResult<()> {
        let _guard = self.op_lock.lock().await;
        let ring = self.current_ring();
        let next_timestamp = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let metadata = crypto::key_manager::generate_spare_key(&ring, next_timestamp)?;
        self.publish_and_apply(&metadata.keys, metadata.active_key_hash).await
    }

    /// Promote the spare key (the newest non-active entry) to active.
    pub async fn rotate_to_spare_key(&self) -> TokenServiceResult<()> {
        let _guard = self.op_lock.lock().await;
        let ring = self.current_ring();
        let metadata = crypto::key_manager::rotate_to_spare_key(&ring)?;
        self.publish_and_apply(&metadata.keys, metadata.active_key_hash).await
    }

    /// Keep only the `n` newest keys (the active one is always kept).
    pub async fn prune_keys(&self, n: usize) -> TokenServiceResult<()> {
        let _guard = self.op_lock.lock().await;
        let ring = self.current_ring();
        let metadata = crypto::key_manager::prune_keys(&ring, n);
        self.publish_and_apply(&metadata.keys, metadata.active_key_hash).await
    }

    /// Administrative rotation: generate a spare, then promote it. Only
    /// the elected leader should call this (leadership itself is an
    /// external-collaborator concern, out of scope here).
    pub async fn rotate_keys_on_master(&self) -> TokenServiceResult<()> {
        self.generate_spare_key().await?;
        self.rotate_to_spare_key().await
    }

    /// Install the metadata slot once per cluster lifetime, if nothing
    /// has been published yet. `install_in_progress` prevents duplicate
    /// submissions from overlapping metadata-change events.
    pub async fn maybe_install_token_metadata(&self) -> TokenServiceResult<()> {
        if self.channel.current().await.is_some() {
            return Ok(());
        }
        if self
            .install_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let ring = self.current_ring();
        let keys: Vec<KeyAndTimestamp> = ring
            .entries_by_timestamp_desc()
            .into_iter()
            .map(|(_, entry)| entry.key_and_timestamp())
            .collect();
        let result = self.publish_and_apply(&keys, ring.active_key_hash()).await;
        self.install_in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn publish_and_apply(&self, keys: &[KeyAndTimestamp], active_key_hash: KeyHash) -> TokenServiceResult<()> {
        let dto = to_dto(keys, active_key_hash);
        self.channel.publish_urgent(dto.clone()).await?;
        self.apply_metadata(&dto)
    }
}
