//! A minimal stand-in for cluster-state publish/subscribe: one node calls
//! `publish_urgent`, every subscribed node receives the new metadata on
//! its own `subscribe()` stream. "Urgent" priority and the acknowledged
//! contract are modeled as: `publish_urgent` does not return until the
//! value has been handed to every receiver currently registered, and
//! reports how many there were.

use crate::error::{MetadataError, MetadataResult};
use crate::model::KeyMetadataDto;
use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

#[async_trait]
pub trait MetadataChannel: Send + Sync {
    /// Publish new key metadata to every subscriber and wait for the
    /// publish to be accepted. Fails if nobody is listening yet, matching
    /// a cluster-state publish with zero other master-eligible nodes
    /// never being considered "acknowledged" by this channel's contract.
    async fn publish_urgent(&self, metadata: KeyMetadataDto) -> MetadataResult<usize>;

    /// A fresh broadcast receiver for the calling node's own subscription
    /// loop. The most-recently published metadata is not replayed.
    fn subscribe(&self) -> broadcast::Receiver<KeyMetadataDto>;

    /// The most recently published metadata, if the slot has ever been
    /// installed. Used to decide whether the once-per-cluster-lifetime
    /// install-token-metadata task still needs to run.
    async fn current(&self) -> Option<KeyMetadataDto>;
}

pub struct InMemoryMetadataChannel {
    sender: broadcast::Sender<KeyMetadataDto>,
    last_published: Mutex<Option<KeyMetadataDto>>,
}

impl InMemoryMetadataChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self {
            sender,
            last_published: Mutex::new(None),
        }
    }

    pub async fn last_published(&self) -> Option<KeyMetadataDto> {
        self.last_published.lock().await.clone()
    }
}

impl Default for InMemoryMetadataChannel {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl MetadataChannel for InMemoryMetadataChannel {
    async fn publish_urgent(&self, metadata: KeyMetadataDto) -> MetadataResult<usize> {
        *self.last_published.lock().await = Some(metadata.clone());
        match self.sender.send(metadata) {
            Ok(receiver_count) => Ok(receiver_count),
            Err(_) => Err(MetadataError::NoSubscribers),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<KeyMetadataDto> {
        self.sender.subscribe()
    }

    async fn current(&self) -> Option<KeyMetadataDto> {
        self.last_published().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn metadata(hash: &str) -> KeyMetadataDto {
        KeyMetadataDto {
            keys: vec![],
            active_key_hash: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_fails() {
        let channel = InMemoryMetadataChannel::default();
        let result = channel.publish_urgent(metadata("a")).await;
        assert!(matches!(result, Err(MetadataError::NoSubscribers)));
    }

    #[tokio::test]
    async fn subscriber_receives_published_metadata() {
        let channel = InMemoryMetadataChannel::default();
        let mut receiver = channel.subscribe();
        let count = channel.publish_urgent(metadata("a")).await.unwrap();
        assert_eq!(count, 1);
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.active_key_hash, "a");
    }

    #[tokio::test]
    async fn last_published_is_retained_for_late_joiners_to_poll() {
        let channel = InMemoryMetadataChannel::default();
        let _receiver = channel.subscribe();
        channel.publish_urgent(metadata("a")).await.unwrap();
        assert_eq!(channel.last_published().await.unwrap().active_key_hash, "a");
    }
}
