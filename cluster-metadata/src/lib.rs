//! Stand-in for the cluster-state publish/subscribe channel the key
//! manager uses to hand rotated key metadata to every node: an
//! acknowledged, urgent-priority broadcast with no persistence of its
//! own beyond the most recent value.

pub mod channel;
pub mod error;
pub mod model;

pub use channel::{InMemoryMetadataChannel, MetadataChannel};
pub use error::{MetadataError, MetadataResult};
pub use model::{KeyEntryDto, KeyMetadataDto};
