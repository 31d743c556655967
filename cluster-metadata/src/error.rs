use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum MetadataError {
    #[error("cluster metadata publish timed out waiting for acknowledgement")]
    AckTimeout,

    #[error("cluster metadata publish failed: {0}")]
    PublishFailed(String),

    #[error("no nodes are currently subscribed to receive metadata")]
    NoSubscribers,
}

pub type MetadataResult<T> = Result<T, MetadataError>;
