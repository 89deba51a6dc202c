//! Error types for the ingestion path.

use std::time::Duration;

/// Event metadata holds a value with no JSON representation.
#[derive(Debug, thiserror::Error)]
#[error("event metadata cannot be encoded: {0}")]
pub struct SerializationError(#[from] serde_json::Error);

/// A single message could not be handed to the broker.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The broker refused the message or the connection failed while sending.
    #[error("broker rejected message: {0}")]
    Rejected(String),

    /// The message was sent but the broker never confirmed it.
    #[error("broker did not acknowledge message: {0}")]
    Unacknowledged(String),

    /// The wire message could not be rendered to bytes.
    #[error("wire message could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A bulk publish stopped at `index`. Messages before it may already be delivered.
#[derive(Debug, thiserror::Error)]
#[error("bulk publish stopped at index {index}: {source}")]
pub struct BulkPublishError {
    pub index: usize,
    #[source]
    pub source: PublishError,
}

/// Errors returned by [`IngestionService`](crate::IngestionService).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to encode event: {0}")]
    Serialization(#[source] SerializationError),

    #[error("failed to encode event at index {index}: {source}")]
    BatchSerialization {
        index: usize,
        #[source]
        source: SerializationError,
    },

    #[error("failed to publish event: {0}")]
    Publish(#[source] PublishError),

    #[error("failed to publish event at index {index}: {source}")]
    BatchPublish {
        index: usize,
        #[source]
        source: PublishError,
    },

    /// The publish step outlived its deadline. For a batch, an unknown
    /// prefix of the events may have been delivered.
    #[error("publish did not complete within {0:?}")]
    DeadlineExceeded(Duration),
}

impl IngestError {
    /// Position of the failing event within a batch, if the failure is tied to one.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::BatchSerialization { index, .. } | Self::BatchPublish { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }

    /// Whether the failure was caused by the submitted data rather than the broker.
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            Self::Serialization(_) | Self::BatchSerialization { .. }
        )
    }
}

/// The store could not take a batch of consumed messages. The whole batch
/// is redelivered.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("store rejected the batch: {0}")]
    Rejected(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures setting up or reading from the durable consumer.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("failed to create consumer '{name}': {reason}")]
    Create { name: String, reason: String },

    #[error("failed to pull messages: {0}")]
    Pull(String),
}
