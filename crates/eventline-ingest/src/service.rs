//! Hash, encode and publish orchestration.

use std::sync::Arc;
use std::time::Duration;

use eventline_types::Event;

use crate::codec::{encode, WireMessage};
use crate::error::{IngestError, SerializationError};
use crate::hasher::event_hash;
use crate::publisher::Publisher;

/// Default upper bound on a single publish step.
const DEFAULT_PUBLISH_DEADLINE: Duration = Duration::from_secs(10);

/// Turns validated events into broker messages.
///
/// Stateless between calls. Retries are left to the broker client.
pub struct IngestionService {
    publisher: Arc<dyn Publisher>,
    deadline: Duration,
}

impl IngestionService {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            publisher,
            deadline: DEFAULT_PUBLISH_DEADLINE,
        }
    }

    /// Bounds how long one call may wait on the broker.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Publishes a single event.
    ///
    /// # Errors
    ///
    /// `IngestError::Serialization` if the metadata cannot be encoded,
    /// `IngestError::Publish` if the broker rejects the message, and
    /// `IngestError::DeadlineExceeded` if no acknowledgement arrives in time.
    pub async fn process_one(&self, event: &Event) -> Result<(), IngestError> {
        let message = prepare(event).map_err(IngestError::Serialization)?;

        tokio::time::timeout(self.deadline, self.publisher.publish(&message))
            .await
            .map_err(|_| IngestError::DeadlineExceeded(self.deadline))?
            .map_err(IngestError::Publish)?;

        tracing::debug!(
            event_hash = message.event_hash,
            event_name = %message.event_name,
            "event published"
        );
        Ok(())
    }

    /// Publishes an ordered batch.
    ///
    /// Every event is encoded before anything is sent, so an unencodable
    /// event leaves the broker untouched. Publishing then walks the batch in
    /// order and stops at the first rejected message.
    ///
    /// # Errors
    ///
    /// `IngestError::BatchSerialization` / `IngestError::BatchPublish` carry
    /// the index of the failing event. `IngestError::DeadlineExceeded` means
    /// an unknown prefix of the batch may have been delivered.
    pub async fn process_many(&self, events: &[Event]) -> Result<(), IngestError> {
        let messages = events
            .iter()
            .enumerate()
            .map(|(index, event)| {
                prepare(event).map_err(|source| IngestError::BatchSerialization { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let result = tokio::time::timeout(self.deadline, self.publisher.publish_bulk(&messages))
            .await
            .map_err(|_| IngestError::DeadlineExceeded(self.deadline))?;

        if let Err(e) = result {
            tracing::warn!(
                index = e.index,
                batch_size = messages.len(),
                "bulk publish stopped early: {}",
                e.source
            );
            return Err(IngestError::BatchPublish {
                index: e.index,
                source: e.source,
            });
        }

        tracing::debug!(batch_size = messages.len(), "event batch published");
        Ok(())
    }
}

fn prepare(event: &Event) -> Result<WireMessage, SerializationError> {
    let hash = event_hash(&event.event_name, &event.user_id, event.timestamp);
    encode(event, hash)
}
