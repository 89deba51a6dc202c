//! Broker publishing.
//!
//! [`Publisher`] is the seam between the ingestion service and the broker
//! client. Implementations must not report success until the broker has
//! accepted the record; [`AckMode::FireAndForget`] exists only as an
//! explicit opt-in for deployments that trade delivery visibility for
//! throughput.

use async_nats::jetstream;
use async_nats::HeaderMap;
use async_trait::async_trait;
use serde::Deserialize;

use crate::codec::WireMessage;
use crate::error::{BulkPublishError, PublishError};

/// JetStream de-duplicates messages carrying the same id within the stream's window.
const MESSAGE_ID_HEADER: &str = "Nats-Msg-Id";

/// Hands wire messages to a broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes one message and waits for the broker to accept it.
    async fn publish(&self, message: &WireMessage) -> Result<(), PublishError>;

    /// Publishes `messages` in order, stopping at the first failure.
    ///
    /// No rollback is attempted: on error, every message before
    /// `BulkPublishError::index` may already be delivered.
    async fn publish_bulk(&self, messages: &[WireMessage]) -> Result<(), BulkPublishError> {
        for (index, message) in messages.iter().enumerate() {
            self.publish(message)
                .await
                .map_err(|source| BulkPublishError { index, source })?;
        }
        Ok(())
    }
}

/// When a publish call is considered complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Return once the stream has stored the message.
    #[default]
    Acknowledged,
    /// Return once the message is sent. The acknowledgement is awaited on a
    /// background task and failures are only logged.
    FireAndForget,
}

impl std::str::FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acknowledged" => Ok(Self::Acknowledged),
            "fire_and_forget" => Ok(Self::FireAndForget),
            other => Err(format!("unknown ack mode: {other}")),
        }
    }
}

/// Publishes to a NATS JetStream subject.
#[derive(Debug, Clone)]
pub struct JetStreamPublisher {
    context: jetstream::Context,
    subject: String,
    ack_mode: AckMode,
}

impl JetStreamPublisher {
    /// Creates a publisher for `subject`. The subject must be bound to a stream.
    pub fn new(context: jetstream::Context, subject: impl Into<String>) -> Self {
        Self {
            context,
            subject: subject.into(),
            ack_mode: AckMode::default(),
        }
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }
}

#[async_trait]
impl Publisher for JetStreamPublisher {
    async fn publish(&self, message: &WireMessage) -> Result<(), PublishError> {
        let payload = message.to_bytes()?;
        let key = message.partition_key();

        let mut headers = HeaderMap::new();
        headers.insert(MESSAGE_ID_HEADER, key.as_str());

        let ack = self
            .context
            .publish_with_headers(self.subject.clone(), headers, payload)
            .await
            .map_err(|e| PublishError::Rejected(e.to_string()))?;

        match self.ack_mode {
            AckMode::Acknowledged => {
                let ack = ack
                    .await
                    .map_err(|e| PublishError::Unacknowledged(e.to_string()))?;
                tracing::trace!(
                    event_hash = %key,
                    stream = %ack.stream,
                    sequence = ack.sequence,
                    duplicate = ack.duplicate,
                    "broker acknowledged event"
                );
            }
            AckMode::FireAndForget => {
                tokio::spawn(async move {
                    if let Err(e) = ack.await {
                        tracing::warn!(event_hash = %key, "event was not acknowledged: {}", e);
                    }
                });
            }
        }

        Ok(())
    }
}
