//! Durable broker consumer that fills the analytical store.
//!
//! Messages are pulled from a JetStream durable consumer in batches, decoded,
//! and written to an [`EventSink`]. A message is acknowledged only after the
//! sink accepted the batch holding it, so anything the stream stored reaches
//! the store eventually, even across store outages or restarts of this
//! process. Redelivery can write a message twice; the store collapses rows
//! that share an event identity.

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy},
    AckKind,
};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;

use crate::codec::WireMessage;
use crate::error::{ConsumerError, SinkError};

/// Destination for consumed messages.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Stores `messages` as one unit. An error means none of them may be
    /// treated as stored.
    async fn write(&self, messages: &[WireMessage]) -> Result<(), SinkError>;
}

/// One delivered broker message and the handle used to settle it.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn payload(&self) -> &[u8];

    /// The message is stored; the broker may forget it.
    async fn acknowledge(&self) -> Result<(), async_nats::Error>;

    /// Ask for redelivery after `delay`.
    async fn redeliver_after(&self, delay: Duration) -> Result<(), async_nats::Error>;

    /// The message can never be stored; stop delivering it.
    async fn terminate(&self) -> Result<(), async_nats::Error>;
}

#[async_trait]
impl Delivery for jetstream::Message {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    async fn acknowledge(&self) -> Result<(), async_nats::Error> {
        jetstream::Message::ack(self).await
    }

    async fn redeliver_after(&self, delay: Duration) -> Result<(), async_nats::Error> {
        self.ack_with(AckKind::Nak(Some(delay))).await
    }

    async fn terminate(&self) -> Result<(), async_nats::Error> {
        self.ack_with(AckKind::Term).await
    }
}

/// What happened to the messages of one pulled batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Written to the sink and acknowledged.
    pub stored: usize,
    /// Left for redelivery after the sink failed.
    pub retried: usize,
    /// Undecodable and terminated.
    pub rejected: usize,
}

/// Decodes `deliveries`, writes them to `sink` in delivery order, and
/// settles each one with the broker.
///
/// Undecodable payloads are terminated and do not block the rest of the
/// batch. If the sink fails, every decoded message is nacked with
/// `retry_delay`.
pub async fn store_batch<D: Delivery>(
    sink: &dyn EventSink,
    deliveries: Vec<D>,
    retry_delay: Duration,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    let mut messages = Vec::with_capacity(deliveries.len());
    let mut pending = Vec::with_capacity(deliveries.len());

    for delivery in deliveries {
        match WireMessage::from_bytes(delivery.payload()) {
            Ok(message) => {
                messages.push(message);
                pending.push(delivery);
            }
            Err(e) => {
                tracing::warn!("dropping undecodable broker message: {}", e);
                if let Err(e) = delivery.terminate().await {
                    tracing::warn!("failed to terminate broker message: {}", e);
                }
                outcome.rejected += 1;
            }
        }
    }

    if messages.is_empty() {
        return outcome;
    }

    match sink.write(&messages).await {
        Ok(()) => {
            for delivery in &pending {
                // A lost ack only means a redelivery the store collapses.
                if let Err(e) = delivery.acknowledge().await {
                    tracing::warn!("failed to acknowledge stored message: {}", e);
                }
            }
            outcome.stored = pending.len();
        }
        Err(e) => {
            tracing::error!(
                count = pending.len(),
                "store write failed, scheduling redelivery: {}",
                e
            );
            for delivery in &pending {
                if let Err(e) = delivery.redeliver_after(retry_delay).await {
                    tracing::warn!("failed to nak message: {}", e);
                }
            }
            outcome.retried = pending.len();
        }
    }

    outcome
}

/// Tuning for [`StoreConsumer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Durable name; the broker keeps the delivery position under it.
    pub durable_name: String,
    /// Most messages pulled per batch.
    pub batch_size: usize,
    /// How long one pull waits for messages to arrive.
    pub max_wait: Duration,
    /// Delay before a batch the sink refused is redelivered.
    pub retry_delay: Duration,
    /// How long the broker waits for an acknowledgement before redelivering.
    pub ack_wait: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            durable_name: "eventline-store".to_string(),
            batch_size: 500,
            max_wait: Duration::from_secs(1),
            retry_delay: Duration::from_secs(5),
            ack_wait: Duration::from_secs(30),
        }
    }
}

/// Pull consumer that moves events from the stream into an [`EventSink`].
pub struct StoreConsumer {
    consumer: jetstream::consumer::Consumer<pull::Config>,
    sink: Arc<dyn EventSink>,
    settings: ConsumerSettings,
}

impl StoreConsumer {
    /// Binds to the durable consumer on `stream`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::Create` if the broker refuses the consumer.
    pub async fn create(
        stream: &jetstream::stream::Stream,
        subject: &str,
        sink: Arc<dyn EventSink>,
        settings: ConsumerSettings,
    ) -> Result<Self, ConsumerError> {
        let consumer = stream
            .get_or_create_consumer(
                &settings.durable_name,
                pull::Config {
                    durable_name: Some(settings.durable_name.clone()),
                    filter_subject: subject.to_string(),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: settings.ack_wait,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ConsumerError::Create {
                name: settings.durable_name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            consumer,
            sink,
            settings,
        })
    }

    /// Pulls and stores batches until `shutdown` flips to `true` or its
    /// sender is dropped. A batch already pulled is settled before returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(durable = %self.settings.durable_name, "store consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pulled = tokio::select! {
                _ = shutdown.changed() => break,
                pulled = self.next_batch() => pulled,
            };

            match pulled {
                Ok(deliveries) if deliveries.is_empty() => {}
                Ok(deliveries) => {
                    let outcome =
                        store_batch(self.sink.as_ref(), deliveries, self.settings.retry_delay)
                            .await;
                    tracing::debug!(
                        stored = outcome.stored,
                        retried = outcome.retried,
                        rejected = outcome.rejected,
                        "settled batch"
                    );
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
            }
        }

        tracing::info!("store consumer stopped");
    }

    async fn next_batch(&self) -> Result<Vec<jetstream::Message>, ConsumerError> {
        let mut batch = self
            .consumer
            .batch()
            .max_messages(self.settings.batch_size)
            .expires(self.settings.max_wait)
            .messages()
            .await
            .map_err(|e| ConsumerError::Pull(e.to_string()))?;

        let mut deliveries = Vec::new();
        while let Some(message) = batch.next().await {
            deliveries.push(message.map_err(|e| ConsumerError::Pull(e.to_string()))?);
        }
        Ok(deliveries)
    }
}
