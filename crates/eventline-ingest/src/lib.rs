//! Event ingestion for Eventline: identity, encoding, and publishing.
//!
//! Every accepted event goes through three steps before it reaches the
//! broker:
//!
//! 1. [`event_hash`] derives a stable 64-bit identity from
//!    `(event_name, user_id, timestamp)`. It doubles as the broker
//!    de-duplication key.
//! 2. [`encode`] turns the event into a [`WireMessage`], flattening the
//!    metadata map to canonical JSON text.
//! 3. A [`Publisher`] hands the message to the broker and waits for the
//!    acknowledgement.
//!
//! [`IngestionService`] runs the three steps for a single event or an
//! ordered batch and reports failures with the index of the offending event.
//!
//! On the other side of the stream, a [`StoreConsumer`] pulls from a durable
//! JetStream consumer and hands decoded messages to an [`EventSink`],
//! acknowledging each message only once the sink stored it.
//!
//! # Publishers
//!
//! | Publisher | Backing |
//! |-----------|---------|
//! | [`JetStreamPublisher`] | NATS JetStream stream, `Nats-Msg-Id` = event hash |
//! | [`MemoryPublisher`] | in-process record list, optional injected failure |

mod codec;
mod consumer;
mod error;
mod hasher;
mod memory;
mod publisher;
mod service;

pub use codec::{encode, WireMessage};
pub use consumer::{
    store_batch, BatchOutcome, ConsumerSettings, Delivery, EventSink, StoreConsumer,
};
pub use error::{
    BulkPublishError, ConsumerError, IngestError, PublishError, SerializationError, SinkError,
};
pub use hasher::event_hash;
pub use memory::{MemoryPublisher, MemorySink, PublishedRecord};
pub use publisher::{AckMode, JetStreamPublisher, Publisher};
pub use service::IngestionService;
