//! In-process publisher and sink that record what they were given.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::WireMessage;
use crate::consumer::EventSink;
use crate::error::{PublishError, SinkError};
use crate::publisher::Publisher;

/// A message as the broker would have received it.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRecord {
    pub key: String,
    pub payload: Bytes,
}

impl PublishedRecord {
    /// Decodes the payload back into a wire message.
    pub fn message(&self) -> Result<WireMessage, serde_json::Error> {
        WireMessage::from_bytes(&self.payload)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    published: Vec<PublishedRecord>,
    calls: usize,
    fail_on_call: Option<usize>,
}

/// Publisher backed by a vector. Can be told to reject one specific call.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    state: Mutex<MemoryState>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the publish call with the given zero-based position; all
    /// other calls succeed.
    pub fn failing_on_call(call: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                fail_on_call: Some(call),
                ..MemoryState::default()
            }),
        }
    }

    /// Records accepted so far, in publish order.
    pub fn published(&self) -> Vec<PublishedRecord> {
        self.state().published.clone()
    }

    /// Number of publish attempts, successful or not.
    pub fn call_count(&self) -> usize {
        self.state().calls
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, message: &WireMessage) -> Result<(), PublishError> {
        let payload = message.to_bytes()?;
        let mut state = self.state();
        let call = state.calls;
        state.calls += 1;

        if state.fail_on_call == Some(call) {
            return Err(PublishError::Rejected(format!(
                "injected failure on call {call}"
            )));
        }

        state.published.push(PublishedRecord {
            key: message.partition_key(),
            payload,
        });
        Ok(())
    }
}

/// Sink backed by a vector. Can be told to refuse every write.
#[derive(Debug, Default)]
pub struct MemorySink {
    stored: Mutex<Vec<WireMessage>>,
    failure: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every write fails with [`SinkError::Unavailable`].
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            stored: Mutex::default(),
            failure: Some(message.into()),
        }
    }

    /// Messages written so far, in write order.
    pub fn stored(&self) -> Vec<WireMessage> {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn write(&self, messages: &[WireMessage]) -> Result<(), SinkError> {
        if let Some(message) = &self.failure {
            return Err(SinkError::Unavailable(message.clone()));
        }
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(messages);
        Ok(())
    }
}
