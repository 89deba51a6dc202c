//! Event to broker message conversion.

use bytes::Bytes;
use eventline_types::{Channel, Event};
use serde::{Deserialize, Serialize};

use crate::error::SerializationError;

/// The broker payload for one event.
///
/// Scalar fields are copied from the [`Event`]; `metadata` is flattened to
/// canonical JSON text so it lands in the store as a plain string column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub event_hash: u64,
    pub event_name: String,
    pub channel: Option<Channel>,
    pub campaign_id: Option<String>,
    pub user_id: String,
    pub timestamp: i64,
    pub tags: Vec<String>,
    pub metadata: String,
}

impl WireMessage {
    /// The broker key: decimal text of `event_hash`.
    pub fn partition_key(&self) -> String {
        self.event_hash.to_string()
    }

    /// The JSON body handed to the broker.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Reads a message back from a broker payload.
    pub fn from_bytes(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Builds the wire message for `event`.
///
/// An empty metadata map encodes as `"{}"`, never as an empty string.
///
/// # Errors
///
/// Returns `SerializationError` if a metadata value has no JSON
/// representation (NaN or an infinity).
pub fn encode(event: &Event, event_hash: u64) -> Result<WireMessage, SerializationError> {
    let metadata = serde_json::to_string(&event.metadata)?;

    Ok(WireMessage {
        event_hash,
        event_name: event.event_name.clone(),
        channel: event.channel,
        campaign_id: event.campaign_id.clone(),
        user_id: event.user_id.clone(),
        timestamp: event.timestamp,
        tags: event.tags.clone(),
        metadata,
    })
}
